use std::mem::take;
use std::rc::Rc;

use itertools::Itertools;
use log::debug;

use crate::search::{Engine, Searcher};
use crate::state::ExecutionState;
use crate::stats::WallClock;

const INITIAL_ROUND_BUDGET: f64 = 1.0;

/// Iterative deepening over wall-clock time. A state whose step overruns the
/// round budget is pulled out of the base searcher and paused; once the base
/// runs dry the budget doubles and every paused state rejoins for the next
/// round. States that finish inside the budget are never disturbed, so cheap
/// paths get explored exhaustively before expensive ones are given more rope.
#[derive(Debug)]
pub struct IterativeDeepeningTimeSearcher<S: ExecutionState> {
    base: Box<dyn Searcher<S>>,
    clock: Rc<dyn WallClock>,
    paused: Vec<Rc<S>>,
    round_budget: f64,
    select_time: f64,
}

impl<S: ExecutionState> IterativeDeepeningTimeSearcher<S> {
    pub fn new(base: Box<dyn Searcher<S>>, clock: Rc<dyn WallClock>) -> Self {
        let select_time = clock.wall_time();
        Self { base, clock, paused: vec![], round_budget: INITIAL_ROUND_BUDGET, select_time }
    }

    pub fn round_budget(&self) -> f64 {
        self.round_budget
    }
}

impl<S: ExecutionState> Searcher<S> for IterativeDeepeningTimeSearcher<S> {
    fn name(&self) -> &'static str {
        "iterative-deepening"
    }

    fn select(&mut self, engine: &mut dyn Engine<S>) -> Rc<S> {
        self.select_time = self.clock.wall_time();
        self.base.select(engine)
    }

    fn update(&mut self, engine: &mut dyn Engine<S>, current: Option<&Rc<S>>, added: &[Rc<S>], removed: &[Rc<S>]) {
        let elapsed = self.clock.wall_time() - self.select_time;
        if self.paused.is_empty() {
            self.base.update(engine, current, added, removed);
        } else {
            // paused states were taken out of the base already; their removal
            // only concerns the paused set
            let forwarded = removed
                .iter()
                .filter(|s| !self.paused.iter().any(|p| p.id() == s.id()))
                .cloned()
                .collect_vec();
            self.paused.retain(|p| !removed.iter().any(|s| s.id() == p.id()));
            self.base.update(engine, current, added, &forwarded);
        }
        if let Some(current) = current {
            if elapsed > self.round_budget && !removed.iter().any(|s| s.id() == current.id()) {
                self.paused.push(current.clone());
                self.base.remove_state(engine, current);
            }
        }
        if self.base.is_empty(engine) && !self.paused.is_empty() {
            self.round_budget *= 2.0;
            debug!("all states exceeded the round budget, doubling it to {}s", self.round_budget);
            for state in take(&mut self.paused) {
                self.base.add_state(engine, &state);
            }
        }
    }

    fn is_empty(&self, engine: &dyn Engine<S>) -> bool {
        self.base.is_empty(engine) && self.paused.is_empty()
    }

    fn respects_removal(&self) -> bool {
        self.base.respects_removal()
    }
}
