use std::collections::VecDeque;
use std::rc::Rc;

use itertools::Itertools;
use rand::Rng;

use crate::search::{Engine, Searcher, SeedRng, SharedRng};
use crate::state::ExecutionState;

/// Depth first search: always advances the most recently added state, which
/// keeps the engine burrowing down one path until it terminates or forks.
#[derive(Debug)]
pub struct DfsSearcher<S: ExecutionState> {
    states: Vec<Rc<S>>,
}

impl<S: ExecutionState> Default for DfsSearcher<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ExecutionState> DfsSearcher<S> {
    pub fn new() -> Self {
        Self { states: vec![] }
    }
}

impl<S: ExecutionState> Searcher<S> for DfsSearcher<S> {
    fn name(&self) -> &'static str {
        "dfs"
    }

    fn select(&mut self, _engine: &mut dyn Engine<S>) -> Rc<S> {
        self.states.last().expect("selecting from an empty searcher").clone()
    }

    fn update(&mut self, _engine: &mut dyn Engine<S>, _current: Option<&Rc<S>>, added: &[Rc<S>], removed: &[Rc<S>]) {
        self.states.extend(added.iter().cloned());
        for state in removed {
            if self.states.last().is_some_and(|top| top.id() == state.id()) {
                _ = self.states.pop();
            } else {
                let (idx, _) = self
                    .states
                    .iter()
                    .find_position(|tracked| tracked.id() == state.id())
                    .expect("removed state was not tracked");
                _ = self.states.remove(idx);
            }
        }
    }

    fn is_empty(&self, _engine: &dyn Engine<S>) -> bool {
        self.states.is_empty()
    }
}

/// Breadth first search over a queue. A forking `current` is rotated to the
/// tail so that its siblings get their turn before either successor runs
/// again; this keeps round-robin fairness even when this searcher is only one
/// voice inside an interleaved composite.
#[derive(Debug)]
pub struct BfsSearcher<S: ExecutionState> {
    states: VecDeque<Rc<S>>,
}

impl<S: ExecutionState> Default for BfsSearcher<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ExecutionState> BfsSearcher<S> {
    pub fn new() -> Self {
        Self { states: VecDeque::new() }
    }
}

impl<S: ExecutionState> Searcher<S> for BfsSearcher<S> {
    fn name(&self) -> &'static str {
        "bfs"
    }

    fn select(&mut self, _engine: &mut dyn Engine<S>) -> Rc<S> {
        self.states.front().expect("selecting from an empty searcher").clone()
    }

    fn update(&mut self, _engine: &mut dyn Engine<S>, current: Option<&Rc<S>>, added: &[Rc<S>], removed: &[Rc<S>]) {
        if let Some(current) = current {
            if !added.is_empty() && !removed.iter().any(|s| s.id() == current.id()) {
                let (idx, _) = self
                    .states
                    .iter()
                    .find_position(|tracked| tracked.id() == current.id())
                    .expect("current state was not tracked");
                _ = self.states.remove(idx);
                self.states.push_back(current.clone());
            }
        }
        self.states.extend(added.iter().cloned());
        for state in removed {
            if self.states.front().is_some_and(|head| head.id() == state.id()) {
                _ = self.states.pop_front();
            } else {
                let (idx, _) = self
                    .states
                    .iter()
                    .find_position(|tracked| tracked.id() == state.id())
                    .expect("removed state was not tracked");
                _ = self.states.remove(idx);
            }
        }
    }

    fn is_empty(&self, _engine: &dyn Engine<S>) -> bool {
        self.states.is_empty()
    }
}

/// Uniform random selection over all tracked states.
#[derive(Debug)]
pub struct RandomSearcher<S: ExecutionState, R: SeedRng> {
    states: Vec<Rc<S>>,
    rng: SharedRng<R>,
}

impl<S: ExecutionState, R: SeedRng> RandomSearcher<S, R> {
    pub fn new(rng: SharedRng<R>) -> Self {
        Self { states: vec![], rng }
    }
}

impl<S: ExecutionState, R: SeedRng + 'static> Searcher<S> for RandomSearcher<S, R> {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select(&mut self, _engine: &mut dyn Engine<S>) -> Rc<S> {
        assert!(!self.states.is_empty(), "selecting from an empty searcher");
        let idx = self.rng.borrow_mut().random_range(0..self.states.len());
        self.states[idx].clone()
    }

    fn update(&mut self, _engine: &mut dyn Engine<S>, _current: Option<&Rc<S>>, added: &[Rc<S>], removed: &[Rc<S>]) {
        self.states.extend(added.iter().cloned());
        for state in removed {
            let (idx, _) = self
                .states
                .iter()
                .find_position(|tracked| tracked.id() == state.id())
                .expect("removed state was not tracked");
            _ = self.states.swap_remove(idx);
        }
    }

    fn is_empty(&self, _engine: &dyn Engine<S>) -> bool {
        self.states.is_empty()
    }
}
