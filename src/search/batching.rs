use std::rc::Rc;

use log::debug;

use crate::search::{Engine, Searcher};
use crate::state::ExecutionState;
use crate::stats::{SearchStats, WallClock};

/// How long [`BatchingSearcher`] sticks with one state before asking its base
/// searcher again.
#[derive(Debug, Copy, Clone)]
pub struct BatchingBudgets {
    /// Wall-clock seconds per batch.
    pub time_budget: f64,
    /// Executed instructions per batch.
    pub instruction_budget: u64,
}

impl Default for BatchingBudgets {
    fn default() -> Self {
        Self { time_budget: 5.0, instruction_budget: 10_000 }
    }
}

/// Repeats the base searcher's last choice until a time or instruction budget
/// runs out, amortizing expensive selection strategies over many cheap steps.
/// The cached state survives intervening updates unless one of them removes
/// it. A batch that overshoots its time budget by more than 10% (a slow
/// solver call, usually) raises the budget to the observed duration so that
/// later batches aren't cut short right after being selected.
#[derive(Debug)]
pub struct BatchingSearcher<S: ExecutionState> {
    base: Box<dyn Searcher<S>>,
    budgets: BatchingBudgets,
    clock: Rc<dyn WallClock>,
    stats: Rc<dyn SearchStats>,
    last: Option<Rc<S>>,
    batch_start_time: f64,
    batch_start_instructions: u64,
}

impl<S: ExecutionState> BatchingSearcher<S> {
    pub fn new(
        base: Box<dyn Searcher<S>>,
        budgets: BatchingBudgets,
        clock: Rc<dyn WallClock>,
        stats: Rc<dyn SearchStats>,
    ) -> Self {
        Self { base, budgets, clock, stats, last: None, batch_start_time: 0.0, batch_start_instructions: 0 }
    }

    fn batch_expired(&self, now: f64) -> bool {
        match &self.last {
            None => true,
            Some(_) => {
                now - self.batch_start_time > self.budgets.time_budget
                    || self.stats.instructions() - self.batch_start_instructions > self.budgets.instruction_budget
            }
        }
    }
}

impl<S: ExecutionState> Searcher<S> for BatchingSearcher<S> {
    fn name(&self) -> &'static str {
        "batching"
    }

    fn select(&mut self, engine: &mut dyn Engine<S>) -> Rc<S> {
        let now = self.clock.wall_time();
        if !self.batch_expired(now) {
            return self.last.clone().unwrap();
        }
        if self.last.is_some() {
            let elapsed = now - self.batch_start_time;
            if elapsed > self.budgets.time_budget * 1.1 {
                debug!("raising the batch time budget from {}s to {elapsed}s", self.budgets.time_budget);
                self.budgets.time_budget = elapsed;
            }
        }
        let state = self.base.select(engine);
        self.last = Some(state.clone());
        self.batch_start_time = self.clock.wall_time();
        self.batch_start_instructions = self.stats.instructions();
        state
    }

    fn update(&mut self, engine: &mut dyn Engine<S>, current: Option<&Rc<S>>, added: &[Rc<S>], removed: &[Rc<S>]) {
        if let Some(last) = &self.last {
            if removed.iter().any(|s| s.id() == last.id()) {
                self.last = None;
            }
        }
        self.base.update(engine, current, added, removed);
    }

    fn is_empty(&self, engine: &dyn Engine<S>) -> bool {
        self.base.is_empty(engine)
    }

    fn respects_removal(&self) -> bool {
        self.base.respects_removal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::basic::BfsSearcher;
    use crate::search::tests::{TestEngine, TestResources, TestState};

    fn budgets() -> BatchingBudgets {
        BatchingBudgets { time_budget: 1.0, instruction_budget: 1000 }
    }

    fn searcher(res: &TestResources) -> BatchingSearcher<TestState> {
        BatchingSearcher::new(Box::new(BfsSearcher::new()), budgets(), res.clock.clone(), res.stats.clone())
    }

    #[test]
    fn batch_stickiness_test() {
        let res = TestResources::seeded(0);
        let mut engine = TestEngine::new();
        let engine = &mut engine;
        let mut batching = searcher(&res);
        let (a, b) = (TestState::new(1), TestState::new(2));
        batching.update(engine, None, &[a.clone(), b.clone()], &[]);
        assert_eq!(batching.select(engine).id(), a.id());
        // rotate the base's preference away from a; the cached choice wins
        // regardless
        batching.update(engine, Some(&a), &[TestState::new(3)], &[]);
        res.clock.advance(0.5);
        res.stats.add_instructions(400);
        assert_eq!(batching.select(engine).id(), a.id());
        // past the time budget a fresh state is picked
        res.clock.advance(0.6);
        assert_ne!(batching.select(engine).id(), a.id());
    }

    #[test]
    fn instruction_budget_test() {
        let res = TestResources::seeded(0);
        let mut engine = TestEngine::new();
        let engine = &mut engine;
        let mut batching = searcher(&res);
        let (a, b) = (TestState::new(1), TestState::new(2));
        batching.update(engine, None, &[a.clone(), b.clone()], &[]);
        assert_eq!(batching.select(engine).id(), a.id());
        // exactly on budget is still inside the batch
        res.stats.add_instructions(1000);
        assert_eq!(batching.select(engine).id(), a.id());
        // a forks; the base queue rotates it behind b, but the cache is intact
        batching.update(engine, Some(&a), &[TestState::new(3)], &[]);
        assert_eq!(batching.select(engine).id(), a.id());
        res.stats.add_instructions(1);
        // one instruction over budget starts a fresh batch at the queue head
        assert_eq!(batching.select(engine).id(), b.id());
    }

    #[test]
    fn self_tuning_test() {
        let res = TestResources::seeded(0);
        let mut engine = TestEngine::new();
        let engine = &mut engine;
        let mut batching = searcher(&res);
        let a = TestState::new(1);
        batching.add_state(engine, &a);
        assert_eq!(batching.select(engine).id(), a.id());
        // a solver call blew way past the budget; the budget adapts
        res.clock.advance(3.0);
        assert_eq!(batching.select(engine).id(), a.id());
        assert_eq!(batching.budgets.time_budget, 3.0);
        // the next batch only expires once the raised budget runs out
        res.clock.advance(2.0);
        let now = res.clock.wall_time();
        assert!(!batching.batch_expired(now));
        res.clock.advance(1.5);
        let now = res.clock.wall_time();
        assert!(batching.batch_expired(now));
    }

    #[test]
    fn removal_invalidates_cache_test() {
        let res = TestResources::seeded(0);
        let mut engine = TestEngine::new();
        let engine = &mut engine;
        let mut batching = searcher(&res);
        let (a, b) = (TestState::new(1), TestState::new(2));
        batching.update(engine, None, &[a.clone(), b.clone()], &[]);
        assert_eq!(batching.select(engine).id(), a.id());
        batching.remove_state(engine, &a);
        // no budget has expired, but the cached state is gone
        assert_eq!(batching.select(engine).id(), b.id());
    }
}
