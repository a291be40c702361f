/*
 *  Rudders, a library of state selection schedulers for symbolic execution.
 *  Copyright (C) 2024 ToTheAnd
 *
 *  Rudders is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  Rudders is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with Rudders. If not, see <https://www.gnu.org/licenses/>.
 */

use std::rc::Rc;

use anyhow::bail;
use rand::Rng;

use crate::search::{Engine, Res, Searcher, SearcherError, SeedRng, SharedRng};
use crate::state::{ExecutionState, RecoveryPriority};

fn split_by_kind<S: ExecutionState>(states: &[Rc<S>]) -> (Vec<Rc<S>>, Vec<Rc<S>>) {
    states.iter().cloned().partition(|s| s.is_recovery())
}

/// Routes states by kind: ordinary states feed the base searcher, recovery
/// states the recovery searcher, and neither ever sees the other kind. With
/// both sides populated, `select` prefers the recovery side with probability
/// `ratio`%.
#[derive(Debug)]
pub struct SplittedSearcher<S: ExecutionState, R: SeedRng> {
    base: Box<dyn Searcher<S>>,
    recovery: Box<dyn Searcher<S>>,
    ratio: u32,
    rng: SharedRng<R>,
}

fn check_ratio(ratio: u32) -> Res<()> {
    if ratio > 100 {
        bail!(SearcherError::InvalidRatio(ratio));
    }
    Ok(())
}

impl<S: ExecutionState, R: SeedRng> SplittedSearcher<S, R> {
    pub fn new(base: Box<dyn Searcher<S>>, recovery: Box<dyn Searcher<S>>, ratio: u32, rng: SharedRng<R>) -> Res<Self> {
        check_ratio(ratio)?;
        Ok(Self { base, recovery, ratio, rng })
    }

    fn pick_recovery_side(&mut self) -> bool {
        self.rng.borrow_mut().random_range(0..100) < self.ratio
    }
}

impl<S: ExecutionState, R: SeedRng + 'static> Searcher<S> for SplittedSearcher<S, R> {
    fn name(&self) -> &'static str {
        "splitted"
    }

    fn select(&mut self, engine: &mut dyn Engine<S>) -> Rc<S> {
        if self.base.is_empty(engine) {
            self.recovery.select(engine)
        } else if self.recovery.is_empty(engine) || !self.pick_recovery_side() {
            self.base.select(engine)
        } else {
            self.recovery.select(engine)
        }
    }

    fn update(&mut self, engine: &mut dyn Engine<S>, current: Option<&Rc<S>>, added: &[Rc<S>], removed: &[Rc<S>]) {
        let (recovery_added, base_added) = split_by_kind(added);
        let (recovery_removed, base_removed) = split_by_kind(removed);
        // a sub-searcher only gets to see `current` if it is of its kind, so
        // that current-related heuristics are never applied to a state the
        // searcher doesn't track
        self.base.update(engine, current.filter(|c| !c.is_recovery()), &base_added, &base_removed);
        self.recovery.update(engine, current.filter(|c| c.is_recovery()), &recovery_added, &recovery_removed);
    }

    fn is_empty(&self, engine: &dyn Engine<S>) -> bool {
        self.base.is_empty(engine) && self.recovery.is_empty(engine)
    }

    fn respects_removal(&self) -> bool {
        self.base.respects_removal() && self.recovery.respects_removal()
    }
}

/// [`SplittedSearcher`] plus a bypass for high-priority recovery states: as
/// long as any of those are pending they are selected first, ahead of both
/// regular sides. Once a root recovery state completes, the remaining
/// high-priority states lose their urgency: they are demoted and handed to
/// the regular recovery searcher.
#[derive(Debug)]
pub struct OptimizedSplittedSearcher<S: ExecutionState, R: SeedRng> {
    base: Box<dyn Searcher<S>>,
    recovery: Box<dyn Searcher<S>>,
    high_priority: Box<dyn Searcher<S>>,
    // mirror of the high-priority searcher's contents, needed to flush it
    high_states: Vec<Rc<S>>,
    ratio: u32,
    rng: SharedRng<R>,
}

impl<S: ExecutionState, R: SeedRng> OptimizedSplittedSearcher<S, R> {
    pub fn new(
        base: Box<dyn Searcher<S>>,
        recovery: Box<dyn Searcher<S>>,
        high_priority: Box<dyn Searcher<S>>,
        ratio: u32,
        rng: SharedRng<R>,
    ) -> Res<Self> {
        check_ratio(ratio)?;
        Ok(Self { base, recovery, high_priority, high_states: vec![], ratio, rng })
    }
}

impl<S: ExecutionState, R: SeedRng + 'static> Searcher<S> for OptimizedSplittedSearcher<S, R> {
    fn name(&self) -> &'static str {
        "optimized-splitted"
    }

    fn select(&mut self, engine: &mut dyn Engine<S>) -> Rc<S> {
        if !self.high_priority.is_empty(engine) {
            self.high_priority.select(engine)
        } else if self.base.is_empty(engine) {
            self.recovery.select(engine)
        } else if self.recovery.is_empty(engine) || self.rng.borrow_mut().random_range(0..100) >= self.ratio {
            self.base.select(engine)
        } else {
            self.recovery.select(engine)
        }
    }

    fn update(&mut self, engine: &mut dyn Engine<S>, current: Option<&Rc<S>>, added: &[Rc<S>], removed: &[Rc<S>]) {
        let (recovery_added, base_added) = split_by_kind(added);
        let (recovery_removed, base_removed) = split_by_kind(removed);
        let (high_added, low_added): (Vec<_>, Vec<_>) =
            recovery_added.into_iter().partition(|s| s.priority() == RecoveryPriority::High);
        let (high_removed, low_removed): (Vec<_>, Vec<_>) =
            recovery_removed.iter().cloned().partition(|s| s.priority() == RecoveryPriority::High);

        self.base.update(engine, current.filter(|c| !c.is_recovery()), &base_added, &base_removed);
        let high_current = current.filter(|c| c.is_recovery() && c.priority() == RecoveryPriority::High);
        let low_current = current.filter(|c| c.is_recovery() && c.priority() == RecoveryPriority::Low);
        self.recovery.update(engine, low_current, &low_added, &low_removed);
        self.high_priority.update(engine, high_current, &high_added, &high_removed);

        self.high_states.extend(high_added);
        self.high_states.retain(|h| !high_removed.iter().any(|s| s.id() == h.id()));

        // a root recovery state finished: whatever urgency the remaining
        // high-priority states had is gone with it
        if recovery_removed.iter().any(|s| s.is_resumed() && s.level() == 0) {
            for state in std::mem::take(&mut self.high_states) {
                self.high_priority.remove_state(engine, &state);
                state.set_priority(RecoveryPriority::Low);
                self.recovery.add_state(engine, &state);
            }
        }
    }

    fn is_empty(&self, engine: &dyn Engine<S>) -> bool {
        self.base.is_empty(engine) && self.recovery.is_empty(engine) && self.high_priority.is_empty(engine)
    }

    fn respects_removal(&self) -> bool {
        self.base.respects_removal() && self.recovery.respects_removal() && self.high_priority.respects_removal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::basic::DfsSearcher;
    use crate::search::tests::{RecordingSearcher, TestEngine, TestState, shared_rng};
    use crate::state::RecoveryPriority::{High, Low};

    fn splitted(ratio: u32) -> SplittedSearcher<TestState, rand::rngs::StdRng> {
        SplittedSearcher::new(Box::new(DfsSearcher::new()), Box::new(DfsSearcher::new()), ratio, shared_rng(99))
            .unwrap()
    }

    #[test]
    fn kind_purity_test() {
        let mut engine = TestEngine::new();
        let engine = &mut engine;
        let (base, base_record) = RecordingSearcher::new();
        let (recovery_side, recovery_record) = RecordingSearcher::new();
        let mut searcher =
            SplittedSearcher::new(Box::new(base), Box::new(recovery_side), 50, shared_rng(0)).unwrap();
        let ordinary = TestState::new(1);
        let recovery = TestState::recovery(2, 0, Low);
        searcher.update(engine, None, &[ordinary.clone(), recovery.clone()], &[]);
        searcher.update(engine, Some(&ordinary), &[], &[]);
        searcher.update(engine, Some(&recovery), &[], &[ordinary.clone(), recovery.clone()]);
        assert_eq!(*base_record.added.borrow(), vec![ordinary.id()]);
        assert_eq!(*base_record.removed.borrow(), vec![ordinary.id()]);
        assert_eq!(*recovery_record.added.borrow(), vec![recovery.id()]);
        assert_eq!(*recovery_record.removed.borrow(), vec![recovery.id()]);
        // each side saw `current` only when it was of its kind
        assert_eq!(*base_record.currents.borrow(), vec![None, Some(ordinary.id()), None]);
        assert_eq!(*recovery_record.currents.borrow(), vec![None, None, Some(recovery.id())]);
    }

    #[test]
    fn ratio_extremes_test() {
        let mut engine = TestEngine::new();
        let engine = &mut engine;
        let ordinary = TestState::new(1);
        let recovery = TestState::recovery(2, 0, Low);
        let mut always_recovery = splitted(100);
        always_recovery.update(engine, None, &[ordinary.clone(), recovery.clone()], &[]);
        for _ in 0..20 {
            assert_eq!(always_recovery.select(engine).id(), recovery.id());
        }
        let mut never_recovery = splitted(0);
        never_recovery.update(engine, None, &[ordinary.clone(), recovery.clone()], &[]);
        for _ in 0..20 {
            assert_eq!(never_recovery.select(engine).id(), ordinary.id());
        }
    }

    #[test]
    fn falls_back_to_nonempty_side_test() {
        let mut engine = TestEngine::new();
        let engine = &mut engine;
        let ordinary = TestState::new(1);
        let recovery = TestState::recovery(2, 0, Low);
        let mut searcher = splitted(0);
        searcher.add_state(engine, &recovery);
        // ratio 0 still selects the recovery state when the base is empty
        assert_eq!(searcher.select(engine).id(), recovery.id());
        let mut searcher = splitted(100);
        searcher.add_state(engine, &ordinary);
        assert_eq!(searcher.select(engine).id(), ordinary.id());
    }

    #[test]
    fn rejects_bad_ratio_test() {
        let res = SplittedSearcher::<TestState, _>::new(
            Box::new(DfsSearcher::new()),
            Box::new(DfsSearcher::new()),
            101,
            shared_rng(0),
        );
        assert!(res.is_err());
    }

    fn optimized(ratio: u32) -> OptimizedSplittedSearcher<TestState, rand::rngs::StdRng> {
        OptimizedSplittedSearcher::new(
            Box::new(DfsSearcher::new()),
            Box::new(DfsSearcher::new()),
            Box::new(DfsSearcher::new()),
            ratio,
            shared_rng(7),
        )
        .unwrap()
    }

    #[test]
    fn high_priority_first_test() {
        let mut engine = TestEngine::new();
        let engine = &mut engine;
        let mut searcher = optimized(50);
        let ordinary = TestState::new(1);
        let low = TestState::recovery(2, 1, Low);
        let high = TestState::recovery(3, 1, High);
        searcher.update(engine, None, &[high.clone(), low.clone(), ordinary.clone()], &[]);
        for _ in 0..10 {
            assert_eq!(searcher.select(engine).id(), high.id());
        }
        searcher.remove_state(engine, &high);
        // with the bypass empty, selection falls back to the splitted scheme
        let chosen = searcher.select(engine);
        assert!(chosen.id() == ordinary.id() || chosen.id() == low.id());
    }

    #[test]
    fn resumed_high_priority_root_flushes_test() {
        let mut engine = TestEngine::new();
        let engine = &mut engine;
        let mut searcher = optimized(50);
        let ordinary = TestState::new(1);
        let low = TestState::recovery(2, 0, Low);
        let high_root = TestState::recovery(3, 0, High);
        searcher.update(engine, None, &[high_root.clone(), low.clone(), ordinary.clone()], &[]);
        // the high-priority state wins over both regular sides
        assert_eq!(searcher.select(engine).id(), high_root.id());
        let straggler = TestState::recovery(4, 1, High);
        searcher.add_state(engine, &straggler);
        // the high-priority root completes; its removal routes to the bypass
        // searcher and flushes the remaining high-priority states
        high_root.set_resumed(true);
        let root_id = high_root.id();
        searcher.update(engine, None, &[], &[high_root]);
        assert!(searcher.high_priority.is_empty(engine));
        assert_eq!(straggler.priority(), Low);
        assert_ne!(searcher.select(engine).id(), root_id, "the resumed root is gone");
    }

    #[test]
    fn root_completion_flushes_high_priority_test() {
        let mut engine = TestEngine::new();
        let engine = &mut engine;
        let mut searcher = optimized(100);
        let root = TestState::recovery(1, 0, Low);
        let high = TestState::recovery(2, 1, High);
        let straggler = TestState::recovery(3, 1, High);
        searcher.update(engine, None, &[root.clone(), high.clone(), straggler.clone()], &[]);
        assert_eq!(searcher.select(engine).id(), straggler.id());
        // the root recovery state completes and is resumed
        root.set_resumed(true);
        searcher.update(engine, None, &[], &[root]);
        // the stragglers were demoted and moved to the regular recovery side
        assert!(searcher.high_priority.is_empty(engine));
        assert!(searcher.high_states.is_empty());
        assert_eq!(high.priority(), Low);
        assert_eq!(straggler.priority(), Low);
        let chosen = searcher.select(engine);
        assert!(chosen.id() == high.id() || chosen.id() == straggler.id());
    }
}
