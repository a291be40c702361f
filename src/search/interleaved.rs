use std::rc::Rc;

use anyhow::bail;

use crate::search::{Engine, Res, Searcher, SearcherError};
use crate::state::ExecutionState;

/// Round-robins `select` over several searchers, each of which sees the full
/// update stream and tracks every state. Interleaving a coverage-guided
/// searcher with a uniform one is the usual way to hedge against a heuristic
/// going blind.
#[derive(Debug)]
pub struct InterleavedSearcher<S: ExecutionState> {
    searchers: Vec<Box<dyn Searcher<S>>>,
    index: usize,
}

impl<S: ExecutionState> InterleavedSearcher<S> {
    pub fn new(searchers: Vec<Box<dyn Searcher<S>>>) -> Res<Self> {
        if searchers.is_empty() {
            bail!(SearcherError::NoSubSearchers);
        }
        let index = searchers.len();
        Ok(Self { searchers, index })
    }
}

impl<S: ExecutionState> Searcher<S> for InterleavedSearcher<S> {
    fn name(&self) -> &'static str {
        "interleaved"
    }

    fn select(&mut self, engine: &mut dyn Engine<S>) -> Rc<S> {
        self.index -= 1;
        let chosen = self.index;
        if self.index == 0 {
            self.index = self.searchers.len();
        }
        self.searchers[chosen].select(engine)
    }

    fn update(&mut self, engine: &mut dyn Engine<S>, current: Option<&Rc<S>>, added: &[Rc<S>], removed: &[Rc<S>]) {
        for searcher in &mut self.searchers {
            searcher.update(engine, current, added, removed);
        }
    }

    fn is_empty(&self, engine: &dyn Engine<S>) -> bool {
        // all sub-searchers see the same updates, so any of them can answer
        self.searchers[0].is_empty(engine)
    }

    fn respects_removal(&self) -> bool {
        self.searchers.iter().all(|searcher| searcher.respects_removal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::basic::{BfsSearcher, DfsSearcher};
    use crate::search::tests::{TestEngine, TestState};

    #[test]
    fn round_robin_test() {
        let mut engine = TestEngine::new();
        let engine = &mut engine;
        let mut interleaved =
            InterleavedSearcher::new(vec![Box::new(DfsSearcher::new()) as _, Box::new(BfsSearcher::new()) as _])
                .unwrap();
        let (a, b, c) = (TestState::new(1), TestState::new(2), TestState::new(3));
        interleaved.update(engine, None, &[a.clone(), b.clone(), c.clone()], &[]);
        // the cycle starts at the last sub-searcher and counts down
        assert_eq!(interleaved.select(engine).id(), a.id()); // bfs: head
        assert_eq!(interleaved.select(engine).id(), c.id()); // dfs: top
        assert_eq!(interleaved.select(engine).id(), a.id());
        assert_eq!(interleaved.select(engine).id(), c.id());
        // removals reach every sub-searcher
        interleaved.update(engine, None, &[], &[a, c]);
        assert_eq!(interleaved.select(engine).id(), b.id());
        assert_eq!(interleaved.select(engine).id(), b.id());
        interleaved.remove_state(engine, &b);
        assert!(interleaved.is_empty(engine));
    }

    #[test]
    fn rejects_empty_list_test() {
        assert!(InterleavedSearcher::<TestState>::new(vec![]).is_err());
    }
}
