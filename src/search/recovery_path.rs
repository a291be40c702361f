use std::rc::Rc;

use itertools::Itertools;

use crate::search::random_path::random_walk;
use crate::search::{Engine, Searcher, SeedRng, SharedRng};
use crate::state::ExecutionState;
use crate::tree::PTreeNodeRef;

/// Random-path selection specialized for recovery states, which live in a
/// stack of nested subtrees: each recovery level explores the subtree below
/// the process tree node where it was spawned. Selection walks the innermost
/// subtree, so the deepest pending recovery work finishes first and its
/// suspended parents can resume.
#[derive(Debug)]
pub struct RandomRecoveryPathSearcher<S: ExecutionState, R: SeedRng> {
    tree_stack: Vec<PTreeNodeRef<S>>,
    states: Vec<Rc<S>>,
    rng: SharedRng<R>,
}

impl<S: ExecutionState, R: SeedRng> RandomRecoveryPathSearcher<S, R> {
    pub fn new(rng: SharedRng<R>) -> Self {
        Self { tree_stack: vec![], states: vec![], rng }
    }
}

impl<S: ExecutionState, R: SeedRng + 'static> Searcher<S> for RandomRecoveryPathSearcher<S, R> {
    fn name(&self) -> &'static str {
        "random-recovery-path"
    }

    fn select(&mut self, _engine: &mut dyn Engine<S>) -> Rc<S> {
        match self.tree_stack.last() {
            // no subtree roots left, only stragglers; any of them will do
            None => self.states.last().expect("selecting from an empty searcher").clone(),
            Some(top) => random_walk(top, &self.rng),
        }
    }

    fn update(&mut self, _engine: &mut dyn Engine<S>, _current: Option<&Rc<S>>, added: &[Rc<S>], removed: &[Rc<S>]) {
        for state in added {
            debug_assert!(state.is_recovery());
            // the first state of a new recovery level opens its subtree
            if state.level() == self.tree_stack.len() {
                self.tree_stack.push(state.ptree_node());
            }
            self.states.push(state.clone());
        }
        for state in removed {
            if state.is_resumed() && state.level() + 1 == self.tree_stack.len() {
                _ = self.tree_stack.pop();
            }
            let (idx, _) = self
                .states
                .iter()
                .find_position(|tracked| tracked.id() == state.id())
                .expect("removed state was not tracked");
            _ = self.states.swap_remove(idx);
        }
    }

    fn is_empty(&self, _engine: &dyn Engine<S>) -> bool {
        self.tree_stack.is_empty() && self.states.is_empty()
    }

    fn respects_removal(&self) -> bool {
        false
    }
}
