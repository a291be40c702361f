use std::marker::PhantomData;
use std::rc::Rc;

use rand::RngCore;

use crate::search::{Engine, Searcher, SeedRng, SharedRng};
use crate::state::ExecutionState;
use crate::tree::PTreeNodeRef;

/// Walks the process tree from `start` to a leaf, flipping a coin at every
/// fork point that still has both subtrees populated. One 32-bit word from the
/// shared RNG pays for 32 flips; forks with a single live subtree are taken
/// for free. Deep states are exponentially less likely to be chosen than
/// shallow ones, which counteracts fork-point explosion along hot paths.
///
/// If the reached state is suspended, selection falls through its recovery
/// chain until a state that can actually be advanced is found.
pub(super) fn random_walk<S: ExecutionState, R: SeedRng>(start: &PTreeNodeRef<S>, rng: &SharedRng<R>) -> Rc<S> {
    let mut node = start.clone();
    let mut flips = 0u32;
    let mut bits = 0u32;
    let mut state = loop {
        let next = {
            let n = node.borrow();
            if let Some(state) = n.state() {
                break state;
            }
            match (n.left(), n.right()) {
                (Some(left), None) => left,
                (None, Some(right)) => right,
                (Some(left), Some(right)) => {
                    if bits == 0 {
                        flips = rng.borrow_mut().next_u32();
                        bits = 32;
                    }
                    bits -= 1;
                    if flips & (1 << bits) != 0 { left } else { right }
                }
                (None, None) => unreachable!("interior process tree node without children"),
            }
        };
        node = next;
    };
    while state.is_suspended() {
        state = state.recovery_state().expect("suspended state without a recovery delegate");
    }
    state
}

/// Selects by walking the engine's process tree with [`random_walk`]. The
/// engine maintains the tree, so `update` has nothing to do, and emptiness is
/// the engine's live set being empty. Because removals don't register here,
/// this searcher must not serve as the base of a merging searcher.
#[derive(Debug)]
pub struct RandomPathSearcher<S: ExecutionState, R: SeedRng> {
    rng: SharedRng<R>,
    _state: PhantomData<S>,
}

impl<S: ExecutionState, R: SeedRng> RandomPathSearcher<S, R> {
    pub fn new(rng: SharedRng<R>) -> Self {
        Self { rng, _state: PhantomData }
    }
}

impl<S: ExecutionState, R: SeedRng + 'static> Searcher<S> for RandomPathSearcher<S, R> {
    fn name(&self) -> &'static str {
        "random-path"
    }

    fn select(&mut self, engine: &mut dyn Engine<S>) -> Rc<S> {
        let root = engine.process_tree().root().expect("selecting from an empty process tree");
        random_walk(&root, &self.rng)
    }

    fn update(&mut self, _engine: &mut dyn Engine<S>, _current: Option<&Rc<S>>, _added: &[Rc<S>], _removed: &[Rc<S>]) {
        // the process tree is maintained by the engine
    }

    fn is_empty(&self, engine: &dyn Engine<S>) -> bool {
        engine.num_live_states() == 0
    }

    fn respects_removal(&self) -> bool {
        false
    }
}
