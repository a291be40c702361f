use std::fmt::Debug;
use std::rc::Rc;

use derive_more::Display;

use crate::tree::PTreeNodeRef;

/// Stable identity of an execution state. All searcher bookkeeping (sets, maps,
/// the discrete PDF) is keyed by id, never by state contents.
#[derive(Debug, Display, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[must_use]
pub struct StateId(pub u64);

/// Dense identifier of an instruction, as assigned by the engine's loader.
/// Used to index per-instruction statistics and to key merge points.
#[derive(Debug, Display, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[must_use]
pub struct InstrId(pub u64);

/// Scheduling priority of a recovery state.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum RecoveryPriority {
    #[default]
    Low,
    High,
}

/// The searcher-facing view of a symbolic execution state. The engine owns the
/// state and everything interesting about it (memory, constraints, the call
/// stack); searchers only ever look at the handful of accessors below.
///
/// States are shared as `Rc<S>` between the engine's live set, the process
/// tree and searcher containers, so mutating accessors take `&self` and
/// implementations use interior mutability.
pub trait ExecutionState: Debug + 'static {
    fn id(&self) -> StateId;

    /// The instruction the program counter currently points at.
    fn instruction_id(&self) -> InstrId;

    /// Whether the program counter is at a call instruction targeting `function`.
    fn calls_function(&self, function: &str) -> bool;

    /// Advance the program counter by one instruction. Merging searchers use
    /// this to step a parked state past the merge call before handing it back
    /// to their base searcher.
    fn advance_pc(&self);

    /// Attempt to absorb `other` into `self`. Returns whether the merge
    /// succeeded; on failure both states are left untouched.
    fn try_merge(&self, other: &Self) -> bool;

    /// The process tree leaf currently carrying this state.
    fn ptree_node(&self) -> PTreeNodeRef<Self>
    where
        Self: Sized;

    /// Called by [`ProcessTree`](crate::tree::ProcessTree) when the state is
    /// planted or moved to a fresh leaf. Implementations should store a `Weak`
    /// reference; the tree owns the strong one.
    fn set_ptree_node(&self, node: &PTreeNodeRef<Self>)
    where
        Self: Sized;

    // Heuristic inputs. Engines that don't track a given statistic can leave
    // the default, which makes the corresponding weight mode degenerate to
    // uniform selection instead of failing.

    /// Heuristic seed used by the `depth` weight mode.
    fn weight(&self) -> f64 {
        1.0
    }

    /// Cumulative solver cost spent on this state, in seconds.
    fn query_cost(&self) -> f64 {
        0.0
    }

    /// Instructions executed since this state last covered new code.
    fn insts_since_cov_new(&self) -> u64 {
        0
    }

    /// Instructions executed in the current call path.
    fn call_path_instructions(&self) -> u64 {
        0
    }

    /// Distance to the closest uncovered instruction, assuming the current
    /// function returns without covering anything.
    fn min_dist_to_uncovered_on_return(&self) -> u64 {
        0
    }

    // Recovery states. Ordinary engines never spawn them, so everything
    // defaults to the ordinary-state answers.

    /// Whether this is a recovery state, spawned to patch a hole in an
    /// under-approximated side effect.
    fn is_recovery(&self) -> bool {
        false
    }

    /// A suspended state is waiting for one of its recovery states to finish
    /// and must not be advanced itself.
    fn is_suspended(&self) -> bool {
        false
    }

    /// The recovery state to advance on behalf of this state while it is
    /// suspended.
    fn recovery_state(&self) -> Option<Rc<Self>>
    where
        Self: Sized,
    {
        None
    }

    fn priority(&self) -> RecoveryPriority {
        RecoveryPriority::Low
    }

    fn set_priority(&self, _priority: RecoveryPriority) {}

    /// Depth of this state in the stack of nested recovery subtrees.
    fn level(&self) -> usize {
        0
    }

    /// Whether the state this recovery state was spawned for has already been
    /// resumed.
    fn is_resumed(&self) -> bool {
        false
    }
}
