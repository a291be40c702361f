//! [`rudders`](crate) is the state selection subsystem of a symbolic execution
//! engine: the pluggable scheduler deciding, at every step, which pending
//! execution state the engine advances next. Exploration forks into an
//! unbounded tree of live states, and the strategy that picks among them
//! dictates coverage, time-to-bug and memory footprint, so the crate ships a
//! whole family of [`Searcher`](search::Searcher)s (depth/breadth first,
//! uniform and weighted random, random tree walks, state merging, batching,
//! iterative deepening) plus composites that interleave them or route states
//! by kind, including the hierarchical treatment of recovery states.
//!
//! The engine itself stays on the other side of two narrow traits: searchers
//! are generic over [`ExecutionState`](state::ExecutionState), and every call
//! receives the [`Engine`](search::Engine) services it may consult. No state
//! is ever owned here; the engine guarantees states outlive their add/remove
//! window.

#![deny(unused_results)]

pub use anyhow;
pub use itertools;
pub use rand;
pub use strum;
pub use strum_macros;

/// The [`Searcher`](search::Searcher) contract, all concrete searchers in
/// submodules, and the [`SearcherSpec`](search::SearcherSpec) configuration
/// tree with its factory.
pub mod search;
/// Identifiers and the engine-state view searchers are generic over.
pub mod state;
/// Read-only interfaces to the engine's statistics, coverage oracles and the
/// wall clock.
pub mod stats;
/// The process tree recording the fork history; leaves carry live states.
pub mod tree;
