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

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;
use std::slice::from_ref;

use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::search::basic::{BfsSearcher, DfsSearcher, RandomSearcher};
use crate::search::batching::{BatchingBudgets, BatchingSearcher};
use crate::search::deepening::IterativeDeepeningTimeSearcher;
use crate::search::interleaved::InterleavedSearcher;
use crate::search::merging::{BumpMergingSearcher, MergingSearcher};
use crate::search::random_path::RandomPathSearcher;
use crate::search::recovery_path::RandomRecoveryPathSearcher;
use crate::search::splitted::{OptimizedSplittedSearcher, SplittedSearcher};
use crate::search::weighted::{WeightMode, WeightedRandomSearcher};
use crate::state::ExecutionState;
use crate::stats::{CoverageDistances, SearchStats, WallClock};
use crate::tree::ProcessTree;

pub mod basic;
pub mod batching;
pub mod deepening;
pub mod interleaved;
pub mod merging;
pub mod pdf;
pub mod random_path;
pub mod recovery_path;
pub mod splitted;
pub mod weighted;

pub type Res<T> = anyhow::Result<T>;

pub trait SeedRng: Rng + SeedableRng + Debug {}

impl<T: Rng + SeedableRng + Debug> SeedRng for T {}

/// The process-wide RNG, shared by every randomized searcher in a composition
/// and threaded through constructors. Everything runs on the engine thread,
/// so a `RefCell` is all the synchronization needed.
pub type SharedRng<R> = Rc<RefCell<R>>;

pub fn shared_rng_from_seed<R: SeedRng>(seed: u64) -> SharedRng<R> {
    Rc::new(RefCell::new(R::seed_from_u64(seed)))
}

/// The services searchers consume from the engine. Passed into every searcher
/// call instead of being captured at construction: the engine owns the
/// searcher, so a stored backreference would be circular.
pub trait Engine<S: ExecutionState> {
    /// Size of the engine's canonical live-state set.
    fn num_live_states(&self) -> usize;

    fn process_tree(&self) -> &ProcessTree<S>;

    /// The function whose call sites act as merge points, or `None` if
    /// merging is disabled.
    fn merge_function(&self) -> Option<&str>;

    /// Immediately remove `state` from the live set and its leaf from the
    /// process tree. Called by merging searchers for states they have
    /// absorbed into another state. The terminated state must NOT show up in
    /// a later `removed` set: the searcher requesting the termination has
    /// already dropped it from its own view.
    fn terminate_state(&mut self, state: &Rc<S>);
}

/// A state selection strategy. The engine asks `select` which state to
/// advance next and reports the consequences of each step through `update`;
/// the searcher's tracked set mirrors the engine's live set at all times
/// (minus states a composite has parked internally).
pub trait Searcher<S: ExecutionState>: Debug {
    /// A short lowercase name, used in configuration errors and logs.
    fn name(&self) -> &'static str;

    /// Returns the state the engine should advance next. Must only be called
    /// while `is_empty` returns false, and always returns a state that was
    /// added and not yet removed. Consecutive calls may return different
    /// states.
    fn select(&mut self, engine: &mut dyn Engine<S>) -> Rc<S>;

    /// Called once per engine step: `current` is the state that was just
    /// advanced (if any), `added` the states born in this step, `removed` the
    /// states that left the live set. `added` and `removed` are disjoint and
    /// duplicate-free.
    fn update(&mut self, engine: &mut dyn Engine<S>, current: Option<&Rc<S>>, added: &[Rc<S>], removed: &[Rc<S>]);

    fn is_empty(&self, engine: &dyn Engine<S>) -> bool;

    /// Whether an entry in `removed` reliably takes the state out of this
    /// searcher's view. Tree-walk searchers select straight from the process
    /// tree and return false; composites answer for their whole subtree.
    /// Merging searchers refuse a base without this property, since their
    /// drain loop would otherwise never terminate.
    fn respects_removal(&self) -> bool {
        true
    }

    fn add_state(&mut self, engine: &mut dyn Engine<S>, state: &Rc<S>) {
        self.update(engine, None, from_ref(state), &[]);
    }

    fn remove_state(&mut self, engine: &mut dyn Engine<S>, state: &Rc<S>) {
        self.update(engine, None, &[], from_ref(state));
    }
}

/// Everything a searcher composition might need besides the engine itself.
/// The members are shared handles, so one set of resources can serve an
/// arbitrarily nested composition.
#[derive(Debug)]
pub struct SearchResources<R: SeedRng> {
    pub rng: SharedRng<R>,
    pub clock: Rc<dyn WallClock>,
    pub stats: Rc<dyn SearchStats>,
    pub distances: Rc<dyn CoverageDistances>,
}

impl<R: SeedRng> Clone for SearchResources<R> {
    fn clone(&self) -> Self {
        Self {
            rng: self.rng.clone(),
            clock: self.clock.clone(),
            stats: self.stats.clone(),
            distances: self.distances.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SearcherError {
    #[error("the split ratio must be between 0 and 100, not {0}")]
    InvalidRatio(u32),
    #[error("an interleaved searcher needs at least one sub-searcher")]
    NoSubSearchers,
    #[error(
        "a {searcher} cannot be driven by a '{base}' base: that base ignores removals, \
         so draining it to the merge points would never terminate"
    )]
    RemovalIgnoringBase { searcher: &'static str, base: &'static str },
}

/// A declarative description of a searcher composition, typically produced by
/// the engine's option parsing. [`build_searcher`] turns it into a live
/// searcher and rejects invalid or hazardous combinations.
#[derive(Debug, Clone)]
pub enum SearcherSpec {
    Dfs,
    Bfs,
    Random,
    WeightedRandom(WeightMode),
    RandomPath,
    BumpMerging { base: Box<SearcherSpec>, log_merges: bool },
    Merging { base: Box<SearcherSpec>, log_merges: bool },
    Batching { base: Box<SearcherSpec>, budgets: BatchingBudgets },
    IterativeDeepening { base: Box<SearcherSpec> },
    Interleaved(Vec<SearcherSpec>),
    Splitted { base: Box<SearcherSpec>, recovery: Box<SearcherSpec>, ratio: u32 },
    OptimizedSplitted { base: Box<SearcherSpec>, recovery: Box<SearcherSpec>, high_priority: Box<SearcherSpec>, ratio: u32 },
    RandomRecoveryPath,
}

impl SearcherSpec {
    /// The stock exploration setup: random-path over the ordinary states,
    /// random-recovery-path over the recovery states, batched so that tree
    /// walks don't dominate the step loop.
    pub fn default_exploration(ratio: u32) -> Self {
        SearcherSpec::Batching {
            base: Box::new(SearcherSpec::Splitted {
                base: Box::new(SearcherSpec::RandomPath),
                recovery: Box::new(SearcherSpec::RandomRecoveryPath),
                ratio,
            }),
            budgets: BatchingBudgets::default(),
        }
    }
}

pub fn build_searcher<S: ExecutionState, R: SeedRng + 'static>(
    spec: &SearcherSpec,
    resources: &SearchResources<R>,
) -> Res<Box<dyn Searcher<S>>> {
    let searcher: Box<dyn Searcher<S>> = match spec {
        SearcherSpec::Dfs => Box::new(DfsSearcher::new()),
        SearcherSpec::Bfs => Box::new(BfsSearcher::new()),
        SearcherSpec::Random => Box::new(RandomSearcher::new(resources.rng.clone())),
        SearcherSpec::WeightedRandom(mode) => Box::new(WeightedRandomSearcher::new(
            *mode,
            resources.rng.clone(),
            resources.stats.clone(),
            resources.distances.clone(),
        )),
        SearcherSpec::RandomPath => Box::new(RandomPathSearcher::new(resources.rng.clone())),
        SearcherSpec::BumpMerging { base, log_merges } => {
            Box::new(BumpMergingSearcher::new(build_searcher(base, resources)?, *log_merges)?)
        }
        SearcherSpec::Merging { base, log_merges } => {
            Box::new(MergingSearcher::new(build_searcher(base, resources)?, *log_merges)?)
        }
        SearcherSpec::Batching { base, budgets } => Box::new(BatchingSearcher::new(
            build_searcher(base, resources)?,
            *budgets,
            resources.clock.clone(),
            resources.stats.clone(),
        )),
        SearcherSpec::IterativeDeepening { base } => {
            Box::new(IterativeDeepeningTimeSearcher::new(build_searcher(base, resources)?, resources.clock.clone()))
        }
        SearcherSpec::Interleaved(specs) => {
            let searchers = specs.iter().map(|spec| build_searcher(spec, resources)).collect::<Res<Vec<_>>>()?;
            Box::new(InterleavedSearcher::new(searchers)?)
        }
        SearcherSpec::Splitted { base, recovery, ratio } => Box::new(SplittedSearcher::new(
            build_searcher(base, resources)?,
            build_searcher(recovery, resources)?,
            *ratio,
            resources.rng.clone(),
        )?),
        SearcherSpec::OptimizedSplitted { base, recovery, high_priority, ratio } => {
            Box::new(OptimizedSplittedSearcher::new(
                build_searcher(base, resources)?,
                build_searcher(recovery, resources)?,
                build_searcher(high_priority, resources)?,
                *ratio,
                resources.rng.clone(),
            )?)
        }
        SearcherSpec::RandomRecoveryPath => Box::new(RandomRecoveryPathSearcher::new(resources.rng.clone())),
    };
    Ok(searcher)
}
