use std::collections::HashMap;
use std::rc::Rc;

use rand::Rng;
use strum_macros::{Display, EnumString};

use crate::search::pdf::DiscretePdf;
use crate::search::{Engine, Searcher, SeedRng, SharedRng};
use crate::state::{ExecutionState, StateId};
use crate::stats::{CoverageDistances, SearchStats};

/// How [`WeightedRandomSearcher`] weighs a state. All weights are positive;
/// divisors are clamped so that a state never becomes unselectable.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum WeightMode {
    /// The depth heuristic seed stored on the state. The only mode whose
    /// weights are cached at insertion instead of recomputed every step.
    Depth,
    /// Inverse square of how often the current instruction has been executed
    /// globally, favoring states sitting at rarely visited code.
    #[strum(serialize = "icnt")]
    InstCount,
    /// Inverse of the instruction count of the state's current call path.
    #[strum(serialize = "cpicnt")]
    CpInstCount,
    /// Inverse of the cumulative solver cost, with a floor below which all
    /// states count as equally cheap.
    QueryCost,
    /// Inverse square of the distance to the closest uncovered instruction.
    #[strum(serialize = "md2u")]
    MinDistToUncovered,
    /// Like `md2u`, plus a bonus for states that recently covered new code.
    #[strum(serialize = "covnew")]
    CoveringNew,
    /// Like `covnew`, but measuring the distance to a target call instead of
    /// to uncovered code.
    PatchTesting,
}

/// When a state's query cost is below this, its cost weight is exactly 1.
const QUERY_COST_FLOOR: f64 = 0.1;
/// Distance substituted when the oracle reports an (unreachable) zero.
const UNKNOWN_DISTANCE: u64 = 10_000;
/// Freshness bonuses only kick in this many instructions after covering new code.
const COV_NEW_GRACE: u64 = 1000;

/// Selects states with probability proportional to a per-state weight, backed
/// by a [`DiscretePdf`]. Except in `depth` mode, the weight of the state that
/// just ran is refreshed on every update, so the distribution tracks the
/// heuristics as the search moves.
#[derive(Debug)]
pub struct WeightedRandomSearcher<S: ExecutionState, R: SeedRng> {
    mode: WeightMode,
    update_weights: bool,
    pdf: DiscretePdf<StateId>,
    states: HashMap<StateId, Rc<S>>,
    rng: SharedRng<R>,
    stats: Rc<dyn SearchStats>,
    distances: Rc<dyn CoverageDistances>,
}

impl<S: ExecutionState, R: SeedRng> WeightedRandomSearcher<S, R> {
    pub fn new(
        mode: WeightMode,
        rng: SharedRng<R>,
        stats: Rc<dyn SearchStats>,
        distances: Rc<dyn CoverageDistances>,
    ) -> Self {
        Self {
            mode,
            update_weights: mode != WeightMode::Depth,
            pdf: DiscretePdf::new(),
            states: HashMap::new(),
            rng,
            stats,
            distances,
        }
    }

    fn distance_weight(&self, state: &S, to_call: bool) -> f64 {
        let instruction = state.instruction_id();
        let on_return = state.min_dist_to_uncovered_on_return();
        let dist = if to_call {
            self.distances.to_call(instruction, on_return)
        } else {
            self.distances.to_uncovered(instruction, on_return)
        };
        let dist = if dist == 0 { UNKNOWN_DISTANCE } else { dist };
        let inv = 1.0 / dist as f64;
        inv * inv
    }

    fn freshness_weight(state: &S) -> f64 {
        let since = state.insts_since_cov_new();
        if since == 0 {
            return 0.0;
        }
        let inv = 1.0 / since.saturating_sub(COV_NEW_GRACE).max(1) as f64;
        inv * inv
    }

    fn weigh(&self, state: &S) -> f64 {
        match self.mode {
            WeightMode::Depth => state.weight(),
            WeightMode::InstCount => {
                let visits = self.stats.instruction_visits(state.instruction_id());
                let inv = 1.0 / visits.max(1) as f64;
                inv * inv
            }
            WeightMode::CpInstCount => 1.0 / state.call_path_instructions().max(1) as f64,
            WeightMode::QueryCost => {
                let cost = state.query_cost();
                if cost < QUERY_COST_FLOOR { 1.0 } else { 1.0 / cost }
            }
            WeightMode::MinDistToUncovered => self.distance_weight(state, false),
            WeightMode::CoveringNew => Self::freshness_weight(state) + self.distance_weight(state, false),
            WeightMode::PatchTesting => Self::freshness_weight(state) + self.distance_weight(state, true),
        }
    }
}

impl<S: ExecutionState, R: SeedRng + 'static> Searcher<S> for WeightedRandomSearcher<S, R> {
    fn name(&self) -> &'static str {
        "weighted-random"
    }

    fn select(&mut self, _engine: &mut dyn Engine<S>) -> Rc<S> {
        let u = self.rng.borrow_mut().random::<f64>();
        let id = self.pdf.choose(u);
        self.states.get(&id).expect("the pdf and the state map went out of sync").clone()
    }

    fn update(&mut self, _engine: &mut dyn Engine<S>, current: Option<&Rc<S>>, added: &[Rc<S>], removed: &[Rc<S>]) {
        if self.update_weights {
            if let Some(current) = current {
                if !removed.iter().any(|s| s.id() == current.id()) {
                    self.pdf.update(current.id(), self.weigh(current));
                }
            }
        }
        for state in added {
            let weight = self.weigh(state);
            self.pdf.insert(state.id(), weight);
            _ = self.states.insert(state.id(), state.clone());
        }
        for state in removed {
            self.pdf.remove(state.id());
            _ = self.states.remove(&state.id()).expect("removed state was not tracked");
        }
    }

    fn is_empty(&self, _engine: &dyn Engine<S>) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::search::tests::{TestEngine, TestResources, TestState};
    use crate::state::InstrId;

    fn searcher(mode: WeightMode, res: &TestResources) -> WeightedRandomSearcher<TestState, rand::rngs::StdRng> {
        WeightedRandomSearcher::new(mode, res.rng.clone(), res.stats.clone(), res.distances.clone())
    }

    #[test]
    fn depth_mode_frequency_test() {
        let res = TestResources::seeded(0xb10c);
        let mut engine = TestEngine::new();
        let engine = &mut engine;
        let mut weighted = searcher(WeightMode::Depth, &res);
        let a = TestState::with_weight(1, 1.0);
        let b = TestState::with_weight(2, 3.0);
        weighted.update(engine, None, &[a, b.clone()], &[]);
        let draws = 10_000;
        let mut b_count = 0;
        for _ in 0..draws {
            if weighted.select(engine).id() == b.id() {
                b_count += 1;
            }
        }
        let freq = f64::from(b_count) / f64::from(draws);
        assert!((0.73..=0.77).contains(&freq), "b was drawn with frequency {freq}");
    }

    #[test]
    fn query_cost_weights_test() {
        let res = TestResources::seeded(1);
        let weighted = searcher(WeightMode::QueryCost, &res);
        let cheap = TestState::new(1);
        cheap.set_query_cost(0.05);
        let expensive = TestState::new(2);
        expensive.set_query_cost(4.0);
        assert_eq!(weighted.weigh(&cheap), 1.0);
        assert_eq!(weighted.weigh(&expensive), 0.25);
    }

    #[test]
    fn inst_count_weights_test() {
        let res = TestResources::seeded(1);
        res.stats.set_visits(InstrId(7), 10);
        let weighted = searcher(WeightMode::InstCount, &res);
        let hot = TestState::at_instruction(1, InstrId(7));
        let cold = TestState::at_instruction(2, InstrId(8));
        assert!((weighted.weigh(&hot) - 0.01).abs() < 1e-15);
        // an instruction that was never executed gets the clamped weight 1
        assert_eq!(weighted.weigh(&cold), 1.0);
    }

    #[test]
    fn covering_new_weights_test() {
        let res = TestResources::seeded(1);
        res.distances.set_uncovered(InstrId(3), 100);
        let weighted = searcher(WeightMode::CoveringNew, &res);
        let state = TestState::at_instruction(1, InstrId(3));
        state.set_insts_since_cov_new(1500);
        // freshness term (1/500)^2 plus distance term (1/100)^2
        let expected = (1.0 / 500.0f64).powi(2) + (1.0 / 100.0f64).powi(2);
        assert!((weighted.weigh(&state) - expected).abs() < 1e-12);
        // a state that never covered anything new only gets the distance term
        let stale = TestState::at_instruction(2, InstrId(3));
        assert!((weighted.weigh(&stale) - (1.0 / 100.0f64).powi(2)).abs() < 1e-12);
    }

    #[test]
    fn patch_testing_weights_test() {
        let res = TestResources::seeded(1);
        res.distances.set_uncovered(InstrId(5), 7);
        res.distances.set_call(InstrId(5), 200);
        let weighted = searcher(WeightMode::PatchTesting, &res);
        let state = TestState::at_instruction(1, InstrId(5));
        // patch testing measures the distance to the target call, not to
        // uncovered code
        assert!((weighted.weigh(&state) - (1.0 / 200.0f64).powi(2)).abs() < 1e-12);
        // a zero distance means the oracle has no answer, not that the state
        // is on top of the target
        res.distances.set_call(InstrId(5), 0);
        assert!((weighted.weigh(&state) - (1.0 / 10_000.0f64).powi(2)).abs() < 1e-16);
    }

    #[test]
    fn reweighs_current_test() {
        let res = TestResources::seeded(7);
        let mut engine = TestEngine::new();
        let engine = &mut engine;
        let mut weighted = searcher(WeightMode::QueryCost, &res);
        let a = TestState::new(1);
        let b = TestState::new(2);
        weighted.update(engine, None, &[a.clone(), b], &[]);
        assert_eq!(weighted.pdf.weight(a.id()), Some(1.0));
        // a's solver cost exploded while it ran; the next update refreshes it
        a.set_query_cost(10.0);
        weighted.update(engine, Some(&a), &[], &[]);
        assert_eq!(weighted.pdf.weight(a.id()), Some(0.1));
        // removed states are not reweighed
        weighted.update(engine, Some(&a), &[], &[a.clone()]);
        assert!(!weighted.pdf.contains(a.id()));
    }

    #[test]
    fn depth_mode_caches_weights_test() {
        let res = TestResources::seeded(7);
        let mut engine = TestEngine::new();
        let engine = &mut engine;
        let mut weighted = searcher(WeightMode::Depth, &res);
        let a = TestState::with_weight(1, 2.0);
        weighted.update(engine, None, &[a.clone()], &[]);
        weighted.update(engine, Some(&a), &[], &[]);
        assert_eq!(weighted.pdf.weight(a.id()), Some(2.0));
    }

    #[test]
    fn mode_names_test() {
        assert_eq!(WeightMode::from_str("covnew").unwrap(), WeightMode::CoveringNew);
        assert_eq!(WeightMode::from_str("md2u").unwrap(), WeightMode::MinDistToUncovered);
        assert_eq!(WeightMode::from_str("query-cost").unwrap(), WeightMode::QueryCost);
        assert_eq!(WeightMode::from_str("patch-testing").unwrap(), WeightMode::PatchTesting);
        assert!(WeightMode::from_str("coverage").is_err());
        assert_eq!(WeightMode::InstCount.to_string(), "icnt");
    }
}
