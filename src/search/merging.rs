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

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::rc::Rc;

use anyhow::bail;
use log::debug;

use crate::search::{Engine, Searcher, SearcherError, Res};
use crate::state::{ExecutionState, InstrId};

// A state is "at a merge point" iff its pc is a call to the engine's
// designated merge function. Both searchers intercept such states on their way
// out of the base searcher and try to coalesce them before letting the engine
// advance anyone past the call.
fn at_merge_point<S: ExecutionState>(state: &S, merge_function: Option<&str>) -> bool {
    merge_function.is_some_and(|function| state.calls_function(function))
}

/// Opportunistic one-at-a-time merging. At most one state is parked per merge
/// point; a second arrival is either absorbed into the parked state or, if the
/// merge fails, swaps places with it ("bumping" the old one onward past the
/// call).
#[derive(Debug)]
pub struct BumpMergingSearcher<S: ExecutionState> {
    base: Box<dyn Searcher<S>>,
    parked: HashMap<InstrId, Rc<S>>,
    log_merges: bool,
}

impl<S: ExecutionState> BumpMergingSearcher<S> {
    pub fn new(base: Box<dyn Searcher<S>>, log_merges: bool) -> Res<Self> {
        if !base.respects_removal() {
            bail!(SearcherError::RemovalIgnoringBase { searcher: "bump merging searcher", base: base.name() });
        }
        Ok(Self { base, parked: HashMap::new(), log_merges })
    }
}

impl<S: ExecutionState> Searcher<S> for BumpMergingSearcher<S> {
    fn name(&self) -> &'static str {
        "bump-merging"
    }

    fn select(&mut self, engine: &mut dyn Engine<S>) -> Rc<S> {
        let merge_function = engine.merge_function().map(str::to_owned);
        loop {
            if self.base.is_empty(engine) {
                // everyone left is waiting at a merge point with nobody to
                // meet; release one of them past the call
                let point = *self.parked.keys().next().expect("select on an empty searcher");
                let state = self.parked.remove(&point).unwrap();
                state.advance_pc();
                self.base.add_state(engine, &state);
            }
            let selected = self.base.select(engine);
            if !at_merge_point(&*selected, merge_function.as_deref()) {
                return selected;
            }
            let point = selected.instruction_id();
            self.base.remove_state(engine, &selected);
            match self.parked.entry(point) {
                Entry::Vacant(entry) => {
                    if self.log_merges {
                        debug!("parking state {} at merge point {point}", selected.id());
                    }
                    _ = entry.insert(selected);
                }
                Entry::Occupied(mut entry) => {
                    let parked = entry.get().clone();
                    if parked.try_merge(&selected) {
                        if self.log_merges {
                            debug!("merged state {} into {} at merge point {point}", selected.id(), parked.id());
                        }
                        engine.terminate_state(&selected);
                    } else {
                        // bump: the newcomer takes over the parking spot and
                        // the old state continues past the call
                        if self.log_merges {
                            debug!("state {} bumps {} at merge point {point}", selected.id(), parked.id());
                        }
                        _ = entry.insert(selected);
                        parked.advance_pc();
                        self.base.add_state(engine, &parked);
                    }
                }
            }
        }
    }

    fn update(&mut self, engine: &mut dyn Engine<S>, current: Option<&Rc<S>>, added: &[Rc<S>], removed: &[Rc<S>]) {
        if self.parked.is_empty() {
            self.base.update(engine, current, added, removed);
            return;
        }
        // parked states were never handed down, so the base must not see their
        // removal
        let mut forwarded = vec![];
        for state in removed {
            let parked_at = self.parked.iter().find(|(_, p)| p.id() == state.id()).map(|(point, _)| *point);
            if let Some(point) = parked_at {
                _ = self.parked.remove(&point);
            } else {
                forwarded.push(state.clone());
            }
        }
        self.base.update(engine, current, added, &forwarded);
    }

    fn is_empty(&self, engine: &dyn Engine<S>) -> bool {
        self.base.is_empty(engine) && self.parked.is_empty()
    }

    fn respects_removal(&self) -> bool {
        self.base.respects_removal()
    }
}

/// Batched merging: states reaching a merge point are parked until the base
/// searcher runs dry, then parked states are merged in groups per merge point
/// and the survivors are released past the call.
#[derive(Debug)]
pub struct MergingSearcher<S: ExecutionState> {
    base: Box<dyn Searcher<S>>,
    parked: Vec<Rc<S>>,
    log_merges: bool,
}

impl<S: ExecutionState> MergingSearcher<S> {
    pub fn new(base: Box<dyn Searcher<S>>, log_merges: bool) -> Res<Self> {
        // a base that ignores removals (a random path searcher, say) would
        // hand the same merge-point state back forever and the drain below
        // would never terminate
        if !base.respects_removal() {
            bail!(SearcherError::RemovalIgnoringBase { searcher: "merging searcher", base: base.name() });
        }
        Ok(Self { base, parked: vec![], log_merges })
    }
}

impl<S: ExecutionState> Searcher<S> for MergingSearcher<S> {
    fn name(&self) -> &'static str {
        "merging"
    }

    fn select(&mut self, engine: &mut dyn Engine<S>) -> Rc<S> {
        let merge_function = engine.merge_function().map(str::to_owned);
        loop {
            // drain: run states until each of them terminates or waits at a
            // merge point
            while !self.base.is_empty(engine) {
                let selected = self.base.select(engine);
                if !at_merge_point(&*selected, merge_function.as_deref()) {
                    return selected;
                }
                if self.log_merges {
                    debug!("parking state {} at merge point {}", selected.id(), selected.instruction_id());
                }
                self.base.remove_state(engine, &selected);
                self.parked.push(selected);
            }
            assert!(!self.parked.is_empty(), "select on an empty searcher");
            // merge: coalesce each merge point's group; states the merge
            // cannot absorb survive as their own group representatives
            while let Some(survivor) = self.parked.pop() {
                let point = survivor.instruction_id();
                let mut i = 0;
                while i < self.parked.len() {
                    if self.parked[i].instruction_id() == point && survivor.try_merge(&self.parked[i]) {
                        let absorbed = self.parked.swap_remove(i);
                        if self.log_merges {
                            debug!("merged state {} into {} at merge point {point}", absorbed.id(), survivor.id());
                        }
                        engine.terminate_state(&absorbed);
                    } else {
                        i += 1;
                    }
                }
                survivor.advance_pc();
                self.base.add_state(engine, &survivor);
            }
        }
    }

    fn update(&mut self, engine: &mut dyn Engine<S>, current: Option<&Rc<S>>, added: &[Rc<S>], removed: &[Rc<S>]) {
        if self.parked.is_empty() {
            self.base.update(engine, current, added, removed);
            return;
        }
        let mut forwarded = vec![];
        for state in removed {
            if let Some(idx) = self.parked.iter().position(|p| p.id() == state.id()) {
                _ = self.parked.swap_remove(idx);
            } else {
                forwarded.push(state.clone());
            }
        }
        self.base.update(engine, current, added, &forwarded);
    }

    fn is_empty(&self, engine: &dyn Engine<S>) -> bool {
        self.base.is_empty(engine) && self.parked.is_empty()
    }

    fn respects_removal(&self) -> bool {
        self.base.respects_removal()
    }
}
