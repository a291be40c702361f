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
use std::fmt::Debug;
use std::hash::Hash;

// A discrete probability density function over a mutable key set, backed by a
// Fenwick tree of prefix sums. See <https://en.wikipedia.org/wiki/Fenwick_tree>.
// Keys live in dense slots; removal swaps the last slot in, so all operations
// stay O(log n).

#[derive(Debug)]
pub struct DiscretePdf<K: Copy + Eq + Hash + Debug> {
    tree: Vec<f64>,
    weights: Vec<f64>,
    keys: Vec<K>,
    slots: HashMap<K, usize>,
}

impl<K: Copy + Eq + Hash + Debug> Default for DiscretePdf<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash + Debug> DiscretePdf<K> {
    pub fn new() -> Self {
        Self { tree: vec![], weights: vec![], keys: vec![], slots: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: K) -> bool {
        self.slots.contains_key(&key)
    }

    pub fn total_weight(&self) -> f64 {
        self.prefix(self.len())
    }

    pub fn weight(&self, key: K) -> Option<f64> {
        self.slots.get(&key).map(|&slot| self.weights[slot])
    }

    pub fn insert(&mut self, key: K, weight: f64) {
        debug_assert!(weight.is_finite() && weight >= 0.0, "invalid weight {weight}");
        assert!(!self.contains(key), "key {key:?} inserted twice");
        let slot = self.keys.len();
        self.keys.push(key);
        self.weights.push(0.0);
        self.tree.push(0.0);
        _ = self.slots.insert(key, slot);
        self.set(slot, weight);
    }

    pub fn update(&mut self, key: K, weight: f64) {
        debug_assert!(weight.is_finite() && weight >= 0.0, "invalid weight {weight}");
        let slot = *self.slots.get(&key).expect("updating the weight of an unknown key");
        self.set(slot, weight);
    }

    pub fn remove(&mut self, key: K) {
        let slot = self.slots.remove(&key).expect("removing an unknown key");
        let last = self.keys.len() - 1;
        if slot != last {
            let moved_weight = self.weights[last];
            let moved_key = self.keys[last];
            self.set(last, 0.0);
            self.set(slot, moved_weight);
            self.keys[slot] = moved_key;
            _ = self.slots.insert(moved_key, slot);
        } else {
            self.set(slot, 0.0);
        }
        _ = self.keys.pop();
        _ = self.weights.pop();
        // the last tree entry only ever feeds prefix sums past the new length
        _ = self.tree.pop();
    }

    /// Returns the key whose cumulative weight interval contains `u * total`,
    /// i.e. a key drawn with probability proportional to its weight when `u`
    /// is uniform in `[0, 1)`.
    pub fn choose(&self, u: f64) -> K {
        assert!(!self.is_empty(), "choose on an empty pdf");
        debug_assert!((0.0..1.0).contains(&u), "u must be in [0, 1), not {u}");
        let n = self.len();
        let mut target = u * self.total_weight();
        let mut pos = 0;
        let mut step = n.next_power_of_two();
        // find the largest pos whose prefix sum is at most the target, so that
        // an exact boundary hit belongs to the next interval and zero-weight
        // slots are skipped over
        while step > 0 {
            let next = pos + step;
            if next <= n && self.tree[next - 1] <= target {
                pos = next;
                target -= self.tree[next - 1];
            }
            step >>= 1;
        }
        // floating point can push the target past the final interval
        self.keys[pos.min(n - 1)]
    }

    fn set(&mut self, slot: usize, weight: f64) {
        let delta = weight - self.weights[slot];
        self.weights[slot] = weight;
        let mut i = slot + 1;
        while i <= self.tree.len() {
            self.tree[i - 1] += delta;
            i += i & i.wrapping_neg();
        }
    }

    fn prefix(&self, mut n: usize) -> f64 {
        let mut sum = 0.0;
        while n > 0 {
            sum += self.tree[n - 1];
            n -= n & n.wrapping_neg();
        }
        sum
    }
}
