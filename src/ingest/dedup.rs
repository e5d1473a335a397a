//! Dedup cache (§4.4 step 5, §9 design note).
//!
//! Insertion-ordered: a `VecDeque` carries arrival order, a `HashSet` gives O(1) membership.
//! When the soft cap is exceeded the oldest half is dropped — correct because insertion order
//! equals arrival order here, there is no out-of-order re-insertion.

use std::collections::{HashSet, VecDeque};

pub struct DedupCache {
    order: VecDeque<String>,
    seen: HashSet<String>,
    soft_cap: usize,
}

impl DedupCache {
    pub fn new(soft_cap: usize) -> Self {
        Self {
            order: VecDeque::new(),
            seen: HashSet::new(),
            soft_cap,
        }
    }

    /// Returns `true` if `key` was newly inserted (i.e. this frame should be processed), `false`
    /// if it was already present (drop as a duplicate).
    pub fn insert(&mut self, key: String) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        if self.order.len() > self.soft_cap {
            self.evict_oldest_half();
        }
        true
    }

    fn evict_oldest_half(&mut self) {
        let to_drop = self.order.len() / 2;
        for _ in 0..to_drop {
            if let Some(key) = self.order.pop_front() {
                self.seen.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
