//! Bounded weak cache for normalization results.
//!
//! Maps a canonical Add handle to its extracted scalar and normalized
//! form, so repeated normalization of the same shared sum (a sum used
//! as the base of many powers) is answered in O(1). Results are held
//! weakly: a cached entry never keeps a node alive, and expiry is
//! detected by slot-generation comparison. Entries whose key node is
//! destroyed are purged eagerly through the store's tracked-slot
//! notifications; capacity overflow evicts in insertion order.

use rustc_hash::FxHashMap;
use std::collections::VecDeque;

use symdag_core::{Context, TermId, Value, WeakTerm};

/// Entries per eviction round.
const ROUND_SLOTS: usize = 1000;

/// Number of rounds retained.
const ROUNDS: usize = 16;

#[derive(Debug, Clone, Copy)]
struct CseEntry {
    scal: Value,
    result: WeakTerm,
}

/// The normalization-result cache.
#[derive(Debug, Default)]
pub struct CseHash {
    map: FxHashMap<TermId, CseEntry>,
    /// Keys in insertion order; stale keys are skipped lazily.
    ring: VecDeque<TermId>,
}

impl CseHash {
    /// Total entry capacity.
    pub const CAPACITY: usize = ROUND_SLOTS * ROUNDS;

    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the cached normalization of `id`.
    ///
    /// On a hit the result is upgraded to an owned reference. An entry
    /// whose weak result has expired counts as a miss and is dropped.
    pub fn get(&mut self, ctx: &mut Context, id: TermId) -> Option<(Value, TermId)> {
        let entry = *self.map.get(&id)?;
        match ctx.upgrade(entry.result) {
            Some(result) => Some((entry.scal, result)),
            None => {
                self.map.remove(&id);
                None
            }
        }
    }

    /// Caches the normalization of `id` as `scal * result`.
    ///
    /// The result is held weakly; the caller keeps ownership of its
    /// strong reference. The oldest entry is evicted once the cache is
    /// full.
    pub fn insert(&mut self, id: TermId, scal: Value, result: WeakTerm) {
        if self.map.len() >= Self::CAPACITY {
            self.evict_oldest();
        }
        if self.map.insert(id, CseEntry { scal, result }).is_none() {
            self.ring.push_back(id);
        }
    }

    fn evict_oldest(&mut self) {
        while let Some(old) = self.ring.pop_front() {
            if self.map.remove(&old).is_some() {
                log::trace!("cse: evicted entry for {old}");
                break;
            }
        }
    }

    /// Purges entries keyed by destroyed nodes.
    ///
    /// Called with the tracked handles the store reported on release,
    /// before their slots can be reused.
    pub fn forget(&mut self, destroyed: &[TermId]) {
        for id in destroyed {
            self.map.remove(id);
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_expiry() {
        let mut ctx = Context::new();
        let mut cache = CseHash::new();

        let key = ctx.symbol("k");
        let res = ctx.symbol("r");
        cache.insert(key, Value::new(2.0), ctx.downgrade(res));

        let (scal, got) = cache.get(&mut ctx, key).expect("entry should be live");
        assert_eq!(scal, Value::new(2.0));
        assert_eq!(got, res);
        ctx.release(got);

        // Dropping the last strong reference expires the weak result
        ctx.release(res);
        assert_eq!(cache.get(&mut ctx, key), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_forget_purges_key() {
        let mut ctx = Context::new();
        let mut cache = CseHash::new();

        let key = ctx.symbol("k");
        let res = ctx.symbol("r");
        cache.insert(key, Value::ONE, ctx.downgrade(res));

        ctx.mark_tracked(key);
        let dead = ctx.release(key);
        cache.forget(&dead);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_eviction() {
        let mut ctx = Context::new();
        let mut cache = CseHash::new();

        let res = ctx.symbol("r");
        let weak = ctx.downgrade(res);

        let mut first = None;
        for i in 0..=CseHash::CAPACITY {
            let key = ctx.symbol(&format!("k{i}"));
            if first.is_none() {
                first = Some(key);
            }
            cache.insert(key, Value::ONE, weak);
        }

        assert_eq!(cache.len(), CseHash::CAPACITY);
        // The oldest entry was rotated out
        assert_eq!(cache.get(&mut ctx, first.expect("set above")), None);
    }
}
