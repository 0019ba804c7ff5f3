//! Time-bounded `(origin_id, seqno)` dedup cache for DATA frames.
//!
//! The sole loop-suppression mechanism for DATA (OGMs are never deduplicated this
//! way, see `mesh::node`).

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub type DedupKey = ([u8; 8], u32);

#[derive(Default)]
pub struct DedupCache {
    seen: HashMap<DedupKey, Instant>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key` if absent, returning `true` if it was newly inserted (i.e. the
    /// frame should be processed) or `false` if it was already present (drop it).
    pub fn insert_if_new(&mut self, key: DedupKey, now: Instant) -> bool {
        if self.seen.contains_key(&key) {
            return false;
        }
        self.seen.insert(key, now);
        true
    }

    pub fn evict_expired(&mut self, expiry: Duration, now: Instant) {
        self.seen
            .retain(|_, ts| now.saturating_duration_since(*ts) <= expiry);
    }

    #[cfg(test)]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_insert_is_accepted() {
        let mut cache = DedupCache::new();
        let now = Instant::now();
        assert!(cache.insert_if_new(([1; 8], 1), now));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut cache = DedupCache::new();
        let now = Instant::now();
        assert!(cache.insert_if_new(([1; 8], 1), now));
        assert!(!cache.insert_if_new(([1; 8], 1), now));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_seqno_is_a_distinct_key() {
        let mut cache = DedupCache::new();
        let now = Instant::now();
        assert!(cache.insert_if_new(([1; 8], 1), now));
        assert!(cache.insert_if_new(([1; 8], 2), now));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn eviction_drops_only_stale_entries() {
        let mut cache = DedupCache::new();
        let old = Instant::now() - Duration::from_secs(100);
        let now = Instant::now();
        cache.insert_if_new(([1; 8], 1), old);
        cache.insert_if_new(([2; 8], 1), now);
        cache.evict_expired(Duration::from_secs(30), now);
        assert_eq!(cache.len(), 1);
        // the expired key is gone, so it is accepted again
        assert!(cache.insert_if_new(([1; 8], 1), now));
    }
}
