//! Originator and neighbor tables, behind one mutex.
//!
//! Both tables live behind a single [`std::sync::Mutex`] so mutation from the RX
//! thread and eviction from the cleanup thread can never race each other.

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub type NodeId = [u8; 8];

#[derive(Debug, Clone, Copy)]
pub struct OriginatorEntry {
    pub best_next_hop: NodeId,
    pub last_seqno: u32,
    pub metric: u8,
    pub last_seen: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct NeighborEntry {
    pub last_seen: Instant,
    pub link_metric: u8,
}

/// Wrap-aware "strictly greater than" comparison for 32-bit sequence numbers, used
/// instead of plain `>` so a counter wrap doesn't spuriously demote a fresher OGM.
/// Resolves the open question left by the reference implementation (see DESIGN.md).
pub fn seqno_is_newer(candidate: u32, stored: u32) -> bool {
    (candidate.wrapping_sub(stored) as i32) > 0
}

#[derive(Default)]
pub struct RoutingTables {
    originators: HashMap<NodeId, OriginatorEntry>,
    neighbors: HashMap<NodeId, NeighborEntry>,
}

impl RoutingTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one OGM observation. Returns `true` if the originator's next hop was
    /// (re)established by this call, which is also true for a brand-new entry.
    pub fn observe_ogm(
        &mut self,
        origin_id: NodeId,
        seqno: u32,
        prev_hop_id: NodeId,
        link_metric: u8,
        now: Instant,
    ) -> bool {
        let neighbor = self.neighbors.entry(prev_hop_id).or_insert(NeighborEntry {
            last_seen: now,
            link_metric,
        });
        neighbor.last_seen = now;
        neighbor.link_metric = link_metric;

        match self.originators.get_mut(&origin_id) {
            None => {
                self.originators.insert(
                    origin_id,
                    OriginatorEntry {
                        best_next_hop: prev_hop_id,
                        last_seqno: seqno,
                        metric: link_metric,
                        last_seen: now,
                    },
                );
                true
            }
            Some(entry) => {
                if seqno_is_newer(seqno, entry.last_seqno) {
                    entry.best_next_hop = prev_hop_id;
                    entry.last_seqno = seqno;
                    entry.metric = link_metric;
                    entry.last_seen = now;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn best_next_hop(&self, dest_id: &NodeId) -> Option<NodeId> {
        self.originators.get(dest_id).map(|e| e.best_next_hop)
    }

    pub fn originator(&self, origin_id: &NodeId) -> Option<OriginatorEntry> {
        self.originators.get(origin_id).copied()
    }

    pub fn neighbor(&self, prev_hop_id: &NodeId) -> Option<NeighborEntry> {
        self.neighbors.get(prev_hop_id).copied()
    }

    /// Evict originators and neighbors past their respective expiry.
    pub fn evict_expired(
        &mut self,
        route_expiry: Duration,
        neighbor_expiry: Duration,
        now: Instant,
    ) {
        self.originators
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= route_expiry);
        self.neighbors
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= neighbor_expiry);
    }

    #[cfg(test)]
    pub fn originator_count(&self) -> usize {
        self.originators.len()
    }

    #[cfg(test)]
    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seqno_comparison_handles_wrap() {
        assert!(seqno_is_newer(5, 3));
        assert!(!seqno_is_newer(3, 5));
        assert!(!seqno_is_newer(5, 5));
        // Wrap: 1 is newer than u32::MAX.
        assert!(seqno_is_newer(1, u32::MAX));
        assert!(!seqno_is_newer(u32::MAX, 1));
    }

    #[test]
    fn first_ogm_creates_entries() {
        let mut tables = RoutingTables::new();
        let origin = [1; 8];
        let prev_hop = [2; 8];
        let now = Instant::now();
        assert!(tables.observe_ogm(origin, 1, prev_hop, 255, now));
        assert_eq!(tables.best_next_hop(&origin), Some(prev_hop));
        assert_eq!(tables.neighbor(&prev_hop).unwrap().link_metric, 255);
    }

    #[test]
    fn stale_seqno_does_not_replace_entry() {
        let mut tables = RoutingTables::new();
        let origin = [1; 8];
        let hop_a = [2; 8];
        let hop_b = [3; 8];
        let now = Instant::now();
        tables.observe_ogm(origin, 10, hop_a, 200, now);
        let replaced = tables.observe_ogm(origin, 5, hop_b, 200, now);
        assert!(!replaced);
        assert_eq!(tables.best_next_hop(&origin), Some(hop_a));
    }

    #[test]
    fn newer_seqno_replaces_next_hop() {
        let mut tables = RoutingTables::new();
        let origin = [1; 8];
        let hop_a = [2; 8];
        let hop_b = [3; 8];
        let now = Instant::now();
        tables.observe_ogm(origin, 10, hop_a, 200, now);
        let replaced = tables.observe_ogm(origin, 11, hop_b, 150, now);
        assert!(replaced);
        assert_eq!(tables.best_next_hop(&origin), Some(hop_b));
    }

    #[test]
    fn eviction_removes_stale_entries() {
        let mut tables = RoutingTables::new();
        let origin = [1; 8];
        let hop = [2; 8];
        let old = Instant::now() - Duration::from_secs(1000);
        tables.observe_ogm(origin, 1, hop, 255, old);
        tables.evict_expired(
            Duration::from_secs(120),
            Duration::from_secs(60),
            Instant::now(),
        );
        assert_eq!(tables.originator_count(), 0);
        assert_eq!(tables.neighbor_count(), 0);
    }
}
