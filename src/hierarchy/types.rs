// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the cache hierarchy.

use std::time::Duration;

use serde::Serialize;

use crate::eviction::EvictionStrategy;

/// Usage of a single tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierStats {
    /// 0 = fastest
    pub tier: usize,
    pub entries: usize,
    pub bytes: usize,
    pub hits: u64,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheMetrics {
    pub hit_count: u64,
    pub miss_count: u64,
    pub eviction_count: u64,
    /// Lookups served (hits plus misses)
    pub total_requests: u64,
    pub total_size_bytes: usize,
    /// Mean `get` latency
    pub average_access_time: Duration,
    /// `hits / (hits + misses)`, 0 before the first lookup
    pub hit_ratio: f64,
    pub entry_count: usize,
    pub expired_count: u64,
    pub promotion_count: u64,
    pub strategy: EvictionStrategy,
    pub tiers: Vec<TierStats>,
}

/// Result of comparing the key index, arena and tier sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub arena_entries: usize,
    pub index_entries: usize,
    pub tier_entries: usize,
    /// Index ids with no arena slot
    pub orphaned_index: usize,
    /// Arena entries the index does not point at
    pub unindexed_entries: usize,
    /// Arena entries missing from their tier set, or tier ids with no entry
    pub tier_mismatches: usize,
    /// Difference between the byte counters and the arena's real total
    pub byte_drift: usize,
}

impl AuditReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.orphaned_index == 0
            && self.unindexed_entries == 0
            && self.tier_mismatches == 0
            && self.byte_drift == 0
            && self.arena_entries == self.index_entries
            && self.arena_entries == self.tier_entries
    }
}

impl std::fmt::Display for AuditReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "arena={} index={} tiers={} orphaned={} unindexed={} mismatched={} drift={}B",
            self.arena_entries,
            self.index_entries,
            self.tier_entries,
            self.orphaned_index,
            self.unindexed_entries,
            self.tier_mismatches,
            self.byte_drift
        )
    }
}
