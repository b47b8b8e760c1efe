// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache entry data structure.
//!
//! A [`CacheEntry`] lives in the hierarchy's arena under a stable
//! [`EntryId`]; tiers only hold ids. The entry records which tier it is in.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::set_options::MAX_PRIORITY;

/// Stable arena identifier. Never reused within one cache instance.
pub type EntryId = u64;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: Vec<u8>,
    /// Stored bytes (compressed when `compressed` is set)
    pub payload: Vec<u8>,
    pub created_at: Instant,
    pub last_accessed: Instant,
    /// Hits while resident; never decreases
    pub access_count: u64,
    pub ttl: Option<Duration>,
    /// Stored payload size after compression
    pub size_bytes: usize,
    pub tags: HashSet<String>,
    /// 1 (lowest) to 5 (highest)
    pub priority: u8,
    pub compressed: bool,
    /// Index into the tier list, 0 = fastest
    pub tier: usize,
    /// Hits since the entry last changed tier
    pub accesses_since_promotion: u64,
}

impl CacheEntry {
    pub(crate) fn new(
        key: Vec<u8>,
        payload: Vec<u8>,
        compressed: bool,
        ttl: Option<Duration>,
        tags: HashSet<String>,
        priority: u8,
        tier: usize,
    ) -> Self {
        let now = Instant::now();
        let size_bytes = payload.len();
        Self {
            key,
            payload,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            ttl,
            size_bytes,
            tags,
            priority,
            compressed,
            tier,
            accesses_since_promotion: 0,
        }
    }

    pub fn record_access(&mut self) {
        self.last_accessed = Instant::now();
        self.access_count = self.access_count.saturating_add(1);
        self.accesses_since_promotion = self.accesses_since_promotion.saturating_add(1);
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    #[must_use]
    pub fn idle(&self) -> Duration {
        self.last_accessed.elapsed()
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(self.created_at) > ttl)
    }

    /// Instant at which the entry expires, if it has a TTL.
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.ttl.and_then(|ttl| self.created_at.checked_add(ttl))
    }

    #[must_use]
    pub fn has_any_tag(&self, tags: &HashSet<String>) -> bool {
        !self.tags.is_disjoint(tags)
    }

    /// Priority scaled to (0, 1].
    #[must_use]
    pub fn normalized_priority(&self) -> f64 {
        f64::from(self.priority) / f64::from(MAX_PRIORITY)
    }
}

/// Lightweight copy of the fields eviction needs, taken so candidate
/// selection never holds arena locks.
#[derive(Debug, Clone)]
pub struct EntryMeta {
    pub id: EntryId,
    pub key: Vec<u8>,
    pub size_bytes: usize,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub access_count: u64,
    pub priority: u8,
    pub expires_at: Option<Instant>,
    pub tier: usize,
}

impl EntryMeta {
    pub(crate) fn from_entry(id: EntryId, entry: &CacheEntry) -> Self {
        Self {
            id,
            key: entry.key.clone(),
            size_bytes: entry.size_bytes,
            created_at: entry.created_at,
            last_accessed: entry.last_accessed,
            access_count: entry.access_count,
            priority: entry.priority,
            expires_at: entry.expires_at(),
            tier: entry.tier,
        }
    }
}
