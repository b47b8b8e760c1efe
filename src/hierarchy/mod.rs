// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache hierarchy manager.
//!
//! The [`CacheHierarchy`] owns every cached entry and the tiers that rank
//! them, fastest first.
//!
//! # Layout
//!
//! ```text
//!   index: key ──► EntryId          (DashMap, per-key serialization)
//!   arena: EntryId ──► CacheEntry   (DashMap, owns payloads)
//!   tiers: [L1, L2, L3, L4]         (DashSet<EntryId> + byte counters)
//! ```
//!
//! Locks are always taken index → arena → tier sets, and no code path
//! reaches back into the index while holding an arena guard.
//!
//! # Budget
//!
//! Bytes and entry slots are reserved with compare-and-swap before an entry
//! is attached, so concurrent writers never overshoot `max_memory_bytes` or
//! `max_entries`. When a reservation fails, one writer at a time runs an
//! eviction pass under the eviction mutex and the reservation is retried.
//!
//! # Example
//!
//! ```
//! use tiered_cache::{CacheConfig, CacheHierarchy, SetOptions};
//!
//! let cache = CacheHierarchy::new(CacheConfig::default()).unwrap();
//! cache.set(b"user:1", b"alice".to_vec(), SetOptions::default().tag("users")).unwrap();
//!
//! assert_eq!(cache.get(b"user:1"), Some(b"alice".to_vec()));
//! assert_eq!(cache.invalidate_by_tags(["users"]), 1);
//! assert_eq!(cache.get(b"user:1"), None);
//! ```

mod tier;
mod types;

pub use types::{AuditReport, CacheMetrics, TierStats};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::access_log::{AccessLog, AccessOperation};
use crate::analyzer::{CachePattern, PatternKind, Recommendation};
use crate::compression;
use crate::config::CacheConfig;
use crate::entry::{CacheEntry, EntryId, EntryMeta};
use crate::error::CacheError;
use crate::eviction::{EvictionPolicy, EvictionStrategy};
use crate::metrics::tier_label;
use crate::predictor::{AccessPredictor, PredictorSettings};
use crate::pressure::StrategyTarget;
use crate::set_options::{SetOptions, MAX_PRIORITY};

use tier::Tier;

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
    promotions: AtomicU64,
    access_nanos: AtomicU64,
}

enum Lookup {
    Hit {
        id: EntryId,
        tier: usize,
        payload: Vec<u8>,
        compressed: bool,
    },
    Expired,
    Missing,
}

/// Multi-tier in-memory cache.
///
/// `Send + Sync`; share it behind an `Arc`.
pub struct CacheHierarchy {
    config: CacheConfig,
    policy: EvictionPolicy,
    entries: DashMap<EntryId, CacheEntry>,
    index: DashMap<Vec<u8>, EntryId>,
    tiers: Vec<Tier>,
    next_id: AtomicU64,
    reserved_bytes: AtomicUsize,
    reserved_entries: AtomicUsize,
    strategy: AtomicU8,
    eviction_lock: Mutex<()>,
    predictor: Arc<AccessPredictor>,
    access_log: Arc<AccessLog>,
    counters: Counters,
}

impl CacheHierarchy {
    /// Create a hierarchy with its own access log and predictor.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        let access_log = Arc::new(AccessLog::new(config.access_log_capacity));
        let predictor = Arc::new(AccessPredictor::new(PredictorSettings::from(&config)));
        Self::with_components(config, access_log, predictor)
    }

    /// Create a hierarchy that records into `access_log` and places entries
    /// using `predictor`.
    pub fn with_components(
        config: CacheConfig,
        access_log: Arc<AccessLog>,
        predictor: Arc<AccessPredictor>,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        let tiers = (0..config.tier_count).map(|_| Tier::default()).collect();
        let strategy = config.eviction_strategy;
        crate::metrics::set_eviction_strategy(strategy as u8);
        info!(
            tiers = config.tier_count,
            max_bytes = config.max_memory_bytes,
            max_entries = config.max_entries,
            strategy = %strategy,
            "Cache hierarchy created"
        );
        Ok(Self {
            policy: EvictionPolicy::from(&config),
            config,
            entries: DashMap::new(),
            index: DashMap::new(),
            tiers,
            next_id: AtomicU64::new(1),
            reserved_bytes: AtomicUsize::new(0),
            reserved_entries: AtomicUsize::new(0),
            strategy: AtomicU8::new(strategy as u8),
            eviction_lock: Mutex::new(()),
            predictor,
            access_log,
            counters: Counters::default(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[must_use]
    pub fn access_log(&self) -> &Arc<AccessLog> {
        &self.access_log
    }

    #[must_use]
    pub fn predictor(&self) -> &Arc<AccessPredictor> {
        &self.predictor
    }

    // --- Core operations ---

    /// Look up `key`, fastest tier first.
    ///
    /// Expired entries are removed and reported as a miss. Every call
    /// appends exactly one record to the access log.
    #[tracing::instrument(skip(self, key), fields(tier))]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let start = Instant::now();

        let found = match self.lookup(key) {
            Lookup::Hit {
                id,
                tier,
                payload,
                compressed,
            } => match compression::decode_payload(&payload, compressed) {
                Ok(value) => Some((tier, value)),
                Err(e) => {
                    warn!(error = %e, "Stored payload failed to decode, dropping entry");
                    self.remove_if_current(key, id);
                    None
                }
            },
            Lookup::Expired | Lookup::Missing => None,
        };

        let elapsed = start.elapsed();
        self.counters
            .access_nanos
            .fetch_add(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX), Ordering::Relaxed);

        match found {
            Some((tier, value)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                self.tier(tier).record_hit();
                let label = tier_label(tier);
                tracing::Span::current().record("tier", label.as_str());
                crate::metrics::record_operation(&label, "get", "hit");
                crate::metrics::record_latency(&label, "get", elapsed);
                self.access_log.record(key, AccessOperation::Get, true);
                Some(value)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::Span::current().record("tier", "miss");
                crate::metrics::record_operation("all", "get", "miss");
                crate::metrics::record_latency("all", "get", elapsed);
                self.access_log.record(key, AccessOperation::Get, false);
                None
            }
        }
    }

    /// Store `value` under `key`, replacing any existing entry.
    ///
    /// Runs synchronous eviction passes until the entry fits. Fails with
    /// [`CacheError::CapacityExceeded`] when the payload is larger than the
    /// whole budget or eviction runs out of candidates.
    #[tracing::instrument(skip(self, key, value, options), fields(size, tier))]
    pub fn set(&self, key: &[u8], value: Vec<u8>, options: SetOptions) -> Result<(), CacheError> {
        let start = Instant::now();
        let encoded = compression::encode_payload(value, self.config.compression_threshold_bytes)?;
        let size = encoded.bytes.len();
        tracing::Span::current().record("size", size);

        let budget = self.config.max_memory_bytes;
        if size > budget {
            warn!(size, budget, "Payload larger than the whole cache budget");
            return Err(self.reject(size));
        }

        let ttl = options.ttl.or_else(|| self.config.default_ttl());
        let priority = options.effective_priority();
        let tier = self.placement_tier(key, priority);

        // Replacing a key is not an eviction.
        if let Some((_, previous)) = self.index.remove(key) {
            self.detach(previous);
        }

        while !self.try_reserve(size) {
            if !self.evict_for(size) {
                warn!(size, budget, "No eviction candidates left");
                return Err(self.reject(size));
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = CacheEntry::new(
            key.to_vec(),
            encoded.bytes,
            encoded.compressed,
            ttl,
            options.tags,
            priority,
            tier,
        );
        match self.index.entry(key.to_vec()) {
            Entry::Occupied(mut occupied) => {
                // A concurrent set for the same key landed first.
                let displaced = occupied.insert(id);
                self.detach(displaced);
                self.attach(id, entry);
            }
            Entry::Vacant(vacant) => {
                self.attach(id, entry);
                vacant.insert(id);
            }
        }

        self.access_log.record(key, AccessOperation::Set, false);
        let label = tier_label(tier);
        tracing::Span::current().record("tier", label.as_str());
        crate::metrics::record_operation(&label, "set", "success");
        crate::metrics::record_latency(&label, "set", start.elapsed());
        self.publish_usage();
        Ok(())
    }

    /// Remove `key`. Returns whether an entry was removed; repeating the
    /// call is harmless.
    #[tracing::instrument(skip(self, key))]
    pub fn delete(&self, key: &[u8]) -> bool {
        let _timer = crate::time_operation!("all", "delete");
        let removed = self
            .index
            .remove(key)
            .and_then(|(_, id)| self.detach(id))
            .is_some();

        self.access_log.record(key, AccessOperation::Delete, false);
        let status = if removed { "success" } else { "miss" };
        crate::metrics::record_operation("all", "delete", status);
        if removed {
            self.publish_usage();
        }
        removed
    }

    /// Remove every entry carrying at least one of `tags`.
    #[tracing::instrument(skip_all)]
    pub fn invalidate_by_tags<I, S>(&self, tags: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: HashSet<String> = tags.into_iter().map(Into::into).collect();
        if tags.is_empty() {
            return 0;
        }

        let victims: Vec<(EntryId, Vec<u8>)> = self
            .entries
            .iter()
            .filter(|slot| slot.has_any_tag(&tags))
            .map(|slot| (*slot.key(), slot.value().key.clone()))
            .collect();

        let mut removed = 0;
        for (id, key) in victims {
            if self.remove_if_current(&key, id).is_some() {
                self.access_log.record(&key, AccessOperation::Invalidate, false);
                removed += 1;
            }
        }

        if removed > 0 {
            crate::metrics::record_invalidation(removed);
            self.publish_usage();
        }
        info!(tags = ?tags, removed, "Invalidated by tags");
        removed
    }

    /// Point-in-time statistics. Also refreshes the usage gauges.
    #[must_use]
    pub fn statistics(&self) -> CacheMetrics {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_ratio = if total_requests == 0 {
            0.0
        } else {
            hits as f64 / total_requests as f64
        };
        let average_access_time = if total_requests == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.counters.access_nanos.load(Ordering::Relaxed) / total_requests)
        };

        let tiers: Vec<TierStats> = self
            .tiers
            .iter()
            .enumerate()
            .map(|(i, tier)| tier.stats(i))
            .collect();
        for stats in &tiers {
            crate::metrics::set_tier_usage(stats.tier, stats.entries, stats.bytes);
        }
        crate::metrics::set_hit_ratio(hit_ratio);
        self.publish_usage();

        CacheMetrics {
            hit_count: hits,
            miss_count: misses,
            eviction_count: self.counters.evictions.load(Ordering::Relaxed),
            total_requests,
            total_size_bytes: tiers.iter().map(|t| t.bytes).sum(),
            average_access_time,
            hit_ratio,
            entry_count: self.entries.len(),
            expired_count: self.counters.expired.load(Ordering::Relaxed),
            promotion_count: self.counters.promotions.load(Ordering::Relaxed),
            strategy: self.strategy(),
            tiers,
        }
    }

    // --- Typed helpers ---

    /// Serialize `value` as JSON and store it.
    pub fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &[u8],
        value: &T,
        options: SetOptions,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, bytes, options)
    }

    /// Fetch and deserialize a JSON value. A miss is `Ok(None)`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, CacheError> {
        match self.get(key) {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    // --- Inspection ---

    /// Whether `key` is resident and unexpired. Not recorded as an access.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        let Some(id) = self.index.get(key).map(|id| *id) else {
            return false;
        };
        self.entries.get(&id).is_some_and(|entry| !entry.is_expired())
    }

    /// Tier currently holding `key`, 0 = fastest.
    #[must_use]
    pub fn tier_of(&self, key: &[u8]) -> Option<usize> {
        let id = self.index.get(key).map(|id| *id)?;
        self.entries.get(&id).map(|entry| entry.tier)
    }

    /// Lifetime hit count of the entry stored under `key`.
    #[must_use]
    pub fn access_count(&self, key: &[u8]) -> Option<u64> {
        let id = self.index.get(key).map(|id| *id)?;
        self.entries.get(&id).map(|entry| entry.access_count)
    }

    /// TTL currently applied to `key`.
    #[must_use]
    pub fn ttl_of(&self, key: &[u8]) -> Option<Duration> {
        let id = self.index.get(key).map(|id| *id)?;
        self.entries.get(&id).and_then(|entry| entry.ttl)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Remove every entry. Not counted as evictions.
    pub fn clear(&self) -> usize {
        let keys: Vec<Vec<u8>> = self.index.iter().map(|slot| slot.key().clone()).collect();
        let removed = keys
            .iter()
            .filter(|key| {
                self.index
                    .remove(key.as_slice())
                    .and_then(|(_, id)| self.detach(id))
                    .is_some()
            })
            .count();
        info!(removed, "Cache cleared");
        self.publish_usage();
        removed
    }

    // --- Strategy ---

    #[must_use]
    pub fn strategy(&self) -> EvictionStrategy {
        EvictionStrategy::from_u8(self.strategy.load(Ordering::Acquire))
    }

    pub fn set_strategy(&self, strategy: EvictionStrategy) {
        let previous = EvictionStrategy::from_u8(self.strategy.swap(strategy as u8, Ordering::AcqRel));
        if previous != strategy {
            info!(from = %previous, to = %strategy, "Eviction strategy changed");
            crate::metrics::set_eviction_strategy(strategy as u8);
        }
    }

    // --- Maintenance ---

    /// Remove every expired entry. Returns how many were removed.
    #[tracing::instrument(skip(self))]
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(EntryId, Vec<u8>)> = self
            .entries
            .iter()
            .filter(|slot| slot.is_expired_at(now))
            .map(|slot| (*slot.key(), slot.value().key.clone()))
            .collect();

        let removed = expired
            .iter()
            .filter(|(id, key)| self.remove_if_current(key, *id).is_some())
            .count();

        if removed > 0 {
            self.counters
                .expired
                .fetch_add(removed as u64, Ordering::Relaxed);
            crate::metrics::record_expired(removed);
            self.publish_usage();
        }
        debug!(removed, "Expired entries swept");
        removed
    }

    /// Act on analyzer recommendations for resident entries.
    ///
    /// Promotion and prefetch move an entry up at most one tier per call;
    /// TTL extension only applies to entries that have a TTL and never grows
    /// one past `max_ttl_secs`. Sizes never change. Returns the number of entries modified.
    pub fn apply_patterns(&self, patterns: &[CachePattern]) -> usize {
        let actionable: Vec<&CachePattern> = patterns
            .iter()
            .filter(|p| p.kind != PatternKind::Temporal)
            .collect();
        if actionable.is_empty() {
            return 0;
        }

        let resident: Vec<(EntryId, Vec<u8>)> = self
            .entries
            .iter()
            .map(|slot| (*slot.key(), slot.value().key.clone()))
            .collect();
        let slow_half = self.tiers.len() / 2;
        let factor = self.config.ttl_extension_factor;
        let ceiling = self.config.max_ttl();

        let mut changed = 0;
        for (id, key) in resident {
            let (mut promote, mut prefetch, mut extend) = (false, false, false);
            for pattern in actionable.iter().filter(|p| p.matches(&key)) {
                promote |= pattern.recommends(Recommendation::PromoteCacheLevel);
                prefetch |= pattern.recommends(Recommendation::Prefetch);
                extend |= pattern.recommends(Recommendation::IncreaseTtl);
            }
            if !(promote || prefetch || extend) {
                continue;
            }

            let Some(mut entry) = self.entries.get_mut(&id) else {
                continue;
            };
            let mut touched = false;
            if extend {
                if let Some(ttl) = entry.ttl {
                    let extended = extend_ttl(ttl, factor, ceiling);
                    if extended != ttl {
                        entry.ttl = Some(extended);
                        touched = true;
                    }
                }
            }
            let from = entry.tier;
            if from > 0 && (promote || (prefetch && from >= slow_half)) {
                self.move_up(id, &mut entry);
                touched = true;
            }
            if touched {
                changed += 1;
            }
        }

        if changed > 0 {
            crate::metrics::record_recommendations_applied(changed);
        }
        debug!(patterns = actionable.len(), changed, "Applied pattern recommendations");
        changed
    }

    /// Compare arena, key index and tier sets. Exact only while no other
    /// operation is in flight.
    #[must_use]
    pub fn audit(&self) -> AuditReport {
        let arena: Vec<(EntryId, Vec<u8>, usize, usize)> = self
            .entries
            .iter()
            .map(|slot| (*slot.key(), slot.key.clone(), slot.tier, slot.size_bytes))
            .collect();
        let arena_tiers: HashMap<EntryId, usize> =
            arena.iter().map(|(id, _, tier, _)| (*id, *tier)).collect();

        let mut report = AuditReport {
            arena_entries: arena.len(),
            index_entries: self.index.len(),
            tier_entries: self.tiers.iter().map(Tier::len).sum(),
            ..Default::default()
        };

        report.orphaned_index = self
            .index
            .iter()
            .filter(|slot| !arena_tiers.contains_key(slot.value()))
            .count();

        for (id, key, tier, _) in &arena {
            if self.index.get(key.as_slice()).map(|v| *v) != Some(*id) {
                report.unindexed_entries += 1;
            }
            if !self.tiers.get(*tier).is_some_and(|t| t.contains(*id)) {
                report.tier_mismatches += 1;
            }
        }
        for (index, tier) in self.tiers.iter().enumerate() {
            report.tier_mismatches += tier
                .ids()
                .into_iter()
                .filter(|id| arena_tiers.get(id) != Some(&index))
                .count();
        }

        let real_bytes: usize = arena.iter().map(|(_, _, _, size)| size).sum();
        let tier_bytes: usize = self.tiers.iter().map(Tier::bytes).sum();
        let reserved = self.reserved_bytes.load(Ordering::Acquire);
        report.byte_drift = real_bytes
            .abs_diff(tier_bytes)
            .max(real_bytes.abs_diff(reserved));
        report
    }

    /// Audit, and if anything disagrees rebuild the index, tier sets and
    /// budget counters from the arena. Returns the pre-heal report.
    pub fn heal(&self) -> AuditReport {
        let _guard = self.eviction_lock.lock();
        let report = self.audit();
        if report.is_consistent() {
            return report;
        }
        warn!(%report, "Cache index drift detected, healing");
        crate::metrics::record_inconsistency("healed");

        self.index.retain(|_, id| self.entries.contains_key(id));

        let arena: Vec<(EntryId, Vec<u8>)> = self
            .entries
            .iter()
            .map(|slot| (*slot.key(), slot.key.clone()))
            .collect();
        for (id, key) in arena {
            if self.index.get(key.as_slice()).map(|v| *v) != Some(id) {
                self.entries.remove(&id);
            }
        }

        let last = self.tiers.len() - 1;
        let mut members: Vec<Vec<(EntryId, usize)>> = vec![Vec::new(); self.tiers.len()];
        let mut bytes = 0;
        for mut slot in self.entries.iter_mut() {
            if slot.tier > last {
                slot.tier = last;
            }
            members[slot.tier].push((*slot.key(), slot.size_bytes));
            bytes += slot.size_bytes;
        }
        for (tier, ids) in self.tiers.iter().zip(members) {
            tier.reset(ids);
        }
        self.reserved_bytes.store(bytes, Ordering::Release);
        self.reserved_entries
            .store(self.entries.len(), Ordering::Release);
        self.publish_usage();
        report
    }

    // --- Internal helpers ---

    fn tier(&self, index: usize) -> &Tier {
        &self.tiers[index.min(self.tiers.len() - 1)]
    }

    fn placement_tier(&self, key: &[u8], priority: u8) -> usize {
        let score = if self.predictor.is_informative() {
            self.predictor.predict_frequency(key)
        } else {
            f64::from(priority) / f64::from(MAX_PRIORITY)
        };
        tier_for_score(score, self.tiers.len())
    }

    fn lookup(&self, key: &[u8]) -> Lookup {
        let Some(id) = self.index.get(key).map(|id| *id) else {
            return Lookup::Missing;
        };

        let now = Instant::now();
        let hit = {
            let Some(mut entry) = self.entries.get_mut(&id) else {
                return Lookup::Missing;
            };
            if entry.is_expired_at(now) {
                None
            } else {
                entry.record_access();
                let tier = entry.tier;
                if tier > 0 && entry.accesses_since_promotion > self.config.promotion_access_threshold {
                    self.move_up(id, &mut entry);
                }
                Some(Lookup::Hit {
                    id,
                    tier,
                    payload: entry.payload.clone(),
                    compressed: entry.compressed,
                })
            }
        };

        match hit {
            Some(hit) => hit,
            None => {
                if self.remove_if_current(key, id).is_some() {
                    self.counters.expired.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_expired(1);
                    debug!("Expired entry removed on read");
                }
                Lookup::Expired
            }
        }
    }

    /// Move an entry up one tier. Caller holds the entry's arena guard.
    fn move_up(&self, id: EntryId, entry: &mut CacheEntry) {
        let from = entry.tier;
        if from == 0 {
            return;
        }
        let to = from - 1;
        let present = self.tier(from).remove(id, entry.size_bytes);
        debug_assert!(present, "entry {id} missing from tier {from}");
        if !present {
            Self::report_inconsistency("missing_tier_member");
        }
        self.tier(to).add(id, entry.size_bytes);
        entry.tier = to;
        entry.accesses_since_promotion = 0;

        self.counters.promotions.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_promotion(from, to);
        debug!(id, from = %tier_label(from), to = %tier_label(to), "Promoted entry");
    }

    fn attach(&self, id: EntryId, entry: CacheEntry) {
        let tier = entry.tier;
        let size = entry.size_bytes;
        self.entries.insert(id, entry);
        self.tier(tier).add(id, size);
    }

    /// Drop an entry the index no longer points at and release its budget.
    fn detach(&self, id: EntryId) -> Option<CacheEntry> {
        let slot = self.entries.remove(&id);
        debug_assert!(slot.is_some(), "indexed entry {id} has no arena slot");
        let Some((_, entry)) = slot else {
            Self::report_inconsistency("missing_arena_slot");
            return None;
        };

        let present = self.tier(entry.tier).remove(id, entry.size_bytes);
        debug_assert!(present, "entry {id} missing from tier {}", entry.tier);
        if !present {
            Self::report_inconsistency("missing_tier_member");
        }
        self.reserved_bytes
            .fetch_sub(entry.size_bytes, Ordering::AcqRel);
        self.reserved_entries.fetch_sub(1, Ordering::AcqRel);
        Some(entry)
    }

    /// Remove `key` only if it still maps to `id`.
    fn remove_if_current(&self, key: &[u8], id: EntryId) -> Option<CacheEntry> {
        self.index.remove_if(key, |_, current| *current == id)?;
        self.detach(id)
    }

    fn report_inconsistency(kind: &str) {
        warn!(kind, "Cache index inconsistency");
        crate::metrics::record_inconsistency(kind);
    }

    fn fits(&self, size: usize) -> bool {
        let bytes = self.reserved_bytes.load(Ordering::Acquire);
        let count = self.reserved_entries.load(Ordering::Acquire);
        bytes.saturating_add(size) <= self.config.max_memory_bytes
            && count < self.config.max_entries
    }

    /// Reserve bytes and one entry slot, or nothing.
    fn try_reserve(&self, size: usize) -> bool {
        let max_bytes = self.config.max_memory_bytes;
        let max_entries = self.config.max_entries;

        if self
            .reserved_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(size).filter(|&total| total <= max_bytes)
            })
            .is_err()
        {
            return false;
        }
        if self
            .reserved_entries
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(1).filter(|&total| total <= max_entries)
            })
            .is_err()
        {
            self.reserved_bytes.fetch_sub(size, Ordering::AcqRel);
            return false;
        }
        true
    }

    /// Run one eviction pass for an insert of `size` bytes. Returns false
    /// only when nothing could be evicted and the insert still does not fit.
    fn evict_for(&self, size: usize) -> bool {
        let _guard = self.eviction_lock.lock();
        if self.fits(size) {
            return true;
        }

        let strategy = EvictionPolicy::effective(self.strategy(), self.predictor.is_informative());
        let mut candidates: Vec<EntryMeta> = self
            .entries
            .iter()
            .map(|slot| EntryMeta::from_entry(*slot.key(), slot.value()))
            .collect();
        if candidates.is_empty() {
            return false;
        }
        self.policy.rank(strategy, &mut candidates, |key| {
            self.predictor.predict_access_probability(key)
        });
        let mut queue: VecDeque<EntryMeta> = candidates.into();

        let mut evicted = 0usize;
        let mut evicted_bytes = 0usize;
        let mut evict = |victim: &EntryMeta| {
            if let Some(entry) = self.remove_if_current(&victim.key, victim.id) {
                evicted += 1;
                evicted_bytes += entry.size_bytes;
            }
        };

        if strategy == EvictionStrategy::Adaptive {
            while !self.fits(size) {
                let Some(victim) = queue.pop_front() else {
                    break;
                };
                evict(&victim);
            }
        } else {
            while !self.fits(size) && !queue.is_empty() {
                let batch = self.policy.batch_size(queue.len());
                for victim in queue.drain(..batch) {
                    evict(&victim);
                }
            }
        }

        if evicted > 0 {
            self.counters
                .evictions
                .fetch_add(evicted as u64, Ordering::Relaxed);
            crate::metrics::record_eviction(strategy.as_str(), evicted, evicted_bytes);
            self.publish_usage();
            debug!(
                strategy = %strategy,
                evicted,
                evicted_bytes,
                "Evicted entries to make room"
            );
        }
        evicted > 0 || self.fits(size)
    }

    fn reject(&self, size: usize) -> CacheError {
        crate::metrics::record_capacity_rejection(size);
        crate::metrics::record_operation("all", "set", "rejected");
        CacheError::CapacityExceeded {
            requested: size,
            budget: self.config.max_memory_bytes,
        }
    }

    fn publish_usage(&self) {
        crate::metrics::set_cache_bytes(self.reserved_bytes.load(Ordering::Relaxed));
        crate::metrics::set_cache_items(self.entries.len());
    }
}

impl StrategyTarget for CacheHierarchy {
    fn strategy(&self) -> EvictionStrategy {
        CacheHierarchy::strategy(self)
    }

    fn set_strategy(&self, strategy: EvictionStrategy) {
        CacheHierarchy::set_strategy(self, strategy);
    }
}

/// Grow `ttl` by `factor`, capped at `ceiling`. A TTL already at or past
/// the ceiling is left as is.
fn extend_ttl(ttl: Duration, factor: f64, ceiling: Duration) -> Duration {
    if ttl >= ceiling {
        return ttl;
    }
    Duration::try_from_secs_f64(ttl.as_secs_f64() * factor).map_or(ceiling, |grown| grown.min(ceiling))
}

/// Map a placement score in `[0, 1]` to a tier; higher scores land in
/// faster tiers.
fn tier_for_score(score: f64, tier_count: usize) -> usize {
    let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
    let tier = ((1.0 - score) * tier_count as f64).floor() as usize;
    tier.min(tier_count.saturating_sub(1))
}
