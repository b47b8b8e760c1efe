// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Victim ordering for each eviction strategy.
//!
//! Ranking works on [`EntryMeta`] snapshots so it never holds cache locks.
//! Ties are broken by entry id, which grows with insertion order, so the
//! order is deterministic even when two entries share an `Instant`.

use std::cmp::Ordering;

use crate::config::CacheConfig;
use crate::entry::EntryMeta;
use crate::eviction::EvictionStrategy;
use crate::set_options::MAX_PRIORITY;

/// Round sizing and adaptive weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionPolicy {
    /// Share of resident entries removed per LRU/LFU/FIFO/TTL round
    pub fraction: f64,
    /// (predicted probability, access count, priority)
    pub weights: (f64, f64, f64),
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            fraction: 0.10,
            weights: (0.4, 0.3, 0.3),
        }
    }
}

impl From<&CacheConfig> for EvictionPolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            fraction: config.eviction_fraction,
            weights: config.adaptive_weights,
        }
    }
}

impl EvictionPolicy {
    /// Strategy actually applied. Adaptive degrades to LRU while the
    /// predictor only returns neutral scores.
    #[must_use]
    pub fn effective(strategy: EvictionStrategy, predictor_informative: bool) -> EvictionStrategy {
        match strategy {
            EvictionStrategy::Adaptive if !predictor_informative => EvictionStrategy::Lru,
            other => other,
        }
    }

    /// Entries removed by one batch round: `ceil(fraction * resident)`, at least one.
    #[must_use]
    pub fn batch_size(&self, resident: usize) -> usize {
        if resident == 0 {
            return 0;
        }
        let size = (self.fraction * resident as f64).ceil() as usize;
        size.clamp(1, resident)
    }

    /// Keep-score for adaptive eviction; lower is evicted first.
    #[must_use]
    pub fn adaptive_score(&self, meta: &EntryMeta, probability: f64, max_access_count: u64) -> f64 {
        let (w_prob, w_count, w_prio) = self.weights;
        let count = if max_access_count == 0 {
            0.0
        } else {
            meta.access_count as f64 / max_access_count as f64
        };
        let priority = f64::from(meta.priority) / f64::from(MAX_PRIORITY);

        w_prob * probability.clamp(0.0, 1.0) + w_count * count + w_prio * priority
    }

    /// Sort `entries` so the first element is the next victim.
    pub fn rank<F>(&self, strategy: EvictionStrategy, entries: &mut Vec<EntryMeta>, probability: F)
    where
        F: Fn(&[u8]) -> f64,
    {
        match strategy {
            EvictionStrategy::Lru => entries.sort_by(|a, b| {
                a.last_accessed
                    .cmp(&b.last_accessed)
                    .then_with(|| a.id.cmp(&b.id))
            }),
            EvictionStrategy::Lfu => entries.sort_by(|a, b| {
                a.access_count
                    .cmp(&b.access_count)
                    .then_with(|| a.last_accessed.cmp(&b.last_accessed))
                    .then_with(|| a.id.cmp(&b.id))
            }),
            EvictionStrategy::Fifo => entries.sort_by(|a, b| {
                a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
            }),
            EvictionStrategy::Ttl => entries.sort_by(|a, b| {
                expiry_order(a, b)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            }),
            EvictionStrategy::Adaptive => {
                let max_count = entries.iter().map(|e| e.access_count).max().unwrap_or(0);
                let mut scored: Vec<(f64, EntryMeta)> = entries
                    .drain(..)
                    .map(|meta| {
                        let score = self.adaptive_score(&meta, probability(&meta.key), max_count);
                        (score, meta)
                    })
                    .collect();
                scored.sort_by(|(sa, a), (sb, b)| {
                    sa.total_cmp(sb)
                        .then_with(|| a.last_accessed.cmp(&b.last_accessed))
                        .then_with(|| a.id.cmp(&b.id))
                });
                entries.extend(scored.into_iter().map(|(_, meta)| meta));
            }
        }
    }
}

/// Soonest expiry first; entries without a TTL sort last.
fn expiry_order(a: &EntryMeta, b: &EntryMeta) -> Ordering {
    match (a.expires_at, b.expires_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn meta(id: u64, idle_secs: u64, age_secs: u64, access_count: u64) -> EntryMeta {
        meta_at(base(), id, idle_secs, age_secs, access_count)
    }

    fn base() -> Instant {
        Instant::now() + Duration::from_secs(10_000)
    }

    fn meta_at(now: Instant, id: u64, idle_secs: u64, age_secs: u64, access_count: u64) -> EntryMeta {
        EntryMeta {
            id,
            key: format!("k{id}").into_bytes(),
            size_bytes: 100,
            created_at: now - Duration::from_secs(age_secs),
            last_accessed: now - Duration::from_secs(idle_secs),
            access_count,
            priority: 1,
            expires_at: None,
            tier: 0,
        }
    }

    fn ids(entries: &[EntryMeta]) -> Vec<u64> {
        entries.iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_batch_size() {
        let policy = EvictionPolicy::default();
        assert_eq!(policy.batch_size(0), 0);
        assert_eq!(policy.batch_size(1), 1);
        assert_eq!(policy.batch_size(3), 1);
        assert_eq!(policy.batch_size(10), 1);
        assert_eq!(policy.batch_size(11), 2);
        assert_eq!(policy.batch_size(100), 10);

        let all = EvictionPolicy { fraction: 1.0, ..Default::default() };
        assert_eq!(all.batch_size(7), 7);
    }

    #[test]
    fn test_lru_orders_by_idle_time() {
        let policy = EvictionPolicy::default();
        let mut entries = vec![meta(1, 10, 100, 0), meta(2, 50, 100, 0), meta(3, 5, 100, 0)];
        policy.rank(EvictionStrategy::Lru, &mut entries, |_| 0.5);
        assert_eq!(ids(&entries), vec![2, 1, 3]);
    }

    #[test]
    fn test_lfu_orders_by_count() {
        let policy = EvictionPolicy::default();
        let mut entries = vec![meta(1, 0, 100, 9), meta(2, 0, 100, 1), meta(3, 0, 100, 4)];
        policy.rank(EvictionStrategy::Lfu, &mut entries, |_| 0.5);
        assert_eq!(ids(&entries), vec![2, 3, 1]);
    }

    #[test]
    fn test_fifo_orders_by_creation_then_id() {
        let policy = EvictionPolicy::default();
        let now = base();
        let mut entries = vec![
            meta_at(now, 3, 0, 100, 0),
            meta_at(now, 1, 0, 100, 0),
            meta_at(now, 2, 0, 300, 0),
        ];
        policy.rank(EvictionStrategy::Fifo, &mut entries, |_| 0.5);
        assert_eq!(ids(&entries), vec![2, 1, 3]);
    }

    #[test]
    fn test_ttl_puts_non_expiring_last() {
        let policy = EvictionPolicy::default();
        let t0 = Instant::now();
        let mut a = meta(1, 0, 10, 0);
        a.expires_at = Some(t0 + Duration::from_secs(60));
        let mut b = meta(2, 0, 10, 0);
        b.expires_at = Some(t0 + Duration::from_secs(5));
        let c = meta(3, 0, 10, 0);

        let mut entries = vec![c, a, b];
        policy.rank(EvictionStrategy::Ttl, &mut entries, |_| 0.5);
        assert_eq!(ids(&entries), vec![2, 1, 3]);
    }

    #[test]
    fn test_adaptive_prefers_keeping_likely_entries() {
        let policy = EvictionPolicy::default();
        let mut entries = vec![meta(1, 0, 10, 5), meta(2, 0, 10, 5), meta(3, 0, 10, 5)];
        policy.rank(EvictionStrategy::Adaptive, &mut entries, |key| match key {
            b"k1" => 0.9,
            b"k2" => 0.1,
            _ => 0.5,
        });
        assert_eq!(ids(&entries), vec![2, 3, 1]);
    }

    #[test]
    fn test_adaptive_score_components() {
        let policy = EvictionPolicy::default();
        let mut entry = meta(1, 0, 10, 10);
        entry.priority = 5;
        let score = policy.adaptive_score(&entry, 1.0, 10);
        assert!((score - 1.0).abs() < 1e-9);

        entry.priority = 1;
        entry.access_count = 0;
        let score = policy.adaptive_score(&entry, 0.0, 0);
        assert!((score - 0.3 * 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_adaptive_falls_back_without_predictor() {
        assert_eq!(
            EvictionPolicy::effective(EvictionStrategy::Adaptive, false),
            EvictionStrategy::Lru
        );
        assert_eq!(
            EvictionPolicy::effective(EvictionStrategy::Adaptive, true),
            EvictionStrategy::Adaptive
        );
        assert_eq!(
            EvictionPolicy::effective(EvictionStrategy::Fifo, false),
            EvictionStrategy::Fifo
        );
    }
}
