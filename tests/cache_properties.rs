// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Behavioral tests for the cache hierarchy and engine.
//!
//! Everything here runs in-process; no external services needed.
//!
//! Run with: `cargo test --test cache_properties`

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tiered_cache::{
    CacheConfig, CacheEngine, CacheError, CacheHierarchy, EvictionStrategy, PressureLevel,
    SetOptions, SimulatedMemoryProbe,
};

fn config(max_bytes: usize, strategy: EvictionStrategy) -> CacheConfig {
    CacheConfig {
        max_memory_bytes: max_bytes,
        eviction_strategy: strategy,
        compression_threshold_bytes: usize::MAX,
        ..Default::default()
    }
}

fn key(i: usize) -> Vec<u8> {
    format!("key:{i}").into_bytes()
}

// =============================================================================
// Tier exclusivity and budget
// =============================================================================

#[test]
fn every_resident_key_lives_in_exactly_one_tier() {
    let cache = CacheHierarchy::new(CacheConfig {
        promotion_access_threshold: 1,
        ..config(64 * 1024, EvictionStrategy::Lru)
    })
    .unwrap();

    for i in 0..200 {
        let priority = (i % 5) as u8 + 1;
        cache
            .set(&key(i), vec![0; 32 + i % 64], SetOptions::default().priority(priority))
            .unwrap();
        if i % 3 == 0 {
            cache.get(&key(i / 2));
            cache.get(&key(i / 2));
        }
        if i % 7 == 0 {
            cache.delete(&key(i / 3));
        }
    }

    let report = cache.audit();
    assert!(report.is_consistent(), "{report}");
    assert_eq!(report.tier_entries, report.arena_entries);

    let stats = cache.statistics();
    let per_tier: usize = stats.tiers.iter().map(|t| t.entries).sum();
    assert_eq!(per_tier, stats.entry_count);
}

#[test]
fn byte_budget_holds_after_every_successful_set() {
    for strategy in EvictionStrategy::ALL {
        let cache = CacheHierarchy::new(config(4096, strategy)).unwrap();
        for i in 0..300 {
            let size = 16 + (i * 37) % 700;
            cache.set(&key(i), vec![1; size], SetOptions::default()).unwrap();
            let stats = cache.statistics();
            assert!(
                stats.total_size_bytes <= 4096,
                "{strategy}: {} bytes after set {i}",
                stats.total_size_bytes
            );
        }
        assert!(cache.statistics().eviction_count > 0, "{strategy} never evicted");
        assert!(cache.audit().is_consistent());
    }
}

#[test]
fn concurrent_writers_never_overshoot_budget() {
    let cache = Arc::new(CacheHierarchy::new(config(8192, EvictionStrategy::Fifo)).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let cache = cache.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    let k = key(t * 1000 + i % 40);
                    match cache.set(&k, vec![t as u8; 100 + i % 200], SetOptions::default()) {
                        Ok(()) => {}
                        Err(CacheError::CapacityExceeded { .. }) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                    cache.get(&k);
                    if i % 11 == 0 {
                        cache.delete(&k);
                    }
                    assert!(cache.statistics().total_size_bytes <= 8192);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let report = cache.audit();
    assert!(report.is_consistent(), "{report}");
}

#[test]
fn concurrent_gets_on_one_key_are_serialized() {
    let threshold = 4;
    let cache = Arc::new(
        CacheHierarchy::new(CacheConfig {
            promotion_access_threshold: threshold,
            ..config(64 * 1024, EvictionStrategy::Lru)
        })
        .unwrap(),
    );
    cache.set(b"shared", b"v".to_vec(), SetOptions::default()).unwrap();
    let slowest = cache.tier_of(b"shared").unwrap();

    let threads = 8;
    let gets_per_thread = 50;
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cache = cache.clone();
            thread::spawn(move || {
                let mut last = usize::MAX;
                for _ in 0..gets_per_thread {
                    assert_eq!(cache.get(b"shared"), Some(b"v".to_vec()));
                    let tier = cache.tier_of(b"shared").unwrap();
                    assert!(tier <= last);
                    last = tier;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = (threads * gets_per_thread) as u64;
    assert_eq!(cache.access_count(b"shared"), Some(total));
    let report = cache.audit();
    assert!(report.is_consistent(), "{report}");

    let stats = cache.statistics();
    assert_eq!(stats.hit_count, total);
    assert!(stats.promotion_count <= total / (threshold + 1));
    // One tier per promotion: climbing from the slowest tier to L1 takes
    // exactly `slowest` promotions, however the gets interleave.
    assert_eq!(stats.promotion_count, slowest as u64);
    assert_eq!(cache.tier_of(b"shared"), Some(0));
}

// =============================================================================
// Delete, TTL and tags
// =============================================================================

#[test]
fn delete_is_idempotent() {
    let cache = CacheHierarchy::new(config(1024, EvictionStrategy::Lru)).unwrap();
    cache.set(b"k", b"v".to_vec(), SetOptions::default()).unwrap();

    assert!(cache.delete(b"k"));
    assert!(!cache.delete(b"k"));
    assert_eq!(cache.get(b"k"), None);
}

#[test]
fn ttl_expires_without_a_sweep() {
    let cache = CacheHierarchy::new(config(1024, EvictionStrategy::Lru)).unwrap();
    cache
        .set(b"k", b"v".to_vec(), SetOptions::with_ttl(Duration::from_secs(1)))
        .unwrap();

    assert_eq!(cache.get(b"k"), Some(b"v".to_vec()));
    thread::sleep(Duration::from_millis(1100));
    assert_eq!(cache.get(b"k"), None);
    assert_eq!(cache.statistics().expired_count, 1);
}

#[test]
fn tag_invalidation_removes_every_tagged_entry() {
    let cache = CacheHierarchy::new(config(1024, EvictionStrategy::Lru)).unwrap();
    cache.set(b"a", b"1".to_vec(), SetOptions::default().tag("x")).unwrap();
    cache
        .set(b"b", b"2".to_vec(), SetOptions::default().tags(["x", "y"]))
        .unwrap();
    cache.set(b"c", b"3".to_vec(), SetOptions::default().tag("y")).unwrap();

    assert_eq!(cache.invalidate_by_tags(["x"]), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.contains(b"c"));
    assert!(!cache.contains(b"a"));
    assert!(!cache.contains(b"b"));
}

// =============================================================================
// Promotion and hit ratio
// =============================================================================

#[test]
fn hot_entry_climbs_one_tier_at_a_time() {
    let threshold = 10;
    let cache = CacheHierarchy::new(CacheConfig {
        promotion_access_threshold: threshold,
        ..config(1024, EvictionStrategy::Lru)
    })
    .unwrap();
    cache.set(b"hot", b"v".to_vec(), SetOptions::default()).unwrap();
    let slowest = cache.tier_count() - 1;
    assert_eq!(cache.tier_of(b"hot"), Some(slowest));

    let mut previous = slowest;
    for _ in 0..=threshold {
        cache.get(b"hot");
        let tier = cache.tier_of(b"hot").unwrap();
        assert!(previous - tier <= 1, "jumped from {previous} to {tier}");
        previous = tier;
    }
    assert!(previous < slowest);

    let mut seen = HashSet::new();
    for _ in 0..(threshold as usize + 1) * 4 {
        cache.get(b"hot");
        let tier = cache.tier_of(b"hot").unwrap();
        assert!(previous - tier <= 1);
        previous = tier;
        seen.insert(tier);
    }
    assert_eq!(previous, 0);
    assert!(seen.contains(&0));
}

#[test]
fn hit_ratio_never_drops_on_repeated_hits() {
    let cache = CacheHierarchy::new(config(1024, EvictionStrategy::Lru)).unwrap();
    assert_eq!(cache.statistics().hit_ratio, 0.0);

    cache.set(b"k", b"v".to_vec(), SetOptions::default()).unwrap();
    cache.get(b"k");
    let first = cache.statistics().hit_ratio;

    for _ in 0..20 {
        cache.get(b"k");
        let ratio = cache.statistics().hit_ratio;
        assert!(ratio >= first);
    }

    let stats = cache.statistics();
    assert_eq!(stats.total_requests, 21);
    assert_eq!(stats.hit_ratio, 1.0);
}

// =============================================================================
// Eviction
// =============================================================================

#[test]
fn overfilling_never_leaves_cache_over_budget() {
    for strategy in EvictionStrategy::ALL {
        let cache = CacheHierarchy::new(config(2000, strategy)).unwrap();
        for i in 0..50 {
            let ttl = Duration::from_secs(60 + i as u64);
            cache.set(&key(i), vec![0; 150], SetOptions::with_ttl(ttl)).unwrap();
            assert!(cache.statistics().total_size_bytes <= 2000);
        }
        assert!(cache.contains(&key(49)), "{strategy} evicted the newest entry");
    }
}

#[test]
fn lru_scenario_evicts_two_oldest() {
    let cache = CacheHierarchy::new(CacheConfig {
        max_memory_bytes: 1024,
        eviction_strategy: EvictionStrategy::Lru,
        ..Default::default()
    })
    .unwrap();

    for i in 1..=5 {
        cache.set(&key(i), vec![b'x'; 300], SetOptions::default()).unwrap();
    }

    assert!(!cache.contains(&key(1)));
    assert!(!cache.contains(&key(2)));
    for i in 3..=5 {
        assert!(cache.contains(&key(i)));
    }
    let stats = cache.statistics();
    assert_eq!(stats.eviction_count, 2);
    assert_eq!(stats.total_size_bytes, 900);
}

#[test]
fn payload_larger_than_budget_is_rejected() {
    let cache = CacheHierarchy::new(config(1024, EvictionStrategy::Lru)).unwrap();
    cache.set(b"small", vec![0; 100], SetOptions::default()).unwrap();

    let err = cache.set(b"huge", vec![0; 2048], SetOptions::default()).unwrap_err();
    assert!(matches!(err, CacheError::CapacityExceeded { requested: 2048, budget: 1024 }));
    // Nothing was evicted for a payload that could never fit.
    assert!(cache.contains(b"small"));
    assert_eq!(cache.statistics().eviction_count, 0);
}

// =============================================================================
// Memory pressure
// =============================================================================

#[test]
fn critical_pressure_clears_free_lists_and_switches_to_fifo() {
    let probe = Arc::new(SimulatedMemoryProbe::new(0.10));
    let engine = CacheEngine::with_probe(CacheConfig::default(), probe.clone()).unwrap();

    let ids: Vec<_> = (0..8)
        .map(|i| engine.allocate_memory(100 * (i + 1), "buffer").unwrap())
        .collect();
    for id in ids {
        assert!(engine.deallocate_memory(id));
    }
    assert!(engine.get_memory_statistics().pooled_blocks > 0);

    probe.set(0.95);
    let report = engine.pressure_controller().check();

    assert_eq!(report.level, PressureLevel::Critical);
    let stats = engine.get_memory_statistics();
    assert_eq!(stats.pooled_blocks, 0);
    assert_eq!(stats.pooled_bytes, 0);
    assert_eq!(engine.get_statistics().strategy, EvictionStrategy::Fifo);
}

#[test]
fn pinned_allocations_survive_critical_pressure() {
    let probe = Arc::new(SimulatedMemoryProbe::new(0.95));
    let engine = CacheEngine::with_probe(CacheConfig::default(), probe).unwrap();

    let pinned = engine.allocate_pinned_memory(512, "index").unwrap();
    let unpinned = engine.allocate_memory(512, "scratch").unwrap();
    engine.allocator().release(unpinned);

    engine.tick();

    assert!(engine.allocator().allocation(pinned).is_some());
    assert!(engine.allocator().allocation(unpinned).is_none());
}
