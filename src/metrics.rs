// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the tiered cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `tiered_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for sizes
//!
//! # Labels
//! - `tier`: L1, L2, ... (or `all` for a full miss)
//! - `operation`: get, set, delete, invalidate
//! - `status`: hit, miss, success, rejected, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::compression::CompressionStats;

/// Human-readable tier label ("L1" is the fastest tier).
#[must_use]
pub fn tier_label(tier: usize) -> String {
    format!("L{}", tier + 1)
}

/// Record a cache operation outcome
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "tiered_cache_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "tiered_cache_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record eviction event
pub fn record_eviction(strategy: &str, count: usize, bytes: usize) {
    counter!("tiered_cache_evictions_total", "strategy" => strategy.to_string())
        .increment(count as u64);
    counter!("tiered_cache_evicted_bytes_total").increment(bytes as u64);
}

/// Record entries removed by TTL expiry (lazy or swept)
pub fn record_expired(count: usize) {
    counter!("tiered_cache_expired_total").increment(count as u64);
}

/// Record an entry moving up one tier
pub fn record_promotion(from_tier: usize, to_tier: usize) {
    counter!(
        "tiered_cache_promotions_total",
        "from" => tier_label(from_tier),
        "to" => tier_label(to_tier)
    )
    .increment(1);
}

/// Record entries removed by tag invalidation
pub fn record_invalidation(count: usize) {
    counter!("tiered_cache_invalidated_total").increment(count as u64);
}

/// Record a set rejected because no room could be made
pub fn record_capacity_rejection(bytes: usize) {
    counter!("tiered_cache_capacity_rejections_total").increment(1);
    histogram!("tiered_cache_rejected_bytes").record(bytes as f64);
}

/// Record a compressed payload
pub fn record_compression(stats: CompressionStats) {
    counter!("tiered_cache_compressed_payloads_total").increment(1);
    histogram!("tiered_cache_compression_ratio").record(stats.ratio);
}

/// Set current cache size in bytes
pub fn set_cache_bytes(bytes: usize) {
    gauge!("tiered_cache_bytes").set(bytes as f64);
}

/// Set current cache item count
pub fn set_cache_items(count: usize) {
    gauge!("tiered_cache_items").set(count as f64);
}

/// Set per-tier item count and size
pub fn set_tier_usage(tier: usize, items: usize, bytes: usize) {
    gauge!("tiered_cache_tier_items", "tier" => tier_label(tier)).set(items as f64);
    gauge!("tiered_cache_tier_bytes", "tier" => tier_label(tier)).set(bytes as f64);
}

/// Set current hit ratio (0.0 - 1.0)
pub fn set_hit_ratio(ratio: f64) {
    gauge!("tiered_cache_hit_ratio").set(ratio);
}

/// Set active eviction strategy (numeric representation)
pub fn set_eviction_strategy(strategy: u8) {
    gauge!("tiered_cache_eviction_strategy").set(strategy as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// MEMORY - Allocator and pressure
// ═══════════════════════════════════════════════════════════════════════════

/// Record an allocation and whether it came from a free list
pub fn record_allocation(class_bytes: usize, pooled: bool) {
    let source = if pooled { "pool" } else { "fresh" };
    counter!("tiered_cache_allocations_total", "source" => source).increment(1);
    histogram!("tiered_cache_allocation_bytes").record(class_bytes as f64);
}

/// Record an allocation that could not be satisfied
pub fn record_allocation_failure(requested: usize) {
    counter!("tiered_cache_allocation_failures_total").increment(1);
    histogram!("tiered_cache_failed_allocation_bytes").record(requested as f64);
}

/// Record allocations reclaimed by a pressure pass
pub fn record_reclaim(count: usize, bytes: usize) {
    counter!("tiered_cache_reclaimed_allocations_total").increment(count as u64);
    counter!("tiered_cache_reclaimed_bytes_total").increment(bytes as u64);
}

/// Set allocator in-use and pooled bytes
pub fn set_allocator_bytes(in_use: usize, pooled: usize) {
    gauge!("tiered_cache_allocator_in_use_bytes").set(in_use as f64);
    gauge!("tiered_cache_allocator_pooled_bytes").set(pooled as f64);
}

/// Set system memory utilization (0.0 - 1.0)
pub fn set_memory_pressure(utilization: f64) {
    gauge!("tiered_cache_memory_pressure").set(utilization);
}

/// Set pressure level (0 = Low, 1 = Moderate, 2 = High, 3 = Critical)
pub fn set_pressure_level(level: u8) {
    gauge!("tiered_cache_pressure_level").set(level as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// BACKGROUND JOBS
// ═══════════════════════════════════════════════════════════════════════════

/// Record a background job run
pub fn record_background_job(job: &str, status: &str, duration: Duration) {
    counter!(
        "tiered_cache_background_jobs_total",
        "job" => job.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("tiered_cache_background_job_seconds", "job" => job.to_string())
        .record(duration.as_secs_f64());
}

/// Record patterns detected by an analysis run
pub fn record_patterns(kind: &str, count: usize) {
    counter!("tiered_cache_patterns_detected_total", "kind" => kind.to_string())
        .increment(count as u64);
}

/// Record recommendations applied to resident entries
pub fn record_recommendations_applied(count: usize) {
    counter!("tiered_cache_recommendations_applied_total").increment(count as u64);
}

/// Record an index/tier inconsistency that was healed
pub fn record_inconsistency(kind: &str) {
    counter!("tiered_cache_inconsistencies_total", "kind" => kind.to_string()).increment(1);
}

/// Set engine state (for monitoring state machine transitions)
pub fn set_engine_state(state: &str) {
    counter!(
        "tiered_cache_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}

/// Convenience macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($tier:expr, $op:expr) => {
        $crate::metrics::LatencyTimer::new($tier, $op)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these only verify the calls don't panic.

    #[test]
    fn test_tier_label() {
        assert_eq!(tier_label(0), "L1");
        assert_eq!(tier_label(3), "L4");
    }

    #[test]
    fn test_cache_metrics() {
        record_operation("L1", "get", "hit");
        record_operation("all", "get", "miss");
        record_latency("L2", "set", Duration::from_micros(40));
        record_eviction("lru", 3, 900);
        record_expired(2);
        record_promotion(3, 2);
        record_invalidation(5);
        record_capacity_rejection(4096);
        record_compression(CompressionStats::new(4096, 512));
    }

    #[test]
    fn test_gauges() {
        set_cache_bytes(1024 * 1024);
        set_cache_items(5000);
        set_tier_usage(0, 10, 4096);
        set_hit_ratio(0.8);
        set_eviction_strategy(2);
        set_memory_pressure(0.75);
        set_pressure_level(1);
        set_allocator_bytes(2048, 1024);
    }

    #[test]
    fn test_memory_metrics() {
        record_allocation(256, true);
        record_allocation(1024, false);
        record_allocation_failure(1 << 40);
        record_reclaim(4, 4096);
    }

    #[test]
    fn test_background_metrics() {
        record_background_job("expiry_sweep", "success", Duration::from_millis(3));
        record_background_job("predictor_retrain", "skipped", Duration::ZERO);
        record_patterns("frequency", 2);
        record_recommendations_applied(7);
        record_inconsistency("missing_arena_slot");
        set_engine_state("Running");
    }

    #[test]
    fn test_latency_timer() {
        {
            let _timer = time_operation!("L1", "get");
            std::thread::sleep(Duration::from_micros(10));
        }
        // Timer recorded on drop
    }
}
