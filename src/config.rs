// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the tiered cache.
//!
//! # Example
//!
//! ```
//! use tiered_cache::{CacheConfig, EvictionStrategy};
//!
//! // Minimal config (uses defaults)
//! let config = CacheConfig::default();
//! assert_eq!(config.max_memory_bytes, 256 * 1024 * 1024); // 256 MB
//! assert!(config.validate().is_ok());
//!
//! // Tuned config
//! let config = CacheConfig {
//!     max_memory_bytes: 64 * 1024 * 1024,
//!     eviction_strategy: EvictionStrategy::Lru,
//!     promotion_access_threshold: 5,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::CacheError;
use crate::eviction::EvictionStrategy;

/// Configuration for the cache hierarchy and its background jobs.
///
/// All fields have defaults, so a partial JSON/TOML document deserializes.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of resident entries
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Global byte budget across all tiers (default: 256 MB)
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: usize,

    /// TTL applied when `set` is called without one. `None` = no expiry.
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,

    /// Payloads larger than this are zstd-compressed
    #[serde(default = "default_compression_threshold_bytes")]
    pub compression_threshold_bytes: usize,

    /// Baseline eviction strategy (the pressure controller may override it)
    #[serde(default)]
    pub eviction_strategy: EvictionStrategy,

    /// Hits since the last promotion before an entry moves up one tier
    #[serde(default = "default_promotion_access_threshold")]
    pub promotion_access_threshold: u64,

    /// Number of tiers, fastest first
    #[serde(default = "default_tier_count")]
    pub tier_count: usize,

    /// Share of resident entries removed per LRU/LFU/FIFO/TTL eviction round
    #[serde(default = "default_eviction_fraction")]
    pub eviction_fraction: f64,

    /// Adaptive score weights: (predicted probability, access count, priority)
    #[serde(default = "default_adaptive_weights")]
    pub adaptive_weights: (f64, f64, f64),

    /// Expired-entry sweep interval
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Pattern analysis interval
    #[serde(default = "default_pattern_analysis_interval_secs")]
    pub pattern_analysis_interval_secs: u64,

    /// Predictor retraining interval
    #[serde(default = "default_predictor_retrain_interval_secs")]
    pub predictor_retrain_interval_secs: u64,

    /// Memory pressure sampling interval
    #[serde(default = "default_pressure_check_interval_secs")]
    pub pressure_check_interval_secs: u64,

    /// Access log ring buffer capacity
    #[serde(default = "default_access_log_capacity")]
    pub access_log_capacity: usize,

    /// Predictor training gates
    #[serde(default = "default_predictor_min_records")]
    pub predictor_min_records: usize,
    #[serde(default = "default_predictor_min_key_records")]
    pub predictor_min_key_records: usize,
    #[serde(default = "default_predictor_retrain_min_new_records")]
    pub predictor_retrain_min_new_records: u64,

    /// Prediction horizon used to turn time-to-next-access into a score
    #[serde(default = "default_predictor_horizon_secs")]
    pub predictor_horizon_secs: u64,

    /// Pattern analyzer thresholds
    #[serde(default = "default_pattern_min_records")]
    pub pattern_min_records: usize,
    #[serde(default = "default_frequency_share_threshold")]
    pub frequency_share_threshold: f64,
    #[serde(default = "default_spatial_share_threshold")]
    pub spatial_share_threshold: f64,
    #[serde(default = "default_temporal_share_factor")]
    pub temporal_share_factor: f64,

    /// Multiplier applied to a TTL by an `increase_ttl` recommendation
    #[serde(default = "default_ttl_extension_factor")]
    pub ttl_extension_factor: f64,

    /// Ceiling for TTLs grown by repeated extension
    #[serde(default = "default_max_ttl_secs")]
    pub max_ttl_secs: u64,

    /// Memory allocator settings
    #[serde(default)]
    pub allocator: AllocatorConfig,
}

/// Settings for the size-class memory allocator.
#[derive(Debug, Clone, Deserialize)]
pub struct AllocatorConfig {
    /// Smallest size class (rounded up to a power of two)
    #[serde(default = "default_min_class_bytes")]
    pub min_class_bytes: usize,

    /// Free blocks retained per size class at low pressure
    #[serde(default = "default_max_free_per_class")]
    pub max_free_per_class: usize,

    /// Hard cap on reserved bytes. `None` = limited only by the system.
    #[serde(default)]
    pub limit_bytes: Option<usize>,

    /// Unpinned allocations untouched for longer than this are reclaimed at high pressure
    #[serde(default = "default_idle_reclaim_secs")]
    pub idle_reclaim_secs: u64,
}

fn default_max_entries() -> usize { 100_000 }
fn default_max_memory_bytes() -> usize { 256 * 1024 * 1024 } // 256 MB
fn default_compression_threshold_bytes() -> usize { 1024 }
fn default_promotion_access_threshold() -> u64 { 10 }
fn default_tier_count() -> usize { 4 }
fn default_eviction_fraction() -> f64 { 0.10 }
fn default_adaptive_weights() -> (f64, f64, f64) { (0.4, 0.3, 0.3) }
fn default_cleanup_interval_secs() -> u64 { 300 }
fn default_pattern_analysis_interval_secs() -> u64 { 600 }
fn default_predictor_retrain_interval_secs() -> u64 { 1800 }
fn default_pressure_check_interval_secs() -> u64 { 30 }
fn default_access_log_capacity() -> usize { 10_000 }
fn default_predictor_min_records() -> usize { 100 }
fn default_predictor_min_key_records() -> usize { 10 }
fn default_predictor_retrain_min_new_records() -> u64 { 1000 }
fn default_predictor_horizon_secs() -> u64 { 300 }
fn default_pattern_min_records() -> usize { 50 }
fn default_frequency_share_threshold() -> f64 { 0.05 }
fn default_spatial_share_threshold() -> f64 { 0.20 }
fn default_temporal_share_factor() -> f64 { 2.0 }
fn default_ttl_extension_factor() -> f64 { 1.5 }
fn default_max_ttl_secs() -> u64 { 7 * 24 * 3600 }
fn default_min_class_bytes() -> usize { 64 }
fn default_max_free_per_class() -> usize { 64 }
fn default_idle_reclaim_secs() -> u64 { 3600 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_memory_bytes: default_max_memory_bytes(),
            default_ttl_secs: None,
            compression_threshold_bytes: default_compression_threshold_bytes(),
            eviction_strategy: EvictionStrategy::default(),
            promotion_access_threshold: default_promotion_access_threshold(),
            tier_count: default_tier_count(),
            eviction_fraction: default_eviction_fraction(),
            adaptive_weights: default_adaptive_weights(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            pattern_analysis_interval_secs: default_pattern_analysis_interval_secs(),
            predictor_retrain_interval_secs: default_predictor_retrain_interval_secs(),
            pressure_check_interval_secs: default_pressure_check_interval_secs(),
            access_log_capacity: default_access_log_capacity(),
            predictor_min_records: default_predictor_min_records(),
            predictor_min_key_records: default_predictor_min_key_records(),
            predictor_retrain_min_new_records: default_predictor_retrain_min_new_records(),
            predictor_horizon_secs: default_predictor_horizon_secs(),
            pattern_min_records: default_pattern_min_records(),
            frequency_share_threshold: default_frequency_share_threshold(),
            spatial_share_threshold: default_spatial_share_threshold(),
            temporal_share_factor: default_temporal_share_factor(),
            ttl_extension_factor: default_ttl_extension_factor(),
            max_ttl_secs: default_max_ttl_secs(),
            allocator: AllocatorConfig::default(),
        }
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            min_class_bytes: default_min_class_bytes(),
            max_free_per_class: default_max_free_per_class(),
            limit_bytes: None,
            idle_reclaim_secs: default_idle_reclaim_secs(),
        }
    }
}

impl CacheConfig {
    /// Reject settings the cache cannot operate with.
    pub fn validate(&self) -> Result<(), CacheError> {
        let invalid = |msg: &str| Err(CacheError::InvalidConfiguration(msg.to_string()));

        if self.promotion_access_threshold == 0 {
            return invalid("promotion_access_threshold must be > 0");
        }
        if self.tier_count == 0 {
            return invalid("tier_count must be > 0");
        }
        if self.max_memory_bytes == 0 {
            return invalid("max_memory_bytes must be > 0");
        }
        if self.max_entries == 0 {
            return invalid("max_entries must be > 0");
        }
        if !(self.eviction_fraction > 0.0 && self.eviction_fraction <= 1.0) {
            return invalid("eviction_fraction must be in (0, 1]");
        }
        let (w_prob, w_count, w_prio) = self.adaptive_weights;
        if w_prob < 0.0 || w_count < 0.0 || w_prio < 0.0 || w_prob + w_count + w_prio <= 0.0 {
            return invalid("adaptive_weights must be non-negative and not all zero");
        }
        if self.access_log_capacity == 0 {
            return invalid("access_log_capacity must be > 0");
        }
        if self.predictor_min_key_records == 0 {
            return invalid("predictor_min_key_records must be > 0");
        }
        if self.predictor_horizon_secs == 0 {
            return invalid("predictor_horizon_secs must be > 0");
        }
        if !(self.frequency_share_threshold > 0.0 && self.frequency_share_threshold < 1.0) {
            return invalid("frequency_share_threshold must be in (0, 1)");
        }
        if !(self.spatial_share_threshold > 0.0 && self.spatial_share_threshold < 1.0) {
            return invalid("spatial_share_threshold must be in (0, 1)");
        }
        if self.temporal_share_factor <= 1.0 {
            return invalid("temporal_share_factor must be > 1");
        }
        if !self.ttl_extension_factor.is_finite() || self.ttl_extension_factor < 1.0 {
            return invalid("ttl_extension_factor must be finite and >= 1");
        }
        if self.max_ttl_secs == 0 {
            return invalid("max_ttl_secs must be > 0");
        }
        for (name, secs) in [
            ("cleanup_interval_secs", self.cleanup_interval_secs),
            ("pattern_analysis_interval_secs", self.pattern_analysis_interval_secs),
            ("predictor_retrain_interval_secs", self.predictor_retrain_interval_secs),
            ("pressure_check_interval_secs", self.pressure_check_interval_secs),
        ] {
            if secs == 0 {
                return Err(CacheError::InvalidConfiguration(format!("{name} must be > 0")));
            }
        }
        if self.allocator.min_class_bytes == 0 {
            return invalid("allocator.min_class_bytes must be > 0");
        }
        Ok(())
    }

    #[must_use]
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    #[must_use]
    pub fn pattern_analysis_interval(&self) -> Duration {
        Duration::from_secs(self.pattern_analysis_interval_secs)
    }

    #[must_use]
    pub fn predictor_retrain_interval(&self) -> Duration {
        Duration::from_secs(self.predictor_retrain_interval_secs)
    }

    #[must_use]
    pub fn pressure_check_interval(&self) -> Duration {
        Duration::from_secs(self.pressure_check_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tier_count, 4);
        assert_eq!(config.promotion_access_threshold, 10);
        assert_eq!(config.eviction_strategy, EvictionStrategy::Adaptive);
        assert_eq!(config.default_ttl(), None);
    }

    #[test]
    fn test_zero_promotion_threshold_rejected() {
        let config = CacheConfig {
            promotion_access_threshold: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfiguration(msg) if msg.contains("promotion_access_threshold")));
    }

    #[test]
    fn test_bad_eviction_fraction_rejected() {
        for fraction in [0.0, -0.5, 1.5, f64::NAN] {
            let config = CacheConfig {
                eviction_fraction: fraction,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "fraction {fraction} should be rejected");
        }
    }

    #[test]
    fn test_non_finite_ttl_extension_rejected() {
        for factor in [f64::INFINITY, f64::NAN, 0.5] {
            let config = CacheConfig {
                ttl_extension_factor: factor,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "factor {factor} should be rejected");
        }
        let config = CacheConfig {
            max_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = CacheConfig {
            cleanup_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CacheConfig = serde_json::from_str(
            r#"{"max_memory_bytes": 1024, "eviction_strategy": "lru", "default_ttl_secs": 60}"#,
        )
        .unwrap();

        assert_eq!(config.max_memory_bytes, 1024);
        assert_eq!(config.eviction_strategy, EvictionStrategy::Lru);
        assert_eq!(config.default_ttl(), Some(Duration::from_secs(60)));
        assert_eq!(config.max_entries, 100_000);
        assert_eq!(config.allocator.min_class_bytes, 64);
    }

    #[test]
    fn test_unknown_strategy_fails_to_deserialize() {
        let result: Result<CacheConfig, _> =
            serde_json::from_str(r#"{"eviction_strategy": "random"}"#);
        assert!(result.is_err());
    }
}
