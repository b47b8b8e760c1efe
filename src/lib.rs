// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Tiered Cache
//!
//! An in-process, multi-tier cache that learns from its own access history.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CacheEngine                          │
//! │  • cache_get / cache_set / cache_delete / invalidate tags  │
//! │  • allocate / deallocate tracked memory                    │
//! │  • background loops: expiry, analysis, training, pressure  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Cache Hierarchy                        │
//! │  • Tiers L1 (fastest) → L4 holding entry ids               │
//! │  • Predictor-driven placement, hit-driven promotion        │
//! │  • LRU / LFU / Adaptive / FIFO / TTL eviction              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   (every get/set/delete logged)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Access Log → Predictor / Pattern Analyzer        │
//! │  • Ring buffer of recent accesses                          │
//! │  • Per-key inter-arrival and hour-of-day profiles          │
//! │  • Temporal, frequency and spatial pattern detection       │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Memory Allocator ◄── Memory Pressure Controller      │
//! │  • Power-of-two size classes with free lists               │
//! │  • Low / Moderate / High / Critical reclamation cascade    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use tiered_cache::{CacheConfig, CacheHierarchy, SetOptions};
//!
//! let cache = CacheHierarchy::new(CacheConfig::default()).unwrap();
//!
//! cache
//!     .set(b"session:42", b"token".to_vec(), SetOptions::with_ttl(Duration::from_secs(60)))
//!     .unwrap();
//! assert_eq!(cache.get(b"session:42"), Some(b"token".to_vec()));
//!
//! let stats = cache.statistics();
//! assert_eq!(stats.hit_count, 1);
//! assert_eq!(stats.hit_ratio, 1.0);
//! ```
//!
//! ## Configuration
//!
//! See [`CacheConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`CacheEngine`] facade and its background loops
//! - [`hierarchy`]: Entries, tiers, placement, promotion, eviction and expiry
//! - [`eviction`]: Strategies and victim ordering
//! - [`predictor`]: Access-probability model trained on the access log
//! - [`analyzer`]: Pattern detection and recommendations
//! - [`memory`]: Size-class allocator and memory probes
//! - [`pressure`]: Memory pressure handling

pub mod access_log;
pub mod analyzer;
pub mod compression;
pub mod config;
pub mod coordinator;
pub mod entry;
pub mod error;
pub mod eviction;
pub mod hierarchy;
pub mod memory;
pub mod metrics;
pub mod predictor;
pub mod pressure;
pub mod set_options;

pub use access_log::{AccessLog, AccessOperation, AccessRecord};
pub use analyzer::{AnalyzerSettings, CachePattern, PatternAnalyzer, PatternKind, Recommendation};
pub use config::{AllocatorConfig, CacheConfig};
pub use coordinator::{CacheEngine, EngineState, MaintenanceReport};
pub use entry::{CacheEntry, EntryId};
pub use error::CacheError;
pub use eviction::{EvictionPolicy, EvictionStrategy};
pub use hierarchy::{AuditReport, CacheHierarchy, CacheMetrics, TierStats};
pub use memory::{
    AllocationId, MemoryAllocation, MemoryAllocator, MemoryProbe, MemoryStats, ReclaimPolicy,
    SimulatedMemoryProbe, SystemMemoryProbe,
};
pub use metrics::LatencyTimer;
pub use predictor::{AccessPredictor, NeutralPredictor, Predictor, PredictorError, TrainingSummary};
pub use pressure::{PressureController, PressureLevel, PressureReport, StrategyTarget};
pub use set_options::{CacheTtl, SetOptions};
