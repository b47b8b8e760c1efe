// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache engine coordinator.
//!
//! The [`CacheEngine`] is the application-facing facade that ties together
//! all components:
//! - the cache hierarchy (entries, tiers, eviction, expiry)
//! - the size-class memory allocator
//! - the access predictor and pattern analyzer
//! - the memory pressure controller
//!
//! # Lifecycle
//!
//! ```text
//! Created → Running → ShuttingDown → Stopped
//! ```
//!
//! Foreground calls work in every state. `start()` only spawns the
//! background maintenance loop.
//!
//! # Example
//!
//! ```rust,no_run
//! use tiered_cache::{CacheConfig, CacheEngine, EngineState, SetOptions};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = CacheEngine::new(CacheConfig::default()).unwrap();
//! assert_eq!(engine.state(), EngineState::Created);
//!
//! engine.start().unwrap();
//! engine.cache_set(b"greeting", b"hello".to_vec(), SetOptions::default()).unwrap();
//! assert_eq!(engine.cache_get(b"greeting"), Some(b"hello".to_vec()));
//!
//! engine.shutdown().await;
//! assert_eq!(engine.state(), EngineState::Stopped);
//! # }
//! ```

mod lifecycle;
mod types;

pub use types::{EngineState, MaintenanceReport};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::access_log::AccessLog;
use crate::analyzer::{AnalyzerSettings, CachePattern, PatternAnalyzer};
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::hierarchy::{CacheHierarchy, CacheMetrics};
use crate::memory::{AllocationId, MemoryAllocator, MemoryProbe, MemoryStats, SystemMemoryProbe};
use crate::predictor::{AccessPredictor, PredictorSettings};
use crate::pressure::{PressureController, PressureLevel};
use crate::set_options::SetOptions;

use lifecycle::Maintenance;

/// Main cache engine.
///
/// `Send + Sync`; every foreground method takes `&self`.
pub struct CacheEngine {
    jobs: Maintenance,
    allocator: Arc<MemoryAllocator>,
    state: watch::Sender<EngineState>,
    state_rx: watch::Receiver<EngineState>,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CacheEngine {
    /// Create an engine that samples real system memory.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        Self::with_probe(config, Arc::new(SystemMemoryProbe::new()))
    }

    /// Create an engine with a custom memory probe.
    pub fn with_probe(config: CacheConfig, probe: Arc<dyn MemoryProbe>) -> Result<Self, CacheError> {
        config.validate()?;

        let access_log = Arc::new(AccessLog::new(config.access_log_capacity));
        let predictor = Arc::new(AccessPredictor::new(PredictorSettings::from(&config)));
        let hierarchy = Arc::new(CacheHierarchy::with_components(
            config.clone(),
            access_log.clone(),
            predictor.clone(),
        )?);
        let analyzer = Arc::new(PatternAnalyzer::new(AnalyzerSettings::from(&config)));
        let allocator = Arc::new(MemoryAllocator::new(config.allocator.clone()));
        let pressure = Arc::new(PressureController::new(
            allocator.clone(),
            probe,
            hierarchy.clone(),
            config.eviction_strategy,
        ));

        let (state, state_rx) = watch::channel(EngineState::Created);
        let (stop, _) = watch::channel(false);
        crate::metrics::set_engine_state(EngineState::Created.as_str());
        info!(
            max_bytes = config.max_memory_bytes,
            max_entries = config.max_entries,
            tiers = config.tier_count,
            "Cache engine created"
        );

        Ok(Self {
            jobs: Maintenance {
                config,
                hierarchy,
                access_log,
                predictor,
                analyzer,
                pressure,
            },
            allocator,
            state,
            state_rx,
            stop,
            task: Mutex::new(None),
        })
    }

    // --- State ---

    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    fn set_state(&self, state: EngineState) {
        self.state.send_replace(state);
        crate::metrics::set_engine_state(state.as_str());
    }

    // --- Cache API ---

    /// Look up `key`. A miss (absent or expired) is `None`.
    pub fn cache_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.jobs.hierarchy.get(key)
    }

    pub fn cache_set(&self, key: &[u8], value: Vec<u8>, options: SetOptions) -> Result<(), CacheError> {
        self.jobs.hierarchy.set(key, value, options)
    }

    pub fn cache_delete(&self, key: &[u8]) -> bool {
        self.jobs.hierarchy.delete(key)
    }

    /// Remove every entry carrying any of `tags`. Returns the count removed.
    pub fn cache_invalidate_tags<I, S>(&self, tags: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.jobs.hierarchy.invalidate_by_tags(tags)
    }

    #[must_use]
    pub fn get_statistics(&self) -> CacheMetrics {
        self.jobs.hierarchy.statistics()
    }

    // --- Memory API ---

    pub fn allocate_memory(&self, size: usize, object_type: &str) -> Result<AllocationId, CacheError> {
        self.allocator.allocate(size, object_type, false)
    }

    /// Allocate memory the pressure controller will never reclaim.
    pub fn allocate_pinned_memory(
        &self,
        size: usize,
        object_type: &str,
    ) -> Result<AllocationId, CacheError> {
        self.allocator.allocate(size, object_type, true)
    }

    pub fn deallocate_memory(&self, id: AllocationId) -> bool {
        self.allocator.deallocate(id)
    }

    #[must_use]
    pub fn get_memory_statistics(&self) -> MemoryStats {
        self.allocator.stats()
    }

    // --- Analysis and pressure ---

    /// Patterns from the most recent analysis run.
    #[must_use]
    pub fn latest_patterns(&self) -> Vec<CachePattern> {
        self.jobs.analyzer.latest()
    }

    #[must_use]
    pub fn pressure_level(&self) -> PressureLevel {
        self.jobs.pressure.level()
    }

    /// Run every maintenance job once on the calling thread, ignoring the
    /// intervals. Useful without a runtime and in tests.
    pub fn tick(&self) -> MaintenanceReport {
        let expired = self.jobs.sweep_expired();
        let (patterns, recommendations_applied) = self.jobs.analyze_patterns();
        let training = match self.jobs.retrain_predictor() {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Predictor training failed, keeping current model");
                None
            }
        };
        let pressure = self.jobs.check_pressure();
        MaintenanceReport {
            expired,
            patterns,
            recommendations_applied,
            training,
            pressure,
        }
    }

    // --- Components ---

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.jobs.config
    }

    #[must_use]
    pub fn hierarchy(&self) -> &Arc<CacheHierarchy> {
        &self.jobs.hierarchy
    }

    #[must_use]
    pub fn allocator(&self) -> &Arc<MemoryAllocator> {
        &self.allocator
    }

    #[must_use]
    pub fn predictor(&self) -> &Arc<AccessPredictor> {
        &self.jobs.predictor
    }

    #[must_use]
    pub fn analyzer(&self) -> &Arc<PatternAnalyzer> {
        &self.jobs.analyzer
    }

    #[must_use]
    pub fn pressure_controller(&self) -> &Arc<PressureController> {
        &self.jobs.pressure
    }

    #[must_use]
    pub fn access_log(&self) -> &Arc<AccessLog> {
        &self.jobs.access_log
    }
}
