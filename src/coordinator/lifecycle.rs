// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine lifecycle: start, shutdown and the background run loop.
//!
//! Four jobs run on independent intervals:
//!
//! | Job | Interval | Work |
//! |---|---|---|
//! | expiry sweep | `cleanup_interval_secs` | drop expired entries |
//! | pattern analysis | `pattern_analysis_interval_secs` | analyze the log, apply recommendations |
//! | predictor training | `predictor_retrain_interval_secs` | retrain once enough new records arrived |
//! | pressure check | `pressure_check_interval_secs` | sample memory, escalate reclamation |
//!
//! The expiry sweep, analysis and training run inside `spawn_blocking`;
//! analysis and training work on a cloned log snapshot. A failed job is
//! logged and retried on its next tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::{interval_at, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::access_log::AccessLog;
use crate::analyzer::PatternAnalyzer;
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::hierarchy::CacheHierarchy;
use crate::predictor::{AccessPredictor, PredictorError, TrainingSummary};
use crate::pressure::{PressureController, PressureReport};

use super::{CacheEngine, EngineState};

/// Handles to everything the background jobs touch. Cheap to clone.
#[derive(Clone)]
pub(super) struct Maintenance {
    pub(super) config: CacheConfig,
    pub(super) hierarchy: Arc<CacheHierarchy>,
    pub(super) access_log: Arc<AccessLog>,
    pub(super) predictor: Arc<AccessPredictor>,
    pub(super) analyzer: Arc<PatternAnalyzer>,
    pub(super) pressure: Arc<PressureController>,
}

impl Maintenance {
    pub(super) fn sweep_expired(&self) -> usize {
        self.hierarchy.sweep_expired()
    }

    /// Analyze the current log snapshot and apply the recommendations.
    /// Returns `(patterns, entries_changed)`.
    pub(super) fn analyze_patterns(&self) -> (usize, usize) {
        let records = self.access_log.snapshot();
        let patterns = self.analyzer.analyze(&records);
        let applied = self.hierarchy.apply_patterns(&patterns);
        debug!(
            records = records.len(),
            patterns = patterns.len(),
            applied,
            "Pattern analysis complete"
        );
        (patterns.len(), applied)
    }

    /// Retrain once at least `predictor_retrain_min_new_records` records
    /// arrived since the last attempt. `Ok(None)` means not enough new data.
    pub(super) fn retrain_predictor(&self) -> Result<Option<TrainingSummary>, PredictorError> {
        let total = self.access_log.total_appended();
        let fresh = self.predictor.new_records_since_training(total);
        if fresh < self.config.predictor_retrain_min_new_records {
            debug!(
                fresh,
                required = self.config.predictor_retrain_min_new_records,
                "Not enough new access records to retrain"
            );
            return Ok(None);
        }

        self.predictor.mark_training_attempt(total);
        let records = self.access_log.snapshot();
        self.predictor.train(&records).map(Some)
    }

    pub(super) fn check_pressure(&self) -> PressureReport {
        self.pressure.check()
    }
}

fn ticker(period: Duration) -> Interval {
    // First tick one period from now, not immediately.
    let mut interval = interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Run `work` on the blocking pool. A panicked job is logged, counted and
/// reported as `None`.
async fn run_blocking<T, F>(job: &'static str, work: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let start = Instant::now();
    match tokio::task::spawn_blocking(work).await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(job, error = %e, "Background job panicked or was cancelled");
            crate::metrics::record_background_job(job, "failure", start.elapsed());
            None
        }
    }
}

#[tracing::instrument(skip_all)]
async fn run(jobs: Maintenance, mut stop: watch::Receiver<bool>) {
    info!("Cache maintenance loop running");

    let mut expiry_interval = ticker(jobs.config.cleanup_interval());
    let mut analysis_interval = ticker(jobs.config.pattern_analysis_interval());
    let mut training_interval = ticker(jobs.config.predictor_retrain_interval());
    let mut pressure_interval = ticker(jobs.config.pressure_check_interval());

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }

            _ = expiry_interval.tick() => {
                let job = jobs.clone();
                let start = Instant::now();
                if let Some(removed) = run_blocking("expiry_sweep", move || job.sweep_expired()).await {
                    crate::metrics::record_background_job("expiry_sweep", "success", start.elapsed());
                    debug!(removed, "Expiry sweep tick");
                }
            }

            _ = analysis_interval.tick() => {
                let job = jobs.clone();
                let start = Instant::now();
                if run_blocking("pattern_analysis", move || job.analyze_patterns()).await.is_some() {
                    crate::metrics::record_background_job("pattern_analysis", "success", start.elapsed());
                }
            }

            _ = training_interval.tick() => {
                let job = jobs.clone();
                let start = Instant::now();
                match run_blocking("predictor_training", move || job.retrain_predictor()).await {
                    Some(Err(e)) => {
                        warn!(error = %e, "Predictor training failed, keeping current model");
                        crate::metrics::record_background_job("predictor_training", "failure", start.elapsed());
                    }
                    Some(Ok(None)) => {
                        crate::metrics::record_background_job("predictor_training", "skipped", start.elapsed());
                    }
                    Some(Ok(Some(_))) => {
                        crate::metrics::record_background_job("predictor_training", "success", start.elapsed());
                    }
                    None => {}
                }
            }

            _ = pressure_interval.tick() => {
                let start = Instant::now();
                let report = jobs.check_pressure();
                crate::metrics::record_background_job("pressure_check", "success", start.elapsed());
                debug!(level = %report.level, utilization = report.utilization, "Pressure tick");
            }
        }
    }

    info!("Cache maintenance loop stopped");
}

impl CacheEngine {
    /// Spawn the background maintenance loop on the current tokio runtime.
    ///
    /// Starting a running engine is a no-op. Fails outside a runtime.
    #[tracing::instrument(skip(self))]
    pub fn start(&self) -> Result<(), CacheError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            CacheError::InvalidConfiguration(format!("engine start requires a tokio runtime: {e}"))
        })?;

        let mut task = self.task.lock();
        if task.is_some() {
            debug!("Engine already running");
            return Ok(());
        }

        self.stop.send_replace(false);
        let stop_rx = self.stop.subscribe();
        *task = Some(handle.spawn(run(self.jobs.clone(), stop_rx)));
        self.set_state(EngineState::Running);
        info!(
            cleanup_secs = self.jobs.config.cleanup_interval_secs,
            analysis_secs = self.jobs.config.pattern_analysis_interval_secs,
            retrain_secs = self.jobs.config.predictor_retrain_interval_secs,
            pressure_secs = self.jobs.config.pressure_check_interval_secs,
            "Cache engine started"
        );
        Ok(())
    }

    /// Signal the background loop to stop and wait for it to exit.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let shutdown_start = Instant::now();
        let task = self.task.lock().take();
        let Some(task) = task else {
            self.set_state(EngineState::Stopped);
            return;
        };

        info!("Initiating cache engine shutdown...");
        self.set_state(EngineState::ShuttingDown);
        self.stop.send_replace(true);

        if let Err(e) = task.await {
            warn!(error = %e, "Maintenance loop ended abnormally");
        }

        self.set_state(EngineState::Stopped);
        crate::metrics::record_background_job("shutdown", "success", shutdown_start.elapsed());
        info!("Cache engine shutdown complete");
    }
}
