// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Access predictor.
//!
//! Estimates, per key, how soon the next access will arrive and turns that
//! into two bounded scores used by placement and adaptive eviction:
//!
//! - `predict_frequency(key)`: `h / (h + ttna)`
//! - `predict_access_probability(key)`: `1 - exp(-h / ttna)`
//!
//! where `ttna` is the predicted time-to-next-access and `h` the prediction
//! horizon. Both are in `[0, 1]` and strictly decrease as `ttna` grows.
//!
//! Until a model has been trained the [`NeutralPredictor`] is installed and
//! every key scores 0.5, so callers never branch on training state.
//!
//! # Model
//!
//! ```text
//! per key:  mean inter-arrival gap (EWMA)
//!           hour-of-day histogram   ─┐ Laplace-smoothed,
//!           day-of-week histogram   ─┘ scaled against uniform
//!           last access
//!
//! ttna = gap × hour_factor × day_factor + max(0, since_last − gap)
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::access_log::AccessRecord;
use crate::config::CacheConfig;

/// Score returned when nothing is known about a key.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Smallest time-to-next-access considered, in seconds.
const MIN_GAP_SECS: f64 = 0.001;

/// Weight of the newest gap in the per-key moving average.
const GAP_EWMA_ALPHA: f64 = 0.3;

/// Bounds on the hour/day adjustment factors.
const FACTOR_MIN: f64 = 0.25;
const FACTOR_MAX: f64 = 4.0;

/// A source of per-key access scores.
pub trait Predictor: Send + Sync {
    /// Expected access frequency, in `[0, 1]`.
    fn predict_frequency(&self, key: &[u8]) -> f64;

    /// Probability of an access within the horizon, in `[0, 1]`.
    fn predict_access_probability(&self, key: &[u8]) -> f64;

    /// Whether scores carry information beyond the neutral default.
    fn is_informative(&self) -> bool {
        true
    }
}

/// Null-object predictor used until training succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralPredictor;

impl Predictor for NeutralPredictor {
    fn predict_frequency(&self, _key: &[u8]) -> f64 {
        NEUTRAL_SCORE
    }

    fn predict_access_probability(&self, _key: &[u8]) -> f64 {
        NEUTRAL_SCORE
    }

    fn is_informative(&self) -> bool {
        false
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictorError {
    #[error("insufficient history: {records} access records, need at least {required}")]
    InsufficientHistory { records: usize, required: usize },

    #[error("no key has at least {required_per_key} access records")]
    NoDenseKeys { required_per_key: usize },
}

/// Training gates and scoring horizon.
#[derive(Debug, Clone, Copy)]
pub struct PredictorSettings {
    pub min_records: usize,
    pub min_key_records: usize,
    pub horizon_secs: f64,
}

impl Default for PredictorSettings {
    fn default() -> Self {
        Self {
            min_records: 100,
            min_key_records: 10,
            horizon_secs: 300.0,
        }
    }
}

impl From<&CacheConfig> for PredictorSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            min_records: config.predictor_min_records,
            min_key_records: config.predictor_min_key_records,
            horizon_secs: config.predictor_horizon_secs as f64,
        }
    }
}

/// Outcome of a successful training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub records: usize,
    pub keys: usize,
    pub dense_keys: usize,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct KeyProfile {
    mean_gap_secs: f64,
    last_seen: DateTime<Utc>,
    hours: [u32; 24],
    days: [u32; 7],
    samples: u32,
}

impl KeyProfile {
    fn hour_factor(&self, hour: usize) -> f64 {
        smoothed_factor(self.hours[hour], self.samples, 24)
    }

    fn day_factor(&self, day: usize) -> f64 {
        smoothed_factor(self.days[day], self.samples, 7)
    }

    fn time_to_next_access(&self, now: DateTime<Utc>) -> f64 {
        let hour = now.hour() as usize;
        let day = now.weekday().num_days_from_monday() as usize;
        let since_last = (now - self.last_seen).num_milliseconds().max(0) as f64 / 1000.0;
        let overdue = (since_last - self.mean_gap_secs).max(0.0);

        (self.mean_gap_secs * self.hour_factor(hour) * self.day_factor(day) + overdue)
            .max(MIN_GAP_SECS)
    }
}

/// Ratio of the uniform share to the observed (smoothed) share of a bucket.
/// Busy buckets shrink the expected gap, quiet ones stretch it.
fn smoothed_factor(count: u32, samples: u32, buckets: u32) -> f64 {
    let share = f64::from(count + 1) / f64::from(samples + buckets);
    let uniform = 1.0 / f64::from(buckets);
    (uniform / share).clamp(FACTOR_MIN, FACTOR_MAX)
}

/// Model fitted from an access log snapshot.
#[derive(Debug, Clone)]
pub struct TrainedPredictor {
    profiles: HashMap<Vec<u8>, KeyProfile>,
    horizon_secs: f64,
    trained_at: DateTime<Utc>,
}

impl TrainedPredictor {
    pub fn fit(records: &[AccessRecord], settings: PredictorSettings) -> Result<Self, PredictorError> {
        let accesses: Vec<&AccessRecord> = records.iter().filter(|r| r.is_access()).collect();
        if accesses.len() < settings.min_records {
            return Err(PredictorError::InsufficientHistory {
                records: accesses.len(),
                required: settings.min_records,
            });
        }

        let mut by_key: HashMap<&[u8], Vec<DateTime<Utc>>> = HashMap::new();
        for record in &accesses {
            by_key.entry(record.key.as_slice()).or_default().push(record.timestamp);
        }

        let min_key = settings.min_key_records.max(1);
        if !by_key.values().any(|times| times.len() >= min_key) {
            return Err(PredictorError::NoDenseKeys {
                required_per_key: min_key,
            });
        }

        let window_start = accesses.iter().map(|r| r.timestamp).min();
        let window_end = accesses.iter().map(|r| r.timestamp).max();
        let window_secs = match (window_start, window_end) {
            (Some(start), Some(end)) => ((end - start).num_milliseconds() as f64 / 1000.0).max(1.0),
            _ => settings.horizon_secs,
        };

        let mut profiles = HashMap::with_capacity(by_key.len());
        for (key, mut times) in by_key {
            times.sort_unstable();
            let samples = times.len();

            let mean_gap_secs = if samples >= min_key {
                let mut ewma: Option<f64> = None;
                for pair in times.windows(2) {
                    let gap = (pair[1] - pair[0]).num_milliseconds() as f64 / 1000.0;
                    ewma = Some(match ewma {
                        None => gap,
                        Some(prev) => GAP_EWMA_ALPHA * gap + (1.0 - GAP_EWMA_ALPHA) * prev,
                    });
                }
                ewma.unwrap_or(window_secs)
            } else {
                // Too few samples for a gap series; spread the window evenly.
                window_secs / samples as f64
            }
            .max(MIN_GAP_SECS);

            let mut hours = [0u32; 24];
            let mut days = [0u32; 7];
            for t in &times {
                hours[t.hour() as usize] += 1;
                days[t.weekday().num_days_from_monday() as usize] += 1;
            }

            let last_seen = times.last().copied().unwrap_or_else(Utc::now);
            profiles.insert(
                key.to_vec(),
                KeyProfile {
                    mean_gap_secs,
                    last_seen,
                    hours,
                    days,
                    samples: u32::try_from(samples).unwrap_or(u32::MAX),
                },
            );
        }

        Ok(Self {
            profiles,
            horizon_secs: settings.horizon_secs.max(MIN_GAP_SECS),
            trained_at: Utc::now(),
        })
    }

    /// Predicted seconds until the next access, if the key is known.
    #[must_use]
    pub fn time_to_next_access(&self, key: &[u8], now: DateTime<Utc>) -> Option<f64> {
        self.profiles.get(key).map(|p| p.time_to_next_access(now))
    }

    #[must_use]
    pub fn frequency_at(&self, key: &[u8], now: DateTime<Utc>) -> f64 {
        match self.time_to_next_access(key, now) {
            Some(ttna) => self.horizon_secs / (self.horizon_secs + ttna),
            None => NEUTRAL_SCORE,
        }
    }

    #[must_use]
    pub fn probability_at(&self, key: &[u8], now: DateTime<Utc>) -> f64 {
        match self.time_to_next_access(key, now) {
            Some(ttna) => 1.0 - (-self.horizon_secs / ttna).exp(),
            None => NEUTRAL_SCORE,
        }
    }

    #[must_use]
    pub fn key_count(&self) -> usize {
        self.profiles.len()
    }

    #[must_use]
    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }
}

impl Predictor for TrainedPredictor {
    fn predict_frequency(&self, key: &[u8]) -> f64 {
        self.frequency_at(key, Utc::now())
    }

    fn predict_access_probability(&self, key: &[u8]) -> f64 {
        self.probability_at(key, Utc::now())
    }
}

/// Holder for the currently installed predictor.
///
/// Readers clone an `Arc` and release the lock immediately; training builds
/// the new model without holding the lock and swaps it in.
pub struct AccessPredictor {
    current: RwLock<Arc<dyn Predictor>>,
    settings: PredictorSettings,
    appended_at_training: AtomicU64,
    trainings: AtomicU64,
}

impl AccessPredictor {
    #[must_use]
    pub fn new(settings: PredictorSettings) -> Self {
        Self {
            current: RwLock::new(Arc::new(NeutralPredictor)),
            settings,
            appended_at_training: AtomicU64::new(0),
            trainings: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn current(&self) -> Arc<dyn Predictor> {
        self.current.read().clone()
    }

    #[must_use]
    pub fn predict_frequency(&self, key: &[u8]) -> f64 {
        self.current().predict_frequency(key).clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn predict_access_probability(&self, key: &[u8]) -> f64 {
        self.current().predict_access_probability(key).clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn is_informative(&self) -> bool {
        self.current().is_informative()
    }

    /// Replace the active model (custom models, tests).
    pub fn install(&self, predictor: Arc<dyn Predictor>) {
        *self.current.write() = predictor;
    }

    /// Fall back to neutral scores.
    pub fn reset(&self) {
        self.install(Arc::new(NeutralPredictor));
    }

    /// Fit a model on `records` and install it. On failure the previous
    /// model stays active.
    pub fn train(&self, records: &[AccessRecord]) -> Result<TrainingSummary, PredictorError> {
        let model = TrainedPredictor::fit(records, self.settings)?;
        let summary = TrainingSummary {
            records: records.iter().filter(|r| r.is_access()).count(),
            keys: model.key_count(),
            dense_keys: model
                .profiles
                .values()
                .filter(|p| p.samples as usize >= self.settings.min_key_records)
                .count(),
            trained_at: model.trained_at(),
        };
        self.install(Arc::new(model));
        self.trainings.fetch_add(1, Ordering::Relaxed);
        info!(
            records = summary.records,
            keys = summary.keys,
            dense_keys = summary.dense_keys,
            "Access predictor trained"
        );
        Ok(summary)
    }

    /// Records appended to the log since the last training attempt.
    #[must_use]
    pub fn new_records_since_training(&self, total_appended: u64) -> u64 {
        total_appended.saturating_sub(self.appended_at_training.load(Ordering::Relaxed))
    }

    pub fn mark_training_attempt(&self, total_appended: u64) {
        debug!(total_appended, "Predictor training checkpoint");
        self.appended_at_training.store(total_appended, Ordering::Relaxed);
    }

    #[must_use]
    pub fn training_count(&self) -> u64 {
        self.trainings.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn settings(&self) -> PredictorSettings {
        self.settings
    }
}

impl Default for AccessPredictor {
    fn default() -> Self {
        Self::new(PredictorSettings::default())
    }
}
