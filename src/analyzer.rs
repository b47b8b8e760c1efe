// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Access pattern analysis.
//!
//! Works on an [`AccessLog`](crate::access_log::AccessLog) snapshot and
//! reports three kinds of pattern:
//!
//! | Kind      | Detected when                                    | Recommends                 |
//! |-----------|--------------------------------------------------|----------------------------|
//! | Temporal  | an hour of day carries > factor × uniform share  | prefetch, increase TTL     |
//! | Frequency | one key carries > threshold of traffic           | promote (+ TTL at 2×)      |
//! | Spatial   | a key prefix with ≥ 2 keys carries > threshold   | prefetch                   |
//!
//! Only gets and sets count as traffic. Below the minimum record count the
//! analyzer reports nothing.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::access_log::AccessRecord;
use crate::config::CacheConfig;

/// Sample count at which confidence reaches 1.
const CONFIDENCE_SATURATION: f64 = 100.0;

/// Separators that end a key prefix.
const PREFIX_SEPARATORS: [u8; 3] = [b':', b'/', b'.'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Traffic concentrated in an hour of day
    Temporal,
    /// Traffic concentrated on one key
    Frequency,
    /// Traffic concentrated on a family of keys sharing a prefix
    Spatial,
}

impl PatternKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temporal => "temporal",
            Self::Frequency => "frequency",
            Self::Spatial => "spatial",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    IncreaseTtl,
    Prefetch,
    PromoteCacheLevel,
}

/// A detected access pattern and what to do about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachePattern {
    pub kind: PatternKind,
    /// Exact key (frequency), key prefix (spatial) or `hour:HH` (temporal).
    /// Raw bytes, since keys need not be UTF-8.
    pub key_pattern: Vec<u8>,
    /// Share of analyzed traffic, 0-1
    pub access_frequency: f64,
    /// How concentrated the traffic is in time, 0-1
    pub temporal_locality: f64,
    /// How concentrated the traffic is across neighbouring keys, 0-1
    pub spatial_locality: f64,
    pub predicted_next_access: Option<DateTime<Utc>>,
    pub confidence: f64,
    pub recommendations: BTreeSet<Recommendation>,
}

impl CachePattern {
    /// Whether this pattern applies to a resident key. Temporal patterns
    /// describe time, not keys, and match nothing.
    #[must_use]
    pub fn matches(&self, key: &[u8]) -> bool {
        match self.kind {
            PatternKind::Temporal => false,
            PatternKind::Frequency => key == self.key_pattern.as_slice(),
            PatternKind::Spatial => key.starts_with(&self.key_pattern),
        }
    }

    /// Printable form of `key_pattern` for logs and dashboards.
    #[must_use]
    pub fn label(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.key_pattern)
    }

    #[must_use]
    pub fn recommends(&self, recommendation: Recommendation) -> bool {
        self.recommendations.contains(&recommendation)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnalyzerSettings {
    pub min_records: usize,
    pub frequency_share_threshold: f64,
    pub spatial_share_threshold: f64,
    pub temporal_share_factor: f64,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            min_records: 50,
            frequency_share_threshold: 0.05,
            spatial_share_threshold: 0.20,
            temporal_share_factor: 2.0,
        }
    }
}

impl From<&CacheConfig> for AnalyzerSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            min_records: config.pattern_min_records,
            frequency_share_threshold: config.frequency_share_threshold,
            spatial_share_threshold: config.spatial_share_threshold,
            temporal_share_factor: config.temporal_share_factor,
        }
    }
}

/// Stateless detector plus the most recent result set.
pub struct PatternAnalyzer {
    settings: AnalyzerSettings,
    latest: RwLock<Vec<CachePattern>>,
    runs: AtomicU64,
}

impl PatternAnalyzer {
    #[must_use]
    pub fn new(settings: AnalyzerSettings) -> Self {
        Self {
            settings,
            latest: RwLock::new(Vec::new()),
            runs: AtomicU64::new(0),
        }
    }

    /// Analyze `records` and remember the result as the latest pattern set.
    pub fn analyze(&self, records: &[AccessRecord]) -> Vec<CachePattern> {
        let patterns = self.detect(records, Utc::now());
        *self.latest.write() = patterns.clone();
        self.runs.fetch_add(1, Ordering::Relaxed);
        patterns
    }

    /// Patterns from the last [`analyze`](Self::analyze) call.
    #[must_use]
    pub fn latest(&self) -> Vec<CachePattern> {
        self.latest.read().clone()
    }

    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Pure detection relative to `now` (used for the next-access estimate).
    #[must_use]
    pub fn detect(&self, records: &[AccessRecord], now: DateTime<Utc>) -> Vec<CachePattern> {
        let accesses: Vec<&AccessRecord> = records.iter().filter(|r| r.is_access()).collect();
        if accesses.len() < self.settings.min_records {
            debug!(
                records = accesses.len(),
                required = self.settings.min_records,
                "Too few records for pattern analysis"
            );
            return Vec::new();
        }

        let mut patterns = self.temporal_patterns(&accesses, now);
        patterns.extend(self.frequency_patterns(&accesses));
        patterns.extend(self.spatial_patterns(&accesses));

        for kind in [PatternKind::Temporal, PatternKind::Frequency, PatternKind::Spatial] {
            let count = patterns.iter().filter(|p| p.kind == kind).count();
            if count > 0 {
                crate::metrics::record_patterns(kind.as_str(), count);
            }
        }
        debug!(records = accesses.len(), patterns = patterns.len(), "Pattern analysis complete");
        patterns
    }

    fn temporal_patterns(&self, accesses: &[&AccessRecord], now: DateTime<Utc>) -> Vec<CachePattern> {
        let total = accesses.len() as f64;
        let mut hours = [0usize; 24];
        for record in accesses {
            hours[record.timestamp.hour() as usize] += 1;
        }

        let floor = self.settings.temporal_share_factor / 24.0;
        let mut patterns: Vec<CachePattern> = hours
            .iter()
            .enumerate()
            .filter_map(|(hour, &count)| {
                let share = count as f64 / total;
                (share > floor).then(|| CachePattern {
                    kind: PatternKind::Temporal,
                    key_pattern: format!("hour:{hour:02}").into_bytes(),
                    access_frequency: share,
                    temporal_locality: share,
                    spatial_locality: 0.0,
                    predicted_next_access: next_occurrence_of_hour(now, hour as u32),
                    confidence: confidence(count),
                    recommendations: [Recommendation::Prefetch, Recommendation::IncreaseTtl]
                        .into_iter()
                        .collect(),
                })
            })
            .collect();
        sort_by_share(&mut patterns);
        patterns
    }

    fn frequency_patterns(&self, accesses: &[&AccessRecord]) -> Vec<CachePattern> {
        let total = accesses.len() as f64;
        let mut by_key: HashMap<&[u8], (usize, [usize; 24])> = HashMap::new();
        for record in accesses {
            let slot = by_key.entry(record.key.as_slice()).or_insert((0, [0; 24]));
            slot.0 += 1;
            slot.1[record.timestamp.hour() as usize] += 1;
        }

        let threshold = self.settings.frequency_share_threshold;
        let mut patterns: Vec<CachePattern> = by_key
            .into_iter()
            .filter_map(|(key, (count, hours))| {
                let share = count as f64 / total;
                if share <= threshold {
                    return None;
                }
                let mut recommendations: BTreeSet<Recommendation> =
                    [Recommendation::PromoteCacheLevel].into_iter().collect();
                if share >= 2.0 * threshold {
                    recommendations.insert(Recommendation::IncreaseTtl);
                }
                let busiest = hours.iter().copied().max().unwrap_or(0);
                Some(CachePattern {
                    kind: PatternKind::Frequency,
                    key_pattern: key.to_vec(),
                    access_frequency: share,
                    temporal_locality: busiest as f64 / count as f64,
                    spatial_locality: 0.0,
                    predicted_next_access: None,
                    confidence: confidence(count),
                    recommendations,
                })
            })
            .collect();
        sort_by_share(&mut patterns);
        patterns
    }

    fn spatial_patterns(&self, accesses: &[&AccessRecord]) -> Vec<CachePattern> {
        let total = accesses.len() as f64;
        let mut by_prefix: HashMap<&[u8], (usize, HashSet<&[u8]>)> = HashMap::new();
        for record in accesses {
            if let Some(prefix) = key_prefix(&record.key) {
                let slot = by_prefix.entry(prefix).or_default();
                slot.0 += 1;
                slot.1.insert(record.key.as_slice());
            }
        }

        let mut patterns: Vec<CachePattern> = by_prefix
            .into_iter()
            .filter_map(|(prefix, (count, keys))| {
                let share = count as f64 / total;
                (keys.len() >= 2 && share > self.settings.spatial_share_threshold).then(|| {
                    CachePattern {
                        kind: PatternKind::Spatial,
                        key_pattern: prefix.to_vec(),
                        access_frequency: share,
                        temporal_locality: 0.0,
                        spatial_locality: share,
                        predicted_next_access: None,
                        confidence: confidence(count),
                        recommendations: [Recommendation::Prefetch].into_iter().collect(),
                    }
                })
            })
            .collect();
        sort_by_share(&mut patterns);
        patterns
    }
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerSettings::default())
    }
}

/// Leading segment of a key up to and including the first separator.
fn key_prefix(key: &[u8]) -> Option<&[u8]> {
    key.iter()
        .position(|b| PREFIX_SEPARATORS.contains(b))
        .filter(|&pos| pos > 0)
        .map(|pos| &key[..=pos])
}

fn confidence(samples: usize) -> f64 {
    (samples as f64 / CONFIDENCE_SATURATION).min(1.0)
}

fn sort_by_share(patterns: &mut [CachePattern]) {
    patterns.sort_by(|a, b| {
        b.access_frequency
            .total_cmp(&a.access_frequency)
            .then_with(|| a.key_pattern.cmp(&b.key_pattern))
    });
}

/// Start of the next `hour:00` strictly after `now`.
fn next_occurrence_of_hour(now: DateTime<Utc>, hour: u32) -> Option<DateTime<Utc>> {
    let today = now.date_naive().and_hms_opt(hour, 0, 0)?.and_utc();
    if today > now {
        Some(today)
    } else {
        Some(today + ChronoDuration::days(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_log::AccessOperation;
    use chrono::TimeZone;

    fn at(hour: u32, key: &str) -> AccessRecord {
        let ts = Utc.with_ymd_and_hms(2026, 3, 2, hour, 15, 0).unwrap();
        AccessRecord::at(ts, key.as_bytes().to_vec(), AccessOperation::Get, true)
    }

    fn spread_uniformly(count: usize, key_for: impl Fn(usize) -> String) -> Vec<AccessRecord> {
        (0..count).map(|i| at((i % 24) as u32, &key_for(i))).collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 3, 10, 30, 0).unwrap()
    }

    #[test]
    fn test_too_few_records_yields_nothing() {
        let analyzer = PatternAnalyzer::default();
        let records: Vec<_> = (0..49).map(|_| at(3, "hot")).collect();
        assert!(analyzer.detect(&records, now()).is_empty());
    }

    #[test]
    fn test_frequency_pattern_for_hot_key() {
        let analyzer = PatternAnalyzer::default();
        // 240 unique cold keys spread over the day plus one key at 20%.
        let mut records = spread_uniformly(240, |i| format!("cold{i}"));
        records.extend((0..60).map(|i| at((i % 24) as u32, "hot")));

        let patterns = analyzer.detect(&records, now());
        let hot: Vec<_> = patterns.iter().filter(|p| p.kind == PatternKind::Frequency).collect();
        assert_eq!(hot.len(), 1);
        assert_eq!(hot[0].key_pattern, b"hot");
        assert!((hot[0].access_frequency - 0.2).abs() < 1e-9);
        assert!(hot[0].recommends(Recommendation::PromoteCacheLevel));
        assert!(hot[0].recommends(Recommendation::IncreaseTtl));
        assert!(hot[0].matches(b"hot"));
        assert!(!hot[0].matches(b"hotter"));
    }

    #[test]
    fn test_frequency_ttl_recommendation_needs_double_threshold() {
        let analyzer = PatternAnalyzer::default();
        // 7% share: above 5%, below 10%.
        let mut records = spread_uniformly(93, |i| format!("c{i}"));
        records.extend((0..7).map(|i| at(i as u32, "warm")));

        let patterns = analyzer.detect(&records, now());
        let warm = patterns
            .iter()
            .find(|p| p.kind == PatternKind::Frequency && p.key_pattern == b"warm")
            .unwrap();
        assert!(warm.recommends(Recommendation::PromoteCacheLevel));
        assert!(!warm.recommends(Recommendation::IncreaseTtl));
    }

    #[test]
    fn test_temporal_pattern_for_busy_hour() {
        let analyzer = PatternAnalyzer::default();
        let mut records = spread_uniformly(240, |i| format!("k{i}"));
        records.extend((0..60).map(|i| at(14, &format!("burst{i}"))));

        let patterns = analyzer.detect(&records, now());
        let temporal: Vec<_> = patterns.iter().filter(|p| p.kind == PatternKind::Temporal).collect();
        assert_eq!(temporal.len(), 1);
        assert_eq!(temporal[0].key_pattern, b"hour:14");
        assert_eq!(temporal[0].label(), "hour:14");
        assert!(temporal[0].recommends(Recommendation::Prefetch));
        assert!(temporal[0].recommends(Recommendation::IncreaseTtl));
        assert_eq!(
            temporal[0].predicted_next_access,
            Some(Utc.with_ymd_and_hms(2026, 3, 3, 14, 0, 0).unwrap())
        );
        assert!(!temporal[0].matches(b"burst1"));
    }

    #[test]
    fn test_uniform_traffic_has_no_temporal_pattern() {
        let analyzer = PatternAnalyzer::default();
        let records = spread_uniformly(480, |i| format!("k{i}"));
        let patterns = analyzer.detect(&records, now());
        assert!(patterns.iter().all(|p| p.kind != PatternKind::Temporal));
    }

    #[test]
    fn test_spatial_pattern_for_prefix_family() {
        let analyzer = PatternAnalyzer::default();
        let mut records = spread_uniformly(100, |i| format!("user:{}", i % 40));
        records.extend(spread_uniformly(100, |i| format!("misc{i}")));

        let patterns = analyzer.detect(&records, now());
        let spatial: Vec<_> = patterns.iter().filter(|p| p.kind == PatternKind::Spatial).collect();
        assert_eq!(spatial.len(), 1);
        assert_eq!(spatial[0].key_pattern, b"user:");
        assert!((spatial[0].spatial_locality - 0.5).abs() < 1e-9);
        assert!(spatial[0].recommends(Recommendation::Prefetch));
        assert!(spatial[0].matches(b"user:7"));
        assert!(!spatial[0].matches(b"users"));
    }

    #[test]
    fn test_single_key_prefix_is_not_spatial() {
        let analyzer = PatternAnalyzer::default();
        let mut records = spread_uniformly(100, |_| "only:one".to_string());
        records.extend(spread_uniformly(100, |i| format!("misc{i}")));

        let patterns = analyzer.detect(&records, now());
        assert!(patterns.iter().all(|p| p.kind != PatternKind::Spatial));
    }

    #[test]
    fn test_key_prefix() {
        assert_eq!(key_prefix(b"user:1"), Some(b"user:".as_slice()));
        assert_eq!(key_prefix(b"img/a/b.png"), Some(b"img/".as_slice()));
        assert_eq!(key_prefix(b"a.b"), Some(b"a.".as_slice()));
        assert_eq!(key_prefix(b"plain"), None);
        assert_eq!(key_prefix(b":leading"), None);
    }

    #[test]
    fn test_binary_keys_keep_their_bytes() {
        let analyzer = PatternAnalyzer::default();
        let ts = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let hot = vec![0xff, 0xfe, 0x01];
        let records: Vec<_> = (0..100)
            .map(|_| AccessRecord::at(ts, hot.clone(), AccessOperation::Get, true))
            .collect();

        let patterns = analyzer.detect(&records, now());
        let frequency = patterns
            .iter()
            .find(|p| p.kind == PatternKind::Frequency)
            .unwrap();
        assert_eq!(frequency.key_pattern, hot);
        assert!(frequency.matches(&hot));
        assert!(!frequency.matches(&[0xff, 0xfe]));
    }

    #[test]
    fn test_binary_prefix_matches_family() {
        let analyzer = PatternAnalyzer::default();
        let mut records = spread_uniformly(100, |i| format!("misc{i}"));
        let ts = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        records.extend((0..100u8).map(|i| {
            AccessRecord::at(ts, vec![0xc3, b':', i % 10], AccessOperation::Get, true)
        }));

        let patterns = analyzer.detect(&records, now());
        let spatial = patterns
            .iter()
            .find(|p| p.kind == PatternKind::Spatial)
            .unwrap();
        assert_eq!(spatial.key_pattern, vec![0xc3, b':']);
        assert!(spatial.matches(&[0xc3, b':', 0x80]));
    }

    #[test]
    fn test_confidence_saturates() {
        assert!((confidence(50) - 0.5).abs() < 1e-9);
        assert_eq!(confidence(1_000), 1.0);
    }

    #[test]
    fn test_next_occurrence_wraps_to_tomorrow() {
        let n = now();
        assert_eq!(
            next_occurrence_of_hour(n, 9),
            Some(Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap())
        );
        assert_eq!(
            next_occurrence_of_hour(n, 11),
            Some(Utc.with_ymd_and_hms(2026, 3, 3, 11, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_analyze_stores_latest() {
        let analyzer = PatternAnalyzer::default();
        let records: Vec<_> = (0..60).map(|i| at((i % 24) as u32, "hot")).collect();
        let patterns = analyzer.analyze(&records);
        assert!(!patterns.is_empty());
        assert_eq!(analyzer.latest(), patterns);
        assert_eq!(analyzer.run_count(), 1);
    }

    #[test]
    fn test_deletes_ignored() {
        let analyzer = PatternAnalyzer::default();
        let ts = Utc::now();
        let records: Vec<_> = (0..100)
            .map(|_| AccessRecord::at(ts, b"k".to_vec(), AccessOperation::Delete, false))
            .collect();
        assert!(analyzer.detect(&records, now()).is_empty());
    }
}
