// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Memory pressure handling.
//!
//! The controller samples a [`MemoryProbe`], classifies the reading into a
//! four-level cascade and escalates reclamation accordingly:
//!
//! - **Low** (< 70%): no reclamation
//! - **Moderate** (70-80%): reclaim unpinned allocations with no references
//! - **High** (80-90%): also reclaim idle allocations, halve free lists, switch to LFU
//! - **Critical** (>= 90%): reclaim unreferenced or idle, drop all free lists, switch to FIFO
//!
//! Stepping down to Low or Moderate restores the baseline strategy and
//! free-list cap; stepping down to High loosens Critical's settings to
//! LFU and half the cap. Pinned allocations are never touched.
//!
//! # Example
//!
//! ```
//! use tiered_cache::PressureLevel;
//!
//! assert_eq!(PressureLevel::from_utilization(0.5), PressureLevel::Low);
//! assert_eq!(PressureLevel::from_utilization(0.85), PressureLevel::High);
//! assert_eq!(PressureLevel::from_utilization(0.95), PressureLevel::Critical);
//! assert!(PressureLevel::Moderate < PressureLevel::High);
//! ```

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::eviction::EvictionStrategy;
use crate::memory::{MemoryAllocator, MemoryProbe, ReclaimOutcome, ReclaimPolicy};

/// Pressure level derived from memory utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PressureLevel {
    Low = 0,
    Moderate = 1,
    High = 2,
    Critical = 3,
}

impl PressureLevel {
    /// Classify a utilization ratio (0.0 → 1.0).
    #[must_use]
    pub fn from_utilization(utilization: f64) -> Self {
        match utilization {
            u if u < 0.70 => Self::Low,
            u if u < 0.80 => Self::Moderate,
            u if u < 0.90 => Self::High,
            _ => Self::Critical,
        }
    }

    /// Strategy forced while at this level, if any.
    #[must_use]
    pub fn strategy_override(&self) -> Option<EvictionStrategy> {
        match self {
            Self::Low | Self::Moderate => None,
            Self::High => Some(EvictionStrategy::Lfu),
            Self::Critical => Some(EvictionStrategy::Fifo),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Normal operation",
            Self::Moderate => "Moderate - reclaiming unreferenced allocations",
            Self::High => "High - reclaiming idle allocations, LFU eviction",
            Self::Critical => "Critical - free lists dropped, FIFO eviction",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Moderate,
            2 => Self::High,
            3 => Self::Critical,
            _ => Self::Low,
        }
    }
}

impl std::fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Something whose eviction strategy the controller can steer.
pub trait StrategyTarget: Send + Sync {
    fn strategy(&self) -> EvictionStrategy;
    fn set_strategy(&self, strategy: EvictionStrategy);
}

/// What one pressure check observed and did.
#[derive(Debug, Clone, PartialEq)]
pub struct PressureReport {
    pub utilization: f64,
    pub level: PressureLevel,
    pub previous: PressureLevel,
    pub reclaimed: ReclaimOutcome,
    /// Pooled bytes dropped from free lists
    pub pool_bytes_released: usize,
    pub strategy: EvictionStrategy,
}

pub struct PressureController {
    allocator: Arc<MemoryAllocator>,
    probe: Arc<dyn MemoryProbe>,
    target: Arc<dyn StrategyTarget>,
    baseline_strategy: EvictionStrategy,
    baseline_cap: usize,
    idle_reclaim: Duration,
    level: AtomicU8,
    utilization_bits: AtomicU64,
}

impl PressureController {
    #[must_use]
    pub fn new(
        allocator: Arc<MemoryAllocator>,
        probe: Arc<dyn MemoryProbe>,
        target: Arc<dyn StrategyTarget>,
        baseline_strategy: EvictionStrategy,
    ) -> Self {
        let baseline_cap = allocator.config().max_free_per_class;
        let idle_reclaim = Duration::from_secs(allocator.config().idle_reclaim_secs);
        Self {
            allocator,
            probe,
            target,
            baseline_strategy,
            baseline_cap,
            idle_reclaim,
            level: AtomicU8::new(PressureLevel::Low as u8),
            utilization_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Sample the probe and act on the reading.
    pub fn check(&self) -> PressureReport {
        let utilization = self.probe.utilization();
        self.apply(utilization)
    }

    /// Act on an explicit utilization reading.
    pub fn apply(&self, utilization: f64) -> PressureReport {
        let level = PressureLevel::from_utilization(utilization);
        let previous = PressureLevel::from_u8(self.level.swap(level as u8, Ordering::AcqRel));
        self.utilization_bits
            .store(utilization.to_bits(), Ordering::Relaxed);

        let mut reclaimed = ReclaimOutcome::default();
        let mut pool_bytes_released = 0;

        match level {
            PressureLevel::Low => {}
            PressureLevel::Moderate => {
                reclaimed = self.allocator.reclaim(ReclaimPolicy::unreferenced());
            }
            PressureLevel::High => {
                reclaimed = self
                    .allocator
                    .reclaim(ReclaimPolicy::unreferenced_or_idle(self.idle_reclaim));
                pool_bytes_released = self.allocator.halve_free_lists();
            }
            PressureLevel::Critical => {
                reclaimed = self
                    .allocator
                    .reclaim(ReclaimPolicy::unreferenced_or_idle(self.idle_reclaim));
                pool_bytes_released = self.allocator.clear_free_lists();
            }
        }

        // High and Critical pin their settings on every check; lower levels
        // only reset them on the way down.
        if level >= PressureLevel::High || level < previous {
            self.allocator.set_free_list_cap(self.cap_for(level));
            self.target.set_strategy(
                level
                    .strategy_override()
                    .unwrap_or(self.baseline_strategy),
            );
        }

        if level != previous {
            if level < previous && level <= PressureLevel::Moderate {
                info!(utilization, level = %level, from = %previous, "Memory pressure relieved, baseline restored");
            } else if level > previous && level >= PressureLevel::High {
                warn!(
                    utilization,
                    level = %level,
                    from = %previous,
                    "{}",
                    level.description()
                );
            } else {
                info!(utilization, level = %level, from = %previous, "Memory pressure level changed");
            }
        }
        debug!(
            utilization,
            level = %level,
            reclaimed = reclaimed.allocations,
            pool_bytes_released,
            "Pressure check"
        );

        crate::metrics::set_memory_pressure(utilization);
        crate::metrics::set_pressure_level(level as u8);

        PressureReport {
            utilization,
            level,
            previous,
            reclaimed,
            pool_bytes_released,
            strategy: self.target.strategy(),
        }
    }

    /// Free-list cap enforced at `level`.
    #[must_use]
    pub fn cap_for(&self, level: PressureLevel) -> usize {
        match level {
            PressureLevel::Low | PressureLevel::Moderate => self.baseline_cap,
            PressureLevel::High => self.baseline_cap / 2,
            PressureLevel::Critical => 0,
        }
    }

    #[must_use]
    pub fn level(&self) -> PressureLevel {
        PressureLevel::from_u8(self.level.load(Ordering::Acquire))
    }

    /// Utilization seen by the last check.
    #[must_use]
    pub fn last_utilization(&self) -> f64 {
        f64::from_bits(self.utilization_bits.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn baseline_strategy(&self) -> EvictionStrategy {
        self.baseline_strategy
    }
}
