// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sources of system memory utilization for the pressure controller.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use tracing::debug;

/// Reports memory utilization as a fraction in `[0, 1]`.
pub trait MemoryProbe: Send + Sync {
    fn utilization(&self) -> f64;
}

/// Host memory via `sysinfo`.
pub struct SystemMemoryProbe {
    system: Mutex<System>,
}

impl SystemMemoryProbe {
    #[must_use]
    pub fn new() -> Self {
        let system =
            System::new_with_specifics(RefreshKind::new().with_memory(MemoryRefreshKind::everything()));
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn utilization(&self) -> f64 {
        let mut system = self.system.lock();
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            debug!("Total memory reported as zero; assuming no pressure");
            return 0.0;
        }
        (system.used_memory() as f64 / total as f64).clamp(0.0, 1.0)
    }
}

/// Fixed, settable utilization for tests and simulation.
#[derive(Debug)]
pub struct SimulatedMemoryProbe {
    bits: AtomicU64,
}

impl SimulatedMemoryProbe {
    #[must_use]
    pub fn new(utilization: f64) -> Self {
        Self {
            bits: AtomicU64::new(utilization.clamp(0.0, 1.0).to_bits()),
        }
    }

    pub fn set(&self, utilization: f64) {
        self.bits
            .store(utilization.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

impl MemoryProbe for SimulatedMemoryProbe {
    fn utilization(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_probe() {
        let probe = SimulatedMemoryProbe::new(0.95);
        assert_eq!(probe.utilization(), 0.95);
        probe.set(0.5);
        assert_eq!(probe.utilization(), 0.5);
    }

    #[test]
    fn test_simulated_probe_clamps() {
        let probe = SimulatedMemoryProbe::new(1.7);
        assert_eq!(probe.utilization(), 1.0);
        probe.set(-0.2);
        assert_eq!(probe.utilization(), 0.0);
    }

    #[test]
    fn test_system_probe_in_range() {
        let probe = SystemMemoryProbe::new();
        let u = probe.utilization();
        assert!((0.0..=1.0).contains(&u));
    }
}
