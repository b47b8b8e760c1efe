// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the cache engine.

use crate::predictor::TrainingSummary;
use crate::pressure::PressureReport;

/// Engine lifecycle state.
///
/// Use [`super::CacheEngine::state()`] to check the current state or
/// [`super::CacheEngine::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created, background loops not started. Foreground calls work.
    Created,
    /// Background loops running
    Running,
    /// Stop signal sent, waiting for the loops to exit
    ShuttingDown,
    /// Background loops have exited
    Stopped,
}

impl EngineState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Outcome of one manual maintenance pass.
///
/// Returned by [`super::CacheEngine::tick()`].
#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceReport {
    pub expired: usize,
    pub patterns: usize,
    pub recommendations_applied: usize,
    /// Set when the predictor retrained this pass
    pub training: Option<TrainingSummary>,
    pub pressure: PressureReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_labels() {
        assert_eq!(EngineState::Created.to_string(), "Created");
        assert_eq!(EngineState::ShuttingDown.as_str(), "shutting_down");
        assert_eq!(EngineState::Stopped.as_str(), "stopped");
    }
}
