// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Eviction strategy selectable at runtime.
///
/// Ordered roughly by how aggressively the strategy discards recently
/// useful data; the pressure controller moves toward `Fifo` as memory
/// gets scarce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EvictionStrategy {
    /// Least recently accessed first
    Lru = 0,
    /// Least frequently accessed first
    Lfu = 1,
    /// Composite of predicted access probability, access count and priority
    Adaptive = 2,
    /// Oldest insertion first
    Fifo = 3,
    /// Soonest expiry first; entries without a TTL go last
    Ttl = 4,
}

impl EvictionStrategy {
    pub const ALL: [EvictionStrategy; 5] = [
        Self::Lru,
        Self::Lfu,
        Self::Adaptive,
        Self::Fifo,
        Self::Ttl,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Lfu => "lfu",
            Self::Adaptive => "adaptive",
            Self::Fifo => "fifo",
            Self::Ttl => "ttl",
        }
    }

    /// Decode from the atomic representation. Unknown values map to LRU.
    #[must_use]
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Lfu,
            2 => Self::Adaptive,
            3 => Self::Fifo,
            4 => Self::Ttl,
            _ => Self::Lru,
        }
    }
}

impl Default for EvictionStrategy {
    fn default() -> Self {
        Self::Adaptive
    }
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionStrategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "lfu" => Ok(Self::Lfu),
            "adaptive" => Ok(Self::Adaptive),
            "fifo" => Ok(Self::Fifo),
            "ttl" => Ok(Self::Ttl),
            other => Err(CacheError::InvalidConfiguration(format!(
                "unknown eviction strategy '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("LRU".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Lru);
        assert_eq!(" fifo ".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Fifo);
        assert!("random".parse::<EvictionStrategy>().is_err());
    }

    #[test]
    fn test_atomic_repr_round_trips() {
        for strategy in EvictionStrategy::ALL {
            assert_eq!(EvictionStrategy::from_u8(strategy as u8), strategy);
        }
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&EvictionStrategy::Adaptive).unwrap();
        assert_eq!(json, "\"adaptive\"");
        let parsed: EvictionStrategy = serde_json::from_str("\"ttl\"").unwrap();
        assert_eq!(parsed, EvictionStrategy::Ttl);
    }
}
