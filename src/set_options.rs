// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-write options for [`CacheHierarchy::set`](crate::CacheHierarchy::set).
//!
//! # Example
//!
//! ```
//! use tiered_cache::{SetOptions, CacheTtl};
//! use std::time::Duration;
//!
//! // Default: config default TTL, no tags, lowest priority
//! let opts = SetOptions::default();
//! assert_eq!(opts.priority, 1);
//!
//! // Standard 15 minute TTL, tagged for group invalidation, high priority
//! let opts = SetOptions::with_ttl(CacheTtl::Medium)
//!     .tag("user:42")
//!     .tag("profile")
//!     .priority(5);
//! assert_eq!(opts.ttl, Some(Duration::from_secs(15 * 60)));
//! assert!(opts.tags.contains("profile"));
//! ```

use std::collections::HashSet;
use std::time::Duration;

/// Lowest caller priority hint.
pub const MIN_PRIORITY: u8 = 1;
/// Highest caller priority hint.
pub const MAX_PRIORITY: u8 = 5;

/// Standard cache TTL values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTtl {
    /// 1 minute - very short-lived cache
    Minute,
    /// 5 minutes - short cache
    Short,
    /// 15 minutes - medium cache
    Medium,
    /// 1 hour - standard cache (most common)
    Hour,
    /// 24 hours - long cache
    Day,
    /// 7 days - very long cache
    Week,
    /// Custom duration in seconds
    Custom(u64),
}

impl CacheTtl {
    #[must_use]
    pub fn custom_secs(secs: u64) -> Self {
        Self::Custom(secs)
    }

    #[must_use]
    pub fn to_duration(self) -> Duration {
        match self {
            CacheTtl::Minute => Duration::from_secs(60),
            CacheTtl::Short => Duration::from_secs(5 * 60),
            CacheTtl::Medium => Duration::from_secs(15 * 60),
            CacheTtl::Hour => Duration::from_secs(60 * 60),
            CacheTtl::Day => Duration::from_secs(24 * 60 * 60),
            CacheTtl::Week => Duration::from_secs(7 * 24 * 60 * 60),
            CacheTtl::Custom(secs) => Duration::from_secs(secs),
        }
    }
}

impl From<CacheTtl> for Duration {
    fn from(ttl: CacheTtl) -> Self {
        ttl.to_duration()
    }
}

/// Options controlling how an entry is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOptions {
    /// Time-to-live. `None` falls back to the configured default TTL.
    pub ttl: Option<Duration>,

    /// Tags for group invalidation.
    pub tags: HashSet<String>,

    /// Caller priority hint, 1 (lowest) to 5 (highest). Out-of-range
    /// values are clamped when the entry is stored.
    pub priority: u8,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            tags: HashSet::new(),
            priority: MIN_PRIORITY,
        }
    }
}

impl SetOptions {
    #[must_use]
    pub fn with_ttl(ttl: impl Into<Duration>) -> Self {
        Self {
            ttl: Some(ttl.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn ttl(mut self, ttl: impl Into<Duration>) -> Self {
        self.ttl = Some(ttl.into());
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Priority clamped to the valid range.
    #[must_use]
    pub fn effective_priority(&self) -> u8 {
        self.priority.clamp(MIN_PRIORITY, MAX_PRIORITY)
    }
}
