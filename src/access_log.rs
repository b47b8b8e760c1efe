// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded ring buffer of recent cache operations.
//!
//! The hierarchy is the only producer. Analysis jobs never read the live
//! buffer directly; they take a [`AccessLog::snapshot`] and work on the copy,
//! so foreground operations only ever contend on a short push.
//!
//! ```
//! use tiered_cache::access_log::{AccessLog, AccessOperation};
//!
//! let log = AccessLog::new(2);
//! log.record(b"a", AccessOperation::Get, false);
//! log.record(b"b", AccessOperation::Set, false);
//! log.record(b"c", AccessOperation::Get, true);
//!
//! let snapshot = log.snapshot();
//! assert_eq!(snapshot.len(), 2); // oldest dropped
//! assert_eq!(snapshot[0].key, b"b".to_vec());
//! assert_eq!(log.total_appended(), 3);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Kind of cache operation recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessOperation {
    Get,
    Set,
    Delete,
    Invalidate,
}

impl fmt::Display for AccessOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Delete => "delete",
            Self::Invalidate => "invalidate",
        };
        f.write_str(name)
    }
}

/// One recorded cache operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRecord {
    pub timestamp: DateTime<Utc>,
    pub key: Vec<u8>,
    pub operation: AccessOperation,
    /// Only meaningful for `Get`; always false otherwise.
    pub hit: bool,
}

impl AccessRecord {
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>, operation: AccessOperation, hit: bool) -> Self {
        Self::at(Utc::now(), key, operation, hit)
    }

    /// Build a record with an explicit timestamp (replay, tests).
    #[must_use]
    pub fn at(
        timestamp: DateTime<Utc>,
        key: impl Into<Vec<u8>>,
        operation: AccessOperation,
        hit: bool,
    ) -> Self {
        Self {
            timestamp,
            key: key.into(),
            operation,
            hit,
        }
    }

    /// True for operations that count as traffic on the key.
    #[must_use]
    pub fn is_access(&self) -> bool {
        matches!(self.operation, AccessOperation::Get | AccessOperation::Set)
    }
}

/// Append-only ring buffer; the oldest record is dropped on overflow.
pub struct AccessLog {
    records: Mutex<VecDeque<AccessRecord>>,
    capacity: usize,
    appended: AtomicU64,
}

impl AccessLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            appended: AtomicU64::new(0),
        }
    }

    pub fn record(&self, key: &[u8], operation: AccessOperation, hit: bool) {
        self.push(AccessRecord::new(key, operation, hit));
    }

    pub fn push(&self, record: AccessRecord) {
        {
            let mut records = self.records.lock();
            if records.len() >= self.capacity {
                records.pop_front();
            }
            records.push_back(record);
        }
        self.appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy of the current contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AccessRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Records ever appended, including ones since dropped.
    #[must_use]
    pub fn total_appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Default for AccessLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}
