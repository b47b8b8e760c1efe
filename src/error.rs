// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

use crate::compression::CompressionError;

/// Errors surfaced by the cache and the memory allocator.
///
/// A cache miss is not an error; lookups return `None` instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The entry could not be admitted even after a full eviction pass.
    #[error("capacity exceeded: {requested} bytes requested, budget is {budget} bytes")]
    CapacityExceeded { requested: usize, budget: usize },

    /// The payload could not be encoded or compressed.
    #[error("serialization failed: {0}")]
    SerializationFailure(String),

    /// The allocator could not satisfy a request after reclamation.
    #[error("out of memory: could not allocate {requested} bytes")]
    OutOfMemory { requested: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<CompressionError> for CacheError {
    fn from(e: CompressionError) -> Self {
        Self::SerializationFailure(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationFailure(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_message_includes_sizes() {
        let err = CacheError::CapacityExceeded { requested: 2048, budget: 1024 };
        let msg = err.to_string();
        assert!(msg.contains("2048"));
        assert!(msg.contains("1024"));
    }

    #[test]
    fn test_json_error_maps_to_serialization_failure() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: CacheError = json_err.into();
        assert!(matches!(err, CacheError::SerializationFailure(_)));
    }

    #[test]
    fn test_compression_error_maps_to_serialization_failure() {
        let err: CacheError = CompressionError::CompressFailed("boom".into()).into();
        assert_eq!(err, CacheError::SerializationFailure("compression failed: boom".into()));
    }
}
