// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transparent payload compression for cache entries.
//!
//! Payloads above the configured threshold are zstd-compressed on `set`
//! and decompressed on `get`. The compressed form is only kept when it is
//! actually smaller than the original, so `size_bytes` never grows.
//!
//! # Feature Flag
//!
//! Compression requires the `compression` feature (enabled by default).
//! Without it every payload is stored verbatim.
//!
//! ```rust,ignore
//! use tiered_cache::compression::{encode_payload, decode_payload};
//!
//! let data = vec![b'a'; 4096];
//! let encoded = encode_payload(data.clone(), 1024)?;
//! assert!(encoded.compressed);
//! assert_eq!(decode_payload(&encoded.bytes, encoded.compressed)?, data);
//! ```

/// Default compression level (3 is a good balance of speed/ratio)
#[cfg(feature = "compression")]
const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Compression error types
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// Failed to compress data
    #[error("compression failed: {0}")]
    CompressFailed(String),

    /// Failed to decompress data
    #[error("decompression failed: {0}")]
    DecompressFailed(String),
}

/// A payload ready to be stored in a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub bytes: Vec<u8>,
    pub compressed: bool,
    pub original_bytes: usize,
}

/// Prepare a payload for storage, compressing it when it exceeds `threshold`.
#[cfg(feature = "compression")]
pub fn encode_payload(data: Vec<u8>, threshold: usize) -> Result<EncodedPayload, CompressionError> {
    let original_bytes = data.len();
    if original_bytes <= threshold {
        return Ok(EncodedPayload { bytes: data, compressed: false, original_bytes });
    }

    let packed = zstd::encode_all(data.as_slice(), DEFAULT_COMPRESSION_LEVEL)
        .map_err(|e| CompressionError::CompressFailed(e.to_string()))?;
    if packed.len() < original_bytes {
        crate::metrics::record_compression(CompressionStats::new(original_bytes, packed.len()));
        Ok(EncodedPayload { bytes: packed, compressed: true, original_bytes })
    } else {
        Ok(EncodedPayload { bytes: data, compressed: false, original_bytes })
    }
}

/// Restore a stored payload to its original bytes.
#[cfg(feature = "compression")]
pub fn decode_payload(data: &[u8], compressed: bool) -> Result<Vec<u8>, CompressionError> {
    if compressed {
        zstd::decode_all(data)
            .map_err(|e| CompressionError::DecompressFailed(e.to_string()))
    } else {
        Ok(data.to_vec())
    }
}

/// Compression statistics for a single operation.
#[derive(Debug, Clone, Copy)]
pub struct CompressionStats {
    /// Original size in bytes
    pub original_bytes: usize,
    /// Compressed size in bytes
    pub compressed_bytes: usize,
    /// Compression ratio (original / compressed)
    pub ratio: f64,
    /// Space saved as percentage (0.0 - 1.0)
    pub savings: f64,
}

impl CompressionStats {
    /// Calculate stats from original and compressed sizes.
    #[must_use]
    pub fn new(original_bytes: usize, compressed_bytes: usize) -> Self {
        let ratio = if compressed_bytes > 0 {
            original_bytes as f64 / compressed_bytes as f64
        } else {
            0.0
        };
        let savings = if original_bytes > 0 {
            1.0 - (compressed_bytes as f64 / original_bytes as f64)
        } else {
            0.0
        };
        Self {
            original_bytes,
            compressed_bytes,
            ratio,
            savings,
        }
    }
}

// ============================================================================
// Pass-through implementations when compression feature is disabled
// ============================================================================

#[cfg(not(feature = "compression"))]
pub fn encode_payload(data: Vec<u8>, _threshold: usize) -> Result<EncodedPayload, CompressionError> {
    let original_bytes = data.len();
    Ok(EncodedPayload { bytes: data, compressed: false, original_bytes })
}

#[cfg(not(feature = "compression"))]
pub fn decode_payload(data: &[u8], compressed: bool) -> Result<Vec<u8>, CompressionError> {
    if compressed {
        return Err(CompressionError::DecompressFailed(
            "payload is compressed but the compression feature is disabled".into(),
        ));
    }
    Ok(data.to_vec())
}
