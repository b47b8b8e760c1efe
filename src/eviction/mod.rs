// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Eviction policies for the cache hierarchy.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Eviction Module                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  strategy.rs   - EvictionStrategy (lru/lfu/adaptive/fifo/ttl)│
//! │  └─ stored as an atomic u8 in the hierarchy                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  scoring.rs    - EvictionPolicy                              │
//! │  └─ rank(): victim order per strategy                        │
//! │  └─ batch_size(): ceil(fraction × resident), min 1           │
//! │  └─ adaptive_score(): probability + count + priority         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The hierarchy snapshots entry metadata, ranks it here, then removes
//! victims one at a time under the eviction mutex until the pending insert
//! fits. Batch strategies take `ceil(fraction × remaining)` victims per
//! round from the front of the ranked list; adaptive walks it one entry at
//! a time until the budget is restored.

pub mod scoring;
pub mod strategy;

pub use scoring::EvictionPolicy;
pub use strategy::EvictionStrategy;
