// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Memory tracking: size-class allocator and system memory probes.

pub mod allocator;
pub mod probe;
pub mod size_class;

pub use allocator::{
    AllocationId, MemoryAllocation, MemoryAllocator, MemoryStats, ReclaimOutcome, ReclaimPolicy,
};
pub use probe::{MemoryProbe, SimulatedMemoryProbe, SystemMemoryProbe};
pub use size_class::SizeClass;
