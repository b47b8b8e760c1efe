// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Power-of-two size classes.

/// A rounded allocation size. Always a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SizeClass(usize);

impl SizeClass {
    /// Smallest power of two `>= max(size, min_class)`. `None` when that
    /// would overflow `usize`.
    #[must_use]
    pub fn classify(size: usize, min_class: usize) -> Option<Self> {
        size.max(min_class).max(1).checked_next_power_of_two().map(Self)
    }

    /// Block size in bytes.
    #[must_use]
    pub fn bytes(self) -> usize {
        self.0
    }

    /// log2 of the block size; used as the free-list slot.
    #[must_use]
    pub fn index(self) -> usize {
        self.0.trailing_zeros() as usize
    }

    /// Number of distinct classes addressable on this platform.
    #[must_use]
    pub const fn slot_count() -> usize {
        usize::BITS as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rounds_up() {
        assert_eq!(SizeClass::classify(1, 64).unwrap().bytes(), 64);
        assert_eq!(SizeClass::classify(64, 64).unwrap().bytes(), 64);
        assert_eq!(SizeClass::classify(65, 64).unwrap().bytes(), 128);
        assert_eq!(SizeClass::classify(1000, 64).unwrap().bytes(), 1024);
        assert_eq!(SizeClass::classify(4097, 64).unwrap().bytes(), 8192);
    }

    #[test]
    fn test_zero_size_uses_minimum() {
        assert_eq!(SizeClass::classify(0, 64).unwrap().bytes(), 64);
        assert_eq!(SizeClass::classify(0, 0).unwrap().bytes(), 1);
    }

    #[test]
    fn test_min_class_rounded_to_power_of_two() {
        assert_eq!(SizeClass::classify(10, 100).unwrap().bytes(), 128);
    }

    #[test]
    fn test_overflow_is_none() {
        assert!(SizeClass::classify(usize::MAX, 64).is_none());
    }

    #[test]
    fn test_index_is_log2() {
        assert_eq!(SizeClass::classify(64, 64).unwrap().index(), 6);
        assert_eq!(SizeClass::classify(1024, 64).unwrap().index(), 10);
        assert!(SizeClass::classify(1 << 40, 64).unwrap().index() < SizeClass::slot_count());
    }
}
