// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashSet;

use crate::entry::EntryId;
use crate::hierarchy::types::TierStats;

/// One level of the hierarchy. Holds ids only; entries live in the arena.
///
/// Membership changes happen while the caller holds the entry's arena
/// guard (or owns the removed entry), so a live id is in exactly one tier.
#[derive(Default)]
pub(crate) struct Tier {
    ids: DashSet<EntryId>,
    bytes: AtomicUsize,
    hits: AtomicU64,
}

impl Tier {
    pub(crate) fn add(&self, id: EntryId, size: usize) {
        if self.ids.insert(id) {
            self.bytes.fetch_add(size, Ordering::AcqRel);
        }
    }

    /// Returns false if the id was not present.
    pub(crate) fn remove(&self, id: EntryId, size: usize) -> bool {
        if self.ids.remove(&id).is_some() {
            self.bytes.fetch_sub(size, Ordering::AcqRel);
            true
        } else {
            false
        }
    }

    pub(crate) fn contains(&self, id: EntryId) -> bool {
        self.ids.contains(&id)
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn bytes(&self) -> usize {
        self.bytes.load(Ordering::Acquire)
    }

    pub(crate) fn ids(&self) -> Vec<EntryId> {
        self.ids.iter().map(|id| *id).collect()
    }

    /// Replace contents wholesale (heal only).
    pub(crate) fn reset(&self, ids: impl IntoIterator<Item = (EntryId, usize)>) {
        self.ids.clear();
        let mut total = 0;
        for (id, size) in ids {
            self.ids.insert(id);
            total += size;
        }
        self.bytes.store(total, Ordering::Release);
    }

    pub(crate) fn stats(&self, tier: usize) -> TierStats {
        TierStats {
            tier,
            entries: self.len(),
            bytes: self.bytes(),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove_tracks_bytes() {
        let tier = Tier::default();
        tier.add(1, 100);
        tier.add(2, 50);
        tier.add(1, 100); // duplicate ignored
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.bytes(), 150);

        assert!(tier.remove(1, 100));
        assert!(!tier.remove(1, 100));
        assert_eq!(tier.bytes(), 50);
        assert!(tier.contains(2));
    }

    #[test]
    fn test_reset() {
        let tier = Tier::default();
        tier.add(1, 10);
        tier.reset([(7, 70), (8, 80)]);
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.bytes(), 150);
        assert!(!tier.contains(1));
    }
}
