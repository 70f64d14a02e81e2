//! Signature -> archetype lookup.
//!
//! Every structural edit resolves its destination archetype through
//! [`ArchetypeIndex`], so lookup must stay O(1) amortized regardless of how
//! many archetypes exist. The table is open-addressed with linear probing,
//! keyed by [`Signature::hash_value`]. Collisions are resolved by full
//! signature equality, never by hash equality alone.

use tracing::debug;

use crate::archetype::ArchetypeId;
use crate::signature::Signature;

/// Smallest slot count the table will use.
const MIN_SLOTS: usize = 8;

#[derive(Debug, Clone)]
struct Slot {
    hash: u64,
    signature: Signature,
    archetype: ArchetypeId,
}

/// Open-addressed, linear-probed map from [`Signature`] to [`ArchetypeId`].
///
/// The slot count is always a power of two. The table doubles and rehashes
/// once an insert would push the load factor past 70%.
#[derive(Debug, Clone)]
pub struct ArchetypeIndex {
    slots: Vec<Option<Slot>>,
    len: usize,
}

impl ArchetypeIndex {
    /// Create a table with room for at least `slots` entries before probing
    /// degrades. Rounded up to a power of two, minimum 8.
    pub fn with_slots(slots: usize) -> Self {
        let capacity = slots.max(MIN_SLOTS).next_power_of_two();
        Self {
            slots: vec![None; capacity],
            len: 0,
        }
    }

    /// Number of signatures stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the table holds no signatures.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current slot count.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    /// Find the archetype stored for `signature`.
    pub fn get(&self, signature: &Signature) -> Option<ArchetypeId> {
        let hash = signature.hash_value();
        let mask = self.mask();
        let mut pos = hash as usize & mask;
        loop {
            match &self.slots[pos] {
                None => return None,
                Some(slot) if slot.hash == hash && slot.signature == *signature => {
                    return Some(slot.archetype);
                }
                Some(_) => pos = (pos + 1) & mask,
            }
        }
    }

    /// Insert `signature -> archetype`. The caller guarantees `signature` is
    /// not already present.
    pub fn insert(&mut self, signature: Signature, archetype: ArchetypeId) {
        debug_assert!(self.get(&signature).is_none());
        if (self.len + 1) * 10 > self.slots.len() * 7 {
            self.grow();
        }
        let hash = signature.hash_value();
        Self::place(
            &mut self.slots,
            Slot {
                hash,
                signature,
                archetype,
            },
        );
        self.len += 1;
    }

    fn place(slots: &mut [Option<Slot>], slot: Slot) {
        let mask = slots.len() - 1;
        let mut pos = slot.hash as usize & mask;
        while slots[pos].is_some() {
            pos = (pos + 1) & mask;
        }
        slots[pos] = Some(slot);
    }

    fn grow(&mut self) {
        let new_capacity = self.slots.len() * 2;
        debug!(
            old_capacity = self.slots.len(),
            new_capacity,
            entries = self.len,
            "growing archetype index"
        );
        let old = std::mem::replace(&mut self.slots, vec![None; new_capacity]);
        for slot in old.into_iter().flatten() {
            Self::place(&mut self.slots, slot);
        }
    }
}

impl Default for ArchetypeIndex {
    fn default() -> Self {
        Self::with_slots(MIN_SLOTS)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentKind;

    fn sig(ids: &[usize]) -> Signature {
        ids.iter().map(|&i| ComponentKind::from_index(i)).collect()
    }

    #[test]
    fn capacity_is_power_of_two() {
        assert_eq!(ArchetypeIndex::with_slots(0).capacity(), 8);
        assert_eq!(ArchetypeIndex::with_slots(9).capacity(), 16);
        assert_eq!(ArchetypeIndex::with_slots(64).capacity(), 64);
    }

    #[test]
    fn insert_then_get() {
        let mut index = ArchetypeIndex::default();
        index.insert(sig(&[0, 1]), ArchetypeId(0));
        index.insert(sig(&[1]), ArchetypeId(1));
        index.insert(Signature::new(), ArchetypeId(2));
        assert_eq!(index.get(&sig(&[1, 0])), Some(ArchetypeId(0)));
        assert_eq!(index.get(&sig(&[1])), Some(ArchetypeId(1)));
        assert_eq!(index.get(&Signature::new()), Some(ArchetypeId(2)));
        assert_eq!(index.get(&sig(&[2])), None);
    }

    #[test]
    fn grows_past_seventy_percent() {
        let mut index = ArchetypeIndex::with_slots(8);
        for i in 0..5 {
            index.insert(sig(&[i]), ArchetypeId(i as u32));
        }
        assert_eq!(index.capacity(), 8);
        index.insert(sig(&[5]), ArchetypeId(5));
        assert_eq!(index.capacity(), 16);
        for i in 0..6 {
            assert_eq!(index.get(&sig(&[i])), Some(ArchetypeId(i as u32)));
        }
    }

    #[test]
    fn many_signatures_survive_rehash() {
        let mut index = ArchetypeIndex::default();
        for i in 0..500usize {
            index.insert(sig(&[i % 37, 40 + i]), ArchetypeId(i as u32));
        }
        assert_eq!(index.len(), 500);
        assert!(index.capacity().is_power_of_two());
        assert!(index.len() * 10 <= index.capacity() * 7);
        for i in 0..500usize {
            assert_eq!(index.get(&sig(&[i % 37, 40 + i])), Some(ArchetypeId(i as u32)));
        }
    }
}
