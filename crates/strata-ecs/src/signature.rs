//! Component-set signatures.
//!
//! A [`Signature`] is a bitset over [`ComponentKind`]s: bit `i` is set when the
//! set contains kind `i`. Signatures are the sole identity of an archetype --
//! two archetypes are the same archetype iff their signatures are equal.
//!
//! The word vector grows on demand and is kept canonical (no trailing zero
//! words), so derived equality is set equality and [`Signature::hash_value`]
//! is the same for equal sets regardless of how they were built.

use std::fmt;

use crate::component::ComponentKind;

const WORD_BITS: usize = u64::BITS as usize;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// A set of component kinds, stored as a bitset.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    words: Vec<u64>,
}

impl Signature {
    /// The empty signature.
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Build a signature containing exactly the given kinds.
    pub fn from_kinds<I: IntoIterator<Item = ComponentKind>>(kinds: I) -> Self {
        let mut sig = Self::new();
        for kind in kinds {
            sig.set(kind);
        }
        sig
    }

    #[inline]
    fn split(kind: ComponentKind) -> (usize, u64) {
        let index = kind.index();
        (index / WORD_BITS, 1u64 << (index % WORD_BITS))
    }

    /// Add `kind` to the set.
    pub fn set(&mut self, kind: ComponentKind) {
        let (word, mask) = Self::split(kind);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= mask;
    }

    /// Remove `kind` from the set.
    pub fn unset(&mut self, kind: ComponentKind) {
        let (word, mask) = Self::split(kind);
        if let Some(w) = self.words.get_mut(word) {
            *w &= !mask;
            self.trim();
        }
    }

    /// Returns a copy of this signature with `kind` added.
    pub fn with(&self, kind: ComponentKind) -> Self {
        let mut sig = self.clone();
        sig.set(kind);
        sig
    }

    /// Returns a copy of this signature with `kind` removed.
    pub fn without(&self, kind: ComponentKind) -> Self {
        let mut sig = self.clone();
        sig.unset(kind);
        sig
    }

    /// Returns the union of both signatures.
    pub fn union(&self, other: &Signature) -> Self {
        let (long, short) = if self.words.len() >= other.words.len() {
            (self, other)
        } else {
            (other, self)
        };
        let mut words = long.words.clone();
        for (w, o) in words.iter_mut().zip(&short.words) {
            *w |= *o;
        }
        Self { words }
    }

    /// Whether `kind` is in the set.
    #[inline]
    pub fn test(&self, kind: ComponentKind) -> bool {
        let (word, mask) = Self::split(kind);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    /// Superset test: every kind in `required` is also in `self`.
    pub fn contains(&self, required: &Signature) -> bool {
        if required.words.len() > self.words.len() {
            // Canonical form: the last word of `required` is non-zero and
            // `self` has no bits that far out.
            return false;
        }
        self.words
            .iter()
            .zip(&required.words)
            .all(|(mine, req)| mine & req == *req)
    }

    /// Whether the two sets share at least one kind.
    pub fn intersects(&self, other: &Signature) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .any(|(a, b)| a & b != 0)
    }

    /// Whether the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of kinds in the set.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate the kinds in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(ComponentKind::from_index(i * WORD_BITS + bit))
            })
        })
    }

    /// The highest kind in the set, if any.
    pub fn max_kind(&self) -> Option<ComponentKind> {
        let last = *self.words.last()?;
        let bit = WORD_BITS - 1 - last.leading_zeros() as usize;
        Some(ComponentKind::from_index((self.words.len() - 1) * WORD_BITS + bit))
    }

    /// FNV-1a over the word sequence. Deterministic across runs and equal for
    /// equal signatures; used as the archetype table hash.
    pub fn hash_value(&self) -> u64 {
        self.words.iter().fold(FNV_OFFSET, |h, &w| (h ^ w).wrapping_mul(FNV_PRIME))
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl FromIterator<ComponentKind> for Signature {
    fn from_iter<I: IntoIterator<Item = ComponentKind>>(iter: I) -> Self {
        Self::from_kinds(iter)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|k| k.index())).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
