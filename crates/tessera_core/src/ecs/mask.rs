//! # Component Masks
//!
//! Fixed-width bitset over component ids. One mask identifies one archetype.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

use super::component::ComponentId;

/// Number of distinct component ids a world can hold.
pub const MASK_TOTAL_BITS: usize = 256;

const WORDS: usize = MASK_TOTAL_BITS / 64;

/// A set of component ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mask {
    bits: [u64; WORDS],
}

impl Mask {
    /// The empty set.
    pub const EMPTY: Self = Self { bits: [0; WORDS] };

    /// Builds a mask from ids. Repeated ids are folded.
    #[must_use]
    pub fn new(ids: &[ComponentId]) -> Self {
        ids.iter().copied().collect()
    }

    /// Checks membership of `id`.
    #[inline]
    #[must_use]
    pub const fn get(&self, id: ComponentId) -> bool {
        let i = id.index();
        (self.bits[i / 64] >> (i % 64)) & 1 == 1
    }

    /// Sets or clears `id`.
    #[inline]
    pub fn set(&mut self, id: ComponentId, value: bool) {
        let i = id.index();
        if value {
            self.bits[i / 64] |= 1 << (i % 64);
        } else {
            self.bits[i / 64] &= !(1 << (i % 64));
        }
    }

    /// Copy with `id` set.
    #[inline]
    #[must_use]
    pub fn with(mut self, id: ComponentId) -> Self {
        self.set(id, true);
        self
    }

    /// Copy with `id` cleared.
    #[inline]
    #[must_use]
    pub fn without(mut self, id: ComponentId) -> Self {
        self.set(id, false);
        self
    }

    /// Checks that every id in `other` is also in `self`.
    #[inline]
    #[must_use]
    pub fn contains_all(&self, other: &Self) -> bool {
        self.bits
            .iter()
            .zip(other.bits.iter())
            .all(|(a, b)| a & b == *b)
    }

    /// Checks that `self` and `other` share at least one id.
    #[inline]
    #[must_use]
    pub fn contains_any(&self, other: &Self) -> bool {
        self.bits
            .iter()
            .zip(other.bits.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Checks for the empty set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    /// Number of ids in the set.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Ids in `self` that are not in `other`.
    #[inline]
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut out = *self;
        for (a, b) in out.bits.iter_mut().zip(other.bits.iter()) {
            *a &= !b;
        }
        out
    }

    /// Iterates the ids in ascending order.
    #[must_use]
    pub fn iter(&self) -> MaskIter<'_> {
        MaskIter {
            bits: &self.bits,
            word_idx: 0,
            current_word: self.bits[0],
        }
    }
}

/// Iterator over the ids of a [`Mask`].
pub struct MaskIter<'a> {
    bits: &'a [u64; WORDS],
    word_idx: usize,
    current_word: u64,
}

impl<'a> Iterator for MaskIter<'a> {
    type Item = ComponentId;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_word != 0 {
                let bit = self.current_word.trailing_zeros() as usize;
                self.current_word &= self.current_word - 1;
                #[allow(clippy::cast_possible_truncation)]
                return Some(ComponentId::from_raw((self.word_idx * 64 + bit) as u8));
            }
            self.word_idx += 1;
            if self.word_idx >= WORDS {
                return None;
            }
            self.current_word = self.bits[self.word_idx];
        }
    }
}

impl<'a> IntoIterator for &'a Mask {
    type Item = ComponentId;
    type IntoIter = MaskIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<ComponentId> for Mask {
    fn from_iter<I: IntoIterator<Item = ComponentId>>(iter: I) -> Self {
        let mut mask = Self::EMPTY;
        for id in iter {
            mask.set(id, true);
        }
        mask
    }
}

macro_rules! word_op {
    ($trait:ident, $fn:ident, $op:tt) => {
        impl $trait for Mask {
            type Output = Self;

            #[inline]
            fn $fn(mut self, rhs: Self) -> Self {
                for (a, b) in self.bits.iter_mut().zip(rhs.bits.iter()) {
                    *a = *a $op *b;
                }
                self
            }
        }
    };
}

word_op!(BitAnd, bitand, &);
word_op!(BitOr, bitor, |);
word_op!(BitXor, bitxor, ^);

impl Not for Mask {
    type Output = Self;

    #[inline]
    fn not(mut self) -> Self {
        for w in &mut self.bits {
            *w = !*w;
        }
        self
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(ComponentId::raw)).finish()
    }
}
