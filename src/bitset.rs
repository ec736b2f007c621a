//! Compact bitset representation for taxon sets.
//!
//! # Overview
//! A bitset is an efficient way to represent which taxa belong to one side of
//! a split. Each bit position corresponds to a taxon index assigned by a
//! [`TaxonRegistry`](crate::taxa::TaxonRegistry).
//!
//! # Example
//! For a registry with taxa [A, B, C, D] mapped to indices [0, 1, 2, 3]:
//! - Split side {A, C} → bitset `0b0101` (bits 0 and 2 set)
//! - Split side {B, C, D} → bitset `0b1110` (bits 1, 2, 3 set)
//!
//! # Capacity
//! Bits live in `Vec<u64>` words, so the taxon-count ceiling is bound by
//! memory rather than a single machine word. A registry of N taxa needs
//! `N.div_ceil(64)` words per set, and every set derived from that registry
//! shares the same width; the word-wise operations below rely on it.

/// A compact bitset for representing which taxa belong to a split side.
///
/// Internally stores bits in `Vec<u64>` words to support arbitrarily many
/// taxa. Each u64 word holds 64 taxon indices.
///
/// The derived `Ord` compares word 0 first; word 0 holds the lowest taxon
/// indices, so this gives a stable total order used wherever splits must be
/// emitted in a deterministic sequence.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates a new bitset with all bits set to 0.
    ///
    /// # Parameters
    /// - `words`: Number of u64 words needed. Calculate as `num_taxa.div_ceil(64)`
    ///
    /// # Example
    /// ```
    /// # use rust_python_tree_consensus::bitset::Bitset;
    /// // For a registry with 100 taxa, need 2 words (128 bits)
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Creates a bitset with bits `0..bits` set, sized to exactly hold them.
    ///
    /// This is the all-taxa mask for a registry of `bits` taxa.
    ///
    /// # Example
    /// ```
    /// # use rust_python_tree_consensus::bitset::Bitset;
    /// let full = Bitset::full(70);
    /// assert_eq!(full.count_ones(), 70);
    /// assert!(full.get(69));
    /// assert!(!full.get(70));
    /// ```
    pub fn full(bits: usize) -> Self {
        let mut words = vec![u64::MAX; bits.div_ceil(64)];
        let tail = bits & 63;
        if tail != 0 {
            if let Some(last) = words.last_mut() {
                *last = (1u64 << tail) - 1;
            }
        }
        Bitset(words)
    }

    /// Number of u64 words backing this set.
    pub fn word_count(&self) -> usize {
        self.0.len()
    }

    /// Sets the bit at the given index to 1.
    ///
    /// Marks a taxon as present on this split side.
    ///
    /// # Example
    /// ```
    /// # use rust_python_tree_consensus::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);
    /// bs.set(5);
    /// assert_eq!(bs.0[0], 0b00100001);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6;     // Equivalent to idx / 64
        let bit = idx & 63;      // Equivalent to idx % 64
        self.0[word] |= 1u64 << bit;
    }

    /// Reads the bit at the given index. Indices past the width read as 0.
    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        let word = idx >> 6;
        let bit = idx & 63;
        match self.0.get(word) {
            Some(w) => (w >> bit) & 1 == 1,
            None => false,
        }
    }

    /// Performs bitwise OR with another bitset (union operation).
    ///
    /// Merges two taxon sets: `self` becomes `self ∪ other`
    ///
    /// # Example
    /// ```
    /// # use rust_python_tree_consensus::bitset::Bitset;
    /// let mut left = Bitset::zeros(1);
    /// left.set(0);   // {0}
    ///
    /// let mut right = Bitset::zeros(1);
    /// right.set(1);  // {1}
    ///
    /// left.or_assign(&right);  // {0} ∪ {1} = {0, 1}
    /// assert_eq!(left.0[0], 0b11);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Counts the number of set bits (population count).
    ///
    /// Returns how many taxa are on this split side.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    /// True if `self` and `other` share at least one set bit.
    #[inline]
    pub fn intersects(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).any(|(a, b)| a & b != 0)
    }

    /// True if every set bit of `self` is also set in `other`.
    ///
    /// # Example
    /// ```
    /// # use rust_python_tree_consensus::bitset::Bitset;
    /// let mut small = Bitset::zeros(1);
    /// small.set(1);
    /// let mut big = Bitset::zeros(1);
    /// big.set(1);
    /// big.set(3);
    /// assert!(small.is_subset_of(&big));
    /// assert!(!big.is_subset_of(&small));
    /// ```
    #[inline]
    pub fn is_subset_of(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a & !b == 0)
    }

    /// Computes `universe \ self`, word-wise.
    ///
    /// `universe` caps the width, so padding bits past the last taxon never
    /// leak into the complement.
    ///
    /// # Example
    /// ```
    /// # use rust_python_tree_consensus::bitset::Bitset;
    /// let universe = Bitset::full(4);
    /// let mut side = Bitset::zeros(1);
    /// side.set(0);
    /// side.set(1);
    /// let other_side = side.complement_within(&universe);
    /// assert!(other_side.get(2) && other_side.get(3));
    /// assert!(!other_side.get(0) && !other_side.get(1));
    /// ```
    pub fn complement_within(&self, universe: &Bitset) -> Bitset {
        let words = universe
            .0
            .iter()
            .zip(&self.0)
            .map(|(u, s)| u & !s)
            .collect();
        Bitset(words)
    }

    /// Iterates the set bit indices in ascending order.
    pub fn ones(&self) -> Ones<'_> {
        Ones {
            words: &self.0,
            word_ix: 0,
            current: self.0.first().copied().unwrap_or(0),
        }
    }
}

/// Iterator over the set bit indices of a [`Bitset`], ascending.
pub struct Ones<'a> {
    words: &'a [u64],
    word_ix: usize,
    current: u64,
}

impl Iterator for Ones<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.current == 0 {
            self.word_ix += 1;
            if self.word_ix >= self.words.len() {
                return None;
            }
            self.current = self.words[self.word_ix];
        }
        let bit = self.current.trailing_zeros() as usize;
        self.current &= self.current - 1; // clear lowest set bit
        Some((self.word_ix << 6) + bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = Bitset::zeros(1);
        assert!(bs.is_empty());
        bs.set(0);
        bs.set(2);
        assert_eq!(bs.0[0], 0b0101);
        assert!(bs.get(0));
        assert!(!bs.get(1));
        assert!(bs.get(2));
        assert!(!bs.is_empty());
    }

    #[test]
    fn test_get_past_width_is_clear() {
        let bs = Bitset::zeros(1);
        assert!(!bs.get(64));
        assert!(!bs.get(1000));
    }

    #[test]
    fn test_bitset_or() {
        let mut bs1 = Bitset::zeros(1);
        bs1.set(0);
        bs1.set(1);

        let mut bs2 = Bitset::zeros(1);
        bs2.set(2);
        bs2.set(3);

        bs1.or_assign(&bs2);
        assert_eq!(bs1.0[0], 0b1111);
    }

    #[test]
    fn test_count_ones() {
        let mut bs = Bitset::zeros(1);
        bs.set(0);
        bs.set(2);
        bs.set(5);
        assert_eq!(bs.count_ones(), 3);
    }

    #[test]
    fn test_full_mask_has_exact_population() {
        for bits in [1, 5, 63, 64, 65, 128, 130] {
            let full = Bitset::full(bits);
            assert_eq!(full.count_ones(), bits, "width {bits}");
            assert!(!full.get(bits));
        }
    }

    #[test]
    fn test_complement_partitions_the_universe() {
        let universe = Bitset::full(130);
        let mut side = Bitset::zeros(universe.word_count());
        side.set(0);
        side.set(64);
        side.set(129);

        let other = side.complement_within(&universe);
        assert_eq!(side.count_ones() + other.count_ones(), 130);
        assert!(!side.intersects(&other));

        let mut together = side.clone();
        together.or_assign(&other);
        assert_eq!(together, universe);
    }

    #[test]
    fn test_subset_and_intersection() {
        let mut a = Bitset::zeros(2);
        a.set(3);
        a.set(70);

        let mut b = Bitset::zeros(2);
        b.set(3);
        b.set(70);
        b.set(100);

        assert!(a.is_subset_of(&b));
        assert!(!b.is_subset_of(&a));
        assert!(a.intersects(&b));

        let mut c = Bitset::zeros(2);
        c.set(9);
        assert!(!a.intersects(&c));

        // The empty set is a subset of everything.
        assert!(Bitset::zeros(2).is_subset_of(&a));
    }

    #[test]
    fn test_ones_walks_words_in_order() {
        let mut bs = Bitset::zeros(3);
        for idx in [0, 63, 64, 127, 130] {
            bs.set(idx);
        }
        assert_eq!(bs.ones().collect::<Vec<_>>(), vec![0, 63, 64, 127, 130]);
        assert_eq!(Bitset::zeros(2).ones().next(), None);
        assert_eq!(Bitset::zeros(0).ones().next(), None);
    }

    #[test]
    fn test_large_taxon_sets() {
        // More than 64 taxa spills into multiple words.
        let mut bs = Bitset::zeros(2);
        bs.set(0);    // First word
        bs.set(63);   // Last bit of first word
        bs.set(64);   // First bit of second word
        bs.set(127);  // Last bit of second word

        assert_eq!(bs.count_ones(), 4);
        assert_eq!(bs.0[0], 1u64 | (1u64 << 63));
        assert_eq!(bs.0[1], 1u64 | (1u64 << 63));
    }
}
