//! Canonical splits (bipartitions) over a taxon registry.
//!
//! # Overview
//! Removing one edge from a tree partitions the taxa into two sides. Either
//! side identifies the bipartition, so raw subtree masks are canonicalized
//! before they are stored or compared: the kept side is the one that does
//! NOT contain taxon index 0. A mask and its complement therefore collapse
//! to the same [`Split`] key, which is what makes split counting across
//! trees meaningful.

use itertools::Itertools;

use crate::bitset::Bitset;
use crate::taxa::TaxonRegistry;

/// One side of a bipartition, stored in canonical orientation.
///
/// Ordering and hashing delegate to the underlying [`Bitset`], giving a
/// deterministic sort order for table output and threshold tie-breaking.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Split {
    bits: Bitset,
}

impl Split {
    /// Canonicalizes a raw subtree mask into a split key.
    ///
    /// If the mask contains taxon 0 it is flipped to its complement within
    /// `all_taxa`, so the stored side never holds bit 0.
    ///
    /// # Example
    /// ```
    /// # use rust_python_tree_consensus::bitset::Bitset;
    /// # use rust_python_tree_consensus::split::Split;
    /// let all_taxa = Bitset::full(4);
    ///
    /// let mut side = Bitset::zeros(1);
    /// side.set(2);
    /// side.set(3);
    /// let split = Split::canonical(side.clone(), &all_taxa);
    ///
    /// // The complement {0, 1} canonicalizes to the same key.
    /// let flipped = Split::canonical(side.complement_within(&all_taxa), &all_taxa);
    /// assert_eq!(split, flipped);
    /// assert!(!split.contains(0));
    /// ```
    pub fn canonical(raw: Bitset, all_taxa: &Bitset) -> Self {
        if raw.get(0) {
            Split { bits: raw.complement_within(all_taxa) }
        } else {
            Split { bits: raw }
        }
    }

    /// The canonical side's bitmask.
    pub fn mask(&self) -> &Bitset {
        &self.bits
    }

    /// Number of taxa on the canonical side.
    pub fn population(&self) -> usize {
        self.bits.count_ones()
    }

    /// True if the taxon at `index` is on the canonical side.
    pub fn contains(&self, index: usize) -> bool {
        self.bits.get(index)
    }

    /// True if this split isolates at most one taxon on either side.
    ///
    /// Pendant edges give population 1, the edge above taxon 0 gives
    /// population N-1, and the root's own mask canonicalizes to population
    /// 0. None of them carry topology information.
    pub fn is_trivial(&self, num_taxa: usize) -> bool {
        let population = self.population();
        population <= 1 || population + 1 >= num_taxa
    }

    /// Compatibility test between two canonical splits.
    ///
    /// Two bipartitions are compatible iff at least one of the four
    /// intersections between their sides is empty. Both canonical sides
    /// exclude taxon 0, so both complements contain it and their
    /// intersection is never empty; what remains is disjointness or
    /// containment either way.
    pub fn is_compatible_with(&self, other: &Split) -> bool {
        !self.bits.intersects(&other.bits)
            || self.bits.is_subset_of(&other.bits)
            || other.bits.is_subset_of(&self.bits)
    }

    /// Renders the bipartition as a newick-like string.
    ///
    /// The canonical side is grouped as one clade, the complement spread
    /// around it: `(out,...,(in,...))`. Taxa appear in index order, so the
    /// rendering is deterministic for a given registry.
    pub fn newick_string(&self, registry: &TaxonRegistry) -> String {
        let outside = (0..registry.len())
            .filter(|ix| !self.bits.get(*ix))
            .filter_map(|ix| registry.label(ix))
            .join(",");
        if self.bits.is_empty() {
            return format!("({outside})");
        }
        let inside = self
            .bits
            .ones()
            .filter_map(|ix| registry.label(ix))
            .join(",");
        format!("({outside},({inside}))")
    }
}
