//! Taxon registry: stable label-to-index assignment shared across trees.
//!
//! # Overview
//! Every split is a bitmask over taxon indices, so all trees being compared
//! must agree on which taxon owns which bit. A [`TaxonRegistry`] fixes that
//! assignment once, up front, and is then passed by shared reference to the
//! encoders and distributions that need it. There is no process-wide
//! registry; callers construct one explicitly and keep it alive for as long
//! as any split derived from it.
//!
//! Registration is strict: adding a label twice is an error rather than an
//! idempotent lookup, so a typo in a leaf label surfaces immediately instead
//! of silently aliasing two taxa.

use std::collections::HashMap;

use crate::bitset::Bitset;
use crate::error::ConsensusError;

/// A named leaf unit with its assigned bit position.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Taxon {
    label: String,
    index: usize,
}

impl Taxon {
    /// The taxon's label as it appears in tree files.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The taxon's bit position in every split over this registry.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Ordered set of taxa with unique labels and dense, stable indices.
///
/// Indices are assigned in registration order, starting at 0, and never
/// change once assigned. Splits, distributions, and consensus trees all
/// borrow the registry they were built over.
///
/// # Example
/// ```
/// # use rust_python_tree_consensus::taxa::TaxonRegistry;
/// let registry = TaxonRegistry::from_labels(["A", "B", "C"]).unwrap();
/// assert_eq!(registry.index_of("B").unwrap(), 1);
/// assert_eq!(registry.all_taxa_bitmask().count_ones(), 3);
/// ```
#[derive(Clone, Debug, Default)]
pub struct TaxonRegistry {
    taxa: Vec<Taxon>,
    by_label: HashMap<String, usize>,
}

impl TaxonRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        TaxonRegistry::default()
    }

    /// Builds a registry from labels in iteration order.
    ///
    /// Fails with [`ConsensusError::DuplicateLabel`] on a repeated label.
    pub fn from_labels<I, S>(labels: I) -> Result<Self, ConsensusError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = TaxonRegistry::new();
        for label in labels {
            registry.add_taxon(label)?;
        }
        Ok(registry)
    }

    /// Registers a new taxon and returns it with its assigned index.
    ///
    /// Fails with [`ConsensusError::DuplicateLabel`] if the label is already
    /// registered; registration is never an idempotent lookup.
    pub fn add_taxon<S: Into<String>>(&mut self, label: S) -> Result<&Taxon, ConsensusError> {
        let label = label.into();
        if self.by_label.contains_key(&label) {
            return Err(ConsensusError::DuplicateLabel(label));
        }
        let index = self.taxa.len();
        self.by_label.insert(label.clone(), index);
        self.taxa.push(Taxon { label, index });
        Ok(&self.taxa[index])
    }

    /// Looks up the index assigned to `label`.
    ///
    /// Fails with [`ConsensusError::UnknownTaxon`] if absent.
    pub fn index_of(&self, label: &str) -> Result<usize, ConsensusError> {
        self.by_label
            .get(label)
            .copied()
            .ok_or_else(|| ConsensusError::UnknownTaxon(label.to_string()))
    }

    /// True if `label` is registered.
    pub fn contains(&self, label: &str) -> bool {
        self.by_label.contains_key(label)
    }

    /// The taxon at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Taxon> {
        self.taxa.get(index)
    }

    /// The label at `index`, if any.
    pub fn label(&self, index: usize) -> Option<&str> {
        self.taxa.get(index).map(|t| t.label.as_str())
    }

    /// Number of registered taxa.
    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    /// True if no taxon is registered.
    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }

    /// Iterates taxa in index order.
    pub fn iter(&self) -> std::slice::Iter<'_, Taxon> {
        self.taxa.iter()
    }

    /// Number of u64 words a bitset over this registry needs.
    pub fn word_count(&self) -> usize {
        self.taxa.len().div_ceil(64)
    }

    /// The mask with every registered taxon's bit set.
    ///
    /// Splits are complemented against this mask, never against raw
    /// all-ones words, so padding bits stay clear.
    pub fn all_taxa_bitmask(&self) -> Bitset {
        Bitset::full(self.taxa.len())
    }
}
