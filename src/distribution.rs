//! Split occurrence counting across streams of trees.
//!
//! # Overview
//! A [`SplitDistribution`] accumulates how often each canonical split occurs
//! over a sequence of trees, all encoded against one shared
//! [`TaxonRegistry`]. Trees are consumed one at a time from an iterator, so
//! a file of ten thousand posterior samples never has to be materialized.
//! Once counting is done the distribution answers frequency queries and
//! feeds consensus construction.
//!
//! Distributions built over the *same* registry instance can be merged,
//! which is how per-file counts are combined after parallel processing.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ptr;

use phylotree::tree::Tree as PhyloTree;

use crate::encode::encode_tree;
use crate::error::ConsensusError;
use crate::split::Split;
use crate::taxa::TaxonRegistry;

/// Summary counts over an accumulated distribution.
///
/// Occurrence counts sum multiplicities across trees; unique counts ignore
/// them. Trivial splits (pendant edges and the root mask) are excluded from
/// the nontrivial pair.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SplitCounts {
    pub num_splits: u64,
    pub num_unique_splits: u64,
    pub num_nontrivial_splits: u64,
    pub num_unique_nontrivial_splits: u64,
}

/// Occurrence counts for canonical splits over a fixed taxon registry.
///
/// The registry is borrowed, not owned: every distribution taking part in a
/// comparison shares one registry, and merging checks that it is literally
/// the same instance.
#[derive(Clone, Debug)]
pub struct SplitDistribution<'r> {
    registry: &'r TaxonRegistry,
    counts: HashMap<Split, u64>,
    total_trees: u64,
}

impl<'r> SplitDistribution<'r> {
    /// Creates an empty distribution over `registry`.
    pub fn new(registry: &'r TaxonRegistry) -> Self {
        SplitDistribution {
            registry,
            counts: HashMap::new(),
            total_trees: 0,
        }
    }

    /// The registry this distribution counts against.
    pub fn registry(&self) -> &'r TaxonRegistry {
        self.registry
    }

    /// Encodes one tree and folds its splits into the counts.
    ///
    /// Splits are deduplicated within the tree first: the two root edges of
    /// a bifurcating root canonicalize to one bipartition, and counting it
    /// twice would push frequencies past 1.0. A split's count is therefore
    /// the number of trees containing it.
    ///
    /// Counting is atomic per tree: if encoding fails, neither the counts
    /// nor the tree total move.
    pub fn count_tree(&mut self, tree: &PhyloTree) -> Result<(), ConsensusError> {
        let seen: HashSet<Split> = encode_tree(tree, self.registry)?.collect();
        for split in seen {
            *self.counts.entry(split).or_insert(0) += 1;
        }
        self.total_trees += 1;
        Ok(())
    }

    /// Consumes a stream of parsed trees, counting each one.
    ///
    /// Returns the number of trees consumed from this call. An `Err` item
    /// from the stream (or an encoding failure) aborts the walk and
    /// propagates; trees counted before the failure stay counted. Callers
    /// that want to skip bad records filter the stream before handing it
    /// over. An empty stream is fine and counts zero trees.
    pub fn count_splits_on_trees<I>(&mut self, trees: I) -> Result<u64, ConsensusError>
    where
        I: IntoIterator<Item = Result<PhyloTree, ConsensusError>>,
    {
        let mut consumed = 0u64;
        for tree in trees {
            self.count_tree(&tree?)?;
            consumed += 1;
        }
        Ok(consumed)
    }

    /// Total number of trees counted so far.
    pub fn total_trees(&self) -> u64 {
        self.total_trees
    }

    /// Occurrence count for one split, zero if never seen.
    pub fn count_of(&self, split: &Split) -> u64 {
        self.counts.get(split).copied().unwrap_or(0)
    }

    /// Frequency of one split: the fraction of counted trees containing it.
    ///
    /// With zero trees counted "no data" is a valid state, so the answer is
    /// 0.0 rather than NaN.
    pub fn frequency_of(&self, split: &Split) -> f64 {
        if self.total_trees == 0 {
            return 0.0;
        }
        self.count_of(split) as f64 / self.total_trees as f64
    }

    /// Recomputes the frequency of every stored split.
    ///
    /// Rows are sorted by canonical mask, so repeated calls over unchanged
    /// data return identical vectors.
    pub fn calc_freqs(&self) -> Vec<(Split, f64)> {
        let mut freqs: Vec<(Split, f64)> = self
            .counts
            .keys()
            .map(|split| (split.clone(), self.frequency_of(split)))
            .collect();
        freqs.sort_by(|a, b| a.0.cmp(&b.0));
        freqs
    }

    /// Iterates stored splits with their occurrence counts, unordered.
    pub fn splits(&self) -> impl Iterator<Item = (&Split, u64)> {
        self.counts.iter().map(|(split, count)| (split, *count))
    }

    /// The four summary counts derived from the accumulated map.
    pub fn splits_considered(&self) -> SplitCounts {
        let num_taxa = self.registry.len();
        let mut counts = SplitCounts {
            num_splits: 0,
            num_unique_splits: 0,
            num_nontrivial_splits: 0,
            num_unique_nontrivial_splits: 0,
        };
        for (split, count) in &self.counts {
            counts.num_splits += count;
            counts.num_unique_splits += 1;
            if !split.is_trivial(num_taxa) {
                counts.num_nontrivial_splits += count;
                counts.num_unique_nontrivial_splits += 1;
            }
        }
        counts
    }

    /// Folds another distribution's counts into this one.
    ///
    /// The donor is left untouched. Both distributions must have been built
    /// over the same registry *instance*; equal labels in a different
    /// registry still fail with [`ConsensusError::RegistryMismatch`], since
    /// nothing else guarantees the bit assignments line up.
    pub fn merge_from(&mut self, other: &SplitDistribution<'r>) -> Result<(), ConsensusError> {
        if !ptr::eq(self.registry, other.registry) {
            return Err(ConsensusError::RegistryMismatch);
        }
        for (split, count) in &other.counts {
            *self.counts.entry(split.clone()).or_insert(0) += count;
        }
        self.total_trees += other.total_trees;
        Ok(())
    }
}

/// Builds per-file frequency rows for a set of distributions.
///
/// Rows cover the union of splits seen in any distribution, sorted by
/// canonical mask; each row carries one frequency per distribution, 0.0
/// where that file never produced the split. All distributions must share
/// one registry instance.
pub fn frequency_table<'a>(
    distributions: &'a [SplitDistribution<'_>],
    include_trivial: bool,
) -> Result<Vec<(&'a Split, Vec<f64>)>, ConsensusError> {
    let Some(first) = distributions.first() else {
        return Ok(Vec::new());
    };
    if distributions
        .iter()
        .any(|dist| !ptr::eq(dist.registry, first.registry))
    {
        return Err(ConsensusError::RegistryMismatch);
    }

    let num_taxa = first.registry.len();
    let mut keys: BTreeSet<&Split> = BTreeSet::new();
    for dist in distributions {
        for (split, _) in dist.splits() {
            if include_trivial || !split.is_trivial(num_taxa) {
                keys.insert(split);
            }
        }
    }

    Ok(keys
        .into_iter()
        .map(|split| {
            let row = distributions
                .iter()
                .map(|dist| dist.frequency_of(split))
                .collect();
            (split, row)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::Bitset;

    fn registry_abcd() -> TaxonRegistry {
        TaxonRegistry::from_labels(["A", "B", "C", "D"]).unwrap()
    }

    fn split_of(indices: &[usize], registry: &TaxonRegistry) -> Split {
        let mut bits = Bitset::zeros(registry.word_count());
        for ix in indices {
            bits.set(*ix);
        }
        Split::canonical(bits, &registry.all_taxa_bitmask())
    }

    fn trees(newicks: &[&str]) -> Vec<Result<PhyloTree, ConsensusError>> {
        newicks
            .iter()
            .map(|n| Ok(PhyloTree::from_newick(n).unwrap()))
            .collect()
    }

    #[test]
    fn test_counting_accumulates_occurrences() {
        let registry = registry_abcd();
        let mut dist = SplitDistribution::new(&registry);
        let consumed = dist
            .count_splits_on_trees(trees(&["((A,B),(C,D));", "((A,B),(C,D));"]))
            .unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(dist.total_trees(), 2);

        // Both root edges canonicalize to {C,D}, but a tree still counts once.
        let cd = split_of(&[2, 3], &registry);
        assert_eq!(dist.count_of(&cd), 2);
        assert_eq!(dist.frequency_of(&cd), 1.0);

        let unseen = split_of(&[1, 3], &registry);
        assert_eq!(dist.count_of(&unseen), 0);
        assert_eq!(dist.frequency_of(&unseen), 0.0);
    }

    #[test]
    fn test_empty_stream_counts_zero() {
        let registry = registry_abcd();
        let mut dist = SplitDistribution::new(&registry);
        let consumed = dist.count_splits_on_trees(std::iter::empty()).unwrap();
        assert_eq!(consumed, 0);
        assert_eq!(dist.total_trees(), 0);
        assert!(dist.calc_freqs().is_empty());

        // No data, not NaN.
        let cd = split_of(&[2, 3], &registry);
        assert_eq!(dist.frequency_of(&cd), 0.0);
    }

    #[test]
    fn test_majority_frequencies_over_five_trees() {
        let registry = registry_abcd();
        let mut dist = SplitDistribution::new(&registry);
        dist.count_splits_on_trees(trees(&[
            "((A,B),(C,D));",
            "((A,B),(C,D));",
            "((A,B),(C,D));",
            "((A,C),(B,D));",
            "((A,C),(B,D));",
        ]))
        .unwrap();
        assert_eq!(dist.total_trees(), 5);

        let cd = split_of(&[2, 3], &registry);
        let bd = split_of(&[1, 3], &registry);
        assert_eq!(dist.count_of(&cd), 3);
        assert!((dist.frequency_of(&cd) - 0.6).abs() < 1e-12);
        assert_eq!(dist.count_of(&bd), 2);
        assert!((dist.frequency_of(&bd) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_queries_are_idempotent() {
        let registry = registry_abcd();
        let mut dist = SplitDistribution::new(&registry);
        dist.count_splits_on_trees(trees(&["((A,B),(C,D));", "(A,(B,(C,D)));"]))
            .unwrap();

        assert_eq!(dist.calc_freqs(), dist.calc_freqs());
        assert_eq!(dist.splits_considered(), dist.splits_considered());
        // Interleaving the two queries changes nothing either.
        let before = dist.calc_freqs();
        let _ = dist.splits_considered();
        assert_eq!(before, dist.calc_freqs());
    }

    #[test]
    fn test_splits_considered_breakdown() {
        let registry = registry_abcd();
        let mut dist = SplitDistribution::new(&registry);
        dist.count_splits_on_trees(trees(&["((A,B),(C,D));", "((A,B),(C,D));"]))
            .unwrap();

        // Five distinct splits per tree: {C,D}, {B,C,D}, {B}, {C}, {D}.
        // Only {C,D} is non-trivial over four taxa.
        assert_eq!(
            dist.splits_considered(),
            SplitCounts {
                num_splits: 10,
                num_unique_splits: 5,
                num_nontrivial_splits: 2,
                num_unique_nontrivial_splits: 1,
            }
        );
    }

    #[test]
    fn test_merge_equals_concatenation() {
        let registry = registry_abcd();
        let first = ["((A,B),(C,D));", "((A,C),(B,D));"];
        let second = ["((A,B),(C,D));", "(A,(B,(C,D)));", "((A,D),(B,C));"];

        let mut left = SplitDistribution::new(&registry);
        left.count_splits_on_trees(trees(&first)).unwrap();
        let mut right = SplitDistribution::new(&registry);
        right.count_splits_on_trees(trees(&second)).unwrap();

        let mut combined = SplitDistribution::new(&registry);
        let all: Vec<&str> = first.iter().chain(second.iter()).copied().collect();
        combined.count_splits_on_trees(trees(&all)).unwrap();

        left.merge_from(&right).unwrap();
        assert_eq!(left.total_trees(), combined.total_trees());
        assert_eq!(left.calc_freqs(), combined.calc_freqs());
        assert_eq!(left.splits_considered(), combined.splits_considered());

        // The donor is untouched.
        assert_eq!(right.total_trees(), 3);
    }

    #[test]
    fn test_merge_rejects_foreign_registry() {
        let registry = registry_abcd();
        let lookalike = registry_abcd();
        let mut target = SplitDistribution::new(&registry);
        let donor = SplitDistribution::new(&lookalike);
        let err = target.merge_from(&donor).unwrap_err();
        assert!(matches!(err, ConsensusError::RegistryMismatch));
    }

    #[test]
    fn test_stream_error_aborts_counting() {
        let registry = registry_abcd();
        let mut dist = SplitDistribution::new(&registry);
        let stream = vec![
            Ok(PhyloTree::from_newick("((A,B),(C,D));").unwrap()),
            Err(ConsensusError::UnnamedLeaf),
            Ok(PhyloTree::from_newick("((A,C),(B,D));").unwrap()),
        ];
        assert!(dist.count_splits_on_trees(stream).is_err());
        // The tree before the failure stays counted, the one after is never seen.
        assert_eq!(dist.total_trees(), 1);
    }

    #[test]
    fn test_frequency_table_union_rows() {
        let registry = registry_abcd();
        let mut one = SplitDistribution::new(&registry);
        one.count_splits_on_trees(trees(&["((A,B),(C,D));"])).unwrap();
        let mut two = SplitDistribution::new(&registry);
        two.count_splits_on_trees(trees(&["((A,C),(B,D));"])).unwrap();

        let dists = vec![one, two];
        let table = frequency_table(&dists, false).unwrap();
        // One non-trivial split per file, absent from the other.
        assert_eq!(table.len(), 2);
        for (_, row) in &table {
            assert_eq!(row.len(), 2);
            let mut sorted = row.clone();
            sorted.sort_by(f64::total_cmp);
            assert_eq!(sorted, vec![0.0, 1.0]);
        }

        let with_trivial = frequency_table(&dists, true).unwrap();
        assert!(with_trivial.len() > table.len());
    }
}
