//! Consensus tree assembly from split frequencies.
//!
//! # Overview
//! A consensus tree summarizes many trees as one: every split whose
//! frequency reaches a threshold becomes an internal edge. Construction
//! starts from the star tree (all taxa hanging off one root) and inserts
//! qualifying splits one at a time, most frequent first, grouping the taxa
//! on the split's canonical side under a new node. A split that conflicts
//! with an already-inserted one is dropped and tallied, never an error.
//!
//! Threshold 0.5 gives majority-rule consensus; threshold 1.0 gives strict
//! consensus. Both run through the same code path.

use crate::distribution::SplitDistribution;
use crate::error::ConsensusError;
use crate::split::Split;
use crate::taxa::TaxonRegistry;

use crate::bitset::Bitset;

/// One node of a consensus tree.
///
/// Leaves carry their taxon index; internal nodes carry the support of the
/// split that created them. The root carries neither.
#[derive(Clone, Debug)]
struct ConsensusNode {
    /// Union of the taxa below this node.
    mask: Bitset,
    parent: Option<usize>,
    children: Vec<usize>,
    taxon: Option<usize>,
    support: Option<f64>,
}

/// A rooted rendering of the consensus topology, stored as a node arena.
///
/// Invariants held throughout construction: every taxon appears in exactly
/// one leaf, every internal node's mask equals the union of its children's
/// masks, and the root's mask is the full taxon set.
#[derive(Clone, Debug)]
pub struct ConsensusTree {
    nodes: Vec<ConsensusNode>,
    root: usize,
}

impl ConsensusTree {
    /// Builds the star tree over a registry: one root, one leaf per taxon,
    /// no internal structure yet.
    pub fn star(registry: &TaxonRegistry) -> Self {
        let num_taxa = registry.len();
        let words = registry.word_count();
        let mut nodes = Vec::with_capacity(num_taxa + 1);
        nodes.push(ConsensusNode {
            mask: registry.all_taxa_bitmask(),
            parent: None,
            children: (1..=num_taxa).collect(),
            taxon: None,
            support: None,
        });
        for taxon in registry.iter() {
            let mut mask = Bitset::zeros(words);
            mask.set(taxon.index());
            nodes.push(ConsensusNode {
                mask,
                parent: Some(0),
                children: Vec::new(),
                taxon: Some(taxon.index()),
                support: None,
            });
        }
        ConsensusTree { nodes, root: 0 }
    }

    /// Inserts one split, grouping its canonical side under a new node.
    ///
    /// Descends to the deepest node whose mask contains the split, then
    /// moves the children lying inside the split under a fresh node. Returns
    /// `false` without touching the tree if any child straddles the split
    /// (shares taxa with both sides), which happens exactly when the split
    /// conflicts with one already in the tree. A split already present is a
    /// no-op returning `true`.
    pub fn insert_split(&mut self, split: &Split, support: f64) -> bool {
        let mask = split.mask();
        let mut at = self.root;
        'down: loop {
            for &child in &self.nodes[at].children {
                let child_mask = &self.nodes[child].mask;
                if child_mask == mask {
                    return true;
                }
                if mask.is_subset_of(child_mask) {
                    at = child;
                    continue 'down;
                }
            }
            break;
        }

        // `at` is now the deepest node whose mask contains the split.
        let mut inside = Vec::new();
        let mut outside = Vec::new();
        for &child in &self.nodes[at].children {
            let child_mask = &self.nodes[child].mask;
            if child_mask.is_subset_of(mask) {
                inside.push(child);
            } else if !child_mask.intersects(mask) {
                outside.push(child);
            } else {
                return false;
            }
        }

        let new_id = self.nodes.len();
        self.nodes.push(ConsensusNode {
            mask: mask.clone(),
            parent: Some(at),
            children: inside.clone(),
            taxon: None,
            support: Some(support),
        });
        for &child in &inside {
            self.nodes[child].parent = Some(new_id);
        }
        outside.push(new_id);
        self.nodes[at].children = outside;
        true
    }

    /// The non-trivial splits realized by this tree, sorted by canonical
    /// mask.
    pub fn splits(&self) -> Vec<Split> {
        let all_taxa = &self.nodes[self.root].mask;
        let mut splits: Vec<Split> = self
            .nodes
            .iter()
            .filter(|node| node.taxon.is_none() && node.parent.is_some())
            .map(|node| Split::canonical(node.mask.clone(), all_taxa))
            .collect();
        splits.sort();
        splits
    }

    /// Renders the tree as a newick string, children in insertion order.
    ///
    /// With `with_support`, each internal node is labeled with the
    /// frequency of the split that created it.
    pub fn to_newick(&self, registry: &TaxonRegistry, with_support: bool) -> String {
        let mut out = String::new();
        self.write_node(self.root, registry, with_support, &mut out);
        out.push(';');
        out
    }

    fn write_node(
        &self,
        node_id: usize,
        registry: &TaxonRegistry,
        with_support: bool,
        out: &mut String,
    ) {
        let node = &self.nodes[node_id];
        if let Some(taxon) = node.taxon {
            if let Some(label) = registry.label(taxon) {
                out.push_str(label);
            }
            return;
        }
        out.push('(');
        for (ix, &child) in node.children.iter().enumerate() {
            if ix > 0 {
                out.push(',');
            }
            self.write_node(child, registry, with_support, out);
        }
        out.push(')');
        if with_support {
            if let Some(support) = node.support {
                out.push_str(&support.to_string());
            }
        }
    }
}

/// A consensus tree together with the bookkeeping behind it.
#[derive(Clone, Debug)]
pub struct Consensus {
    pub tree: ConsensusTree,
    /// The threshold the splits were filtered against.
    pub threshold: f64,
    /// Splits that met the threshold and fit the growing tree.
    pub kept_splits: usize,
    /// Splits that met the threshold but conflicted with an earlier insert.
    pub rejected_splits: usize,
}

/// Builds the consensus tree for all splits at or above `threshold`.
///
/// Candidates are the distribution's non-trivial splits with frequency
/// `>= threshold`, inserted in descending occurrence-count order with ties
/// broken by canonical mask, so the result is deterministic. Conflicting
/// candidates are counted in [`Consensus::rejected_splits`] rather than
/// reported as errors.
///
/// Threshold 1.0 is strict consensus; a split present in every tree has
/// count equal to the tree total, so its frequency is exactly 1.0 and it
/// always qualifies.
///
/// # Errors
/// Fails with [`ConsensusError::InvalidThreshold`] unless
/// `0.0 < threshold <= 1.0`.
pub fn tree_from_splits(
    distribution: &SplitDistribution<'_>,
    threshold: f64,
) -> Result<Consensus, ConsensusError> {
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(ConsensusError::InvalidThreshold(threshold));
    }

    let registry = distribution.registry();
    let num_taxa = registry.len();
    let total = distribution.total_trees();

    let mut candidates: Vec<(&Split, u64)> = distribution
        .splits()
        .filter(|(split, _)| !split.is_trivial(num_taxa))
        .filter(|(_, count)| total > 0 && *count as f64 / total as f64 >= threshold)
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut tree = ConsensusTree::star(registry);
    let mut kept_splits = 0;
    let mut rejected_splits = 0;
    for (split, count) in candidates {
        let support = count as f64 / total as f64;
        if tree.insert_split(split, support) {
            kept_splits += 1;
        } else {
            rejected_splits += 1;
        }
    }

    Ok(Consensus {
        tree,
        threshold,
        kept_splits,
        rejected_splits,
    })
}
