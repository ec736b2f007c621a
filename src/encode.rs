//! Extract canonical splits from phylogenetic trees.
//!
//! # Overview
//! Each edge of a tree bipartitions the taxa: the leaves below the edge on
//! one side, everything else on the other. [`encode_tree`] walks a parsed
//! tree bottom-up, builds the subtree bitmask for every node by OR-ing its
//! children, and yields one canonical [`Split`] per edge.
//!
//! # Why taxon names, not node ids
//! Node ids are assigned during parsing and differ across files even for
//! identical taxa. Bit positions therefore come from the shared
//! [`TaxonRegistry`], which is built from labels before any encoding
//! happens, so the same taxon always occupies the same bit in every tree.

use std::collections::{BTreeSet, HashMap};

use phylotree::tree::Tree as PhyloTree;

use crate::bitset::Bitset;
use crate::error::ConsensusError;
use crate::split::Split;
use crate::taxa::TaxonRegistry;

/// Adds every leaf label of `tree` to `labels`.
///
/// Used to assemble the registry's label set before counting begins; the
/// BTreeSet keeps registration order independent of tree traversal order.
///
/// # Errors
/// Fails with [`ConsensusError::UnnamedLeaf`] if a leaf carries no name.
pub fn collect_leaf_labels(
    tree: &PhyloTree,
    labels: &mut BTreeSet<String>,
) -> Result<(), ConsensusError> {
    for leaf_id in tree.get_leaves() {
        let node = tree.get(&leaf_id)?;
        match &node.name {
            Some(name) => {
                labels.insert(name.clone());
            }
            None => return Err(ConsensusError::UnnamedLeaf),
        }
    }
    Ok(())
}

/// Encodes every edge of `tree` as a canonical split.
///
/// The returned sequence is finite, lazy, and consumed by iteration; call
/// again to re-traverse the tree. Pendant edges are included and surface as
/// trivial splits, so downstream filtering decides whether to keep them.
///
/// # Algorithm
/// 1. Map each leaf's node id to its registry index via the leaf name
/// 2. DFS from the root, OR-ing child masks into each node's subtree mask
/// 3. Collect one mask per node in post-order, then drop the root's
///    (the root has no parent edge, so it defines no split)
/// 4. Canonicalize each mask as it is yielded
///
/// # Errors
/// Fails with [`ConsensusError::UnnamedLeaf`] on anonymous leaves and
/// [`ConsensusError::UnknownTaxon`] on labels missing from the registry.
pub fn encode_tree(
    tree: &PhyloTree,
    registry: &TaxonRegistry,
) -> Result<TreeSplits, ConsensusError> {
    let words = registry.word_count();

    let mut leaf_index: HashMap<usize, usize> = HashMap::new();
    for leaf_id in tree.get_leaves() {
        let node = tree.get(&leaf_id)?;
        let name = node.name.as_deref().ok_or(ConsensusError::UnnamedLeaf)?;
        leaf_index.insert(leaf_id, registry.index_of(name)?);
    }

    let root_id = tree.get_root()?;
    let mut raw = Vec::new();
    compute_subtree_masks(root_id, tree, &leaf_index, words, &mut raw)?;
    // Post-order pushes the root's full mask last; the root has no parent
    // edge, so it contributes no split.
    raw.pop();

    Ok(TreeSplits {
        raw: raw.into_iter(),
        all_taxa: registry.all_taxa_bitmask(),
    })
}

/// Recursively computes subtree masks, pushing one per node in post-order.
///
/// - **Leaf node**: a single registry bit
/// - **Internal node**: OR of all child masks
fn compute_subtree_masks(
    node_id: usize,
    tree: &PhyloTree,
    leaf_index: &HashMap<usize, usize>,
    words: usize,
    out: &mut Vec<Bitset>,
) -> Result<Bitset, ConsensusError> {
    let node = tree.get(&node_id)?;

    if node.children.is_empty() {
        let mut mask = Bitset::zeros(words);
        let leaf_ix = *leaf_index.get(&node_id).expect("leaf mapped");
        mask.set(leaf_ix);
        out.push(mask.clone());
        return Ok(mask);
    }

    let mut mask = Bitset::zeros(words);
    for &child_id in &node.children {
        let child_mask = compute_subtree_masks(child_id, tree, leaf_index, words, out)?;
        mask.or_assign(&child_mask);
    }
    out.push(mask.clone());
    Ok(mask)
}

/// Lazy, finite sequence of canonical splits for one tree, one per edge.
#[derive(Debug)]
pub struct TreeSplits {
    raw: std::vec::IntoIter<Bitset>,
    all_taxa: Bitset,
}

impl Iterator for TreeSplits {
    type Item = Split;

    fn next(&mut self) -> Option<Split> {
        self.raw
            .next()
            .map(|mask| Split::canonical(mask, &self.all_taxa))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl ExactSizeIterator for TreeSplits {}
