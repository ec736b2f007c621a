//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Modules:
//! - `bitset`: compact bitset representation for taxon sets.
//! - `taxa`: taxon registry mapping labels to dense bit indices.
//! - `split`: canonical bipartitions and their compatibility rules.
//! - `encode`: turning phylogenetic trees into streams of splits.
//! - `distribution`: split occurrence counts and frequencies over tree sets.
//! - `consensus`: majority-rule / strict consensus tree construction.
//! - `io`: streaming newick/NEXUS tree file readers and table output.
//! - `error`: the crate-wide error type.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).
//!
//! Public API kept stable by re-exporting key items from the modules.

pub mod bitset;
pub mod consensus;
pub mod distribution;
pub mod encode;
pub mod error;
pub mod io;
pub mod split;
pub mod taxa;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use bitset::Bitset;
pub use consensus::{tree_from_splits, Consensus, ConsensusTree};
pub use distribution::{frequency_table, SplitCounts, SplitDistribution};
pub use encode::encode_tree;
pub use error::ConsensusError;
pub use io::TreeFile;
pub use split::Split;
pub use taxa::{Taxon, TaxonRegistry};
