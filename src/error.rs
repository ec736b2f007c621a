//! Crate-wide error type.
//!
//! Tree-structure failures come from the `phylotree` collaborator and are
//! wrapped rather than re-modelled; everything the split bookkeeping itself
//! can reject gets its own variant.

use std::io;
use std::path::PathBuf;

use phylotree::tree::{NewickParseError, TreeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    /// A label was registered twice. Registration is strict: callers that
    /// want idempotent lookups must dedup before registering.
    #[error("taxon label '{0}' is already registered")]
    DuplicateLabel(String),

    /// A tree mentions a leaf label the registry has never seen.
    #[error("taxon label '{0}' is not registered")]
    UnknownTaxon(String),

    /// A leaf without a label cannot be mapped to a bit position.
    #[error("tree contains an unnamed leaf")]
    UnnamedLeaf,

    /// Distributions can only be merged when they were built over the same
    /// registry instance.
    #[error("distributions were built over different taxon registries")]
    RegistryMismatch,

    /// Consensus thresholds are frequencies in (0.0, 1.0].
    #[error("consensus threshold {0} is outside (0.0, 1.0]")]
    InvalidThreshold(f64),

    /// Every requested input was skipped or empty.
    #[error("no readable tree files to process")]
    NoInputs,

    /// Structural access error reported by the tree collaborator.
    #[error("tree structure error: {0}")]
    Tree(#[from] TreeError),

    /// A record closed a parenthesis it never opened. Screened out before
    /// parsing; the newick parser does not recover from this shape.
    #[error("malformed tree record {record} in {}: unmatched ')'", path.display())]
    Unbalanced { path: PathBuf, record: usize },

    /// A tree record could not be parsed. `record` is the 1-based position
    /// of the record within its file, counting burned-in records.
    #[error("malformed tree record {record} in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        record: usize,
        #[source]
        source: NewickParseError,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
