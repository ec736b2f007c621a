//! Python binding layer for split counting and consensus trees.
//!
//! Provides Python functions for comparing split frequencies across tree
//! files and building consensus trees from newick/NEXUS samples.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::path::PathBuf;

use crate::consensus::tree_from_splits;
use crate::distribution::{frequency_table, SplitDistribution};
use crate::io::{file_distributions, registry_from_files};

/// Compare split frequencies across multiple tree files.
///
/// Args:
///     paths: List of file paths to newick/NEXUS tree files
///     burnin: Number of trees to skip at the beginning of each file (default: 0)
///     include_trivial: Keep single-taxon splits in the result (default: False)
///
/// Returns:
///     A tuple of (splits, file_names, frequencies) where:
///     - splits renders each bipartition as a newick-like string, one per row
///     - file_names echoes the input paths, one per column
///     - frequencies is a 2D list, frequencies[row][column], 0.0 where the
///       split never occurs in that file
///
/// Raises:
///     ValueError: If no files are given, a file is unreadable, or a tree
///     record fails to parse
#[pyfunction]
#[pyo3(signature = (paths, burnin=0, include_trivial=false))]
fn split_frequencies(
    paths: Vec<String>,
    burnin: usize,
    include_trivial: bool,
) -> PyResult<(Vec<String>, Vec<String>, Vec<Vec<f64>>)> {
    if paths.is_empty() {
        return Err(PyValueError::new_err("No input files provided"));
    }
    let path_bufs: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();

    let registry = registry_from_files(&path_bufs)
        .map_err(|e| PyValueError::new_err(format!("Failed to read taxa: {e}")))?;
    let distributions = file_distributions(&path_bufs, &registry, burnin)
        .map_err(|e| PyValueError::new_err(format!("Failed to count splits: {e}")))?;

    let rows = frequency_table(&distributions, include_trivial)
        .map_err(|e| PyValueError::new_err(format!("{e}")))?;
    let splits: Vec<String> = rows
        .iter()
        .map(|(split, _)| split.newick_string(&registry))
        .collect();
    let frequencies: Vec<Vec<f64>> = rows.into_iter().map(|(_, row)| row).collect();

    Ok((splits, paths, frequencies))
}

/// Build a consensus tree over every tree in the given files.
///
/// Args:
///     paths: List of file paths to newick/NEXUS tree files
///     threshold: Minimum split frequency in (0, 1]; 0.5 = majority rule,
///         1.0 = strict consensus (default: 0.5)
///     burnin: Number of trees to skip at the beginning of each file (default: 0)
///     with_support: Label internal nodes with split frequencies (default: True)
///
/// Returns:
///     The consensus tree as a newick string.
///
/// Raises:
///     ValueError: If no files are given, the threshold is out of range, a
///     file is unreadable, or a tree record fails to parse
#[pyfunction]
#[pyo3(signature = (paths, threshold=0.5, burnin=0, with_support=true))]
fn consensus_newick(
    paths: Vec<String>,
    threshold: f64,
    burnin: usize,
    with_support: bool,
) -> PyResult<String> {
    if paths.is_empty() {
        return Err(PyValueError::new_err("No input files provided"));
    }
    let path_bufs: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();

    let registry = registry_from_files(&path_bufs)
        .map_err(|e| PyValueError::new_err(format!("Failed to read taxa: {e}")))?;
    let distributions = file_distributions(&path_bufs, &registry, burnin)
        .map_err(|e| PyValueError::new_err(format!("Failed to count splits: {e}")))?;

    let mut combined = SplitDistribution::new(&registry);
    for dist in &distributions {
        combined
            .merge_from(dist)
            .map_err(|e| PyValueError::new_err(format!("{e}")))?;
    }

    let consensus = tree_from_splits(&combined, threshold)
        .map_err(|e| PyValueError::new_err(format!("{e}")))?;
    Ok(consensus.tree.to_newick(&registry, with_support))
}

/// Summarize how many splits the given files contain.
///
/// Args:
///     paths: List of file paths to newick/NEXUS tree files
///     burnin: Number of trees to skip at the beginning of each file (default: 0)
///
/// Returns:
///     A tuple (num_splits, num_unique_splits, num_nontrivial_splits,
///     num_unique_nontrivial_splits) accumulated over all files.
///
/// Raises:
///     ValueError: If no files are given, a file is unreadable, or a tree
///     record fails to parse
#[pyfunction]
#[pyo3(signature = (paths, burnin=0))]
fn splits_considered(paths: Vec<String>, burnin: usize) -> PyResult<(u64, u64, u64, u64)> {
    if paths.is_empty() {
        return Err(PyValueError::new_err("No input files provided"));
    }
    let path_bufs: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();

    let registry = registry_from_files(&path_bufs)
        .map_err(|e| PyValueError::new_err(format!("Failed to read taxa: {e}")))?;
    let distributions = file_distributions(&path_bufs, &registry, burnin)
        .map_err(|e| PyValueError::new_err(format!("Failed to count splits: {e}")))?;

    let mut combined = SplitDistribution::new(&registry);
    for dist in &distributions {
        combined
            .merge_from(dist)
            .map_err(|e| PyValueError::new_err(format!("{e}")))?;
    }

    let counts = combined.splits_considered();
    Ok((
        counts.num_splits,
        counts.num_unique_splits,
        counts.num_nontrivial_splits,
        counts.num_unique_nontrivial_splits,
    ))
}

/// Python module definition
#[pymodule]
fn rust_python_tree_consensus(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(split_frequencies, m)?)?;
    m.add_function(wrap_pyfunction!(consensus_newick, m)?)?;
    m.add_function(wrap_pyfunction!(splits_considered, m)?)?;
    Ok(())
}
