//! Tree-file streaming and table output.
//!
//! # Overview
//! [`TreeFile`] turns a newick or NEXUS file into an iterator of parsed
//! trees, decoding one record at a time so a long posterior sample never
//! sits in memory whole. NEXUS support covers the BEAST/MrBayes shape:
//! a `TRANSLATE` block mapping numeric ids to taxon labels, `tree NAME = `
//! statements, and `[&...]` metacomments on nodes and branches, which are
//! stripped before parsing.
//!
//! Output helpers write the split-frequency table and consensus newick to
//! a path, gzip-compressed when it ends in `.gz`, or to stdout for `-`.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use phylotree::tree::Tree as PhyloTree;
use rayon::prelude::*;

use crate::distribution::SplitDistribution;
use crate::encode::collect_leaf_labels;
use crate::error::ConsensusError;
use crate::split::Split;
use crate::taxa::TaxonRegistry;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TreeFormat {
    Newick,
    Nexus,
}

/// Streaming reader over the tree records of one file.
///
/// Iterating yields one parsed tree per record. A malformed record yields
/// an `Err` carrying the file and 1-based record number, and iteration can
/// continue past it; an I/O failure ends the stream.
pub struct TreeFile {
    reader: Box<dyn BufRead + Send>,
    path: PathBuf,
    format: TreeFormat,
    /// NEXUS id-to-label map, applied to leaves after parsing.
    translate: HashMap<String, String>,
    /// First tree statement found while scanning the NEXUS prelude.
    pending: Option<String>,
    /// Text read past the previous record boundary (newick mode).
    carry: String,
    /// 1-based index of the most recently fetched record.
    record: usize,
    /// Records still to discard before yielding trees.
    burnin: usize,
    done: bool,
}

impl TreeFile {
    /// Opens a tree file, transparently decompressing `.gz` paths.
    pub fn open(path: &Path) -> Result<Self, ConsensusError> {
        Self::with_burnin(path, 0)
    }

    /// Opens a tree file, discarding the first `burnin` records unparsed.
    pub fn with_burnin(path: &Path, burnin: usize) -> Result<Self, ConsensusError> {
        let file = File::open(path).map_err(|source| ConsensusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let reader: Box<dyn BufRead + Send> = if path.to_string_lossy().ends_with(".gz") {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Self::from_reader(reader, path.to_path_buf(), burnin)
    }

    /// Wraps an already-open reader; `path` only labels errors.
    ///
    /// The first line decides the format: a `#NEXUS` marker switches to
    /// NEXUS handling, anything else is treated as bare newick.
    pub fn from_reader(
        mut reader: Box<dyn BufRead + Send>,
        path: PathBuf,
        burnin: usize,
    ) -> Result<Self, ConsensusError> {
        let mut first = String::new();
        reader.read_line(&mut first).map_err(|source| ConsensusError::Io {
            path: path.clone(),
            source,
        })?;
        let format = if first.trim_start().to_ascii_uppercase().starts_with("#NEXUS") {
            TreeFormat::Nexus
        } else {
            TreeFormat::Newick
        };
        let mut tree_file = TreeFile {
            reader,
            path,
            format,
            translate: HashMap::new(),
            pending: None,
            carry: String::new(),
            record: 0,
            burnin,
            done: false,
        };
        match tree_file.format {
            TreeFormat::Nexus => tree_file.scan_nexus_prelude()?,
            TreeFormat::Newick => tree_file.carry = first,
        }
        Ok(tree_file)
    }

    fn read_line(&mut self) -> Result<Option<String>, ConsensusError> {
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf).map_err(|source| ConsensusError::Io {
            path: self.path.clone(),
            source,
        })?;
        if n == 0 { Ok(None) } else { Ok(Some(buf)) }
    }

    /// Skips NEXUS content up to the first tree statement, consuming the
    /// `TRANSLATE` block on the way if one is present.
    fn scan_nexus_prelude(&mut self) -> Result<(), ConsensusError> {
        loop {
            let Some(line) = self.read_line()? else {
                self.done = true;
                return Ok(());
            };
            let trimmed = line.trim();
            let upper = trimmed.to_ascii_uppercase();
            if upper.starts_with("TRANSLATE") {
                self.read_translate_block()?;
            } else if upper.starts_with("TREE ") && trimmed.contains('=') {
                self.pending = Some(line);
                return Ok(());
            }
        }
    }

    /// Consumes `id label` lines until the terminating `;`.
    ///
    /// Entries look like `12 'label',` with the final one ending in `;`,
    /// either on its own line or trailing the entry.
    fn read_translate_block(&mut self) -> Result<(), ConsensusError> {
        loop {
            let Some(line) = self.read_line()? else {
                return Ok(());
            };
            let trimmed = line.trim();
            if trimmed.starts_with(';') {
                return Ok(());
            }
            let last = trimmed.ends_with(';');
            let entry = trimmed.trim_end_matches([',', ';']);
            let mut parts = entry.split_whitespace();
            if let Some(id) = parts.next() {
                if let Some(label) = parts.next() {
                    self.translate
                        .insert(id.to_string(), label.trim_matches('\'').to_string());
                }
            }
            if last {
                return Ok(());
            }
        }
    }

    fn next_record(&mut self) -> Result<Option<String>, ConsensusError> {
        match self.format {
            TreeFormat::Newick => self.next_newick_record(),
            TreeFormat::Nexus => self.next_nexus_record(),
        }
    }

    /// One `;`-terminated record, however many lines it spans.
    fn next_newick_record(&mut self) -> Result<Option<String>, ConsensusError> {
        loop {
            if let Some(pos) = self.carry.find(';') {
                let record: String = self.carry.drain(..=pos).collect();
                return Ok(Some(record));
            }
            match self.read_line()? {
                Some(line) => self.carry.push_str(&line),
                None => {
                    if self.carry.trim().is_empty() {
                        return Ok(None);
                    }
                    // Truncated trailing record; hand it to the parser so
                    // the failure is reported against this file.
                    return Ok(Some(std::mem::take(&mut self.carry)));
                }
            }
        }
    }

    /// The newick payload of the next `TREE name = ...;` statement.
    fn next_nexus_record(&mut self) -> Result<Option<String>, ConsensusError> {
        let line = if let Some(pending) = self.pending.take() {
            pending
        } else {
            loop {
                let Some(line) = self.read_line()? else {
                    return Ok(None);
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let upper = trimmed.to_ascii_uppercase();
                if upper.starts_with("END;") {
                    return Ok(None);
                }
                if upper.starts_with("TREE ") && trimmed.contains('=') {
                    break line;
                }
            }
        };
        let mut statement = match line.splitn(2, '=').nth(1) {
            Some(rest) => rest.to_string(),
            None => String::new(),
        };
        while !statement.contains(';') {
            let Some(more) = self.read_line()? else {
                break;
            };
            statement.push_str(&more);
        }
        Ok(Some(statement))
    }
}

impl Iterator for TreeFile {
    type Item = Result<PhyloTree, ConsensusError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let raw = match self.next_record() {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            self.record += 1;
            if self.burnin > 0 {
                self.burnin -= 1;
                continue;
            }
            let cleaned = strip_metacomments(&raw);
            let trimmed = cleaned.trim();
            if trimmed.is_empty() {
                continue;
            }
            if has_unmatched_close(trimmed) {
                return Some(Err(ConsensusError::Unbalanced {
                    path: self.path.clone(),
                    record: self.record,
                }));
            }
            return Some(match PhyloTree::from_newick(trimmed) {
                Ok(mut tree) => {
                    if !self.translate.is_empty() {
                        rename_leaf_nodes(&mut tree, &self.translate);
                    }
                    Ok(tree)
                }
                Err(source) => Err(ConsensusError::Parse {
                    path: self.path.clone(),
                    record: self.record,
                    source,
                }),
            });
        }
    }
}

/// True if the record closes a parenthesis it never opened.
///
/// Run on every record before parsing: the newick parser does not recover
/// from a `)` without a matching `(`, so that shape has to be caught here.
/// A record with unclosed `(`s passes through and is left to the parser.
fn has_unmatched_close(newick: &str) -> bool {
    let mut depth = 0usize;
    for ch in newick.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    false
}

/// Strips `[&...]` metacomments from a newick string.
///
/// BEAST writes annotations like `:[&rate=0.123]2.45` where 2.45 is the
/// actual branch length; the annotation is removed, the length kept.
fn strip_metacomments(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut in_comment = false;
    let mut chars = newick.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '[' && chars.peek() == Some(&'&') {
            in_comment = true;
        } else if ch == ']' && in_comment {
            in_comment = false;
        } else if !in_comment {
            result.push(ch);
        }
    }

    result
}

/// Rewrites leaf names through a NEXUS translate map.
///
/// Leaves without a mapping keep their original name, so files mixing
/// translated ids and real labels still come out usable.
fn rename_leaf_nodes(tree: &mut PhyloTree, translate: &HashMap<String, String>) {
    for leaf_id in tree.get_leaves() {
        if let Ok(node) = tree.get_mut(&leaf_id) {
            if let Some(name) = &node.name {
                if let Some(mapped) = translate.get(name) {
                    node.name = Some(mapped.clone());
                }
            }
        }
    }
}

/// Builds the shared taxon registry from the first tree of every file.
///
/// Labels are unioned across files and registered in sorted order, so the
/// bit assignment is independent of file order on the command line. An
/// empty file contributes nothing; a first record that fails to parse is
/// that file's error and propagates.
pub fn registry_from_files(paths: &[PathBuf]) -> Result<TaxonRegistry, ConsensusError> {
    let mut labels = BTreeSet::new();
    for path in paths {
        let mut file = TreeFile::open(path)?;
        if let Some(tree) = file.next() {
            collect_leaf_labels(&tree?, &mut labels)?;
        }
    }
    TaxonRegistry::from_labels(labels)
}

/// Builds one distribution per input file, in parallel, over one registry.
///
/// The registry must already hold every taxon the files mention; counting
/// a tree with an unregistered label fails rather than registering it,
/// since the workers share the registry read-only.
pub fn file_distributions<'r>(
    paths: &[PathBuf],
    registry: &'r TaxonRegistry,
    burnin: usize,
) -> Result<Vec<SplitDistribution<'r>>, ConsensusError> {
    paths
        .par_iter()
        .map(|path| {
            let mut dist = SplitDistribution::new(registry);
            let file = TreeFile::with_burnin(path, burnin)?;
            dist.count_splits_on_trees(file)?;
            Ok(dist)
        })
        .collect()
}

/// Opens the destination for report output.
///
/// `-` means stdout; a path ending in `.gz` is gzip-compressed.
pub fn open_output(path: &Path) -> io::Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    let file = File::create(path)?;
    if path.to_string_lossy().ends_with(".gz") {
        let enc = GzEncoder::new(file, Compression::default());
        Ok(Box::new(BufWriter::new(enc)))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Writes the split-frequency table: one row per split, one column per
/// input file.
///
/// With `split_column`, each row starts with the split rendered as a
/// newick-like bipartition; with `header`, the first line carries the file
/// names (and a `split` corner label when both are on).
pub fn write_split_table<W: Write>(
    out: &mut W,
    registry: &TaxonRegistry,
    file_names: &[String],
    rows: &[(&Split, Vec<f64>)],
    delimiter: &str,
    header: bool,
    split_column: bool,
) -> io::Result<()> {
    if header {
        if split_column {
            write!(out, "split{delimiter}")?;
        }
        for (k, name) in file_names.iter().enumerate() {
            if k > 0 {
                write!(out, "{delimiter}")?;
            }
            write!(out, "{name}")?;
        }
        writeln!(out)?;
    }

    for (split, freqs) in rows {
        if split_column {
            write!(out, "{}{delimiter}", split.newick_string(registry))?;
        }
        for (k, freq) in freqs.iter().enumerate() {
            if k > 0 {
                write!(out, "{delimiter}")?;
            }
            write!(out, "{freq}")?;
        }
        writeln!(out)?;
    }

    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::distribution::frequency_table;

    fn reader(text: &str) -> Box<dyn BufRead + Send> {
        Box::new(Cursor::new(text.as_bytes().to_vec()))
    }

    fn tree_file(text: &str) -> TreeFile {
        TreeFile::from_reader(reader(text), PathBuf::from("test.trees"), 0).unwrap()
    }

    fn leaf_labels(tree: &PhyloTree) -> Vec<String> {
        let mut labels = BTreeSet::new();
        collect_leaf_labels(tree, &mut labels).unwrap();
        labels.into_iter().collect()
    }

    #[test]
    fn test_reads_bare_newick_records() {
        let trees: Vec<_> = tree_file("((A,B),(C,D));\n(A,(B,(C,D)));\n")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(leaf_labels(&trees[0]), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_newick_record_spanning_lines() {
        let trees: Vec<_> = tree_file("((A,B),\n(C,D));\n")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(trees.len(), 1);
    }

    #[test]
    fn test_parse_error_reports_record_and_continues() {
        // The middle record is left unclosed, which the parser rejects.
        let mut file = tree_file("((A,B),(C,D));\n(A,(B,C);\n((A,C),(B,D));\n");

        assert!(file.next().unwrap().is_ok());
        let err = file.next().unwrap().unwrap_err();
        match err {
            ConsensusError::Parse { path, record, .. } => {
                assert_eq!(path, PathBuf::from("test.trees"));
                assert_eq!(record, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The bad record does not poison the rest of the stream.
        assert!(file.next().unwrap().is_ok());
        assert!(file.next().is_none());
    }

    #[test]
    fn test_unmatched_close_is_caught_before_parsing() {
        // Records with a stray `)` never reach the parser; they surface as
        // per-record errors and the stream keeps going.
        let mut file = tree_file("((A,B),(C,D));\n)))broken;\nA)B;\n((A,C),(B,D));\n");

        assert!(file.next().unwrap().is_ok());
        for expected_record in [2, 3] {
            let err = file.next().unwrap().unwrap_err();
            match err {
                ConsensusError::Unbalanced { path, record } => {
                    assert_eq!(path, PathBuf::from("test.trees"));
                    assert_eq!(record, expected_record);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
        assert!(file.next().unwrap().is_ok());
        assert!(file.next().is_none());
    }

    #[test]
    fn test_burnin_discards_leading_records() {
        let text = "((A,B),(C,D));\n((A,B),(C,D));\n((A,C),(B,D));\n";
        let file = TreeFile::from_reader(reader(text), PathBuf::from("test.trees"), 2).unwrap();
        let trees: Vec<_> = file.collect::<Result<_, _>>().unwrap();
        assert_eq!(trees.len(), 1);
    }

    #[test]
    fn test_burnin_skips_unparsed_records() {
        // Burn-in records are discarded without parsing, so garbage there
        // never surfaces.
        let text = "not a tree at all;\n((A,B),(C,D));\n";
        let file = TreeFile::from_reader(reader(text), PathBuf::from("test.trees"), 1).unwrap();
        let trees: Vec<_> = file.collect::<Result<_, _>>().unwrap();
        assert_eq!(trees.len(), 1);
    }

    #[test]
    fn test_truncated_trailing_record_is_a_parse_error() {
        let mut file = tree_file("((A,B),(C,D));\n((A,C),(B,D)");
        assert!(file.next().unwrap().is_ok());
        let err = file.next().unwrap().unwrap_err();
        assert!(matches!(err, ConsensusError::Parse { record: 2, .. }));
    }

    #[test]
    fn test_nexus_translate_and_metacomments() {
        let text = "\
#NEXUS
Begin taxa;
\tDimensions ntax=4;
\tTaxlabels A B C D;
End;
Begin trees;
\tTranslate
\t\t1 A,
\t\t2 B,
\t\t3 C,
\t\t4 D;
tree STATE_0 = [&R] ((1:[&rate=0.5,height=1.2]0.3,2:0.1):0.05,(3:0.2,4:0.2):0.1);
tree STATE_1000 = [&R] ((1:0.2,3:0.1):0.05,(2:0.2,4:0.2):0.1);
End;
";
        let trees: Vec<_> = tree_file(text).collect::<Result<_, _>>().unwrap();
        assert_eq!(trees.len(), 2);
        for tree in &trees {
            assert_eq!(leaf_labels(tree), vec!["A", "B", "C", "D"]);
        }
    }

    #[test]
    fn test_nexus_without_translate_block() {
        let text = "\
#NEXUS
Begin trees;
tree one = ((A,B),(C,D));
tree two = ((A,C),(B,D));
End;
";
        let trees: Vec<_> = tree_file(text).collect::<Result<_, _>>().unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(leaf_labels(&trees[0]), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_empty_input_yields_no_trees() {
        assert_eq!(tree_file("").count(), 0);
        assert_eq!(tree_file("\n\n").count(), 0);
    }

    #[test]
    fn test_write_split_table_layout() {
        let registry = TaxonRegistry::from_labels(["A", "B", "C", "D"]).unwrap();
        let mut one = SplitDistribution::new(&registry);
        one.count_tree(&PhyloTree::from_newick("((A,B),(C,D));").unwrap())
            .unwrap();
        let mut two = SplitDistribution::new(&registry);
        two.count_tree(&PhyloTree::from_newick("((A,C),(B,D));").unwrap())
            .unwrap();

        let dists = vec![one, two];
        let rows = frequency_table(&dists, false).unwrap();
        let names = vec!["one.trees".to_string(), "two.trees".to_string()];

        let mut buf = Vec::new();
        write_split_table(&mut buf, &registry, &names, &rows, "\t", true, true).unwrap();
        let rendered = String::from_utf8(buf).unwrap();
        assert_eq!(
            rendered,
            "split\tone.trees\ttwo.trees\n\
             (A,C,(B,D))\t0\t1\n\
             (A,B,(C,D))\t1\t0\n"
        );

        let mut bare = Vec::new();
        write_split_table(&mut bare, &registry, &names, &rows, ",", false, false).unwrap();
        assert_eq!(String::from_utf8(bare).unwrap(), "0,1\n1,0\n");
    }
}
