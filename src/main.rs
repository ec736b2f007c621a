use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use rust_python_tree_consensus::consensus::tree_from_splits;
use rust_python_tree_consensus::distribution::{frequency_table, SplitDistribution};
use rust_python_tree_consensus::error::ConsensusError;
use rust_python_tree_consensus::io::{
    file_distributions, open_output, registry_from_files, write_split_table,
};

/// Compare split frequencies across tree files and build consensus trees
/// from newick/NEXUS samples (e.g. BEAST or MrBayes posteriors).
#[derive(Parser, Debug)]
#[command(name = "tree-consensus", version, about = "Split frequencies and consensus trees for phylogenetic tree samples")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output verbosity level
    #[arg(short = 'v', long = "verbosity", value_enum, default_value_t = Verbosity::Info, global = true)]
    verbosity: Verbosity,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Verbosity {
    Quiet,
    Info,
    Debug,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Tabulate split frequencies across tree files, one column per file
    Compare(CompareArgs),
    /// Build the consensus tree over all input trees
    Consensus(ConsensusArgs),
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Tree files to compare (newick or NEXUS, .gz supported)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output path for the frequency table; `-` for stdout, `.gz` to compress
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: PathBuf,

    /// Column delimiter
    #[arg(short = 'd', long = "delimiter", default_value = "\t")]
    delimiter: String,

    /// Burn-in by number of trees (drop first N records per file)
    #[arg(short = 'b', long = "burnin", default_value_t = 0)]
    burnin: usize,

    /// Omit the header row of file names
    #[arg(long = "no-header", default_value_t = false)]
    no_header: bool,

    /// Omit the first column rendering each split as a bipartition
    #[arg(long = "no-split-column", default_value_t = false)]
    no_split_column: bool,

    /// Keep trivial (single-taxon) splits in the table
    #[arg(long = "include-trivial", default_value_t = false)]
    include_trivial: bool,

    /// Skip input files that do not exist instead of failing
    #[arg(long = "ignore-missing", default_value_t = false)]
    ignore_missing: bool,
}

#[derive(Args, Debug)]
struct ConsensusArgs {
    /// Tree files to summarize (newick or NEXUS, .gz supported)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output path for the consensus newick; `-` for stdout
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: PathBuf,

    /// Minimum split frequency, in (0, 1]; 0.5 = majority rule, 1.0 = strict
    #[arg(short = 't', long = "threshold", default_value_t = 0.5)]
    threshold: f64,

    /// Burn-in by number of trees (drop first N records per file)
    #[arg(short = 'b', long = "burnin", default_value_t = 0)]
    burnin: usize,

    /// Omit split frequencies as internal node labels
    #[arg(long = "no-support", default_value_t = false)]
    no_support: bool,

    /// Skip input files that do not exist instead of failing
    #[arg(long = "ignore-missing", default_value_t = false)]
    ignore_missing: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    let result = match cli.command {
        Command::Compare(args) => run_compare(args),
        Command::Consensus(args) => run_consensus(args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(exit_code(&e));
    }
}

fn init_logging(verbosity: Verbosity) {
    let level = match verbosity {
        Verbosity::Quiet => LevelFilter::Error,
        Verbosity::Info => LevelFilter::Info,
        Verbosity::Debug => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// Missing inputs exit with 2 so scripts can tell them from other failures.
fn exit_code(err: &ConsensusError) -> i32 {
    match err {
        ConsensusError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound => 2,
        _ => 1,
    }
}

/// Drops missing paths when tolerated, errors on them otherwise.
fn resolve_inputs(
    inputs: Vec<PathBuf>,
    ignore_missing: bool,
) -> Result<Vec<PathBuf>, ConsensusError> {
    let mut present = Vec::with_capacity(inputs.len());
    for path in inputs {
        if path.exists() {
            present.push(path);
        } else if ignore_missing {
            log::warn!("skipping missing input {}", path.display());
        } else {
            return Err(ConsensusError::Io {
                path,
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }
    }
    if present.is_empty() {
        return Err(ConsensusError::NoInputs);
    }
    Ok(present)
}

fn run_compare(args: CompareArgs) -> Result<(), ConsensusError> {
    let inputs = resolve_inputs(args.inputs, args.ignore_missing)?;

    let t0 = Instant::now();
    let registry = registry_from_files(&inputs)?;
    log::info!(
        "Registered {} taxa from {} files in {:.3}s",
        registry.len(),
        inputs.len(),
        t0.elapsed().as_secs_f64()
    );

    let t1 = Instant::now();
    let distributions = file_distributions(&inputs, &registry, args.burnin)?;
    let trees_total: u64 = distributions.iter().map(|d| d.total_trees()).sum();
    log::info!(
        "Counted splits on {} trees in {:.3}s",
        trees_total,
        t1.elapsed().as_secs_f64()
    );
    for (path, dist) in inputs.iter().zip(&distributions) {
        let counts = dist.splits_considered();
        log::debug!(
            "{}: {} trees, {} splits ({} unique), {} non-trivial ({} unique)",
            path.display(),
            dist.total_trees(),
            counts.num_splits,
            counts.num_unique_splits,
            counts.num_nontrivial_splits,
            counts.num_unique_nontrivial_splits
        );
    }

    let rows = frequency_table(&distributions, args.include_trivial)?;
    let names: Vec<String> = inputs.iter().map(|p| p.display().to_string()).collect();

    let t2 = Instant::now();
    let mut out = open_output(&args.output).map_err(|source| ConsensusError::Io {
        path: args.output.clone(),
        source,
    })?;
    write_split_table(
        &mut out,
        &registry,
        &names,
        &rows,
        &args.delimiter,
        !args.no_header,
        !args.no_split_column,
    )
    .map_err(|source| ConsensusError::Io {
        path: args.output.clone(),
        source,
    })?;
    log::info!(
        "Wrote {} split rows in {:.3}s",
        rows.len(),
        t2.elapsed().as_secs_f64()
    );
    Ok(())
}

fn run_consensus(args: ConsensusArgs) -> Result<(), ConsensusError> {
    let inputs = resolve_inputs(args.inputs, args.ignore_missing)?;

    let t0 = Instant::now();
    let registry = registry_from_files(&inputs)?;
    log::info!(
        "Registered {} taxa from {} files in {:.3}s",
        registry.len(),
        inputs.len(),
        t0.elapsed().as_secs_f64()
    );

    let t1 = Instant::now();
    let distributions = file_distributions(&inputs, &registry, args.burnin)?;
    let mut combined = SplitDistribution::new(&registry);
    for dist in &distributions {
        combined.merge_from(dist)?;
    }
    log::info!(
        "Counted splits on {} trees in {:.3}s",
        combined.total_trees(),
        t1.elapsed().as_secs_f64()
    );

    let t2 = Instant::now();
    let consensus = tree_from_splits(&combined, args.threshold)?;
    log::info!(
        "Consensus at threshold {}: kept {} splits, rejected {} conflicting",
        args.threshold,
        consensus.kept_splits,
        consensus.rejected_splits
    );

    let newick = consensus.tree.to_newick(&registry, !args.no_support);
    let mut out = open_output(&args.output).map_err(|source| ConsensusError::Io {
        path: args.output.clone(),
        source,
    })?;
    writeln!(out, "{newick}").and_then(|()| out.flush()).map_err(|source| {
        ConsensusError::Io {
            path: args.output.clone(),
            source,
        }
    })?;
    log::info!("Wrote consensus tree in {:.3}s", t2.elapsed().as_secs_f64());
    Ok(())
}
