//! CLI argument parsing for benchdiff
//!
//! Every tunable is optional here so that `benchdiff.toml` can supply it;
//! [`crate::config::BenchConfig::merge_cli`] applies the precedence.

use crate::regression::SortOrder;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for comparison tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Aligned text tables (default)
    #[default]
    Text,
    /// CSV for spreadsheets
    Csv,
    /// Standalone HTML page
    Html,
    /// JSON for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "benchdiff")]
#[command(version)]
#[command(
    about = "Build, run and compare Go microbenchmarks across two git commits",
    long_about = "benchdiff builds the test binaries of the given packages at an old and a new \
commit, runs their benchmarks interleaved, and reports statistically significant \
differences.\n\nExamples:\n  benchdiff ./pkg/...\n  benchdiff --old=main~ --new=main \
--threshold=0.2 ./pkg/kv ./pkg/storage/...\n  benchdiff --new=d1fbdb2 --run=Datum --count=2 \
--format=csv ./pkg/sql/..."
)]
pub struct Cli {
    /// Package patterns to benchmark, as understood by `go list`
    #[arg(value_name = "PACKAGES", required_unless_present = "previous_run")]
    pub packages: Vec<String>,

    /// Commit to compare against new (default new~; 'lastmerge' picks the latest merge commit)
    #[arg(short = 'o', long = "old", value_name = "REF")]
    pub old: Option<String>,

    /// Commit to measure (default HEAD)
    #[arg(short = 'n', long = "new", value_name = "REF")]
    pub new: Option<String>,

    /// Run only benchmarks matching this regex [default: .]
    #[arg(short = 'r', long = "run", value_name = "REGEX")]
    pub run: Option<String>,

    /// Runs of each benchmark binary per commit [default: 10]
    #[arg(short = 'c', long = "count", value_name = "N")]
    pub count: Option<usize>,

    /// Duration or iteration count per benchmark, e.g. 1s or 100x
    #[arg(short = 'd', long = "benchtime", value_name = "D")]
    pub benchtime: Option<String>,

    /// Record CPU profiles
    #[arg(long)]
    pub cpuprofile: bool,

    /// Record allocation profiles
    #[arg(long)]
    pub memprofile: bool,

    /// Record mutex contention profiles
    #[arg(long)]
    pub mutexprofile: bool,

    /// Fail if any regression exceeds this fraction (0.2 = 20%)
    #[arg(short = 't', long = "threshold", value_name = "FRACTION")]
    pub threshold: Option<f64>,

    /// Timestamp of an earlier run; re-process its output instead of running
    #[arg(short = 'p', long = "previous-run", value_name = "TIMESTAMP")]
    pub previous_run: Option<String>,

    /// Command run after each checkout to prepare the tree for building
    #[arg(long = "post-checkout", value_name = "CMD")]
    pub post_checkout: Option<String>,

    /// Build the test binaries with Bazel
    #[arg(short = 'b', long = "bazel")]
    pub bazel: bool,

    /// Row order within each table [default: delta]
    #[arg(short = 's', long = "sort", value_enum)]
    pub sort: Option<SortOrder>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Significance level for reporting a delta [default: 0.05]
    #[arg(long = "alpha", value_name = "P")]
    pub alpha: Option<f64>,

    /// Directory for binaries and artifacts [default: <repo>/benchdiff]
    #[arg(long = "root", value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Config file [default: <repo>/benchdiff.toml if present]
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long = "debug")]
    pub debug: bool,
}
