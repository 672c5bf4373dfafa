//! Persistent defaults from `benchdiff.toml`, merged with the command line
//!
//! ```toml
//! count = 20
//! run = "Scan|Get"
//! benchtime = "2s"
//! threshold = 0.1
//! post_checkout = "make generate"
//! backend = "bazel"
//! bazel_flags = ["--config=ci"]
//! sort = "name"
//! alpha = 0.01
//! root = "/tmp/benchdiff"
//! ```

use crate::cli::Cli;
use crate::error::{BenchError, IoContext, Result};
use crate::layout::DEFAULT_ROOT;
use crate::regression::{SortOrder, StatConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the repository when `--config` is not given
pub const CONFIG_FILE_NAME: &str = "benchdiff.toml";

/// Which build system compiles the test binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Go,
    Bazel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// Runs of each binary per commit
    pub count: usize,
    /// Benchmark name regex
    pub run: String,
    pub benchtime: Option<String>,
    /// Maximum tolerated regression as a fraction
    pub threshold: Option<f64>,
    pub post_checkout: Option<String>,
    pub backend: Backend,
    /// Extra flags for `bazel build`
    pub bazel_flags: Vec<String>,
    pub sort: SortOrder,
    pub alpha: f64,
    /// Binary and artifact root; relative paths are under the repository
    pub root: Option<PathBuf>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            count: 10,
            run: ".".to_string(),
            benchtime: None,
            threshold: None,
            post_checkout: None,
            backend: Backend::Go,
            bazel_flags: Vec::new(),
            sort: SortOrder::Delta,
            alpha: 0.05,
            root: None,
        }
    }
}

impl BenchConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .io_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text)
            .map_err(|e| BenchError::config(format!("{}: {}", path.display(), e)))
    }

    /// Load `explicit` if given, else `<repo>/benchdiff.toml` if it exists, else defaults
    pub fn discover(repo: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = repo.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            tracing::debug!("using config {}", candidate.display());
            return Self::load(&candidate);
        }
        Ok(Self::default())
    }

    /// Overlay every option given on the command line
    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if let Some(count) = cli.count {
            self.count = count;
        }
        if let Some(run) = &cli.run {
            self.run = run.clone();
        }
        if cli.benchtime.is_some() {
            self.benchtime = cli.benchtime.clone();
        }
        if cli.threshold.is_some() {
            self.threshold = cli.threshold;
        }
        if cli.post_checkout.is_some() {
            self.post_checkout = cli.post_checkout.clone();
        }
        if cli.bazel {
            self.backend = Backend::Bazel;
        }
        if let Some(sort) = cli.sort {
            self.sort = sort;
        }
        if let Some(alpha) = cli.alpha {
            self.alpha = alpha;
        }
        if cli.root.is_some() {
            self.root = cli.root.clone();
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(BenchError::config("count must be at least 1"));
        }
        if let Some(threshold) = self.threshold {
            if threshold.is_nan() || threshold < 0.0 {
                return Err(BenchError::config(format!(
                    "threshold must be a non-negative fraction, got {}",
                    threshold
                )));
            }
        }
        self.stat_config().validate()?;
        regex::Regex::new(&self.run)
            .map_err(|e| BenchError::config(format!("invalid run pattern {:?}: {}", self.run, e)))?;
        Ok(())
    }

    pub fn stat_config(&self) -> StatConfig {
        StatConfig {
            significance_level: self.alpha,
            order: self.sort,
        }
    }

    /// Session root, resolved against the repository
    pub fn root_dir(&self, repo: &Path) -> PathBuf {
        match &self.root {
            Some(root) => repo.join(root),
            None => repo.join(DEFAULT_ROOT),
        }
    }
}
