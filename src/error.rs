//! Error types for the benchmark comparison pipeline
//!
//! Every fatal condition surfaces as a [`BenchError`]. Conditions the pipeline
//! absorbs (a package without test files, a benchmark binary reporting a
//! failed assertion) are modelled as ordinary return values instead.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a comparison run
#[derive(Error, Debug)]
pub enum BenchError {
    /// A git ref did not resolve, or resolved to something git rejects
    #[error("invalid git ref {reference:?}")]
    InvalidRef { reference: String },

    /// The build backend failed for a reason other than "no test files"
    #[error("building benchmark binary for {package}: {message}")]
    BuildFailure { package: String, message: String },

    /// Something other than a regular file sits inside a binary cache dir
    #[error("unexpected directory {} in binary cache", path.display())]
    CacheCorruption { path: PathBuf },

    /// A benchmark binary exited with an unrecognized status
    #[error("error running {command}: {message}")]
    ExecutionFailure { command: String, message: String },

    /// A regression exceeded the configured threshold
    #[error("{metric} regression in {benchmark} of {delta} exceeded threshold of {threshold_pct:.2}%")]
    ThresholdViolation {
        metric: String,
        benchmark: String,
        delta: String,
        threshold_pct: f64,
    },

    /// A helper process (git, go, bazel, the post-checkout hook) failed
    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },

    /// Invalid configuration value or file
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// Benchmark output could not be turned into comparison tables
    #[error("processing benchmark output: {message}")]
    Stats { message: String },

    /// Comparison tables could not be serialized
    /// Ctrl-C or SIGTERM arrived; cleanup ran on the way out
    #[error("interrupted")]
    Interrupted,

    #[error("rendering report: {0}")]
    Render(#[from] serde_json::Error),

    /// A `--previous-run` value that is not a valid artifact timestamp
    #[error("invalid run timestamp {value:?}: {message}")]
    InvalidTimestamp { value: String, message: String },

    /// Filesystem or log error
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, BenchError>;

impl BenchError {
    pub fn invalid_ref(reference: impl Into<String>) -> Self {
        Self::InvalidRef {
            reference: reference.into(),
        }
    }

    pub fn build_failure(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BuildFailure {
            package: package.into(),
            message: message.into(),
        }
    }

    pub fn execution(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExecutionFailure {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn stats(message: impl Into<String>) -> Self {
        Self::Stats {
            message: message.into(),
        }
    }

    /// Wrap an I/O error with a short description of what was being attempted
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this error was produced by a helper process reporting failure
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::Command { .. })
    }
}

/// Attach context to `std::io::Result` values
pub trait IoContext<T> {
    fn io_context(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|e| BenchError::io(context(), e))
    }
}
