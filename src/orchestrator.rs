//! Interleaved execution of the benchmark binaries shared by two suites
//!
//! Runs alternate between the old and new binary of each package
//! (A, B, A, B, ...) instead of asking one binary for `-test.count=N`, so
//! slow drifts in machine load land on both sides equally.

use crate::backend::binary_to_package;
use crate::cancel::CancelToken;
use crate::error::{BenchError, IoContext, Result};
use crate::exec::{describe, spawn_with};
use crate::layout::ProfileKind;
use crate::progress::{fraction, ProgressReporter};
use crate::suite::BenchmarkSuite;
use std::collections::{BTreeSet, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// What to run and how often
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Runs per binary per suite
    pub iterations: usize,
    /// Regex passed to `-test.bench`
    pub bench_pattern: String,
    /// Value for `-test.benchtime`, e.g. `1s` or `100x`
    pub bench_time: Option<String>,
    pub profiles: BTreeSet<ProfileKind>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            iterations: 10,
            bench_pattern: ".".to_string(),
            bench_time: None,
            profiles: BTreeSet::new(),
        }
    }
}

/// Result of one benchmark binary invocation that did not abort the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The binary exited 1: one or more benchmarks failed an assertion
    AssertionFailure,
}

/// Totals for a whole interleaved run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub invocations: usize,
    pub assertion_failures: usize,
}

/// Executes a single benchmark binary of a suite
pub trait BenchRunner {
    fn run_binary(
        &mut self,
        suite: &mut BenchmarkSuite,
        binary: &str,
        options: &RunOptions,
    ) -> Result<RunOutcome>;
}

/// Runs real test binaries, appending their output to the suite's log
#[derive(Debug, Default)]
pub struct ProcessRunner {
    logtostderr: HashMap<PathBuf, bool>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the binary's `--help` mentions `logtostderr`.
    ///
    /// `--help` exits non-zero for Go test binaries, so only the text is
    /// inspected; a binary that cannot start fails properly on the real run.
    fn accepts_logtostderr(&mut self, binary: &Path) -> bool {
        *self
            .logtostderr
            .entry(binary.to_path_buf())
            .or_insert_with(|| {
                Command::new(binary)
                    .arg("--help")
                    .stdin(Stdio::null())
                    .output()
                    .map(|out| {
                        let mut text = out.stdout;
                        text.extend_from_slice(&out.stderr);
                        String::from_utf8_lossy(&text).contains("logtostderr")
                    })
                    .unwrap_or(false)
            })
    }
}

/// Command-line arguments for one benchmark invocation
pub fn bench_args(
    suite: &BenchmarkSuite,
    options: &RunOptions,
    logtostderr: bool,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-test.run".into(),
        "-".into(),
        "-test.bench".into(),
        options.bench_pattern.clone().into(),
        "-test.benchmem".into(),
    ];
    if let Some(bench_time) = &options.bench_time {
        args.push("-test.benchtime".into());
        args.push(bench_time.into());
    }
    for kind in &options.profiles {
        args.push(kind.flag().into());
        args.push(suite.profile_path(*kind).into_os_string());
    }
    if logtostderr {
        args.push("--logtostderr".into());
        args.push("NONE".into());
    }
    args
}

impl BenchRunner for ProcessRunner {
    fn run_binary(
        &mut self,
        suite: &mut BenchmarkSuite,
        binary: &str,
        options: &RunOptions,
    ) -> Result<RunOutcome> {
        let path = suite.binary_path(binary).ok_or_else(|| {
            BenchError::execution(binary, format!("suite {} has not been built", suite.reference()))
        })?;

        let logtostderr = self.accepts_logtostderr(&path);
        let mut cmd = Command::new(&path);
        cmd.args(bench_args(suite, options, logtostderr));

        let log = suite.log()?;
        let stdout = log
            .try_clone()
            .io_context(|| "duplicating output log handle".to_string())?;
        let stderr = log
            .try_clone()
            .io_context(|| "duplicating output log handle".to_string())?;

        let status = spawn_with(&mut cmd, Stdio::from(stdout), Stdio::from(stderr))?;
        match status.code() {
            Some(0) => Ok(RunOutcome::Completed),
            Some(1) => Ok(RunOutcome::AssertionFailure),
            _ => {
                let log_path = suite
                    .output_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                Err(BenchError::execution(
                    describe(&cmd),
                    format!("{} (output in {})", status, log_path),
                ))
            }
        }
    }
}

/// Drives a [`BenchRunner`] over two suites
#[derive(Debug, Clone)]
pub struct Orchestrator {
    options: RunOptions,
    show_progress: bool,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            show_progress: true,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Stop between invocations once `cancel` fires
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run every binary present in both suites, alternating old and new.
    ///
    /// Stops at the first invocation that fails for a reason other than a
    /// benchmark assertion.
    pub fn run(
        &self,
        runner: &mut dyn BenchRunner,
        old: &mut BenchmarkSuite,
        new: &mut BenchmarkSuite,
    ) -> Result<RunSummary> {
        let shared: Vec<String> = old.shared_binaries(new).into_iter().collect();
        for missing in old.binaries().symmetric_difference(new.binaries()) {
            tracing::debug!("skipping {}: not built for both refs", missing);
        }
        if shared.is_empty() {
            tracing::warn!(
                "no benchmark binaries in common between {} and {}",
                old.reference(),
                new.reference()
            );
        }

        let mut reporter = ProgressReporter::new();
        if self.show_progress {
            reporter.start(std::io::stderr(), "running benchmarks:");
        } else {
            reporter.start(std::io::sink(), "running benchmarks:");
        }

        let iterations = self.options.iterations;
        let mut summary = RunSummary::default();
        for (i, binary) in shared.iter().enumerate() {
            let package = binary_to_package(binary);
            for j in 0..iterations {
                reporter.update(format!(
                    "pkg={} iter={} {}",
                    fraction(i + 1, shared.len()),
                    fraction(j + 1, iterations),
                    package
                ));

                for suite in [&mut *old, &mut *new] {
                    self.cancel.check()?;
                    let outcome = runner.run_binary(suite, binary, &self.options)?;
                    summary.invocations += 1;
                    if outcome == RunOutcome::AssertionFailure {
                        summary.assertion_failures += 1;
                        reporter.suspend(|| {
                            tracing::warn!(
                                "saw one or more benchmark failures in {} at {}",
                                binary,
                                suite.reference()
                            )
                        });
                    }
                }
            }
        }
        reporter.stop();

        Ok(summary)
    }
}
