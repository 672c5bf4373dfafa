//! End-to-end comparison: resolve, build, run, compare, render, gate
//!
//! ```text
//! RefResolver ─▶ SuiteBuilder(old), SuiteBuilder(new) ─▶ Orchestrator
//!             ─▶ StatEngine ─▶ render ─▶ ThresholdGate
//! ```
//!
//! With `--previous-run` the build and run steps are skipped and the logs of
//! that earlier run are re-processed.

use crate::backend::{BazelBackend, BuildBackend, GoBackend};
use crate::cache::{BuildCache, PackageFilter};
use crate::cancel::CancelToken;
use crate::cli::{Cli, OutputFormat};
use crate::config::{Backend, BenchConfig};
use crate::csv_output::CsvOutput;
use crate::error::{IoContext, Result};
use crate::git::{Git, RefResolver, ResolvedRefs, WorkingTreeGuard};
use crate::html_output::HtmlOutput;
use crate::json_output::JsonOutput;
use crate::layout::{Layout, ProfileKind, RunStamp};
use crate::orchestrator::{BenchRunner, Orchestrator, ProcessRunner, RunOptions, RunSummary};
use crate::regression::{BenchstatEngine, ComparisonTable, StatEngine, ThresholdGate};
use crate::suite::{BenchmarkSuite, PrepHook, SuiteBuilder};
use crate::text_output::TextOutput;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;

/// Everything one invocation needs, after config and CLI are merged
#[derive(Debug, Clone)]
pub struct Request {
    /// Repository root; also the working directory for git and go
    pub repo: PathBuf,
    pub packages: Vec<String>,
    pub old: Option<String>,
    pub new: Option<String>,
    pub profiles: BTreeSet<ProfileKind>,
    pub previous_run: Option<String>,
    pub format: OutputFormat,
    pub config: BenchConfig,
    pub show_progress: bool,
}

impl Request {
    pub fn from_cli(cli: &Cli, repo: PathBuf, config: BenchConfig) -> Self {
        let mut profiles = BTreeSet::new();
        for (enabled, kind) in [
            (cli.cpuprofile, ProfileKind::Cpu),
            (cli.memprofile, ProfileKind::Mem),
            (cli.mutexprofile, ProfileKind::Mutex),
        ] {
            if enabled {
                profiles.insert(kind);
            }
        }
        Self {
            repo,
            packages: cli.packages.clone(),
            old: cli.old.clone(),
            new: cli.new.clone(),
            profiles,
            previous_run: cli.previous_run.clone(),
            format: cli.format,
            config,
            show_progress: true,
        }
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            iterations: self.config.count,
            bench_pattern: self.config.run.clone(),
            bench_time: self.config.benchtime.clone(),
            profiles: self.profiles.clone(),
        }
    }
}

/// What a successful comparison produced
#[derive(Debug)]
pub struct Report {
    pub refs: ResolvedRefs,
    pub tables: Vec<ComparisonTable>,
    /// `None` when a previous run was re-processed
    pub run: Option<RunSummary>,
    pub old_log: Option<PathBuf>,
    pub new_log: Option<PathBuf>,
}

pub struct Pipeline {
    request: Request,
    backend: Box<dyn BuildBackend>,
    runner: Box<dyn BenchRunner>,
    engine: Box<dyn StatEngine>,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(request: Request) -> Self {
        let backend: Box<dyn BuildBackend> = match request.config.backend {
            Backend::Go => Box::new(GoBackend),
            Backend::Bazel => Box::new(BazelBackend {
                build_flags: request.config.bazel_flags.clone(),
            }),
        };
        let engine = Box::new(BenchstatEngine::new(request.config.stat_config()));
        Self {
            request,
            backend,
            runner: Box::new(ProcessRunner::new()),
            engine,
            cancel: CancelToken::new(),
        }
    }

    /// Abort between build and run steps once `cancel` fires
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_backend(mut self, backend: Box<dyn BuildBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_runner(mut self, runner: Box<dyn BenchRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Run the comparison, writing the rendered tables to `out`.
    ///
    /// Threshold violations are reported after the tables have been written.
    pub fn run(&mut self, out: &mut dyn Write) -> Result<Report> {
        let request = &self.request;
        request.config.validate()?;

        let git = Git::new(&request.repo);
        let refs = RefResolver::new(&git).resolve(request.old.as_deref(), request.new.as_deref())?;
        let old_subject = git.subject(&refs.old)?;
        let new_subject = git.subject(&refs.new)?;
        tracing::info!("old: {} {:.50}", refs.old, old_subject);
        tracing::info!("new: {} {:.50}", refs.new, new_subject);

        let layout = Layout::new(request.config.root_dir(&request.repo));
        let mut old = BenchmarkSuite::new(&refs.old, old_subject, &layout);
        let mut new = BenchmarkSuite::new(&refs.new, new_subject, &layout);

        let run = match &request.previous_run {
            Some(previous) => {
                let stamp = RunStamp::parse(previous)?;
                old.open_previous_log(&stamp)?;
                new.open_previous_log(&stamp)?;
                tracing::info!(
                    "found previous run; old={}, new={}",
                    old.output_path().map(|p| p.display().to_string()).unwrap_or_default(),
                    new.output_path().map(|p| p.display().to_string()).unwrap_or_default(),
                );
                None
            }
            None => {
                let stamp = RunStamp::now();
                let filter = PackageFilter::new(request.packages.iter().cloned());
                let hook = request
                    .config
                    .post_checkout
                    .as_deref()
                    .map(PrepHook::parse)
                    .transpose()?;
                let cache = BuildCache::new(layout.clone());
                let builder = SuiteBuilder::new(&request.repo, &cache, self.backend.as_ref())
                    .with_hook(hook.as_ref())
                    .with_progress(request.show_progress)
                    .with_cancel(self.cancel.clone());

                {
                    let tree = WorkingTreeGuard::acquire(&git)?;
                    builder.build(&mut old, &filter, &stamp, &tree)?;
                    builder.build(&mut new, &filter, &stamp, &tree)?;
                }

                let summary = Orchestrator::new(request.run_options())
                    .with_progress(request.show_progress)
                    .with_cancel(self.cancel.clone())
                    .run(self.runner.as_mut(), &mut old, &mut new)?;
                if summary.assertion_failures > 0 {
                    tracing::warn!(
                        "{} of {} benchmark runs reported failures",
                        summary.assertion_failures,
                        summary.invocations
                    );
                }
                Some(summary)
            }
        };

        let tables = self
            .engine
            .compare(old.rewound_log()?, new.rewound_log()?)?;

        let rendered = render(request.format, &refs, request.config.threshold, &tables)?;
        out.write_all(rendered.as_bytes())
            .io_context(|| "writing report".to_string())?;

        if run.is_some() && !request.profiles.is_empty() {
            let locations = profile_locations(&request.profiles, &old, &new);
            if request.format == OutputFormat::Text {
                out.write_all(locations.as_bytes())
                    .io_context(|| "writing report".to_string())?;
            } else {
                tracing::info!("{}", locations.trim());
            }
        }

        ThresholdGate::new(request.config.threshold).evaluate(&tables)?;

        Ok(Report {
            refs,
            tables,
            run,
            old_log: old.output_path().map(PathBuf::from),
            new_log: new.output_path().map(PathBuf::from),
        })
    }
}

/// Render tables in the requested format
pub fn render(
    format: OutputFormat,
    refs: &ResolvedRefs,
    threshold: Option<f64>,
    tables: &[ComparisonTable],
) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => {
            let mut out = TextOutput::new();
            for table in tables {
                out.add_table(table.clone());
            }
            out.to_text()
        }
        OutputFormat::Csv => {
            let mut out = CsvOutput::new();
            for table in tables {
                out.add_table(table.clone());
            }
            out.to_csv()
        }
        OutputFormat::Html => {
            let mut out = HtmlOutput::new(&refs.old, &refs.new);
            for table in tables {
                out.add_table(table.clone());
            }
            out.to_html()
        }
        OutputFormat::Json => {
            let mut out = JsonOutput::new(&refs.old, &refs.new, threshold);
            for table in tables {
                out.add_table(table.clone());
            }
            let mut json = out.to_json()?;
            json.push('\n');
            json
        }
    })
}

/// `wrote cpu profiles to:` blocks for every enabled profile kind
pub fn profile_locations(
    profiles: &BTreeSet<ProfileKind>,
    old: &BenchmarkSuite,
    new: &BenchmarkSuite,
) -> String {
    let mut text = String::new();
    for kind in profiles {
        text.push_str(&format!(
            "\nwrote {} profiles to:\n  old={}\n  new={}\n",
            kind.name(),
            old.profile_path(*kind).display(),
            new.profile_path(*kind).display()
        ));
    }
    text
}
