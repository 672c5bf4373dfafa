//! Benchmark suites and the builder that fills them
//!
//! A [`BenchmarkSuite`] is everything the pipeline knows about one side of
//! the comparison: the ref, its output log and the set of benchmark
//! binaries built for it. [`SuiteBuilder`] populates a suite exactly once,
//! either from the binary cache or by checking out the ref and compiling.

use crate::backend::BuildBackend;
use crate::cache::{BinarySet, BuildCache, CacheLookup, PackageFilter};
use crate::cancel::CancelToken;
use crate::error::{BenchError, IoContext, Result};
use crate::exec::spawn_to_stderr;
use crate::git::WorkingTreeGuard;
use crate::layout::{Layout, ProfileKind, RunStamp};
use crate::progress::{fraction, ProgressReporter};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Command;

/// One side of the comparison
#[derive(Debug)]
pub struct BenchmarkSuite {
    reference: String,
    subject: String,
    layout: Layout,
    output_path: Option<PathBuf>,
    output_log: Option<File>,
    bin_dir: Option<PathBuf>,
    binaries: BinarySet,
    built: bool,
}

impl BenchmarkSuite {
    pub fn new(reference: impl Into<String>, subject: impl Into<String>, layout: &Layout) -> Self {
        Self {
            reference: reference.into(),
            subject: subject.into(),
            layout: layout.clone(),
            output_path: None,
            output_log: None,
            bin_dir: None,
            binaries: BinarySet::new(),
            built: false,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.layout.artifacts_dir(&self.reference)
    }

    pub fn profile_path(&self, kind: ProfileKind) -> PathBuf {
        self.layout.profile(&self.reference, kind)
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn bin_dir(&self) -> Option<&Path> {
        self.bin_dir.as_deref()
    }

    pub fn binaries(&self) -> &BinarySet {
        &self.binaries
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Full path of a cached binary
    pub fn binary_path(&self, binary: &str) -> Option<PathBuf> {
        self.bin_dir.as_ref().map(|d| d.join(binary))
    }

    /// Binaries present in both suites, sorted by name
    pub fn shared_binaries(&self, other: &BenchmarkSuite) -> BinarySet {
        self.binaries
            .intersection(&other.binaries)
            .cloned()
            .collect()
    }

    /// Create the artifact directory and open the output log for reading and appending
    pub fn open_log(&mut self, stamp: &RunStamp) -> Result<()> {
        let dir = self.artifact_dir();
        std::fs::create_dir_all(&dir).io_context(|| format!("creating {}", dir.display()))?;

        let path = self.layout.output_log(&self.reference, stamp);
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .io_context(|| format!("opening {}", path.display()))?;

        self.output_log = Some(file);
        self.output_path = Some(path);
        Ok(())
    }

    /// Re-open the output log written by an earlier run, read-only
    pub fn open_previous_log(&mut self, stamp: &RunStamp) -> Result<()> {
        let path = self.layout.output_log(&self.reference, stamp);
        let file = File::open(&path).io_context(|| format!("opening {}", path.display()))?;
        self.output_log = Some(file);
        self.output_path = Some(path);
        Ok(())
    }

    /// The output log, positioned wherever the last writer left it
    pub fn log(&mut self) -> Result<&mut File> {
        let reference = &self.reference;
        self.output_log.as_mut().ok_or_else(|| {
            BenchError::io(
                format!("output log for {}", reference),
                std::io::Error::new(std::io::ErrorKind::NotFound, "log not opened"),
            )
        })
    }

    /// The output log rewound to its start, ready to be parsed
    pub fn rewound_log(&mut self) -> Result<&mut File> {
        let file = self.log()?;
        file.seek(SeekFrom::Start(0))
            .io_context(|| "rewinding output log".to_string())?;
        Ok(file)
    }

    pub(crate) fn mark_built(&mut self, bin_dir: PathBuf, binaries: BinarySet) {
        assert!(!self.built, "benchmark suite for {} already built", self.reference);
        self.bin_dir = Some(bin_dir);
        self.binaries = binaries;
        self.built = true;
    }
}

/// Repository-preparation command run right after each checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepHook {
    program: String,
    args: Vec<String>,
}

impl PrepHook {
    /// Split a shell-style command line such as `make generate GOFLAGS=-mod=vendor`
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut words = shlex::split(command_line)
            .ok_or_else(|| BenchError::config(format!("unbalanced quotes in {:?}", command_line)))?
            .into_iter();
        let program = words
            .next()
            .ok_or_else(|| BenchError::config("post-checkout command is empty"))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    /// Run in `repo`; all of its output goes to stderr, never to a benchmark log
    pub fn run(&self, repo: &Path) -> Result<()> {
        spawn_to_stderr(
            Command::new(&self.program)
                .args(&self.args)
                .current_dir(repo),
        )
    }
}

/// Fills suites from the cache or by compiling
pub struct SuiteBuilder<'a> {
    repo: &'a Path,
    cache: &'a BuildCache,
    backend: &'a dyn BuildBackend,
    hook: Option<&'a PrepHook>,
    show_progress: bool,
    cancel: CancelToken,
}

impl<'a> SuiteBuilder<'a> {
    pub fn new(repo: &'a Path, cache: &'a BuildCache, backend: &'a dyn BuildBackend) -> Self {
        Self {
            repo,
            cache,
            backend,
            hook: None,
            show_progress: true,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_hook(mut self, hook: Option<&'a PrepHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Stop between packages once `cancel` fires
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build `suite` for `filter`.
    ///
    /// # Panics
    ///
    /// Panics if the suite has already been built.
    pub fn build(
        &self,
        suite: &mut BenchmarkSuite,
        filter: &PackageFilter,
        stamp: &RunStamp,
        tree: &WorkingTreeGuard<'_>,
    ) -> Result<()> {
        assert!(
            !suite.is_built(),
            "benchmark suite for {} already built",
            suite.reference()
        );

        suite.open_log(stamp)?;

        let pending = match self.cache.lookup(suite.reference(), filter)? {
            CacheLookup::Hit { dir, binaries } => {
                tracing::info!(
                    "test binaries already exist for {}: {:.50}",
                    suite.reference(),
                    suite.subject()
                );
                suite.mark_built(dir, binaries);
                return Ok(());
            }
            CacheLookup::Miss(pending) => pending,
        };

        tree.checkout(suite.reference())?;
        if let Some(hook) = self.hook {
            hook.run(self.repo)?;
        }

        let packages = self.backend.expand_packages(self.repo, filter)?;

        let mut reporter = ProgressReporter::new();
        let prefix = format!(
            "building benchmark binaries for {}: {:.50} [backend={}]",
            suite.reference(),
            suite.subject(),
            self.backend.name()
        );
        if self.show_progress {
            reporter.start(std::io::stderr(), prefix);
        } else {
            reporter.start(std::io::sink(), prefix);
        }

        let mut binaries = BinarySet::new();
        for (i, package) in packages.iter().enumerate() {
            self.cancel.check()?;
            reporter.update(fraction(i, packages.len()));
            if let Some(binary) =
                self.backend
                    .build_test_binary(self.repo, package, pending.dir())?
            {
                binaries.insert(binary);
            }
        }
        reporter.update(fraction(packages.len(), packages.len()));
        reporter.stop();

        suite.mark_built(pending.commit()?, binaries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::package_to_binary;
    use crate::git::Vcs;
    use std::cell::RefCell;
    use tempfile::tempdir;

    /// Records checkouts; optionally drops a `CHECKED_OUT` file naming the ref
    #[derive(Default)]
    struct FakeVcs {
        checkouts: RefCell<Vec<String>>,
        worktree: Option<PathBuf>,
    }

    impl Vcs for FakeVcs {
        fn checkout(&self, reference: &str) -> Result<()> {
            self.checkouts.borrow_mut().push(reference.to_string());
            if let Some(dir) = &self.worktree {
                std::fs::write(dir.join("CHECKED_OUT"), reference).unwrap();
            }
            Ok(())
        }

        fn current_branch(&self) -> Result<Option<String>> {
            Ok(None)
        }
    }

    /// Packages named `notests/...` build nothing; `broken/...` fail
    #[derive(Default)]
    struct FakeBackend {
        packages: Vec<String>,
        compiles: RefCell<Vec<String>>,
    }

    impl FakeBackend {
        fn with_packages(packages: &[&str]) -> Self {
            Self {
                packages: packages.iter().map(|p| p.to_string()).collect(),
                compiles: RefCell::new(Vec::new()),
            }
        }
    }

    impl BuildBackend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn expand_packages(&self, _repo: &Path, _filter: &PackageFilter) -> Result<Vec<String>> {
            Ok(self.packages.clone())
        }

        fn build_test_binary(
            &self,
            _repo: &Path,
            package: &str,
            dest_dir: &Path,
        ) -> Result<Option<String>> {
            self.compiles.borrow_mut().push(package.to_string());
            if package.starts_with("broken/") {
                return Err(BenchError::build_failure(package, "syntax error"));
            }
            if package.starts_with("notests/") {
                return Ok(None);
            }
            let binary = package_to_binary(package);
            std::fs::write(dest_dir.join(&binary), b"#!/bin/sh\n").unwrap();
            Ok(Some(binary))
        }
    }

    fn stamp() -> RunStamp {
        RunStamp::parse("2024-05-01T13_04_05Z").unwrap()
    }

    #[test]
    fn test_second_build_is_pure_cache_hit() {
        let root = tempdir().unwrap();
        let layout = Layout::new(root.path());
        let cache = BuildCache::new(layout.clone());
        let backend = FakeBackend::with_packages(&["github.com/o/r/a", "github.com/o/r/b"]);
        let vcs = FakeVcs::default();
        let tree = WorkingTreeGuard::acquire(&vcs).unwrap();
        let builder = SuiteBuilder::new(root.path(), &cache, &backend).with_progress(false);
        let filter = PackageFilter::new(["./..."]);

        let mut first = BenchmarkSuite::new("abc1234", "first", &layout);
        builder.build(&mut first, &filter, &stamp(), &tree).unwrap();
        let mut second = BenchmarkSuite::new("abc1234", "first", &layout);
        builder.build(&mut second, &filter, &stamp(), &tree).unwrap();

        assert_eq!(*vcs.checkouts.borrow(), vec!["abc1234"]);
        assert_eq!(backend.compiles.borrow().len(), 2);
        assert_eq!(first.binaries(), second.binaries());
        assert_eq!(
            second.binaries().iter().collect::<Vec<_>>(),
            ["o_r_a", "o_r_b"]
        );
    }

    #[test]
    fn test_package_without_tests_contributes_nothing() {
        let root = tempdir().unwrap();
        let layout = Layout::new(root.path());
        let cache = BuildCache::new(layout.clone());
        let backend = FakeBackend::with_packages(&["github.com/o/r/a", "notests/x"]);
        let vcs = FakeVcs::default();
        let tree = WorkingTreeGuard::acquire(&vcs).unwrap();
        let builder = SuiteBuilder::new(root.path(), &cache, &backend).with_progress(false);

        let mut suite = BenchmarkSuite::new("abc1234", "s", &layout);
        builder
            .build(&mut suite, &PackageFilter::new(["./..."]), &stamp(), &tree)
            .unwrap();

        assert_eq!(suite.binaries().len(), 1);
        assert!(suite.binaries().contains("o_r_a"));
    }

    #[test]
    fn test_failed_build_removes_cache_dir() {
        let root = tempdir().unwrap();
        let layout = Layout::new(root.path());
        let cache = BuildCache::new(layout.clone());
        let backend = FakeBackend::with_packages(&["github.com/o/r/a", "broken/b", "github.com/o/r/c"]);
        let vcs = FakeVcs::default();
        let tree = WorkingTreeGuard::acquire(&vcs).unwrap();
        let builder = SuiteBuilder::new(root.path(), &cache, &backend).with_progress(false);
        let filter = PackageFilter::new(["./..."]);

        let mut suite = BenchmarkSuite::new("abc1234", "s", &layout);
        let err = builder
            .build(&mut suite, &filter, &stamp(), &tree)
            .unwrap_err();

        assert!(matches!(err, BenchError::BuildFailure { .. }));
        assert!(!cache.bin_dir("abc1234", &filter).exists());
        let leftovers = std::fs::read_dir(layout.bin_root("abc1234")).unwrap().count();
        assert_eq!(leftovers, 0);
        assert!(!suite.is_built());
        // The package after the failure was never attempted.
        assert_eq!(backend.compiles.borrow().len(), 2);
    }

    #[test]
    fn test_cancelled_build_stops_and_leaves_no_cache() {
        let root = tempdir().unwrap();
        let layout = Layout::new(root.path());
        let cache = BuildCache::new(layout.clone());
        let backend = FakeBackend::with_packages(&["github.com/o/r/a", "github.com/o/r/b"]);
        let vcs = FakeVcs::default();
        let tree = WorkingTreeGuard::acquire(&vcs).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let builder = SuiteBuilder::new(root.path(), &cache, &backend)
            .with_progress(false)
            .with_cancel(cancel);
        let filter = PackageFilter::new(["./..."]);

        let mut suite = BenchmarkSuite::new("abc1234", "s", &layout);
        let err = builder
            .build(&mut suite, &filter, &stamp(), &tree)
            .unwrap_err();

        assert!(matches!(err, BenchError::Interrupted));
        assert!(backend.compiles.borrow().is_empty());
        assert!(!cache.bin_dir("abc1234", &filter).exists());
        assert!(!suite.is_built());
    }

    #[cfg(unix)]
    #[test]
    fn test_hook_runs_after_checkout_on_miss_only() {
        let root = tempdir().unwrap();
        let repo = tempdir().unwrap();
        let layout = Layout::new(root.path());
        let cache = BuildCache::new(layout.clone());
        let backend = FakeBackend::with_packages(&["github.com/o/r/a"]);
        let vcs = FakeVcs {
            worktree: Some(repo.path().to_path_buf()),
            ..FakeVcs::default()
        };
        let tree = WorkingTreeGuard::acquire(&vcs).unwrap();
        let hook = PrepHook::parse(
            "sh -c 'echo hook-chatter; echo hook-chatter >&2; cat CHECKED_OUT >> marker; echo >> marker'",
        )
        .unwrap();
        let builder = SuiteBuilder::new(repo.path(), &cache, &backend)
            .with_hook(Some(&hook))
            .with_progress(false);
        let filter = PackageFilter::new(["./..."]);

        let mut first = BenchmarkSuite::new("abc1234", "s", &layout);
        builder.build(&mut first, &filter, &stamp(), &tree).unwrap();
        let mut second = BenchmarkSuite::new("abc1234", "s", &layout);
        builder.build(&mut second, &filter, &stamp(), &tree).unwrap();

        // One run, and it saw the ref already checked out.
        let marker = std::fs::read_to_string(repo.path().join("marker")).unwrap();
        assert_eq!(marker, "abc1234\n");

        let log = std::fs::read_to_string(second.output_path().unwrap()).unwrap();
        assert!(!log.contains("hook-chatter"), "hook output in log: {:?}", log);
    }

    #[test]
    #[should_panic(expected = "already built")]
    fn test_building_twice_panics() {
        let root = tempdir().unwrap();
        let layout = Layout::new(root.path());
        let cache = BuildCache::new(layout.clone());
        let backend = FakeBackend::with_packages(&["github.com/o/r/a"]);
        let vcs = FakeVcs::default();
        let tree = WorkingTreeGuard::acquire(&vcs).unwrap();
        let builder = SuiteBuilder::new(root.path(), &cache, &backend).with_progress(false);
        let filter = PackageFilter::new(["./..."]);

        let mut suite = BenchmarkSuite::new("abc1234", "s", &layout);
        builder.build(&mut suite, &filter, &stamp(), &tree).unwrap();
        let _ = builder.build(&mut suite, &filter, &stamp(), &tree);
    }

    #[test]
    fn test_build_opens_log_in_artifact_dir() {
        let root = tempdir().unwrap();
        let layout = Layout::new(root.path());
        let cache = BuildCache::new(layout.clone());
        let backend = FakeBackend::with_packages(&[]);
        let vcs = FakeVcs::default();
        let tree = WorkingTreeGuard::acquire(&vcs).unwrap();
        let builder = SuiteBuilder::new(root.path(), &cache, &backend).with_progress(false);

        let mut suite = BenchmarkSuite::new("abc1234", "s", &layout);
        builder
            .build(&mut suite, &PackageFilter::new(["./..."]), &stamp(), &tree)
            .unwrap();

        let path = suite.output_path().unwrap().to_path_buf();
        assert_eq!(
            path,
            root.path()
                .join("abc1234/artifacts/out.2024-05-01T13_04_05Z")
        );
        assert!(path.is_file());
    }

    #[test]
    fn test_shared_binaries_intersection() {
        let layout = Layout::new("bd");
        let mut a = BenchmarkSuite::new("a", "", &layout);
        let mut b = BenchmarkSuite::new("b", "", &layout);
        a.mark_built(
            PathBuf::from("x"),
            ["p1", "p2", "p3"].iter().map(|s| s.to_string()).collect(),
        );
        b.mark_built(
            PathBuf::from("y"),
            ["p3", "p2", "p4"].iter().map(|s| s.to_string()).collect(),
        );

        let shared = a.shared_binaries(&b);
        assert_eq!(shared.iter().collect::<Vec<_>>(), ["p2", "p3"]);
        assert_eq!(shared, b.shared_binaries(&a));
    }

    #[test]
    fn test_rewound_log_reads_from_start() {
        use std::io::{Read, Write};
        let root = tempdir().unwrap();
        let layout = Layout::new(root.path());
        let mut suite = BenchmarkSuite::new("abc1234", "s", &layout);
        suite.open_log(&stamp()).unwrap();
        suite.log().unwrap().write_all(b"BenchmarkX 1 2 ns/op\n").unwrap();

        let mut text = String::new();
        suite.rewound_log().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "BenchmarkX 1 2 ns/op\n");
    }

    #[test]
    fn test_log_before_open_is_error() {
        let mut suite = BenchmarkSuite::new("abc1234", "s", &Layout::new("bd"));
        assert!(suite.log().is_err());
    }

    #[test]
    fn test_prep_hook_parse() {
        let hook = PrepHook::parse("make generate 'GOFLAGS=-mod=vendor -x'").unwrap();
        assert_eq!(hook.program, "make");
        assert_eq!(hook.args, vec!["generate", "GOFLAGS=-mod=vendor -x"]);

        assert!(PrepHook::parse("").is_err());
        assert!(PrepHook::parse("echo 'open").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_prep_hook_failure_is_error() {
        let dir = tempdir().unwrap();
        assert!(PrepHook::parse("true").unwrap().run(dir.path()).is_ok());
        assert!(PrepHook::parse("false").unwrap().run(dir.path()).is_err());
    }
}
