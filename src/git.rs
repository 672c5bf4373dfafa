//! Git queries, ref resolution and working-tree ownership
//!
//! All repository access goes through the `git` CLI. Ref resolution is
//! read-only; the only mutating operation, checkout, is reachable solely
//! through a [`WorkingTreeGuard`] so that the original branch is always put
//! back, whichever way the build step exits.

use crate::error::{BenchError, Result};
use crate::exec::{capture, spawn_to_stderr};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Keyword for `--old` selecting the most recent merge commit reachable from new
pub const LAST_MERGE: &str = "lastmerge";

/// Refs at or below this length are never shortened further
const MIN_SHORT_LEN: usize = 7;

/// Mutating working-tree operations
pub trait Vcs {
    /// Switch the working tree to `reference`
    fn checkout(&self, reference: &str) -> Result<()>;

    /// Branch currently checked out, or `None` on a detached HEAD
    fn current_branch(&self) -> Result<Option<String>>;
}

/// Git repository rooted at a working directory
#[derive(Debug, Clone)]
pub struct Git {
    repo_dir: PathBuf,
}

impl Git {
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn git(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_dir);
        cmd
    }

    fn run_git(&self, args: &[&str]) -> Result<String> {
        capture(self.git().args(args))
    }

    /// Resolve any revision expression to a full commit id
    pub fn rev_parse(&self, reference: &str) -> Result<String> {
        let commitish = format!("{}^{{commit}}", reference);
        match self.run_git(&["rev-parse", "--verify", "--quiet", &commitish]) {
            Ok(sha) if !sha.is_empty() => Ok(sha),
            Ok(_) => Err(BenchError::invalid_ref(reference)),
            Err(e) if e.is_command_failure() => Err(BenchError::invalid_ref(reference)),
            Err(e) => Err(e),
        }
    }

    /// Whether `reference` names an object in the repository
    pub fn is_valid_ref(&self, reference: &str) -> Result<bool> {
        match self.run_git(&["cat-file", "-t", reference]) {
            Ok(_) => Ok(true),
            Err(BenchError::Command { message, .. })
                if message.contains("Not a valid object name")
                    || message.contains("ambiguous") =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Shorten a commit id to git's minimal unambiguous prefix.
    ///
    /// The full id is kept when it is not a hex sha or when the short form
    /// fails to validate on its own.
    pub fn shorten(&self, sha: &str) -> String {
        if sha.len() <= MIN_SHORT_LEN || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
            return sha.to_string();
        }
        let Ok(short) = self.run_git(&["rev-parse", "--short", sha]) else {
            return sha.to_string();
        };
        if short.len() < sha.len() && sha.starts_with(&short) {
            if let Ok(true) = self.is_valid_ref(&short) {
                return short;
            }
        }
        sha.to_string()
    }

    /// Most recent merge commit reachable from `from`
    pub fn last_merge(&self, from: &str) -> Result<String> {
        let sha = self.run_git(&["log", "-n", "1", "--merges", "--format=%H", from])?;
        if sha.is_empty() {
            return Err(BenchError::invalid_ref(LAST_MERGE));
        }
        Ok(sha)
    }

    /// One-line commit subject, used only for reporting
    pub fn subject(&self, reference: &str) -> Result<String> {
        self.run_git(&["log", "--format=%s", "-1", reference])
    }
}

impl Vcs for Git {
    fn checkout(&self, reference: &str) -> Result<()> {
        spawn_to_stderr(self.git().args(["checkout", "-q", reference]))
    }

    fn current_branch(&self) -> Result<Option<String>> {
        match self.run_git(&["symbolic-ref", "HEAD"]) {
            Ok(name) => Ok(Some(
                name.strip_prefix("refs/heads/").unwrap_or(&name).to_string(),
            )),
            Err(BenchError::Command { message, .. }) if message.contains("not a symbolic ref") => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// The pair of refs under comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRefs {
    pub old: String,
    pub new: String,
}

/// Turns user-supplied `--old`/`--new` strings into validated commit ids
pub struct RefResolver<'a> {
    git: &'a Git,
}

impl<'a> RefResolver<'a> {
    pub fn new(git: &'a Git) -> Self {
        Self { git }
    }

    /// Resolve both refs.
    ///
    /// `new` defaults to `HEAD`. `old` defaults to the first parent of the
    /// resolved `new`, or to the latest merge commit when it is [`LAST_MERGE`].
    pub fn resolve(&self, old: Option<&str>, new: Option<&str>) -> Result<ResolvedRefs> {
        let new = match new.filter(|r| !r.is_empty()) {
            None => self.git.rev_parse("HEAD")?,
            Some(r) => self.git.rev_parse(r)?,
        };
        let new = self.finish(new)?;

        let old = match old.filter(|r| !r.is_empty()) {
            None => self.git.rev_parse(&format!("{}~", new))?,
            Some(LAST_MERGE) => self.git.last_merge(&new)?,
            Some(r) => self.git.rev_parse(r)?,
        };
        let old = self.finish(old)?;

        Ok(ResolvedRefs { old, new })
    }

    fn finish(&self, sha: String) -> Result<String> {
        let reference = self.git.shorten(&sha);
        if !self.git.is_valid_ref(&reference)? {
            return Err(BenchError::invalid_ref(reference));
        }
        Ok(reference)
    }
}

/// Exclusive, scoped ownership of the shared working tree.
///
/// Records the branch checked out at acquisition and checks it out again on
/// drop, including during panic unwinding. A detached HEAD is left wherever
/// the last checkout put it, since there is no branch to return to.
pub struct WorkingTreeGuard<'a> {
    vcs: &'a dyn Vcs,
    restore_to: Option<String>,
}

impl<'a> WorkingTreeGuard<'a> {
    pub fn acquire(vcs: &'a dyn Vcs) -> Result<Self> {
        let restore_to = vcs.current_branch()?;
        Ok(Self { vcs, restore_to })
    }

    /// Switch the tree to `reference` for the lifetime of the guard
    pub fn checkout(&self, reference: &str) -> Result<()> {
        tracing::info!("checking out '{}'", reference);
        self.vcs.checkout(reference)
    }
}

impl Drop for WorkingTreeGuard<'_> {
    fn drop(&mut self) {
        if let Some(branch) = self.restore_to.take() {
            if let Err(e) = self.vcs.checkout(&branch) {
                tracing::warn!("failed to restore branch {}: {}", branch, e);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_repo::{git, init};
    use super::*;
    use std::cell::RefCell;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_defaults_to_head_and_parent() {
        let dir = tempdir().unwrap();
        init(dir.path(), 3);
        let repo = Git::new(dir.path());

        let refs = RefResolver::new(&repo).resolve(None, None).unwrap();

        let head = git(dir.path(), &["rev-parse", "HEAD"]);
        let parent = git(dir.path(), &["rev-parse", "HEAD~"]);
        assert!(head.starts_with(&refs.new));
        assert!(parent.starts_with(&refs.old));
        assert!(refs.new.len() >= MIN_SHORT_LEN && refs.new.len() < head.len());
    }

    #[test]
    fn test_resolve_old_is_parent_of_explicit_new() {
        let dir = tempdir().unwrap();
        init(dir.path(), 3);
        let repo = Git::new(dir.path());
        let first = git(dir.path(), &["rev-parse", "HEAD~2"]);
        let second = git(dir.path(), &["rev-parse", "HEAD~1"]);

        let refs = RefResolver::new(&repo)
            .resolve(Some(""), Some(&second[..7]))
            .unwrap();

        assert!(second.starts_with(&refs.new));
        assert!(first.starts_with(&refs.old));
    }

    #[test]
    fn test_resolve_invalid_new_ref() {
        let dir = tempdir().unwrap();
        init(dir.path(), 1);
        let repo = Git::new(dir.path());

        let err = RefResolver::new(&repo)
            .resolve(None, Some("no-such-branch"))
            .unwrap_err();
        match err {
            BenchError::InvalidRef { reference } => assert_eq!(reference, "no-such-branch"),
            other => panic!("expected InvalidRef, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_root_commit_has_no_parent() {
        let dir = tempdir().unwrap();
        init(dir.path(), 1);
        let repo = Git::new(dir.path());

        let err = RefResolver::new(&repo).resolve(None, None).unwrap_err();
        assert!(matches!(err, BenchError::InvalidRef { .. }));
    }

    #[test]
    fn test_resolve_lastmerge() {
        let dir = tempdir().unwrap();
        init(dir.path(), 2);
        git(dir.path(), &["checkout", "-q", "-b", "topic", "HEAD~"]);
        std::fs::write(dir.path().join("other.txt"), "x").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-q", "-m", "topic"]);
        git(dir.path(), &["checkout", "-q", "main"]);
        git(dir.path(), &["merge", "-q", "--no-ff", "-m", "merge topic", "topic"]);
        std::fs::write(dir.path().join("file.txt"), "after").unwrap();
        git(dir.path(), &["commit", "-q", "-am", "after merge"]);
        let merge = git(dir.path(), &["rev-parse", "HEAD~"]);
        let repo = Git::new(dir.path());

        let refs = RefResolver::new(&repo)
            .resolve(Some(LAST_MERGE), None)
            .unwrap();
        assert!(merge.starts_with(&refs.old));
    }

    #[test]
    fn test_lastmerge_without_merges_is_invalid() {
        let dir = tempdir().unwrap();
        init(dir.path(), 2);
        let repo = Git::new(dir.path());

        let err = RefResolver::new(&repo)
            .resolve(Some(LAST_MERGE), None)
            .unwrap_err();
        match err {
            BenchError::InvalidRef { reference } => assert_eq!(reference, LAST_MERGE),
            other => panic!("expected InvalidRef, got {:?}", other),
        }
    }

    #[test]
    fn test_shorten_keeps_non_hex_refs() {
        let dir = tempdir().unwrap();
        init(dir.path(), 1);
        let repo = Git::new(dir.path());
        assert_eq!(repo.shorten("main~1234567"), "main~1234567");
        assert_eq!(repo.shorten("abc"), "abc");
    }

    #[test]
    fn test_is_valid_ref() {
        let dir = tempdir().unwrap();
        init(dir.path(), 1);
        let repo = Git::new(dir.path());
        assert!(repo.is_valid_ref("HEAD").unwrap());
        assert!(!repo.is_valid_ref("deadbeefdeadbeef").unwrap());
    }

    #[test]
    fn test_subject() {
        let dir = tempdir().unwrap();
        init(dir.path(), 2);
        let repo = Git::new(dir.path());
        assert_eq!(repo.subject("HEAD").unwrap(), "commit 1");
    }

    #[test]
    fn test_current_branch_detached() {
        let dir = tempdir().unwrap();
        init(dir.path(), 2);
        let repo = Git::new(dir.path());
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));

        git(dir.path(), &["checkout", "-q", "HEAD~"]);
        assert_eq!(repo.current_branch().unwrap(), None);
    }

    #[test]
    fn test_guard_restores_branch_with_real_repo() {
        let dir = tempdir().unwrap();
        init(dir.path(), 2);
        let repo = Git::new(dir.path());
        let parent = git(dir.path(), &["rev-parse", "HEAD~"]);

        {
            let guard = WorkingTreeGuard::acquire(&repo).unwrap();
            guard.checkout(&parent).unwrap();
            assert_eq!(repo.current_branch().unwrap(), None);
        }

        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));
    }

    struct RecordingVcs {
        branch: Option<String>,
        checkouts: RefCell<Vec<String>>,
    }

    impl Vcs for RecordingVcs {
        fn checkout(&self, reference: &str) -> Result<()> {
            self.checkouts.borrow_mut().push(reference.to_string());
            Ok(())
        }

        fn current_branch(&self) -> Result<Option<String>> {
            Ok(self.branch.clone())
        }
    }

    #[test]
    fn test_guard_restores_on_panic() {
        let vcs = RecordingVcs {
            branch: Some("feature".to_string()),
            checkouts: RefCell::new(Vec::new()),
        };

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let guard = WorkingTreeGuard::acquire(&vcs).unwrap();
            guard.checkout("abc1234").unwrap();
            panic!("build blew up");
        }));

        assert!(result.is_err());
        assert_eq!(*vcs.checkouts.borrow(), vec!["abc1234", "feature"]);
    }

    #[test]
    fn test_guard_detached_head_not_restored() {
        let vcs = RecordingVcs {
            branch: None,
            checkouts: RefCell::new(Vec::new()),
        };
        {
            let guard = WorkingTreeGuard::acquire(&vcs).unwrap();
            guard.checkout("abc1234").unwrap();
        }
        assert_eq!(*vcs.checkouts.borrow(), vec!["abc1234"]);
    }
}
