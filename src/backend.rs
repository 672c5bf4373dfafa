//! Build backends that turn a Go package into a benchmark test binary
//!
//! Two interchangeable backends are supported: plain `go test -c`
//! ([`GoBackend`]) and Bazel `go_test` targets ([`BazelBackend`]). Both are
//! driven from the repository root of the shared working tree.

use crate::cache::PackageFilter;
use crate::error::{BenchError, IoContext, Result};
use crate::exec::capture;
use std::path::Path;
use std::process::Command;

/// Module-root prefix stripped from package paths when naming binaries
pub const MODULE_ROOT_PREFIX: &str = "github.com";

/// Translate a package path into a test binary name.
///
/// `github.com/org/repo/pkg/kv` becomes `org_repo_pkg_kv`. Underscores
/// already in the path are indistinguishable from separators afterwards.
pub fn package_to_binary(package: &str) -> String {
    let name = package
        .strip_prefix(MODULE_ROOT_PREFIX)
        .unwrap_or(package)
        .replace('/', "_");
    name.trim_start_matches('_').to_string()
}

/// Best-effort inverse of [`package_to_binary`], for display only
pub fn binary_to_package(binary: &str) -> String {
    binary.replace('_', "/")
}

/// Compiles one benchmark binary per package
pub trait BuildBackend {
    /// Short name for status lines
    fn name(&self) -> &'static str;

    /// Expand package patterns into concrete package paths
    fn expand_packages(&self, repo: &Path, filter: &PackageFilter) -> Result<Vec<String>> {
        go_list(repo, filter)
    }

    /// Build the test binary for `package` into `dest_dir`.
    ///
    /// Returns the binary's file name, or `None` when the package has no
    /// tests and therefore produced nothing.
    fn build_test_binary(&self, repo: &Path, package: &str, dest_dir: &Path)
        -> Result<Option<String>>;
}

/// `go list <patterns>`; one package per line
pub fn go_list(repo: &Path, filter: &PackageFilter) -> Result<Vec<String>> {
    let out = capture(
        Command::new("go")
            .arg("list")
            .args(filter.patterns())
            .current_dir(repo),
    )?;
    Ok(out
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Direct compilation with `go test -c`
#[derive(Debug, Default, Clone, Copy)]
pub struct GoBackend;

impl BuildBackend for GoBackend {
    fn name(&self) -> &'static str {
        "go"
    }

    fn build_test_binary(
        &self,
        repo: &Path,
        package: &str,
        dest_dir: &Path,
    ) -> Result<Option<String>> {
        let binary = package_to_binary(package);
        let dest = dest_dir.join(&binary);

        // Captured so "no test files" warnings stay off the terminal.
        capture(&mut go_test_compile(repo, package, &dest))
            .map_err(|e| BenchError::build_failure(package, e.to_string()))?;

        // Packages without tests compile to nothing. `dest_dir` starts out
        // empty, so anything at `dest` came from this compile.
        if !dest.exists() {
            return Ok(None);
        }
        Ok(Some(binary))
    }
}

/// `go test -c -o <dest> <package>`, run from the repository root
fn go_test_compile(repo: &Path, package: &str, dest: &Path) -> Command {
    let mut cmd = Command::new("go");
    cmd.args(["test", "-c", "-o"])
        .arg(dest)
        .arg(package)
        .current_dir(repo);
    cmd
}

/// Build `go_test` targets with Bazel
#[derive(Debug, Default, Clone)]
pub struct BazelBackend {
    /// Extra flags passed to every `bazel build`, e.g. `--config=test`
    pub build_flags: Vec<String>,
}

impl BazelBackend {
    /// Package directory relative to the workspace root
    fn workspace_path(repo: &Path, package: &str) -> Result<String> {
        let module = capture(Command::new("go").args(["list", "-m"]).current_dir(repo))?;
        let relative = package
            .strip_prefix(module.trim())
            .unwrap_or(package)
            .trim_start_matches('/');
        Ok(relative.to_string())
    }

    fn test_target(repo: &Path, dir: &str) -> Result<Option<String>> {
        let query = format!("kind(go_test, //{}:all)", dir);
        let out = capture(
            Command::new("bazel")
                .args(["query", &query])
                .current_dir(repo),
        )?;
        Ok(out.lines().map(str::trim).find(|l| !l.is_empty()).map(str::to_string))
    }

    fn output_file(repo: &Path, target: &str) -> Result<String> {
        let out = capture(
            Command::new("bazel")
                .args(["cquery", target, "--output=files"])
                .current_dir(repo),
        )?;
        out.lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| BenchError::build_failure(target, "bazel reported no output files"))
    }
}

impl BuildBackend for BazelBackend {
    fn name(&self) -> &'static str {
        "bazel"
    }

    fn build_test_binary(
        &self,
        repo: &Path,
        package: &str,
        dest_dir: &Path,
    ) -> Result<Option<String>> {
        let fail = |e: BenchError| BenchError::build_failure(package, e.to_string());

        let dir = Self::workspace_path(repo, package).map_err(fail)?;
        let Some(target) = Self::test_target(repo, &dir).map_err(fail)? else {
            return Ok(None);
        };

        capture(
            Command::new("bazel")
                .arg("build")
                .arg(&target)
                .args(&self.build_flags)
                .current_dir(repo),
        )
        .map_err(fail)?;

        let built = repo.join(Self::output_file(repo, &target).map_err(fail)?);
        let binary = package_to_binary(package);
        let dest = dest_dir.join(&binary);
        // Bazel outputs are read-only and live in its output base; copy them.
        std::fs::copy(&built, &dest)
            .io_context(|| format!("copying {} to {}", built.display(), dest.display()))?;
        make_executable(&dest)?;
        Ok(Some(binary))
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .io_context(|| format!("chmod {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
