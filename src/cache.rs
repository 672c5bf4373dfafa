//! Content-addressed cache of compiled benchmark binaries
//!
//! Binaries for a ref live in `<root>/<ref>/bin/<key>`, where `key` hashes
//! the package filter. The directory existing is the only signal that a
//! build completed. Builds fill `<key>.partial-<pid>` and are renamed onto
//! `<key>` only once every package is done, so a build that fails, panics or
//! is killed outright never leaves anything at `<key>`.

use crate::error::{BenchError, IoContext, Result};
use crate::layout::Layout;
use std::collections::BTreeSet;
use std::hash::Hasher;
use std::path::{Path, PathBuf};

/// Package patterns, canonicalized by sorting so order never matters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageFilter(Vec<String>);

impl PackageFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        patterns.sort();
        Self(patterns)
    }

    pub fn patterns(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Cache key for this filter: FNV-1a (64-bit) over the sorted patterns,
    /// each terminated by a NUL so `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn cache_key(&self) -> String {
        let mut hasher = fnv::FnvHasher::default();
        for pattern in &self.0 {
            hasher.write(pattern.as_bytes());
            hasher.write(&[0]);
        }
        format!("{:016x}", hasher.finish())
    }
}

/// Unique binary names, iterated in sorted order
pub type BinarySet = BTreeSet<String>;

const PARTIAL_MARKER: &str = ".partial-";

/// Outcome of a cache lookup
#[derive(Debug)]
pub enum CacheLookup {
    /// A completed build exists
    Hit { dir: PathBuf, binaries: BinarySet },
    /// No build exists; a staging directory has been created and must be filled
    Miss(PendingBuild),
}

/// Staging directory of a build in progress.
///
/// Dropping it without calling [`PendingBuild::commit`] deletes the
/// directory and everything in it.
#[derive(Debug)]
pub struct PendingBuild {
    dir: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl PendingBuild {
    /// Where the backend should put binaries
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Publish the staged binaries under the cache key
    pub fn commit(mut self) -> Result<PathBuf> {
        std::fs::rename(&self.dir, &self.target).io_context(|| {
            format!(
                "moving {} to {}",
                self.dir.display(),
                self.target.display()
            )
        })?;
        self.committed = true;
        Ok(std::mem::take(&mut self.target))
    }
}

impl Drop for PendingBuild {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        tracing::debug!("discarding incomplete build in {}", self.dir.display());
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove {}: {}", self.dir.display(), e);
            }
        }
    }
}

/// Maps (ref, package filter) to a directory of built binaries
#[derive(Debug, Clone)]
pub struct BuildCache {
    layout: Layout,
}

impl BuildCache {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn bin_dir(&self, reference: &str, filter: &PackageFilter) -> PathBuf {
        self.layout.bin_root(reference).join(filter.cache_key())
    }

    pub fn lookup(&self, reference: &str, filter: &PackageFilter) -> Result<CacheLookup> {
        let dir = self.bin_dir(reference, filter);
        match std::fs::metadata(&dir) {
            Ok(_) => {
                let binaries = list_binaries(&dir)?;
                Ok(CacheLookup::Hit { dir, binaries })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                remove_stale_partials(&dir);
                let staging = partial_dir(&dir);
                if staging.exists() {
                    std::fs::remove_dir_all(&staging)
                        .io_context(|| format!("removing {}", staging.display()))?;
                }
                std::fs::create_dir_all(&staging)
                    .io_context(|| format!("creating {}", staging.display()))?;
                Ok(CacheLookup::Miss(PendingBuild {
                    dir: staging,
                    target: dir,
                    committed: false,
                }))
            }
            Err(e) => Err(BenchError::io(
                format!("looking for binary directory {}", dir.display()),
                e,
            )),
        }
    }
}

fn partial_dir(dir: &Path) -> PathBuf {
    let mut name = dir.file_name().unwrap_or_default().to_os_string();
    name.push(format!("{}{}", PARTIAL_MARKER, std::process::id()));
    dir.with_file_name(name)
}

/// Best effort: staging dirs for `dir` left behind by killed runs
fn remove_stale_partials(dir: &Path) {
    let (Some(parent), Some(key)) = (dir.parent(), dir.file_name()) else {
        return;
    };
    let prefix = format!("{}{}", key.to_string_lossy(), PARTIAL_MARKER);
    let Ok(entries) = std::fs::read_dir(parent) else {
        return;
    };
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            tracing::debug!("removing abandoned build {}", entry.path().display());
            if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                tracing::warn!("failed to remove {}: {}", entry.path().display(), e);
            }
        }
    }
}

fn list_binaries(dir: &Path) -> Result<BinarySet> {
    let mut binaries = BinarySet::new();
    let entries =
        std::fs::read_dir(dir).io_context(|| format!("reading {}", dir.display()))?;
    for entry in entries {
        let entry = entry.io_context(|| format!("reading {}", dir.display()))?;
        let file_type = entry
            .file_type()
            .io_context(|| format!("inspecting {}", entry.path().display()))?;
        if file_type.is_dir() {
            return Err(BenchError::CacheCorruption { path: entry.path() });
        }
        binaries.insert(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(binaries)
}
