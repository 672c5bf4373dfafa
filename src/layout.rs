//! On-disk layout of a comparison session
//!
//! ```text
//! <root>/<ref>/artifacts/out.<timestamp>     raw benchmark output
//! <root>/<ref>/artifacts/{cpu,mem,mutex}.prof
//! <root>/<ref>/bin/<filter hash>/<binary>    cached test binaries
//! ```

use crate::error::{BenchError, Result};
use chrono::{DateTime, FixedOffset, Local, TimeZone};
use std::path::{Path, PathBuf};

/// Default session root, relative to the repository
pub const DEFAULT_ROOT: &str = "benchdiff";

const TIME_FORMAT: &str = "%Y-%m-%dT%H_%M_%S";

/// Profile kinds a benchmark run can record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProfileKind {
    Cpu,
    Mem,
    Mutex,
}

impl ProfileKind {
    pub const ALL: [ProfileKind; 3] = [ProfileKind::Cpu, ProfileKind::Mem, ProfileKind::Mutex];

    pub fn name(self) -> &'static str {
        match self {
            ProfileKind::Cpu => "cpu",
            ProfileKind::Mem => "mem",
            ProfileKind::Mutex => "mutex",
        }
    }

    /// Test binary flag that writes this profile
    pub fn flag(self) -> &'static str {
        match self {
            ProfileKind::Cpu => "-test.cpuprofile",
            ProfileKind::Mem => "-test.memprofile",
            ProfileKind::Mutex => "-test.mutexprofile",
        }
    }
}

/// Path builder for everything under the session root
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ref_dir(&self, reference: &str) -> PathBuf {
        self.root.join(reference)
    }

    pub fn artifacts_dir(&self, reference: &str) -> PathBuf {
        self.ref_dir(reference).join("artifacts")
    }

    pub fn bin_root(&self, reference: &str) -> PathBuf {
        self.ref_dir(reference).join("bin")
    }

    pub fn output_log(&self, reference: &str, stamp: &RunStamp) -> PathBuf {
        self.artifacts_dir(reference)
            .join(format!("out.{}", stamp.as_str()))
    }

    /// One stable file per profile kind, overwritten by every run
    pub fn profile(&self, reference: &str, kind: ProfileKind) -> PathBuf {
        self.artifacts_dir(reference)
            .join(format!("{}.prof", kind.name()))
    }
}

/// Sortable, filesystem-safe run timestamp: `2024-05-01T13_04_05+02:00`,
/// or with a trailing `Z` in UTC.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RunStamp(String);

impl RunStamp {
    pub fn now() -> Self {
        Self::from_datetime(&Local::now())
    }

    pub fn from_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        let fixed = at.fixed_offset();
        let mut stamp = fixed.format(TIME_FORMAT).to_string();
        if fixed.offset().local_minus_utc() == 0 {
            stamp.push('Z');
        } else {
            stamp.push_str(&fixed.format("%:z").to_string());
        }
        Self(stamp)
    }

    /// Parse a stamp given on the command line (`--previous-run`)
    pub fn parse(value: &str) -> Result<Self> {
        let normalized = match value.strip_suffix('Z') {
            Some(rest) => format!("{}+00:00", rest),
            None => value.to_string(),
        };
        let at: DateTime<FixedOffset> =
            DateTime::parse_from_str(&normalized, &format!("{}%:z", TIME_FORMAT)).map_err(
                |e| BenchError::InvalidTimestamp {
                    value: value.to_string(),
                    message: e.to_string(),
                },
            )?;
        Ok(Self::from_datetime(&at))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
