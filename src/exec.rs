//! Helpers for running external commands
//!
//! Two flavours, mirroring how the pipeline talks to its collaborators:
//! [`capture`] for commands whose stdout is the answer (git queries,
//! `go list`), and [`spawn_with`] for commands whose output is routed
//! somewhere else (benchmark logs, the user's terminal).

use crate::error::{BenchError, Result};
use std::process::{Command, ExitStatus, Stdio};

/// Render a command line for error messages and debug logs
pub fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

/// Run the command and return its trimmed stdout.
///
/// A non-zero exit becomes [`BenchError::Command`] carrying the process's
/// stderr, since that is where git and go explain themselves.
pub fn capture(cmd: &mut Command) -> Result<String> {
    let line = describe(cmd);
    tracing::debug!("capture: {}", line);

    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| BenchError::command(&line, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BenchError::command(
            line,
            format!("{}: {}", output.status, stderr.trim()),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run the command with caller-provided stdio and return its exit status.
///
/// Failing to start the process is an error; a non-zero exit is not, so the
/// caller can decide which statuses it tolerates.
pub fn spawn_with(cmd: &mut Command, stdout: Stdio, stderr: Stdio) -> Result<ExitStatus> {
    let line = describe(cmd);
    tracing::debug!("spawn: {}", line);

    cmd.stdin(Stdio::inherit())
        .stdout(stdout)
        .stderr(stderr)
        .status()
        .map_err(|e| BenchError::command(line, e.to_string()))
}

/// Run the command with all output sent to our stderr, failing on non-zero exit.
///
/// Used for steps whose chatter must never reach stdout, where the
/// comparison tables are printed.
pub fn spawn_to_stderr(cmd: &mut Command) -> Result<()> {
    let line = describe(cmd);
    let status = spawn_with(
        cmd,
        Stdio::from(std::io::stderr()),
        Stdio::from(std::io::stderr()),
    )?;
    if !status.success() {
        return Err(BenchError::command(line, status.to_string()));
    }
    Ok(())
}
