//! Real implementations of the enrichment-signal traits.
//!
//! Version-control queries shell out to the `git` CLI; the test probe
//! runs a configured shell command. Both are read-only, bounded by a
//! polling deadline, and degrade to `None` on any failure - a missing
//! tool or a slow command is "signal unavailable", never an error.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::testing::{TestProbe, VcsOperations};

/// Default deadline for a git invocation.
const GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for a test-runner invocation.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a prepared command to completion within `deadline`.
///
/// Returns captured stdout on success; `None` on spawn failure, non-zero
/// exit, or timeout (the child is killed).
fn run_with_deadline(mut command: Command, deadline: Duration) -> Option<String> {
    command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null());
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::debug!(error = %e, "failed to spawn subprocess");
            return None;
        }
    };

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    return None;
                }
                break;
            }
            Ok(None) => {
                if started.elapsed() > deadline {
                    tracing::debug!("subprocess exceeded deadline; killing");
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to poll subprocess");
                return None;
            }
        }
    }

    let mut output = String::new();
    use std::io::Read;
    child.stdout.take()?.read_to_string(&mut output).ok()?;
    Some(output)
}

// ============================================================================
// Git CLI
// ============================================================================

/// Read-only `git` queries against a working directory.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
    timeout: Duration,
}

impl GitCli {
    /// Create a handle for the repository at `workdir`.
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: GIT_TIMEOUT,
        }
    }

    /// Override the per-invocation deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether a `git` executable is on the path at all.
    #[must_use]
    pub fn available() -> bool {
        which::which("git").is_ok()
    }

    fn git(&self, args: &[&str]) -> Option<String> {
        if !Self::available() {
            return None;
        }
        let mut command = Command::new("git");
        command.current_dir(&self.workdir).args(args);
        run_with_deadline(command, self.timeout)
    }
}

impl VcsOperations for GitCli {
    fn modified_files(&self) -> Option<Vec<String>> {
        let output = self.git(&["diff", "--name-only"])?;
        Some(
            output
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    fn commit_count_mentioning(&self, needle: &str, since: DateTime<Utc>) -> Option<u32> {
        let since_arg = format!("--since={}", since.to_rfc3339());
        let output = self.git(&["log", "--oneline", &since_arg])?;
        let needle_lower = needle.to_lowercase();
        let count = output
            .lines()
            .filter(|l| l.to_lowercase().contains(&needle_lower))
            .count();
        Some(count as u32)
    }
}

// ============================================================================
// Test Runner Probe
// ============================================================================

/// Best-effort invocation of a configured test command.
#[derive(Debug, Clone)]
pub struct CommandTestProbe {
    command: Option<String>,
    workdir: PathBuf,
    timeout: Duration,
}

impl CommandTestProbe {
    /// Create a probe running `command` (if any) in `workdir`.
    #[must_use]
    pub fn new(command: Option<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            workdir: workdir.into(),
            timeout: TEST_TIMEOUT,
        }
    }

    /// Override the invocation deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl TestProbe for CommandTestProbe {
    fn run(&self) -> Option<bool> {
        let command_line = self.command.as_ref()?;
        let mut command = Command::new("sh");
        command.current_dir(&self.workdir).arg("-c").arg(command_line);
        // A completed run means tests passed (the command exited zero);
        // failure and timeout both read as "tests not passing".
        match run_with_deadline(command, self.timeout) {
            Some(_) => Some(true),
            None => Some(false),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_with_deadline_captures_stdout() {
        let mut command = Command::new("sh");
        command.arg("-c").arg("echo hello");
        let output = run_with_deadline(command, Duration::from_secs(5)).unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[test]
    fn test_run_with_deadline_nonzero_exit_is_none() {
        let mut command = Command::new("sh");
        command.arg("-c").arg("exit 3");
        assert!(run_with_deadline(command, Duration::from_secs(5)).is_none());
    }

    #[test]
    fn test_run_with_deadline_kills_slow_command() {
        let mut command = Command::new("sh");
        command.arg("-c").arg("sleep 30");
        let started = Instant::now();
        assert!(run_with_deadline(command, Duration::from_millis(200)).is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_missing_binary_is_none() {
        let command = Command::new("definitely-not-a-real-binary-name");
        assert!(run_with_deadline(command, Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_git_outside_repository_degrades() {
        let dir = tempfile::TempDir::new().unwrap();
        let git = GitCli::new(dir.path());
        // Either git is missing entirely or the directory is not a
        // repository; both must degrade to None, never panic.
        assert!(git.modified_files().is_none());
        assert!(git.commit_count_mentioning("TASK-001", Utc::now()).is_none());
    }

    #[test]
    fn test_probe_without_command_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let probe = CommandTestProbe::new(None, dir.path());
        assert_eq!(probe.run(), None);
    }

    #[test]
    fn test_probe_passing_and_failing_commands() {
        let dir = tempfile::TempDir::new().unwrap();
        let pass = CommandTestProbe::new(Some("true".to_string()), dir.path());
        assert_eq!(pass.run(), Some(true));

        let fail = CommandTestProbe::new(Some("false".to_string()), dir.path());
        assert_eq!(fail.run(), Some(false));
    }
}
