//! Trait definitions for testable abstractions.
//!
//! These traits abstract the optional enrichment signals (version
//! control, test runner) so scoring and progress logic can be tested
//! without real repositories or subprocesses. Every method returns
//! `Option`: `None` means the signal is unavailable, which callers must
//! treat as a neutral/zero value, never as an error.

use chrono::{DateTime, Utc};

/// Abstraction for read-only version-control queries.
pub trait VcsOperations {
    /// Files currently modified in the working tree.
    ///
    /// Returns `None` when the tool is missing, times out, or fails.
    fn modified_files(&self) -> Option<Vec<String>>;

    /// Number of commits since `since` whose subject mentions `needle`.
    ///
    /// Returns `None` when the tool is missing, times out, or fails.
    fn commit_count_mentioning(&self, needle: &str, since: DateTime<Utc>) -> Option<u32>;
}

/// Abstraction for a best-effort test-runner invocation.
pub trait TestProbe {
    /// Run the configured test command.
    ///
    /// `Some(true)` on a passing run, `Some(false)` on a failing run,
    /// `None` when no runner is configured or the invocation itself
    /// could not complete.
    fn run(&self) -> Option<bool>;
}
