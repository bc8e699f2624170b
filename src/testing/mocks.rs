//! Test doubles for the enrichment-signal traits.

use chrono::{DateTime, Utc};

use super::traits::{TestProbe, VcsOperations};

// ============================================================================
// Mock Vcs
// ============================================================================

/// Controllable [`VcsOperations`] implementation.
///
/// The default reports an empty working tree and zero commits; use
/// [`MockVcs::unavailable`] to simulate a missing tool.
#[derive(Debug, Clone)]
pub struct MockVcs {
    modified: Option<Vec<String>>,
    commit_count: Option<u32>,
}

impl Default for MockVcs {
    fn default() -> Self {
        Self {
            modified: Some(Vec::new()),
            commit_count: Some(0),
        }
    }
}

impl MockVcs {
    /// A mock with an empty but reachable repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock simulating a missing or failing tool.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            modified: None,
            commit_count: None,
        }
    }

    /// Set the modified-files response.
    #[must_use]
    pub fn with_modified_files(mut self, files: Vec<String>) -> Self {
        self.modified = Some(files);
        self
    }

    /// Set the commit count returned for any query.
    #[must_use]
    pub fn with_commit_count(mut self, count: u32) -> Self {
        self.commit_count = Some(count);
        self
    }
}

impl VcsOperations for MockVcs {
    fn modified_files(&self) -> Option<Vec<String>> {
        self.modified.clone()
    }

    fn commit_count_mentioning(&self, _needle: &str, _since: DateTime<Utc>) -> Option<u32> {
        self.commit_count
    }
}

// ============================================================================
// Mock Test Probe
// ============================================================================

/// Controllable [`TestProbe`] implementation.
#[derive(Debug, Clone, Default)]
pub struct MockTestProbe {
    result: Option<bool>,
}

impl MockTestProbe {
    /// A probe with no configured result (unavailable).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A probe simulating an unavailable runner.
    #[must_use]
    pub fn unavailable() -> Self {
        Self { result: None }
    }

    /// Set the run outcome.
    #[must_use]
    pub fn with_result(mut self, passing: bool) -> Self {
        self.result = Some(passing);
        self
    }
}

impl TestProbe for MockTestProbe {
    fn run(&self) -> Option<bool> {
        self.result
    }
}
