//! Automatic progress derivation from independent signals.
//!
//! For in-progress tasks the tracker combines weighted evidence - files
//! created on disk, working-tree modifications, related commits, resolved
//! blockers, test signal, and elapsed time against the estimate - into a
//! suggested progress percentage. The result is clamped to [10, 95]:
//! completion and not-started are explicit state transitions, never
//! inferred.
//!
//! Version-control and test-runner signals arrive through trait seams;
//! an unavailable signal contributes its neutral/zero value instead of
//! propagating an error.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{TaskFilter, TaskStore};
use crate::task::{Task, TaskPatch, TaskStatus};
use crate::testing::{TestProbe, VcsOperations};

/// Signal weights; sum to 100.
const WEIGHT_FILES_CREATED: f64 = 25.0;
const WEIGHT_FILES_MODIFIED: f64 = 20.0;
const WEIGHT_COMMITS: f64 = 20.0;
const WEIGHT_DEPENDENCIES: f64 = 15.0;
const WEIGHT_TESTS: f64 = 10.0;
const WEIGHT_TIME: f64 = 10.0;

/// Estimate assumed when a task carries none, in hours.
const DEFAULT_EFFORT_HOURS: f64 = 4.0;

/// Expected commits when no complexity estimate is present.
const DEFAULT_EXPECTED_COMMITS: u32 = 4;

/// File name fragments that count as test evidence for the fallback
/// test signal.
const TEST_PATTERNS: &[&str] = &["test", "spec", "__tests__"];

// ============================================================================
// Report Types
// ============================================================================

/// Per-signal ratios (each in [0, 1]) behind a computed percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalBreakdown {
    pub files_created: f64,
    pub files_modified: f64,
    pub commits: f64,
    pub dependencies: f64,
    pub tests: f64,
    pub time: f64,
}

/// Detailed progress report for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub task_id: String,
    pub current: u8,
    pub suggested: u8,
    pub breakdown: SignalBreakdown,
}

/// One applied progress change from a batch pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressChange {
    pub task_id: String,
    pub from: u8,
    pub to: u8,
}

// ============================================================================
// Tracker
// ============================================================================

/// Derives progress percentages and writes them back through the store.
pub struct ProgressTracker<'a> {
    store: &'a TaskStore,
    vcs: &'a dyn VcsOperations,
    probe: &'a dyn TestProbe,
    workdir: PathBuf,
}

impl<'a> ProgressTracker<'a> {
    /// Create a tracker checking file evidence under `workdir`.
    #[must_use]
    pub fn new(
        store: &'a TaskStore,
        vcs: &'a dyn VcsOperations,
        probe: &'a dyn TestProbe,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            vcs,
            probe,
            workdir: workdir.into(),
        }
    }

    /// Suggested progress for one task.
    #[must_use]
    pub fn compute(&self, task: &Task, all_tasks: &[Task], now: DateTime<Utc>) -> u8 {
        if task.status == TaskStatus::Completed {
            return 100;
        }
        if task.status == TaskStatus::NotStarted {
            return 0;
        }

        let signals = self.signals(task, all_tasks, now);
        let total = signals.files_created * WEIGHT_FILES_CREATED
            + signals.files_modified * WEIGHT_FILES_MODIFIED
            + signals.commits * WEIGHT_COMMITS
            + signals.dependencies * WEIGHT_DEPENDENCIES
            + signals.tests * WEIGHT_TESTS
            + signals.time * WEIGHT_TIME;

        (total.round() as u8).clamp(10, 95)
    }

    /// Factor-level breakdown plus the suggested percentage.
    #[must_use]
    pub fn report(&self, task: &Task, all_tasks: &[Task], now: DateTime<Utc>) -> ProgressReport {
        ProgressReport {
            task_id: task.id.clone(),
            current: task.progress,
            suggested: self.compute(task, all_tasks, now),
            breakdown: self.signals(task, all_tasks, now),
        }
    }

    /// Recompute every in-progress task and persist changes bigger than
    /// one point through the validated batch update.
    pub async fn update_all(&self, now: DateTime<Utc>) -> Result<Vec<ProgressChange>> {
        let tasks = self.store.get_tasks(&TaskFilter::new()).await?;

        let mut changes = Vec::new();
        let mut updates = Vec::new();
        for task in tasks.iter().filter(|t| t.status == TaskStatus::InProgress) {
            let suggested = self.compute(task, &tasks, now);
            if i16::from(suggested).abs_diff(i16::from(task.progress)) > 1 {
                changes.push(ProgressChange {
                    task_id: task.id.clone(),
                    from: task.progress,
                    to: suggested,
                });
                updates.push((task.id.clone(), TaskPatch::new().with_progress(suggested)));
            }
        }

        if !updates.is_empty() {
            self.store.update_tasks(updates, "progress-tracker").await?;
        }
        Ok(changes)
    }

    // ========================================================================
    // Signals
    // ========================================================================

    fn signals(&self, task: &Task, all_tasks: &[Task], now: DateTime<Utc>) -> SignalBreakdown {
        SignalBreakdown {
            files_created: self.files_created_ratio(task),
            files_modified: self.files_modified_ratio(task),
            commits: self.commits_ratio(task),
            dependencies: dependency_ratio(task, all_tasks),
            tests: self.test_signal(task),
            time: time_ratio(task, now),
        }
    }

    /// Fraction of the planned files that exist on disk.
    fn files_created_ratio(&self, task: &Task) -> f64 {
        let planned = &task.implementation_notes.files_to_create;
        if planned.is_empty() {
            return 0.0;
        }
        let created = planned
            .iter()
            .filter(|f| self.workdir.join(f).exists())
            .count();
        created as f64 / planned.len() as f64
    }

    /// Fraction of the planned modifications visible in the working tree.
    fn files_modified_ratio(&self, task: &Task) -> f64 {
        let planned = &task.implementation_notes.files_to_modify;
        if planned.is_empty() {
            return 0.0;
        }
        let Some(modified) = self.vcs.modified_files() else {
            tracing::debug!(task_id = %task.id, "diff signal unavailable");
            return 0.0;
        };
        let touched = planned
            .iter()
            .filter(|f| modified.iter().any(|m| m.contains(f.as_str())))
            .count();
        touched as f64 / planned.len() as f64
    }

    /// Commits mentioning the task id since start, against the expected
    /// count for the task's complexity.
    fn commits_ratio(&self, task: &Task) -> f64 {
        let Some(started) = task.started_at else {
            return 0.0;
        };
        let Some(count) = self.vcs.commit_count_mentioning(&task.id, started) else {
            tracing::debug!(task_id = %task.id, "commit signal unavailable");
            return 0.0;
        };
        let expected = task
            .estimates
            .complexity
            .map_or(DEFAULT_EXPECTED_COMMITS, |c| c.expected_commits());
        (f64::from(count) / f64::from(expected)).min(1.0)
    }

    /// Test-runner result when available, file-pattern fallback otherwise.
    fn test_signal(&self, task: &Task) -> f64 {
        if self.probe.run() == Some(true) {
            return 1.0;
        }
        let has_test_files = task
            .implementation_notes
            .files_created
            .iter()
            .chain(task.implementation_notes.files_modified.iter())
            .any(|file| {
                let lower = file.to_lowercase();
                TEST_PATTERNS.iter().any(|p| lower.contains(p))
            });
        if has_test_files {
            0.5
        } else {
            0.0
        }
    }
}

/// Fraction of blockers whose referenced task has completed; 1 when
/// unblocked.
fn dependency_ratio(task: &Task, all_tasks: &[Task]) -> f64 {
    let blockers = &task.dependencies.blocked_by;
    if blockers.is_empty() {
        return 1.0;
    }
    let resolved = blockers
        .iter()
        .filter(|id| {
            all_tasks
                .iter()
                .any(|t| t.id == **id && t.status == TaskStatus::Completed)
        })
        .count();
    resolved as f64 / blockers.len() as f64
}

/// Elapsed time against the estimate, capped at 1.
fn time_ratio(task: &Task, now: DateTime<Utc>) -> f64 {
    if task.started_at.is_none() {
        return 0.0;
    }
    let estimated = task
        .estimates
        .effort_hours
        .unwrap_or(DEFAULT_EFFORT_HOURS)
        .max(f64::EPSILON);
    (task.age_hours(now) / estimated).min(1.0)
}

// ============================================================================
// Tests
// ============================================================================
