//! Rule-based anomaly detection for tasks.
//!
//! The monitor is the discrete complement to the continuous health score:
//! it applies heuristic threshold rules per task and produces typed
//! [`Issue`]s with a severity and a recommendation. A task may surface
//! several issues at once; its aggregate severity is the maximum across
//! them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::task::{Task, TaskStatus};

// ============================================================================
// Severity
// ============================================================================

/// Issue severity. Ordering follows escalation, so `max()` over a task's
/// issues yields its aggregate severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Remediation tie-break rank: critical sorts first.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

// ============================================================================
// Issue Kinds
// ============================================================================

/// Closed set of anomaly types detected by the monitor plus the two
/// correction-only kinds the remediation engine accepts directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Completed with no implementation evidence and nobody vouching
    FalseCompletion,
    /// In progress with prior progress but no recent update
    Stuck,
    /// Blocked status with an empty blocker list
    InvalidBlocked,
    /// Over-claimed progress with no implementation recorded
    MissingImplementation,
    /// In progress past the evidence deadline with no files recorded
    NoImplementation,
    /// Completed blockers still listed as blocking
    DependencyResolution,
    /// Stated progress diverges from implementation evidence
    ProgressMismatch,
    /// In progress with zero progress past the age threshold
    NoProgress,
    /// Low percentage after the long-horizon threshold
    LowProgress,
    /// No update within the staleness window
    Stale,
}

impl IssueKind {
    /// Fixed remediation ordering; lower runs first.
    #[must_use]
    pub fn remediation_priority(&self) -> u32 {
        match self {
            IssueKind::FalseCompletion => 1,
            IssueKind::Stuck => 2,
            IssueKind::InvalidBlocked => 3,
            IssueKind::MissingImplementation | IssueKind::NoImplementation => 4,
            IssueKind::DependencyResolution => 5,
            IssueKind::ProgressMismatch => 6,
            IssueKind::NoProgress => 7,
            IssueKind::LowProgress => 8,
            IssueKind::Stale => 9,
        }
    }

    /// Returns the string representation of the issue kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::FalseCompletion => "false_completion",
            IssueKind::Stuck => "stuck",
            IssueKind::InvalidBlocked => "invalid_blocked",
            IssueKind::MissingImplementation => "missing_implementation",
            IssueKind::NoImplementation => "no_implementation",
            IssueKind::DependencyResolution => "dependency_resolution",
            IssueKind::ProgressMismatch => "progress_mismatch",
            IssueKind::NoProgress => "no_progress",
            IssueKind::LowProgress => "low_progress",
            IssueKind::Stale => "stale",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Issue
// ============================================================================

/// One detected anomaly on one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    pub recommendation: String,
    /// Detector confidence in [0, 1]; remediation skips issues below its
    /// configured threshold
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
}

fn default_confidence() -> f64 {
    1.0
}

impl Issue {
    /// Create a fully-confident issue detected at `detected_at`.
    #[must_use]
    pub fn new(
        kind: IssueKind,
        severity: Severity,
        message: impl Into<String>,
        recommendation: impl Into<String>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            recommendation: recommendation.into(),
            confidence: 1.0,
            detected_at,
        }
    }

    /// Set the detector confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

// ============================================================================
// Revert History
// ============================================================================

/// Named seam for the monitor's revert grace period.
///
/// A task whose completion was just auto-reverted looks exactly like a
/// stuck task; the monitor asks this interface instead of grepping the
/// event log inline, keeping the coupling to the remediation engine's
/// event vocabulary in one place.
pub trait RevertHistory {
    /// Whether `task_id` had its completion reverted within `grace` of `now`.
    fn recently_reverted(&self, task_id: &str, now: DateTime<Utc>, grace: Duration) -> bool;
}

/// A [`RevertHistory`] that has seen no reverts. Useful for pure calls
/// and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRevertHistory;

impl RevertHistory for NoRevertHistory {
    fn recently_reverted(&self, _task_id: &str, _now: DateTime<Utc>, _grace: Duration) -> bool {
        false
    }
}

// ============================================================================
// Thresholds
// ============================================================================

/// Detection thresholds, all overridable from `backlog.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorThresholds {
    /// Hours without update before an in-progress task with progress
    /// counts as stuck
    pub stuck_hours: f64,
    /// Days without update before an in-progress task counts as stale
    pub stale_days: f64,
    /// Days after which <20% progress counts as a problem
    pub low_progress_days: f64,
    /// Days after which missing implementation evidence counts as a problem
    pub no_implementation_days: f64,
    /// Grace period after an automatic completion revert
    pub revert_grace_hours: i64,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            stuck_hours: 2.0,
            stale_days: 3.0,
            low_progress_days: 7.0,
            no_implementation_days: 1.0,
            revert_grace_hours: 1,
        }
    }
}

impl MonitorThresholds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_stuck_hours(mut self, hours: f64) -> Self {
        self.stuck_hours = hours;
        self
    }

    #[must_use]
    pub fn with_stale_days(mut self, days: f64) -> Self {
        self.stale_days = days;
        self
    }

    #[must_use]
    pub fn with_low_progress_days(mut self, days: f64) -> Self {
        self.low_progress_days = days;
        self
    }

    #[must_use]
    pub fn with_no_implementation_days(mut self, days: f64) -> Self {
        self.no_implementation_days = days;
        self
    }
}

// ============================================================================
// Report Types
// ============================================================================

/// Health assessment of one task that surfaced issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHealth {
    pub task: Task,
    pub issues: Vec<Issue>,
    pub max_severity: Severity,
}

/// Summary counts for a monitoring pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReportStats {
    pub total: usize,
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
}

/// Full result of a monitoring pass over the collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: Vec<Task>,
    pub warning: Vec<TaskHealth>,
    pub critical: Vec<TaskHealth>,
    pub stats: HealthReportStats,
}

// ============================================================================
// Monitor
// ============================================================================

/// Threshold-driven anomaly detector.
#[derive(Debug, Clone, Default)]
pub struct HealthMonitor {
    thresholds: MonitorThresholds,
}

impl HealthMonitor {
    /// Create a monitor with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a monitor with custom thresholds.
    #[must_use]
    pub fn with_thresholds(thresholds: MonitorThresholds) -> Self {
        Self { thresholds }
    }

    /// The active thresholds.
    #[must_use]
    pub fn thresholds(&self) -> &MonitorThresholds {
        &self.thresholds
    }

    /// Evaluate every detection rule against one task.
    pub fn detect_issues(
        &self,
        task: &Task,
        reverts: &dyn RevertHistory,
        now: DateTime<Utc>,
    ) -> Vec<Issue> {
        let mut issues = Vec::new();
        let age = task.age_hours(now);
        let since_update = task.hours_since_update(now);
        let grace = Duration::hours(self.thresholds.revert_grace_hours);
        let recently_reverted = reverts.recently_reverted(&task.id, now, grace);

        if task.status == TaskStatus::InProgress && !recently_reverted {
            if task.progress > 0 && since_update > self.thresholds.stuck_hours {
                issues.push(Issue::new(
                    IssueKind::Stuck,
                    Severity::High,
                    format!("No progress for {} hours", since_update.round()),
                    "Needs immediate attention or reassignment",
                    now,
                ));
            } else if task.progress == 0 && age > 24.0 {
                issues.push(Issue::new(
                    IssueKind::NoProgress,
                    Severity::Medium,
                    format!("No progress made since start ({} hours ago)", age.round()),
                    "Task may be blocked or need decomposition",
                    now,
                ));
            }
        }

        if task.status == TaskStatus::InProgress
            && since_update > self.thresholds.stale_days * 24.0
        {
            issues.push(Issue::new(
                IssueKind::Stale,
                Severity::Medium,
                format!("No updates for {} days", (since_update / 24.0).round()),
                "Review and update progress or pause task",
                now,
            ));
        }

        if task.status == TaskStatus::InProgress
            && age > self.thresholds.low_progress_days * 24.0
            && task.progress < 20
        {
            issues.push(Issue::new(
                IssueKind::LowProgress,
                Severity::Medium,
                format!(
                    "Only {}% complete after {} days",
                    task.progress,
                    (age / 24.0).round()
                ),
                "Break down into smaller subtasks or get help",
                now,
            ));
        }

        if task.status == TaskStatus::InProgress
            && age > self.thresholds.no_implementation_days * 24.0
            && !task.implementation_notes.has_evidence()
        {
            issues.push(Issue::new(
                IssueKind::NoImplementation,
                Severity::High,
                "No code/files created yet",
                "Start implementation or mark as blocked",
                now,
            ));
        }

        // A completed task with no evidence is suspect unless someone
        // vouched for it or it genuinely reached 100%.
        if task.status == TaskStatus::Completed
            && !task.implementation_notes.has_evidence()
            && !task.implementation_notes.verified
            && !task.implementation_notes.do_not_revert
            && task.progress != 100
        {
            issues.push(Issue::new(
                IssueKind::FalseCompletion,
                Severity::Critical,
                "Marked complete without implementation",
                "Revert to in-progress and implement",
                now,
            ));
        }

        if task.status == TaskStatus::Blocked && task.dependencies.blocked_by.is_empty() {
            issues.push(Issue::new(
                IssueKind::InvalidBlocked,
                Severity::Medium,
                "Marked as blocked but has no blockers",
                "Update status or add blocking dependencies",
                now,
            ));
        }

        issues
    }

    /// Run detection over the whole collection and bucket the results.
    ///
    /// Not-started tasks are skipped; critical and high aggregate
    /// severities land in the critical bucket.
    pub fn analyze_all(
        &self,
        tasks: &[Task],
        reverts: &dyn RevertHistory,
        now: DateTime<Utc>,
    ) -> HealthReport {
        let mut report = HealthReport {
            healthy: Vec::new(),
            warning: Vec::new(),
            critical: Vec::new(),
            stats: HealthReportStats::default(),
        };

        for task in tasks {
            if task.status == TaskStatus::NotStarted {
                continue;
            }

            let issues = self.detect_issues(task, reverts, now);
            report.stats.total += 1;

            if issues.is_empty() {
                report.healthy.push(task.clone());
                report.stats.healthy += 1;
                continue;
            }

            let max_severity = issues
                .iter()
                .map(|i| i.severity)
                .max()
                .unwrap_or(Severity::Low);
            let entry = TaskHealth {
                task: task.clone(),
                issues,
                max_severity,
            };

            if max_severity >= Severity::High {
                report.critical.push(entry);
                report.stats.critical += 1;
            } else {
                report.warning.push(entry);
                report.stats.warning += 1;
            }
        }

        report
    }
}

// ============================================================================
// Tests
// ============================================================================
