//! Task domain model.
//!
//! This module contains the core types persisted in the backlog store:
//! - [`Task`] - A unit of trackable work
//! - [`TaskStatus`] - Status state machine with a restricted transition table
//! - [`TaskPatch`] - Partial update applied through the store's validated path
//!
//! # Status Transitions
//!
//! ```text
//! NotStarted ──> InProgress | Blocked
//! InProgress ──> Completed | Blocked | NotStarted
//! Blocked    ──> InProgress | NotStarted
//! Completed  ──> InProgress
//! Ready      ──> (batch passes only)
//! ```
//!
//! `Ready` is reachable only through the dependency resolver and the
//! invalid-blocked remediation; the operator update path never moves a
//! task out of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Task Status
// ============================================================================

/// Current status of a task in the backlog.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Task has not been started yet
    #[default]
    NotStarted,
    /// Task is unblocked and ready to pick up
    Ready,
    /// Task is currently being worked on
    InProgress,
    /// Task is waiting on one or more blockers
    Blocked,
    /// Task is complete
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::NotStarted => write!(f, "not-started"),
            TaskStatus::Ready => write!(f, "ready"),
            TaskStatus::InProgress => write!(f, "in-progress"),
            TaskStatus::Blocked => write!(f, "blocked"),
            TaskStatus::Completed => write!(f, "completed"),
        }
    }
}

impl TaskStatus {
    /// Check if this status can transition to the target through the
    /// operator update path.
    ///
    /// # Example
    ///
    /// ```
    /// use backlog::task::TaskStatus;
    ///
    /// assert!(TaskStatus::NotStarted.can_transition_to(TaskStatus::InProgress));
    /// assert!(!TaskStatus::NotStarted.can_transition_to(TaskStatus::Completed));
    /// ```
    #[must_use]
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, target),
            // From NotStarted
            (NotStarted, InProgress) | (NotStarted, Blocked) |
            // From InProgress
            (InProgress, Completed) | (InProgress, Blocked) | (InProgress, NotStarted) |
            // From Blocked
            (Blocked, InProgress) | (Blocked, NotStarted) |
            // From Completed (allows reopening)
            (Completed, InProgress)
        )
    }

    /// Check if this status represents active work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::InProgress)
    }

    /// Check if this status represents finished work.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

// ============================================================================
// Priority & Complexity
// ============================================================================

/// Task priority, P0 (highest) through P3 (lowest).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::P0 => write!(f, "P0"),
            Priority::P1 => write!(f, "P1"),
            Priority::P2 => write!(f, "P2"),
            Priority::P3 => write!(f, "P3"),
        }
    }
}

/// T-shirt size complexity estimate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum Complexity {
    S,
    M,
    L,
    XL,
}

impl Complexity {
    /// Expected number of commits for a task of this complexity.
    ///
    /// Used by the progress tracker to normalize the commit signal.
    #[must_use]
    pub fn expected_commits(&self) -> u32 {
        match self {
            Complexity::S => 2,
            Complexity::M => 4,
            Complexity::L => 6,
            Complexity::XL => 10,
        }
    }
}

// ============================================================================
// Nested Records
// ============================================================================

/// Directed dependency edges between tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Ids of tasks that must complete before this one can proceed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
    /// Ids of tasks that wait on this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_for: Vec<String>,
}

impl Dependencies {
    /// Check whether any edges are recorded at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocked_by.is_empty() && self.required_for.is_empty()
    }
}

/// Advisory effort estimates, used only for scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Estimates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
}

impl Estimates {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effort_hours.is_none() && self.complexity.is_none() && self.risk_level.is_none()
    }
}

/// Free-form implementation evidence and audit annotations.
///
/// Known fields are typed; anything else round-trips through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImplementationNotes {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_created: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_modified: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_to_create: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_to_modify: Vec<String>,
    /// Task has been manually verified
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub verified: bool,
    /// Automated passes must not revert this task
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub do_not_revert: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testing_approach: Option<String>,
    /// Set when a remediation pass flagged this task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_flagged: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_reason: Option<String>,
    /// Unknown annotation keys, preserved verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ImplementationNotes {
    /// Number of files actually recorded as created or modified.
    #[must_use]
    pub fn recorded_file_count(&self) -> usize {
        self.files_created.len() + self.files_modified.len()
    }

    /// Number of files the task plans to touch.
    #[must_use]
    pub fn planned_file_count(&self) -> usize {
        self.files_to_create.len() + self.files_to_modify.len()
    }

    /// Whether any implementation evidence is recorded.
    #[must_use]
    pub fn has_evidence(&self) -> bool {
        self.recorded_file_count() > 0
    }
}

/// Flags set by the remediation engine to surface tasks needing a human.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttentionFlags {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_attention: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stuck_since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_implementation: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_decomposition: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decomposition_hint: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_status_update: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<DateTime<Utc>>,
}

impl AttentionFlags {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Append-only record of an automatic correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_status: Option<TaskStatus>,
    pub reason: String,
}

/// Append-only record of an automatic progress overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressAdjustment {
    pub timestamp: DateTime<Utc>,
    pub from: u8,
    pub to: u8,
    pub reason: String,
}

// ============================================================================
// Task
// ============================================================================

/// A unit of trackable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique stable identifier, never reused
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: TaskStatus,
    /// 0-100; `completed` implies 100 and `not-started` implies 0,
    /// enforced on write
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Dependencies::is_empty")]
    pub dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "Estimates::is_empty")]
    pub estimates: Estimates,
    #[serde(default)]
    pub implementation_notes: ImplementationNotes,
    #[serde(default, skip_serializing_if = "AttentionFlags::is_empty")]
    pub attention: AttentionFlags,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remediation_history: Vec<RemediationEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub progress_adjustments: Vec<ProgressAdjustment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new task in the initial state.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category: None,
            priority: None,
            status: TaskStatus::NotStarted,
            progress: 0,
            dependencies: Dependencies::default(),
            estimates: Estimates::default(),
            implementation_notes: ImplementationNotes::default(),
            attention: AttentionFlags::default(),
            remediation_history: Vec::new(),
            progress_adjustments: Vec::new(),
            created_at: None,
            started_at: None,
            updated_at: None,
            completed_at: None,
        }
    }

    /// Builder method to set the status.
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder method to set the progress percentage.
    #[must_use]
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }

    /// Builder method to set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Builder method to set the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Builder method to set the blocking task ids.
    #[must_use]
    pub fn with_blocked_by(mut self, blockers: Vec<String>) -> Self {
        self.dependencies.blocked_by = blockers;
        self
    }

    /// Builder method to set the effort estimates.
    #[must_use]
    pub fn with_estimates(mut self, estimates: Estimates) -> Self {
        self.estimates = estimates;
        self
    }

    /// Builder method to set the start timestamp.
    #[must_use]
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// A verified task flagged do-not-revert is exempt from most automated
    /// mutation: only progress, completion timestamps, and implementation
    /// notes may change.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.implementation_notes.verified && self.implementation_notes.do_not_revert
    }

    /// Hours since the task was started, 0 if never started.
    #[must_use]
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        match self.started_at {
            Some(started) => (now - started).num_seconds() as f64 / 3600.0,
            None => 0.0,
        }
    }

    /// Hours since the last update (falling back to the start timestamp),
    /// 0 if neither is set.
    #[must_use]
    pub fn hours_since_update(&self, now: DateTime<Utc>) -> f64 {
        match self.updated_at.or(self.started_at) {
            Some(last) => (now - last).num_seconds() as f64 / 3600.0,
            None => 0.0,
        }
    }
}

// ============================================================================
// Task Patch
// ============================================================================

/// Partial update applied through [`TaskStore::update_task`].
///
/// Every field is optional; unset fields are left untouched. The set of
/// touched field names drives protected-task validation.
///
/// [`TaskStore::update_task`]: crate::store::TaskStore::update_task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Dependencies>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimates: Option<Estimates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_notes: Option<ImplementationNotes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
    /// Create an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target status.
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the progress percentage.
    #[must_use]
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    /// Set the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the dependency edges.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Dependencies) -> Self {
        self.dependencies = Some(dependencies);
        self
    }

    /// Set the implementation notes.
    #[must_use]
    pub fn with_implementation_notes(mut self, notes: ImplementationNotes) -> Self {
        self.implementation_notes = Some(notes);
        self
    }

    /// Names of the fields this patch touches.
    #[must_use]
    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title");
        }
        if self.category.is_some() {
            fields.push("category");
        }
        if self.priority.is_some() {
            fields.push("priority");
        }
        if self.status.is_some() {
            fields.push("status");
        }
        if self.progress.is_some() {
            fields.push("progress");
        }
        if self.dependencies.is_some() {
            fields.push("dependencies");
        }
        if self.estimates.is_some() {
            fields.push("estimates");
        }
        if self.implementation_notes.is_some() {
            fields.push("implementation_notes");
        }
        if self.started_at.is_some() {
            fields.push("started_at");
        }
        if self.completed_at.is_some() {
            fields.push("completed_at");
        }
        fields
    }

    /// Check whether the patch changes anything at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.touched_fields().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
