//! Automatic correction of detected task anomalies.
//!
//! Given a task and its detected issues, the engine applies bounded,
//! confidence-gated, priority-ordered corrective writes through the task
//! store. Every applied or failed correction is appended to a dedicated
//! JSON-lines audit log, independent of the store's own event log.
//!
//! # Ordering
//!
//! Issues are sorted by a fixed type-priority table (false completions
//! first, staleness last), ties broken by severity. Corrections stop once
//! the per-run cap is reached; low-confidence issues are skipped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::health::monitor::{Issue, IssueKind};
use crate::store::events::{self, EventKind, EventRecord};
use crate::store::{backup, TaskStore};
use crate::task::{ProgressAdjustment, RemediationEntry, Task, TaskStatus};

/// Event source recorded for all corrective writes.
const SOURCE: &str = "remediation-engine";

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for a remediation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    /// Maximum corrections applied per run
    pub max_auto_fixes: usize,
    /// Issues below this confidence are skipped
    pub confidence_threshold: f64,
    /// Take a full-collection safety backup before the first write
    pub safe_mode: bool,
    /// Report intended actions without writing
    pub dry_run: bool,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            max_auto_fixes: 10,
            confidence_threshold: 0.7,
            safe_mode: true,
            dry_run: false,
        }
    }
}

impl RemediationConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_auto_fixes(mut self, max: usize) -> Self {
        self.max_auto_fixes = max;
        self
    }

    #[must_use]
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_safe_mode(mut self, enabled: bool) -> Self {
        self.safe_mode = enabled;
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }
}

// ============================================================================
// Outcome Types
// ============================================================================

/// One correction the engine carried out (or would, in dry-run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedRemediation {
    pub kind: IssueKind,
    pub action: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

/// Result of one remediation run over one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationOutcome {
    pub applied: Vec<AppliedRemediation>,
    /// Sorted tail of issues past the applied count - skipped and
    /// unprocessed issues surface here
    pub remaining: Vec<Issue>,
    pub success: bool,
}

// ============================================================================
// Engine
// ============================================================================

/// Applies corrective mutations through the task store.
pub struct RemediationEngine<'a> {
    store: &'a TaskStore,
    config: RemediationConfig,
}

impl<'a> RemediationEngine<'a> {
    /// Create an engine with default configuration.
    #[must_use]
    pub fn new(store: &'a TaskStore) -> Self {
        Self {
            store,
            config: RemediationConfig::default(),
        }
    }

    /// Create an engine with custom configuration.
    #[must_use]
    pub fn with_config(store: &'a TaskStore, config: RemediationConfig) -> Self {
        Self { store, config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &RemediationConfig {
        &self.config
    }

    /// Apply corrections for `issues` on `task`, most urgent first.
    ///
    /// A failing strategy is logged and does not abort its siblings.
    pub async fn remediate(&self, task: &Task, issues: &[Issue]) -> Result<RemediationOutcome> {
        let now = Utc::now();

        let mut sorted = issues.to_vec();
        sorted.sort_by_key(|i| (i.kind.remediation_priority(), i.severity.rank()));

        if self.config.safe_mode && !self.config.dry_run {
            self.write_safety_backup().await;
        }

        let mut applied: Vec<AppliedRemediation> = Vec::new();
        for issue in &sorted {
            if applied.len() >= self.config.max_auto_fixes {
                tracing::warn!(
                    task_id = %task.id,
                    cap = self.config.max_auto_fixes,
                    "max auto-fixes reached; leaving remaining issues untouched"
                );
                break;
            }

            if issue.confidence < self.config.confidence_threshold {
                tracing::debug!(
                    task_id = %task.id,
                    kind = %issue.kind,
                    confidence = issue.confidence,
                    "skipping low-confidence issue"
                );
                continue;
            }

            match self.apply_strategy(task, issue, now).await {
                Ok(Some(result)) => {
                    if !self.config.dry_run {
                        self.append_log(serde_json::json!({
                            "timestamp": now,
                            "task_id": task.id,
                            "issue_type": issue.kind,
                            "confidence": issue.confidence,
                            "action": result.action,
                            "success": true,
                            "details": result.details,
                        }));
                    }
                    applied.push(result);
                }
                Ok(None) => {
                    tracing::debug!(task_id = %task.id, kind = %issue.kind, "strategy had nothing to do");
                }
                Err(e) => {
                    tracing::error!(
                        task_id = %task.id,
                        kind = %issue.kind,
                        error = format!("{e:#}"),
                        "remediation strategy failed"
                    );
                    self.append_log(serde_json::json!({
                        "timestamp": now,
                        "task_id": task.id,
                        "issue_type": issue.kind,
                        "error": format!("{e:#}"),
                    }));
                }
            }
        }

        let remaining = sorted.split_off(applied.len().min(sorted.len()));
        Ok(RemediationOutcome {
            success: !applied.is_empty(),
            applied,
            remaining,
        })
    }

    // ========================================================================
    // Strategy dispatch
    // ========================================================================

    async fn apply_strategy(
        &self,
        task: &Task,
        issue: &Issue,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AppliedRemediation>> {
        match issue.kind {
            IssueKind::FalseCompletion => self.fix_false_completion(task, issue, now).await,
            // A zero-progress task is handled exactly like a stuck one.
            IssueKind::Stuck | IssueKind::NoProgress => self.fix_stuck(task, issue, now).await,
            IssueKind::InvalidBlocked => self.fix_invalid_blocked(task, issue, now).await,
            IssueKind::MissingImplementation | IssueKind::NoImplementation => {
                self.fix_missing_implementation(task, issue, now).await
            }
            IssueKind::DependencyResolution => self.fix_dependencies(task, issue, now).await,
            IssueKind::ProgressMismatch => self.fix_progress_mismatch(task, issue, now).await,
            IssueKind::LowProgress => self.fix_low_progress(task, issue, now).await,
            IssueKind::Stale => self.fix_stale(task, issue, now).await,
        }
    }

    // ========================================================================
    // Strategies
    // ========================================================================

    /// Revert a falsely-completed task to in-progress with clamped progress.
    async fn fix_false_completion(
        &self,
        task: &Task,
        issue: &Issue,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AppliedRemediation>> {
        if self.config.dry_run {
            return Ok(Some(dry_run(
                IssueKind::FalseCompletion,
                "DRY_RUN: Would revert to in-progress",
            )));
        }

        let (mut tasks, index) = self.locate(&task.id).await?;
        let previous_status = tasks[index].status;
        let claimed = tasks[index].progress;
        let new_progress = if claimed == 0 { 50 } else { claimed.min(75) };

        tasks[index].status = TaskStatus::InProgress;
        tasks[index].progress = new_progress;
        tasks[index].completed_at = None;
        tasks[index].updated_at = Some(now);
        tasks[index].remediation_history.push(RemediationEntry {
            timestamp: now,
            kind: "false_completion_revert".to_string(),
            previous_status: Some(previous_status),
            new_status: Some(TaskStatus::InProgress),
            reason: issue.message.clone(),
        });

        self.store.commit(tasks, SOURCE).await?;
        self.log_store_event(
            &task.id,
            serde_json::json!({ "action": events::REVERT_COMPLETION }),
            now,
        );

        Ok(Some(AppliedRemediation {
            kind: IssueKind::FalseCompletion,
            action: "Reverted to in-progress".to_string(),
            dry_run: false,
            details: serde_json::json!({
                "previous_status": previous_status,
                "new_status": TaskStatus::InProgress,
                "new_progress": new_progress,
            }),
        }))
    }

    /// Resolve any completed blockers and flag the task for attention.
    async fn fix_stuck(
        &self,
        task: &Task,
        issue: &Issue,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AppliedRemediation>> {
        if self.config.dry_run {
            return Ok(Some(dry_run(issue.kind, "DRY_RUN: Would attempt to unstick")));
        }

        let (mut tasks, index) = self.locate(&task.id).await?;
        let mut actions: Vec<String> = Vec::new();

        if !tasks[index].dependencies.blocked_by.is_empty() {
            if let Some((remaining, _resolved)) = completed_blockers_removed(&tasks[index], &tasks)
            {
                tasks[index].dependencies.blocked_by = remaining;
                actions.push("Resolved dependencies".to_string());
            }
        }

        tasks[index].attention.requires_attention = true;
        tasks[index].attention.stuck_since = Some(issue.detected_at);
        tasks[index].updated_at = Some(now);

        self.store.commit(tasks, SOURCE).await?;
        self.log_store_event(
            &task.id,
            serde_json::json!({ "action": "flag_stuck", "issue": issue.kind }),
            now,
        );

        let action = if actions.is_empty() {
            "Flagged for attention".to_string()
        } else {
            actions.join(", ")
        };
        Ok(Some(AppliedRemediation {
            kind: issue.kind,
            action,
            dry_run: false,
            details: serde_json::json!({ "actions": actions }),
        }))
    }

    /// A blocked task with no blockers goes straight to ready.
    async fn fix_invalid_blocked(
        &self,
        task: &Task,
        _issue: &Issue,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AppliedRemediation>> {
        if self.config.dry_run {
            return Ok(Some(dry_run(
                IssueKind::InvalidBlocked,
                "DRY_RUN: Would change to ready",
            )));
        }

        let (mut tasks, index) = self.locate(&task.id).await?;
        let previous_status = tasks[index].status;
        tasks[index].status = TaskStatus::Ready;
        tasks[index].dependencies.blocked_by.clear();
        tasks[index].updated_at = Some(now);

        self.store.commit(tasks, SOURCE).await?;
        self.log_store_event(&task.id, serde_json::json!({ "action": "unblock" }), now);

        Ok(Some(AppliedRemediation {
            kind: IssueKind::InvalidBlocked,
            action: "Changed status to ready".to_string(),
            dry_run: false,
            details: serde_json::json!({
                "previous_status": previous_status,
                "new_status": TaskStatus::Ready,
            }),
        }))
    }

    /// Clamp over-claimed progress and flag the task for implementation.
    async fn fix_missing_implementation(
        &self,
        task: &Task,
        issue: &Issue,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AppliedRemediation>> {
        if self.config.dry_run {
            return Ok(Some(dry_run(
                issue.kind,
                "DRY_RUN: Would adjust progress and flag for attention",
            )));
        }

        let (mut tasks, index) = self.locate(&task.id).await?;
        if tasks[index].progress > 20 {
            tasks[index].progress = 10;
        }
        tasks[index].attention.requires_implementation = true;
        tasks[index].implementation_notes.auto_flagged = Some(now);
        tasks[index].implementation_notes.flag_reason =
            Some("No implementation files detected".to_string());
        tasks[index].updated_at = Some(now);
        let new_progress = tasks[index].progress;

        self.store.commit(tasks, SOURCE).await?;
        self.log_store_event(
            &task.id,
            serde_json::json!({ "action": "flag_missing_implementation", "progress": new_progress }),
            now,
        );

        Ok(Some(AppliedRemediation {
            kind: issue.kind,
            action: "Adjusted progress and flagged for implementation".to_string(),
            dry_run: false,
            details: serde_json::json!({ "new_progress": new_progress, "flagged": true }),
        }))
    }

    /// Remove blockers whose referenced task has completed.
    async fn fix_dependencies(
        &self,
        task: &Task,
        _issue: &Issue,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AppliedRemediation>> {
        if self.config.dry_run {
            return Ok(Some(dry_run(
                IssueKind::DependencyResolution,
                "DRY_RUN: Would resolve dependencies",
            )));
        }

        let (mut tasks, index) = self.locate(&task.id).await?;
        let Some((remaining, resolved)) = completed_blockers_removed(&tasks[index], &tasks) else {
            return Ok(None);
        };

        tasks[index].dependencies.blocked_by = remaining.clone();
        tasks[index].updated_at = Some(now);

        self.store.commit(tasks, SOURCE).await?;
        self.log_store_event(
            &task.id,
            serde_json::json!({ "action": "resolve_dependencies", "resolved": resolved }),
            now,
        );

        Ok(Some(AppliedRemediation {
            kind: IssueKind::DependencyResolution,
            action: "Resolved dependencies".to_string(),
            dry_run: false,
            details: serde_json::json!({ "resolved": resolved, "remaining": remaining }),
        }))
    }

    /// Overwrite stated progress with the implementation-derived figure.
    async fn fix_progress_mismatch(
        &self,
        task: &Task,
        _issue: &Issue,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AppliedRemediation>> {
        let actual = derived_progress(task);

        if self.config.dry_run {
            return Ok(Some(dry_run(
                IssueKind::ProgressMismatch,
                format!(
                    "DRY_RUN: Would adjust progress from {}% to {}%",
                    task.progress, actual
                ),
            )));
        }

        let (mut tasks, index) = self.locate(&task.id).await?;
        let old = tasks[index].progress;
        tasks[index].progress = actual;
        tasks[index].updated_at = Some(now);
        tasks[index].progress_adjustments.push(ProgressAdjustment {
            timestamp: now,
            from: old,
            to: actual,
            reason: "Automatic progress alignment based on implementation".to_string(),
        });

        self.store.commit(tasks, SOURCE).await?;
        self.log_store_event(
            &task.id,
            serde_json::json!({ "action": "align_progress", "progress": actual }),
            now,
        );

        Ok(Some(AppliedRemediation {
            kind: IssueKind::ProgressMismatch,
            action: format!("Adjusted progress from {old}% to {actual}%"),
            dry_run: false,
            details: serde_json::json!({
                "old_progress": old,
                "new_progress": actual,
                "difference": i32::from(actual) - i32::from(old),
            }),
        }))
    }

    /// Flag a long-running low-progress task for decomposition.
    async fn fix_low_progress(
        &self,
        task: &Task,
        _issue: &Issue,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AppliedRemediation>> {
        if self.config.dry_run {
            return Ok(Some(dry_run(
                IssueKind::LowProgress,
                "DRY_RUN: Would flag for decomposition",
            )));
        }

        let (mut tasks, index) = self.locate(&task.id).await?;
        tasks[index].attention.requires_decomposition = true;
        tasks[index].attention.decomposition_hint =
            Some("Consider breaking down into smaller subtasks".to_string());
        tasks[index].updated_at = Some(now);

        self.store.commit(tasks, SOURCE).await?;
        self.log_store_event(
            &task.id,
            serde_json::json!({ "action": "flag_decomposition" }),
            now,
        );

        Ok(Some(AppliedRemediation {
            kind: IssueKind::LowProgress,
            action: "Flagged for decomposition".to_string(),
            dry_run: false,
            details: serde_json::json!({
                "recommendation": "Break down into smaller subtasks"
            }),
        }))
    }

    /// Flag a stale task for a status update.
    async fn fix_stale(
        &self,
        task: &Task,
        _issue: &Issue,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AppliedRemediation>> {
        if self.config.dry_run {
            return Ok(Some(dry_run(
                IssueKind::Stale,
                "DRY_RUN: Would refresh task status",
            )));
        }

        let (mut tasks, index) = self.locate(&task.id).await?;
        let last_update = tasks[index].updated_at;
        tasks[index].attention.requires_status_update = true;
        tasks[index].attention.last_health_check = Some(now);
        tasks[index].updated_at = Some(now);

        self.store.commit(tasks, SOURCE).await?;
        self.log_store_event(&task.id, serde_json::json!({ "action": "flag_stale" }), now);

        Ok(Some(AppliedRemediation {
            kind: IssueKind::Stale,
            action: "Flagged for status update".to_string(),
            dry_run: false,
            details: serde_json::json!({ "last_update": last_update }),
        }))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn locate(&self, task_id: &str) -> anyhow::Result<(Vec<Task>, usize)> {
        let tasks = self.store.snapshot().await?;
        let index = tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| anyhow::anyhow!("task {task_id} not found"))?;
        Ok((tasks, index))
    }

    async fn write_safety_backup(&self) {
        match self.store.snapshot().await {
            Ok(tasks) => {
                if let Err(e) =
                    backup::write_safety_backup(&self.store.paths().safety_backup, &tasks).await
                {
                    tracing::warn!(error = format!("{e:#}"), "failed to write safety backup");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to snapshot collection for safety backup");
            }
        }
    }

    fn log_store_event(&self, task_id: &str, changes: serde_json::Value, now: DateTime<Utc>) {
        self.store.log_event(EventRecord::new(
            EventKind::Remediation,
            Some(task_id.to_string()),
            changes,
            SOURCE,
            now,
        ));
    }

    /// Append one line to the remediation audit log, swallowing failures.
    fn append_log(&self, line: serde_json::Value) {
        use std::io::Write;
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.store.paths().remediation_log)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            tracing::error!(error = %e, "failed to append remediation log line");
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn dry_run(kind: IssueKind, action: impl Into<String>) -> AppliedRemediation {
    AppliedRemediation {
        kind,
        action: action.into(),
        dry_run: true,
        details: serde_json::Value::Null,
    }
}

/// Blockers left after removing completed ones, plus the removed set.
/// `None` when nothing changed.
fn completed_blockers_removed(task: &Task, all: &[Task]) -> Option<(Vec<String>, Vec<String>)> {
    let completed: Vec<&str> = all
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(|t| t.id.as_str())
        .collect();

    let (resolved, remaining): (Vec<String>, Vec<String>) = task
        .dependencies
        .blocked_by
        .iter()
        .cloned()
        .partition(|id| completed.contains(&id.as_str()));

    if resolved.is_empty() {
        None
    } else {
        Some((remaining, resolved))
    }
}

/// Progress a task has demonstrably earned, from implementation evidence.
fn derived_progress(task: &Task) -> u8 {
    if task.status == TaskStatus::NotStarted {
        return 0;
    }
    if task.status == TaskStatus::Completed {
        return 100;
    }

    let expected = task.implementation_notes.planned_file_count();
    let actual = task.implementation_notes.recorded_file_count();

    let mut progress = 0.0;
    if expected > 0 {
        progress = (actual as f64 / expected as f64 * 80.0).min(90.0);
    }
    if task.implementation_notes.notes.is_some() {
        progress += 5.0;
    }
    if task.implementation_notes.testing_approach.is_some() {
        progress += 5.0;
    }
    if task.status == TaskStatus::InProgress {
        progress = progress.max(10.0);
    }

    (progress.round() as u8).min(95)
}

// ============================================================================
// Tests
// ============================================================================
