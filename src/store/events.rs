//! Append-only JSONL event log.
//!
//! Every mutation of the backlog appends one immutable record to
//! `tasks/events.jsonl`. Records are never modified or deleted by this
//! crate; rotation is out of scope.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::health::monitor::RevertHistory;

/// Remediation action recorded when a false completion is reverted.
///
/// The health monitor's stuck detection keys off this exact vocabulary
/// (grace period after a revert), so it lives here next to the log that
/// both sides read and write.
pub const REVERT_COMPLETION: &str = "revert_completion";

// ============================================================================
// Event Types
// ============================================================================

/// Operation that produced an event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A task was added to the backlog.
    AddTask,
    /// A task was mutated through the validated update path.
    UpdateTask,
    /// The remediation engine applied a corrective write.
    Remediation,
    /// The dependency resolver changed a task's blockers.
    DependencyResolved,
    /// Aggregate record for a dependency resolver pass.
    DependencyScan,
    /// A health check pass completed.
    HealthCheck,
    /// An error surfaced by a collaborating layer.
    Error,
}

impl EventKind {
    /// Returns the string representation of the event kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddTask => "add_task",
            Self::UpdateTask => "update_task",
            Self::Remediation => "remediation",
            Self::DependencyResolved => "dependency_resolved",
            Self::DependencyScan => "dependency_scan",
            Self::HealthCheck => "health_check",
            Self::Error => "error",
        }
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub operation: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub changes: serde_json::Value,
    pub source: String,
}

impl EventRecord {
    /// Create a record stamped with the given timestamp.
    #[must_use]
    pub fn new(
        operation: EventKind,
        task_id: Option<String>,
        changes: serde_json::Value,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            operation,
            task_id,
            changes,
            source: source.into(),
        }
    }

    /// The `action` string inside `changes`, if any.
    #[must_use]
    pub fn action(&self) -> Option<&str> {
        self.changes.get("action").and_then(|v| v.as_str())
    }

    /// The `progress` value inside `changes`, if any.
    #[must_use]
    pub fn progress_change(&self) -> Option<u64> {
        self.changes.get("progress").and_then(|v| v.as_u64())
    }
}

// ============================================================================
// Event Log
// ============================================================================

/// Handle to the append-only event log file.
///
/// Appends are synchronous; a log write failure must never block the
/// primary persistence path, so callers log and swallow errors from
/// [`EventLog::append`] where the store semantics require it.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Create a handle for the log at `path`. The file is created lazily
    /// on first append.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single JSON line.
    pub fn append(&self, record: &EventRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read every record in append order.
    ///
    /// A missing file means no events yet. Unparseable lines are skipped
    /// with a warning rather than failing the read; the log is an
    /// enrichment signal, not the source of truth.
    pub fn read_all(&self) -> Result<Vec<EventRecord>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in data.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<EventRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed event log line");
                }
            }
        }
        Ok(records)
    }

    /// The most recent `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<EventRecord>> {
        let mut records = self.read_all()?;
        let start = records.len().saturating_sub(limit);
        let mut recent: Vec<EventRecord> = records.drain(start..).collect();
        recent.reverse();
        Ok(recent)
    }

    /// All records for one task, in append order.
    pub fn events_for_task(&self, task_id: &str) -> Result<Vec<EventRecord>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.task_id.as_deref() == Some(task_id))
            .collect())
    }
}

impl RevertHistory for EventLog {
    fn recently_reverted(
        &self,
        task_id: &str,
        now: DateTime<Utc>,
        grace: chrono::Duration,
    ) -> bool {
        let Ok(records) = self.read_all() else {
            return false;
        };
        let cutoff = now - grace;
        records.iter().rev().any(|r| {
            r.timestamp >= cutoff
                && r.operation == EventKind::Remediation
                && r.task_id.as_deref() == Some(task_id)
                && r.action() == Some(REVERT_COMPLETION)
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
