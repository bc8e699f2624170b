//! Batch dependency resolution.
//!
//! One pass over the whole collection removes blockers whose referenced
//! task has completed and promotes newly-unblocked `not-started`/`blocked`
//! tasks to `ready`. The pass persists once at the end; running it again
//! with no intervening changes writes nothing and logs nothing.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{EventKind, EventRecord, TaskStore};
use crate::task::{Task, TaskStatus};

/// Event source recorded for resolver writes.
const SOURCE: &str = "dependency-resolver";

// ============================================================================
// Summary Types
// ============================================================================

/// One task whose blocker list changed during a pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyUpdate {
    pub task_id: String,
    pub title: String,
    pub removed_blockers: Vec<String>,
    pub remaining_blockers: Vec<String>,
    /// The blocker list emptied out in this pass
    pub now_unblocked: bool,
}

/// Result of one resolver pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub updates: Vec<DependencyUpdate>,
    /// Tasks promoted to `ready` this pass
    pub total_unblocked: usize,
}

// ============================================================================
// Resolution
// ============================================================================

/// Remove satisfied blockers in place and promote fully-unblocked tasks.
///
/// Pure over the collection: no I/O, no clock reads.
pub fn resolve(tasks: &mut [Task]) -> ResolutionSummary {
    let completed: HashSet<String> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(|t| t.id.clone())
        .collect();

    let mut summary = ResolutionSummary::default();

    for task in tasks.iter_mut() {
        if task.dependencies.blocked_by.is_empty() {
            continue;
        }

        let original = task.dependencies.blocked_by.clone();
        let remaining: Vec<String> = original
            .iter()
            .filter(|id| !completed.contains(*id))
            .cloned()
            .collect();

        if remaining.len() == original.len() {
            continue;
        }

        let removed: Vec<String> = original
            .into_iter()
            .filter(|id| completed.contains(id))
            .collect();
        let now_unblocked = remaining.is_empty();

        task.dependencies.blocked_by = remaining.clone();
        if now_unblocked
            && matches!(task.status, TaskStatus::NotStarted | TaskStatus::Blocked)
        {
            task.status = TaskStatus::Ready;
            summary.total_unblocked += 1;
        }

        summary.updates.push(DependencyUpdate {
            task_id: task.id.clone(),
            title: task.title.clone(),
            removed_blockers: removed,
            remaining_blockers: remaining,
            now_unblocked,
        });
    }

    summary
}

// ============================================================================
// Resolver
// ============================================================================

/// Applies resolver passes against a store.
pub struct DependencyResolver<'a> {
    store: &'a TaskStore,
}

impl<'a> DependencyResolver<'a> {
    #[must_use]
    pub fn new(store: &'a TaskStore) -> Self {
        Self { store }
    }

    /// Run one pass: scan, mutate, persist once, emit one event per
    /// changed task plus an aggregate event when anything became fully
    /// unblocked.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<ResolutionSummary> {
        let mut tasks = self.store.snapshot().await?;
        let summary = resolve(&mut tasks);

        if summary.updates.is_empty() {
            tracing::debug!("no dependency updates needed");
            return Ok(summary);
        }

        self.store.commit(tasks, SOURCE).await?;

        for update in &summary.updates {
            self.store.log_event(EventRecord::new(
                EventKind::DependencyResolved,
                Some(update.task_id.clone()),
                serde_json::json!({
                    "removed_blockers": update.removed_blockers,
                    "remaining_blockers": update.remaining_blockers,
                    "now_unblocked": update.now_unblocked,
                }),
                SOURCE,
                now,
            ));
        }

        if summary.total_unblocked > 0 {
            let unblocked: Vec<&str> = summary
                .updates
                .iter()
                .filter(|u| u.now_unblocked)
                .map(|u| u.task_id.as_str())
                .collect();
            self.store.log_event(EventRecord::new(
                EventKind::DependencyScan,
                None,
                serde_json::json!({
                    "total_unblocked": summary.total_unblocked,
                    "updated_tasks": unblocked,
                }),
                SOURCE,
                now,
            ));
        }

        Ok(summary)
    }
}

// ============================================================================
// Tests
// ============================================================================
