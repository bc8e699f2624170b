//! Single source of truth for the task collection.
//!
//! All reads and writes of persisted task data go through [`TaskStore`].
//! The store owns the on-disk layout, a short-TTL read cache, timestamped
//! backups, and the append-only event log.
//!
//! # Layout
//!
//! ```text
//! <root>/tasks/backlog.json          collection (pretty JSON array)
//! <root>/tasks/backlog.backup.json   remediation safety snapshot
//! <root>/tasks/backups/              timestamped snapshots (10 newest)
//! <root>/tasks/events.jsonl          append-only audit log
//! <root>/tasks/remediation.log       remediation audit trail
//! <root>/tasks/.backlog.lock         advisory write lock
//! ```
//!
//! # Write path
//!
//! Mutating operations hold an exclusive advisory lock for the whole
//! load-modify-write cycle and re-read the collection from disk while
//! holding it, so cooperating processes serialize their updates. The read
//! cache is a read-path optimization only and may serve a snapshot up to
//! its TTL stale.

pub mod backup;
pub mod events;
pub mod lock;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BacklogError, Result};
use crate::task::{Priority, Task, TaskPatch, TaskStatus};

pub use events::{EventKind, EventLog, EventRecord};
pub use lock::StoreLock;

/// Default time-to-live for the in-process read cache.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);

/// Tasks in progress longer than this many days without an update are
/// listed as stuck in the store health report.
const STUCK_REPORT_DAYS: f64 = 3.0;

// ============================================================================
// Store Paths
// ============================================================================

/// On-disk layout of the store, derived from a root directory.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub root: PathBuf,
    pub tasks_dir: PathBuf,
    pub backlog: PathBuf,
    pub safety_backup: PathBuf,
    pub backups_dir: PathBuf,
    pub events: PathBuf,
    pub remediation_log: PathBuf,
    pub lock_file: PathBuf,
}

impl StorePaths {
    /// Compute the layout under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let tasks_dir = root.join("tasks");
        Self {
            backlog: tasks_dir.join("backlog.json"),
            safety_backup: tasks_dir.join("backlog.backup.json"),
            backups_dir: tasks_dir.join("backups"),
            events: tasks_dir.join("events.jsonl"),
            remediation_log: tasks_dir.join("remediation.log"),
            lock_file: tasks_dir.join(".backlog.lock"),
            tasks_dir,
            root,
        }
    }
}

// ============================================================================
// Filters & Metrics
// ============================================================================

/// Criteria for [`TaskStore::get_tasks`]. Matches are returned in
/// collection order; no implicit sort.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub ids: Option<Vec<String>>,
}

impl TaskFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if task.priority != Some(priority) {
                return false;
            }
        }
        if let Some(ref category) = self.category {
            if task.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if let Some(ref ids) = self.ids {
            if !ids.iter().any(|id| id == &task.id) {
                return false;
            }
        }
        true
    }
}

/// A task listed as stuck in the store health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StuckSummary {
    pub id: String,
    pub title: String,
    pub days_since_update: u64,
}

/// A task listed as blocked in the store health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedSummary {
    pub id: String,
    pub title: String,
    pub blocked_by: Vec<String>,
}

/// A task listed as completed in the store health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedSummary {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Aggregate metrics over the whole collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetrics {
    pub total: usize,
    pub by_status: BTreeMap<TaskStatus, usize>,
    pub by_priority: BTreeMap<Priority, usize>,
    pub stuck_tasks: Vec<StuckSummary>,
    pub blocked_tasks: Vec<BlockedSummary>,
    pub completed_tasks: Vec<CompletedSummary>,
}

// ============================================================================
// Task Store
// ============================================================================

struct CacheEntry {
    tasks: Vec<Task>,
    loaded_at: Instant,
}

/// Owns the persisted task collection.
///
/// Construct one instance per store root and pass it by reference to the
/// components that need it; there is no module-level state.
pub struct TaskStore {
    paths: StorePaths,
    events: EventLog,
    cache_ttl: Duration,
    cache: Mutex<Option<CacheEntry>>,
}

impl TaskStore {
    /// Create a store rooted at `root` with the default cache TTL.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let paths = StorePaths::new(root);
        let events = EventLog::new(&paths.events);
        Self {
            paths,
            events,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Mutex::new(None),
        }
    }

    /// Override the read-cache TTL (zero disables caching).
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// The store's on-disk layout.
    #[must_use]
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// The store's append-only event log.
    #[must_use]
    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    /// Drop the read cache so the next load hits the disk.
    pub fn invalidate_cache(&self) {
        *self.cache.lock().expect("cache mutex poisoned") = None;
    }

    // ========================================================================
    // Initialization
    // ========================================================================

    /// Create the tasks directory and an empty collection.
    ///
    /// Returns `true` if the collection was created, `false` if one
    /// already exists (which is left untouched).
    pub async fn init(&self) -> Result<bool> {
        tokio::fs::create_dir_all(&self.paths.tasks_dir).await?;
        if tokio::fs::metadata(&self.paths.backlog).await.is_ok() {
            tracing::debug!(path = %self.paths.backlog.display(), "backlog already initialized");
            return Ok(false);
        }
        tokio::fs::write(&self.paths.backlog, "[]\n").await?;
        Ok(true)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Get a single task by id.
    pub async fn get_task(&self, id: &str) -> Result<Task> {
        self.load()
            .await?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| BacklogError::not_found(id))
    }

    /// Get every task matching `filter`, in collection order.
    pub async fn get_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect())
    }

    /// The most recent `limit` event records, newest first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<EventRecord>> {
        self.events.recent(limit)
    }

    /// Aggregate counts plus stuck/blocked/completed listings.
    pub async fn generate_health_report(&self, now: DateTime<Utc>) -> Result<StoreMetrics> {
        let tasks = self.load().await?;

        let mut metrics = StoreMetrics {
            total: tasks.len(),
            by_status: BTreeMap::new(),
            by_priority: BTreeMap::new(),
            stuck_tasks: Vec::new(),
            blocked_tasks: Vec::new(),
            completed_tasks: Vec::new(),
        };

        for task in &tasks {
            *metrics.by_status.entry(task.status).or_insert(0) += 1;
            if let Some(priority) = task.priority {
                *metrics.by_priority.entry(priority).or_insert(0) += 1;
            }

            if task.status == TaskStatus::InProgress {
                let days = match task.updated_at {
                    Some(updated) => (now - updated).num_seconds() as f64 / 86_400.0,
                    None => 999.0,
                };
                if days > STUCK_REPORT_DAYS {
                    metrics.stuck_tasks.push(StuckSummary {
                        id: task.id.clone(),
                        title: task.title.clone(),
                        days_since_update: days.round() as u64,
                    });
                }
            }

            let has_blockers = !task.dependencies.blocked_by.is_empty();
            if (task.status == TaskStatus::Blocked || has_blockers)
                && task.status != TaskStatus::Completed
            {
                metrics.blocked_tasks.push(BlockedSummary {
                    id: task.id.clone(),
                    title: task.title.clone(),
                    blocked_by: task.dependencies.blocked_by.clone(),
                });
            }

            if task.status == TaskStatus::Completed {
                metrics.completed_tasks.push(CompletedSummary {
                    id: task.id.clone(),
                    title: task.title.clone(),
                    completed_at: task.completed_at,
                });
            }
        }

        Ok(metrics)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Add a new task. Rejects duplicate ids; defaults `created_at` and
    /// `updated_at` to now where the caller left them unset.
    pub async fn add_task(&self, task: Task, source: &str) -> Result<Task> {
        if task.id.trim().is_empty() || task.title.trim().is_empty() {
            return Err(BacklogError::InvalidRecord {
                reason: "task must have an id and a title".to_string(),
            });
        }
        if task.dependencies.blocked_by.contains(&task.id) {
            return Err(BacklogError::validation(
                &task.id,
                "task cannot list itself in blocked_by",
            ));
        }

        let now = Utc::now();
        self.require_initialized().await?;
        let _lock = StoreLock::acquire(&self.paths.lock_file)?;
        let mut tasks = self.load_fresh().await?;

        if tasks.iter().any(|t| t.id == task.id) {
            return Err(BacklogError::DuplicateTask { id: task.id });
        }

        let mut new_task = task;
        new_task.created_at = new_task.created_at.or(Some(now));
        new_task.updated_at = new_task.updated_at.or(Some(now));

        tasks.push(new_task.clone());
        self.persist(tasks, source, now).await?;

        self.log_event(EventRecord::new(
            EventKind::AddTask,
            Some(new_task.id.clone()),
            serde_json::to_value(&new_task).unwrap_or_default(),
            source,
            now,
        ));

        Ok(new_task)
    }

    /// Apply a partial update to one task through the validated path.
    ///
    /// Loads the collection, validates the patch against the protected-task
    /// and status-transition invariants, derives completion defaults,
    /// stamps `updated_at`, snapshots the pre-update collection, persists,
    /// and appends an event record.
    ///
    /// This is a read-modify-write over the entire collection; the write
    /// lock serializes concurrent callers on the same backing file.
    pub async fn update_task(&self, id: &str, patch: TaskPatch, source: &str) -> Result<Task> {
        let now = Utc::now();
        self.require_initialized().await?;
        let _lock = StoreLock::acquire(&self.paths.lock_file)?;
        let mut tasks = self.load_fresh().await?;

        let index = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| BacklogError::not_found(id))?;

        validate_patch(&tasks[index], &patch)?;

        let changes = serde_json::to_value(&patch).unwrap_or_default();
        let mut updated = tasks[index].clone();
        apply_patch(&mut updated, patch, now);
        tasks[index] = updated.clone();

        self.persist(tasks, source, now).await?;

        self.log_event(EventRecord::new(
            EventKind::UpdateTask,
            Some(id.to_string()),
            changes,
            source,
            now,
        ));

        Ok(updated)
    }

    /// Apply a batch of partial updates.
    ///
    /// Every patch is validated against the pre-batch state before any
    /// mutation is applied; persistence happens once at the end. A failure
    /// after the validation pass is not rolled back.
    pub async fn update_tasks(
        &self,
        updates: Vec<(String, TaskPatch)>,
        source: &str,
    ) -> Result<Vec<Task>> {
        let now = Utc::now();
        self.require_initialized().await?;
        let _lock = StoreLock::acquire(&self.paths.lock_file)?;
        let mut tasks = self.load_fresh().await?;

        // Validate everything against current state before touching anything.
        for (id, patch) in &updates {
            let task = tasks
                .iter()
                .find(|t| t.id == *id)
                .ok_or_else(|| BacklogError::not_found(id))?;
            validate_patch(task, patch)?;
        }

        let batch_id = format!("batch-{}", now.timestamp_millis());
        let mut results = Vec::with_capacity(updates.len());
        let mut records = Vec::with_capacity(updates.len());

        for (id, patch) in updates {
            let index = tasks
                .iter()
                .position(|t| t.id == id)
                .ok_or_else(|| BacklogError::not_found(&id))?;

            let mut changes = serde_json::to_value(&patch).unwrap_or_default();
            if let Some(object) = changes.as_object_mut() {
                object.insert("batch_id".to_string(), serde_json::json!(batch_id));
            }

            let mut updated = tasks[index].clone();
            apply_patch(&mut updated, patch, now);
            tasks[index] = updated.clone();
            results.push(updated);

            records.push(EventRecord::new(
                EventKind::UpdateTask,
                Some(id),
                changes,
                source,
                now,
            ));
        }

        self.persist(tasks, source, now).await?;
        for record in records {
            self.log_event(record);
        }

        Ok(results)
    }

    // ========================================================================
    // Privileged access for batch passes
    // ========================================================================

    /// Current collection for a batch pass (remediation, dependency
    /// resolution). Honors the read cache.
    pub(crate) async fn snapshot(&self) -> Result<Vec<Task>> {
        self.load().await
    }

    /// Persist a corrected collection produced by a batch pass, with the
    /// usual backup, but without the operator transition table: batch
    /// passes perform corrective moves (e.g. promotion to `ready`) that
    /// the operator API forbids.
    pub(crate) async fn commit(&self, tasks: Vec<Task>, source: &str) -> Result<()> {
        let now = Utc::now();
        let _lock = StoreLock::acquire(&self.paths.lock_file)?;
        self.persist(tasks, source, now).await
    }

    /// Append an event record, logging and swallowing failures: the audit
    /// trail must never block the primary persistence path.
    pub(crate) fn log_event(&self, record: EventRecord) {
        if let Err(e) = self.events.append(&record) {
            tracing::error!(error = %e, "failed to append event record");
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn require_initialized(&self) -> Result<()> {
        if tokio::fs::metadata(&self.paths.backlog).await.is_err() {
            return Err(BacklogError::NotInitialized {
                path: self.paths.backlog.clone(),
            });
        }
        Ok(())
    }

    /// Load honoring the read cache.
    async fn load(&self) -> Result<Vec<Task>> {
        {
            let cache = self.cache.lock().expect("cache mutex poisoned");
            if let Some(entry) = cache.as_ref() {
                if entry.loaded_at.elapsed() < self.cache_ttl {
                    tracing::debug!("serving backlog from cache");
                    return Ok(entry.tasks.clone());
                }
            }
        }
        let tasks = self.load_fresh().await?;
        Ok(tasks)
    }

    /// Load directly from disk, refreshing the cache.
    async fn load_fresh(&self) -> Result<Vec<Task>> {
        let data = match tokio::fs::read_to_string(&self.paths.backlog).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BacklogError::NotInitialized {
                    path: self.paths.backlog.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let value: serde_json::Value = serde_json::from_str(&data)
            .map_err(|e| BacklogError::corrupt(&self.paths.backlog, e.to_string()))?;
        if !value.is_array() {
            return Err(BacklogError::corrupt(
                &self.paths.backlog,
                "root must be a JSON array",
            ));
        }
        let tasks: Vec<Task> = serde_json::from_value(value)
            .map_err(|e| BacklogError::corrupt(&self.paths.backlog, e.to_string()))?;

        self.store_cache(&tasks);
        Ok(tasks)
    }

    /// Validate structurally, snapshot the pre-write file, write, refresh
    /// the cache.
    async fn persist(&self, tasks: Vec<Task>, source: &str, now: DateTime<Utc>) -> Result<()> {
        for task in &tasks {
            if task.id.trim().is_empty() || task.title.trim().is_empty() {
                return Err(BacklogError::InvalidRecord {
                    reason: format!("task record missing id or title: {:?}", task.id),
                });
            }
        }

        if let Err(e) =
            backup::create_backup(&self.paths.backlog, &self.paths.backups_dir, source, now).await
        {
            tracing::warn!(error = %e, "failed to create backup; continuing with save");
        }

        let json = serde_json::to_string_pretty(&tasks)?;
        tokio::fs::write(&self.paths.backlog, json).await?;

        self.store_cache(&tasks);
        Ok(())
    }

    fn store_cache(&self, tasks: &[Task]) {
        *self.cache.lock().expect("cache mutex poisoned") = Some(CacheEntry {
            tasks: tasks.to_vec(),
            loaded_at: Instant::now(),
        });
    }
}

// ============================================================================
// Validation & Patch Application
// ============================================================================

/// Fields that may still be mutated on a protected (verified +
/// do-not-revert) task.
const PROTECTED_ALLOWED_FIELDS: &[&str] =
    &["progress", "completed_at", "updated_at", "implementation_notes"];

fn validate_patch(existing: &Task, patch: &TaskPatch) -> Result<()> {
    if existing.is_protected() {
        let disallowed: Vec<&str> = patch
            .touched_fields()
            .into_iter()
            .filter(|f| !PROTECTED_ALLOWED_FIELDS.contains(f))
            .collect();
        if !disallowed.is_empty() {
            return Err(BacklogError::validation(
                &existing.id,
                format!(
                    "task is verified and protected from modification; attempted updates: {}",
                    disallowed.join(", ")
                ),
            ));
        }
    }

    if let Some(target) = patch.status {
        if target != existing.status && !existing.status.can_transition_to(target) {
            return Err(BacklogError::validation(
                &existing.id,
                format!("invalid status transition: {} -> {}", existing.status, target),
            ));
        }
    }

    if let Some(ref deps) = patch.dependencies {
        if deps.blocked_by.contains(&existing.id) {
            return Err(BacklogError::validation(
                &existing.id,
                "task cannot list itself in blocked_by",
            ));
        }
    }

    Ok(())
}

/// Merge `patch` into `task`, deriving status-dependent defaults and
/// stamping `updated_at`. Timestamps are set by transitions, never
/// backdated.
fn apply_patch(task: &mut Task, patch: TaskPatch, now: DateTime<Utc>) {
    let target_status = patch.status;

    if let Some(title) = patch.title {
        task.title = title;
    }
    if let Some(category) = patch.category {
        task.category = Some(category);
    }
    if let Some(priority) = patch.priority {
        task.priority = Some(priority);
    }
    if let Some(dependencies) = patch.dependencies {
        task.dependencies = dependencies;
    }
    if let Some(estimates) = patch.estimates {
        task.estimates = estimates;
    }
    if let Some(notes) = patch.implementation_notes {
        task.implementation_notes = notes;
    }
    if let Some(started_at) = patch.started_at {
        task.started_at = Some(started_at);
    }
    if let Some(completed_at) = patch.completed_at {
        task.completed_at = Some(completed_at);
    }
    if let Some(progress) = patch.progress {
        task.progress = progress.min(100);
    }

    if let Some(status) = target_status {
        task.status = status;
        match status {
            TaskStatus::Completed => {
                if patch.completed_at.is_none() {
                    task.completed_at = Some(now);
                }
                if patch.progress.is_none() {
                    task.progress = 100;
                }
            }
            TaskStatus::NotStarted => {
                if patch.progress.is_none() {
                    task.progress = 0;
                }
            }
            TaskStatus::InProgress => {
                if task.started_at.is_none() {
                    task.started_at = Some(now);
                }
            }
            _ => {}
        }
    }

    task.updated_at = Some(now);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Dependencies;

    async fn seeded_store(tasks: &[Task]) -> (tempfile::TempDir, TaskStore) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = TaskStore::new(dir.path());
        store.init().await.unwrap();
        for task in tasks {
            store.add_task(task.clone(), "seed").await.unwrap();
        }
        (dir, store)
    }

    #[tokio::test]
    async fn test_get_task_before_init_is_not_initialized() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = TaskStore::new(dir.path());
        let err = store.get_task("TASK-001").await.unwrap_err();
        assert!(matches!(err, BacklogError::NotInitialized { .. }));
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = TaskStore::new(dir.path());
        assert!(store.init().await.unwrap());
        assert!(!store.init().await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_store_detected() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = TaskStore::new(dir.path());
        store.init().await.unwrap();
        tokio::fs::write(&store.paths().backlog, "{\"not\": \"an array\"}")
            .await
            .unwrap();

        let err = store.get_task("TASK-001").await.unwrap_err();
        assert!(matches!(err, BacklogError::CorruptStore { .. }));
    }

    #[tokio::test]
    async fn test_unparseable_json_is_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = TaskStore::new(dir.path());
        store.init().await.unwrap();
        tokio::fs::write(&store.paths().backlog, "not json {{{")
            .await
            .unwrap();

        let err = store.get_tasks(&TaskFilter::new()).await.unwrap_err();
        assert!(matches!(err, BacklogError::CorruptStore { .. }));
    }

    #[tokio::test]
    async fn test_add_and_get_roundtrip() {
        let (_dir, store) = seeded_store(&[]).await;
        let task = Task::new("TASK-001", "Build the parser").with_priority(Priority::P1);

        let added = store.add_task(task.clone(), "test").await.unwrap();
        assert!(added.created_at.is_some());
        assert!(added.updated_at.is_some());

        let fetched = store.get_task("TASK-001").await.unwrap();
        assert_eq!(fetched, added);
        assert_eq!(fetched.title, task.title);
        assert_eq!(fetched.priority, task.priority);
    }

    #[tokio::test]
    async fn test_add_duplicate_rejected() {
        let (_dir, store) = seeded_store(&[Task::new("TASK-001", "First")]).await;
        let err = store
            .add_task(Task::new("TASK-001", "Again"), "test")
            .await
            .unwrap_err();
        assert!(matches!(err, BacklogError::DuplicateTask { .. }));
    }

    #[tokio::test]
    async fn test_add_self_blocker_rejected() {
        let (_dir, store) = seeded_store(&[]).await;
        let task = Task::new("TASK-001", "Ouroboros").with_blocked_by(vec!["TASK-001".into()]);
        let err = store.add_task(task, "test").await.unwrap_err();
        assert!(matches!(err, BacklogError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_update_missing_task_not_found() {
        let (_dir, store) = seeded_store(&[]).await;
        let err = store
            .update_task("TASK-404", TaskPatch::new().with_progress(10), "test")
            .await
            .unwrap_err();
        assert!(matches!(err, BacklogError::TaskNotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected_without_write() {
        let (_dir, store) = seeded_store(&[Task::new("TASK-001", "x")]).await;
        let err = store
            .update_task(
                "TASK-001",
                TaskPatch::new().with_status(TaskStatus::Completed),
                "test",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BacklogError::Validation { .. }));

        // The stored task is unchanged.
        let task = store.get_task("TASK-001").await.unwrap();
        assert_eq!(task.status, TaskStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_same_status_write_is_not_a_transition() {
        let (_dir, store) = seeded_store(&[Task::new("TASK-001", "x")]).await;
        let updated = store
            .update_task(
                "TASK-001",
                TaskPatch::new().with_status(TaskStatus::NotStarted),
                "test",
            )
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_completion_derives_progress_and_timestamp() {
        let (_dir, store) =
            seeded_store(&[Task::new("TASK-001", "x").with_status(TaskStatus::InProgress)]).await;
        let updated = store
            .update_task(
                "TASK-001",
                TaskPatch::new().with_status(TaskStatus::Completed),
                "test",
            )
            .await
            .unwrap();
        assert_eq!(updated.progress, 100);
        assert!(updated.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_start_sets_started_at_once() {
        let (_dir, store) = seeded_store(&[Task::new("TASK-001", "x")]).await;
        let updated = store
            .update_task(
                "TASK-001",
                TaskPatch::new().with_status(TaskStatus::InProgress),
                "test",
            )
            .await
            .unwrap();
        let first_start = updated.started_at.unwrap();

        // A later progress write must not move the start timestamp.
        let updated = store
            .update_task("TASK-001", TaskPatch::new().with_progress(30), "test")
            .await
            .unwrap();
        assert_eq!(updated.started_at, Some(first_start));
    }

    #[tokio::test]
    async fn test_protected_task_rejects_status_change() {
        let mut task = Task::new("TASK-001", "x").with_status(TaskStatus::Completed);
        task.progress = 100;
        task.implementation_notes.verified = true;
        task.implementation_notes.do_not_revert = true;
        let (_dir, store) = seeded_store(&[task]).await;

        let err = store
            .update_task(
                "TASK-001",
                TaskPatch::new().with_status(TaskStatus::InProgress),
                "test",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BacklogError::Validation { .. }));
        assert!(err.to_string().contains("protected"));

        let stored = store.get_task("TASK-001").await.unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_protected_task_allows_progress_update() {
        let mut task = Task::new("TASK-001", "x").with_status(TaskStatus::InProgress);
        task.implementation_notes.verified = true;
        task.implementation_notes.do_not_revert = true;
        let (_dir, store) = seeded_store(&[task]).await;

        let updated = store
            .update_task("TASK-001", TaskPatch::new().with_progress(80), "test")
            .await
            .unwrap();
        assert_eq!(updated.progress, 80);
    }

    #[tokio::test]
    async fn test_update_appends_event() {
        let (_dir, store) = seeded_store(&[Task::new("TASK-001", "x")]).await;
        store
            .update_task(
                "TASK-001",
                TaskPatch::new().with_status(TaskStatus::InProgress),
                "cli",
            )
            .await
            .unwrap();

        let events = store.event_log().events_for_task("TASK-001").unwrap();
        let update = events
            .iter()
            .find(|e| e.operation == EventKind::UpdateTask)
            .unwrap();
        assert_eq!(update.source, "cli");
        assert_eq!(
            update.changes.get("status").and_then(|v| v.as_str()),
            Some("in-progress")
        );
    }

    #[tokio::test]
    async fn test_batch_validates_all_before_applying() {
        let (_dir, store) = seeded_store(&[
            Task::new("TASK-001", "a"),
            Task::new("TASK-002", "b"),
        ])
        .await;

        // Second item is an invalid transition; the first must not land.
        let err = store
            .update_tasks(
                vec![
                    (
                        "TASK-001".to_string(),
                        TaskPatch::new().with_status(TaskStatus::InProgress),
                    ),
                    (
                        "TASK-002".to_string(),
                        TaskPatch::new().with_status(TaskStatus::Completed),
                    ),
                ],
                "batch",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BacklogError::Validation { .. }));

        let first = store.get_task("TASK-001").await.unwrap();
        assert_eq!(first.status, TaskStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_batch_applies_and_persists_once() {
        let (_dir, store) = seeded_store(&[
            Task::new("TASK-001", "a"),
            Task::new("TASK-002", "b"),
        ])
        .await;

        let results = store
            .update_tasks(
                vec![
                    (
                        "TASK-001".to_string(),
                        TaskPatch::new().with_status(TaskStatus::InProgress),
                    ),
                    ("TASK-002".to_string(), TaskPatch::new().with_progress(0)),
                ],
                "batch",
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 2);

        let events = store.event_log().read_all().unwrap();
        let batch_events: Vec<_> = events
            .iter()
            .filter(|e| e.operation == EventKind::UpdateTask)
            .collect();
        assert_eq!(batch_events.len(), 2);
        assert!(batch_events
            .iter()
            .all(|e| e.changes.get("batch_id").is_some()));
    }

    #[tokio::test]
    async fn test_filters() {
        let (_dir, store) = seeded_store(&[
            Task::new("TASK-001", "a")
                .with_priority(Priority::P0)
                .with_category("infra"),
            Task::new("TASK-002", "b").with_priority(Priority::P2),
            Task::new("TASK-003", "c")
                .with_priority(Priority::P0)
                .with_category("api"),
        ])
        .await;

        let p0 = store
            .get_tasks(&TaskFilter::new().with_priority(Priority::P0))
            .await
            .unwrap();
        assert_eq!(p0.len(), 2);
        // Collection order preserved.
        assert_eq!(p0[0].id, "TASK-001");

        let infra = store
            .get_tasks(&TaskFilter::new().with_category("infra"))
            .await
            .unwrap();
        assert_eq!(infra.len(), 1);

        let by_ids = store
            .get_tasks(&TaskFilter::new().with_ids(vec!["TASK-002".into(), "TASK-003".into()]))
            .await
            .unwrap();
        assert_eq!(by_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_self_blocker_rejected_on_update() {
        let (_dir, store) = seeded_store(&[Task::new("TASK-001", "x")]).await;
        let err = store
            .update_task(
                "TASK-001",
                TaskPatch::new().with_dependencies(Dependencies {
                    blocked_by: vec!["TASK-001".into()],
                    required_for: vec![],
                }),
                "test",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BacklogError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_health_report_counts_and_listings() {
        let now = Utc::now();
        let (_dir, store) = seeded_store(&[
            Task::new("TASK-001", "fresh"),
            Task::new("TASK-002", "stale")
                .with_status(TaskStatus::InProgress)
                .with_progress(40),
            Task::new("TASK-003", "blocked")
                .with_status(TaskStatus::Blocked)
                .with_blocked_by(vec!["TASK-001".into()]),
        ])
        .await;

        // Age the in-progress task by rewriting its updated_at on disk.
        let mut tasks: Vec<Task> =
            serde_json::from_str(&std::fs::read_to_string(&store.paths().backlog).unwrap())
                .unwrap();
        tasks[1].updated_at = Some(now - chrono::Duration::days(5));
        std::fs::write(
            &store.paths().backlog,
            serde_json::to_string_pretty(&tasks).unwrap(),
        )
        .unwrap();
        store.invalidate_cache();

        let report = store.generate_health_report(now).await.unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.by_status[&TaskStatus::InProgress], 1);
        assert_eq!(report.by_status[&TaskStatus::Blocked], 1);
        assert_eq!(report.stuck_tasks.len(), 1);
        assert_eq!(report.stuck_tasks[0].id, "TASK-002");
        assert_eq!(report.blocked_tasks.len(), 1);
        assert!(report.completed_tasks.is_empty());
    }

    #[tokio::test]
    async fn test_cache_serves_stale_reads_within_ttl() {
        let (_dir, store) = seeded_store(&[Task::new("TASK-001", "x")]).await;

        // Prime the cache.
        store.get_task("TASK-001").await.unwrap();

        // External edit behind the store's back.
        std::fs::write(&store.paths().backlog, "[]").unwrap();

        // Within the TTL the cached snapshot is still served.
        assert!(store.get_task("TASK-001").await.is_ok());

        // After invalidation the external edit is visible.
        store.invalidate_cache();
        assert!(store.get_task("TASK-001").await.is_err());
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = TaskStore::new(dir.path()).with_cache_ttl(Duration::from_secs(0));
        store.init().await.unwrap();
        store
            .add_task(Task::new("TASK-001", "x"), "test")
            .await
            .unwrap();

        std::fs::write(&store.paths().backlog, "[]").unwrap();
        assert!(store.get_task("TASK-001").await.is_err());
    }

    #[tokio::test]
    async fn test_backups_created_on_save() {
        let (_dir, store) = seeded_store(&[Task::new("TASK-001", "x")]).await;
        store
            .update_task("TASK-001", TaskPatch::new().with_progress(0), "test")
            .await
            .unwrap();

        let backups: Vec<_> = std::fs::read_dir(&store.paths().backups_dir)
            .unwrap()
            .collect();
        assert!(!backups.is_empty());
    }
}
