//! Backlog - task state management, health scoring, and auto-remediation.
//!
//! A single-writer JSON task store with validated state transitions,
//! timestamped backups, and an append-only audit log, plus the passes
//! that keep a backlog honest: a weighted health scorer, a rule-based
//! anomaly monitor, a bounded remediation engine, an automatic progress
//! tracker, and a dependency resolver.
//!
//! # Architecture
//!
//! - [`store`] - the task collection on disk: cached loads, validated
//!   writes, backups, events
//! - [`task`] - the domain model and its transition table
//! - [`health`] - continuous scoring and discrete anomaly detection
//! - [`remediation`] - priority-ordered corrective writes
//! - [`progress`] - multi-signal progress derivation
//! - [`deps`] - batch blocker resolution
//! - [`vcs`] - bounded, best-effort git and test-runner probes
//! - [`config`] - `backlog.toml` loading
//! - [`error`] - typed failures and exit codes
//! - [`testing`] - trait seams, mocks, and fixtures
//!
//! # Example
//!
//! ```rust,ignore
//! use backlog::{TaskStore, Task, TaskPatch, TaskStatus};
//!
//! let store = TaskStore::new(".");
//! store.init().await?;
//! store.add_task(Task::new("TASK-001", "Build the parser"), "cli").await?;
//! store.update_task(
//!     "TASK-001",
//!     TaskPatch::new().with_status(TaskStatus::InProgress),
//!     "cli",
//! ).await?;
//! ```

pub mod config;
pub mod deps;
pub mod error;
pub mod health;
pub mod progress;
pub mod remediation;
pub mod store;
pub mod task;
pub mod testing;
pub mod vcs;

// Re-export commonly used types
pub use error::{BacklogError, Result};

// Re-export config types
pub use config::BacklogConfig;

// Re-export domain types
pub use task::{
    Complexity, Dependencies, Estimates, ImplementationNotes, Priority, Task, TaskPatch,
    TaskStatus,
};

// Re-export store types
pub use store::{
    EventKind, EventLog, EventRecord, StoreMetrics, StorePaths, TaskFilter, TaskStore,
};

// Re-export health types
pub use health::{
    HealthMonitor, HealthReport, HealthScore, HealthScorer, HealthStatus, Issue, IssueKind,
    MonitorThresholds, Severity,
};

// Re-export remediation types
pub use remediation::{RemediationConfig, RemediationEngine, RemediationOutcome};

// Re-export batch pass types
pub use deps::{DependencyResolver, ResolutionSummary};
pub use progress::{ProgressReport, ProgressTracker};

// Re-export the real signal probes
pub use vcs::{CommandTestProbe, GitCli};

// StoreFixture is only available in test builds
#[cfg(test)]
pub use testing::StoreFixture;
