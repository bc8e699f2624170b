//! Test fixtures for creating reproducible store environments.

use std::path::Path;

use tempfile::TempDir;

use crate::store::TaskStore;
use crate::task::{Task, TaskStatus};

/// A temporary, initialized store seeded with tasks.
///
/// The backing directory is cleaned up when the fixture is dropped.
pub struct StoreFixture {
    temp_dir: TempDir,
    store: TaskStore,
}

impl StoreFixture {
    /// An initialized, empty store.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory or store cannot be created.
    pub async fn empty() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let store = TaskStore::new(temp_dir.path());
        store.init().await.expect("failed to initialize store");
        Self { temp_dir, store }
    }

    /// An initialized store seeded with the given tasks.
    pub async fn with_tasks(tasks: Vec<Task>) -> Self {
        let fixture = Self::empty().await;
        for task in tasks {
            fixture
                .store
                .add_task(task, "fixture")
                .await
                .expect("failed to seed task");
        }
        fixture
    }

    /// A small mixed-status backlog: one of each lifecycle stage.
    pub async fn mixed_backlog() -> Self {
        Self::with_tasks(vec![
            Task::new("TASK-001", "Design the schema")
                .with_status(TaskStatus::Completed)
                .with_progress(100),
            Task::new("TASK-002", "Build the API")
                .with_status(TaskStatus::InProgress)
                .with_progress(40),
            Task::new("TASK-003", "Write the docs")
                .with_status(TaskStatus::Blocked)
                .with_blocked_by(vec!["TASK-002".to_string()]),
            Task::new("TASK-004", "Ship it"),
        ])
        .await
    }

    /// The seeded store.
    #[must_use]
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Root of the temporary store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TaskFilter;

    #[tokio::test]
    async fn test_mixed_backlog_fixture() {
        let fixture = StoreFixture::mixed_backlog().await;
        let all = fixture
            .store()
            .get_tasks(&TaskFilter::new())
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
    }
}
