//! Integration tests for the task store's persistence invariants.

use backlog::{
    BacklogError, Dependencies, Task, TaskFilter, TaskPatch, TaskStatus, TaskStore,
};
use chrono::Utc;

async fn store_with(tasks: Vec<Task>) -> (tempfile::TempDir, TaskStore) {
    let dir = tempfile::TempDir::new().unwrap();
    let store = TaskStore::new(dir.path());
    store.init().await.unwrap();
    for task in tasks {
        store.add_task(task, "seed").await.unwrap();
    }
    (dir, store)
}

fn protected_task(id: &str) -> Task {
    let mut task = Task::new(id, "verified work")
        .with_status(TaskStatus::Completed)
        .with_progress(100);
    task.implementation_notes.verified = true;
    task.implementation_notes.do_not_revert = true;
    task.implementation_notes.files_created = vec!["src/done.rs".to_string()];
    task
}

// ============================================================================
// Protected-task invariant
// ============================================================================

#[tokio::test]
async fn protected_task_rejects_every_non_exempt_field() {
    let (_dir, store) = store_with(vec![protected_task("TASK-001")]).await;

    let disallowed_patches = vec![
        TaskPatch::new().with_title("renamed"),
        TaskPatch::new().with_priority(backlog::Priority::P0),
        TaskPatch::new().with_status(TaskStatus::InProgress),
        TaskPatch::new().with_dependencies(Dependencies {
            blocked_by: vec!["TASK-000".to_string()],
            required_for: vec![],
        }),
    ];

    for patch in disallowed_patches {
        let before = store.get_task("TASK-001").await.unwrap();
        let err = store.update_task("TASK-001", patch, "test").await.unwrap_err();
        assert!(
            matches!(err, BacklogError::Validation { .. }),
            "expected validation error, got: {err}"
        );

        // The stored task is byte-for-byte unchanged.
        store.invalidate_cache();
        let after = store.get_task("TASK-001").await.unwrap();
        assert_eq!(before, after);
    }
}

#[tokio::test]
async fn protected_task_accepts_exempt_fields() {
    let (_dir, store) = store_with(vec![protected_task("TASK-001")]).await;

    let mut notes = store
        .get_task("TASK-001")
        .await
        .unwrap()
        .implementation_notes;
    notes.notes = Some("post-verification annotation".to_string());

    let updated = store
        .update_task(
            "TASK-001",
            TaskPatch::new()
                .with_progress(100)
                .with_implementation_notes(notes),
            "test",
        )
        .await
        .unwrap();
    assert_eq!(
        updated.implementation_notes.notes.as_deref(),
        Some("post-verification annotation")
    );
    // Protection flags survive the write.
    assert!(updated.implementation_notes.verified);
    assert!(updated.implementation_notes.do_not_revert);
}

// ============================================================================
// Status-transition invariant
// ============================================================================

#[tokio::test]
async fn transition_table_is_enforced_exhaustively() {
    let all_statuses = [
        TaskStatus::NotStarted,
        TaskStatus::Ready,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Completed,
    ];

    for from in all_statuses {
        for to in all_statuses {
            if from == to {
                continue;
            }
            let (_dir, store) =
                store_with(vec![Task::new("TASK-001", "subject").with_status(from)]).await;
            let result = store
                .update_task(
                    "TASK-001",
                    TaskPatch::new().with_status(to),
                    "test",
                )
                .await;

            if from.can_transition_to(to) {
                assert!(result.is_ok(), "expected {from} -> {to} to be allowed");
            } else {
                let err = result.expect_err(&format!("expected {from} -> {to} to be rejected"));
                assert!(matches!(err, BacklogError::Validation { .. }));
            }
        }
    }
}

#[tokio::test]
async fn completion_sets_progress_and_timestamp() {
    let (_dir, store) = store_with(vec![Task::new("TASK-001", "almost done")
        .with_status(TaskStatus::InProgress)
        .with_progress(60)])
    .await;

    store
        .update_task(
            "TASK-001",
            TaskPatch::new().with_status(TaskStatus::Completed),
            "test",
        )
        .await
        .unwrap();

    store.invalidate_cache();
    let stored = store.get_task("TASK-001").await.unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.progress, 100);
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn reopening_a_completed_task_is_allowed() {
    let (_dir, store) = store_with(vec![Task::new("TASK-001", "shipped")
        .with_status(TaskStatus::Completed)
        .with_progress(100)])
    .await;

    let reopened = store
        .update_task(
            "TASK-001",
            TaskPatch::new()
                .with_status(TaskStatus::InProgress)
                .with_progress(80),
            "test",
        )
        .await
        .unwrap();
    assert_eq!(reopened.status, TaskStatus::InProgress);
    assert_eq!(reopened.progress, 80);
}

// ============================================================================
// Round-trip
// ============================================================================

#[tokio::test]
async fn add_then_get_round_trips_except_server_timestamps() {
    let (_dir, store) = store_with(vec![]).await;

    let mut task = Task::new("TASK-042", "Round trip")
        .with_priority(backlog::Priority::P2)
        .with_category("storage")
        .with_blocked_by(vec!["TASK-041".to_string()]);
    task.estimates.effort_hours = Some(6.5);
    task.implementation_notes.files_to_create = vec!["src/codec.rs".to_string()];

    let added = store.add_task(task.clone(), "test").await.unwrap();
    store.invalidate_cache();
    let fetched = store.get_task("TASK-042").await.unwrap();

    assert_eq!(fetched, added);

    // Equal to the submitted task once server-set timestamps are ignored.
    let mut normalized = fetched.clone();
    normalized.created_at = None;
    normalized.updated_at = None;
    assert_eq!(normalized, task);
}

// ============================================================================
// Backup retention
// ============================================================================

#[tokio::test]
async fn backup_retention_keeps_exactly_ten_newest() {
    let (_dir, store) = store_with(vec![Task::new("TASK-001", "churner")
        .with_status(TaskStatus::InProgress)
        .with_progress(1)])
    .await;

    // Well past the retention window of 10.
    for i in 2..=14u8 {
        store
            .update_task("TASK-001", TaskPatch::new().with_progress(i), "test")
            .await
            .unwrap();
    }

    let mut names: Vec<String> = std::fs::read_dir(&store.paths().backups_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with("backlog-") && n.ends_with(".json"))
        .collect();

    assert_eq!(names.len(), 10);

    // The newest snapshot contains the second-to-last progress value,
    // proving the survivors are the most recent saves.
    names.sort();
    let newest = store.paths().backups_dir.join(names.last().unwrap());
    let snapshot: Vec<Task> =
        serde_json::from_str(&std::fs::read_to_string(newest).unwrap()).unwrap();
    assert_eq!(snapshot[0].progress, 13);
}

// ============================================================================
// Batch semantics
// ============================================================================

#[tokio::test]
async fn batch_update_is_validated_before_any_write() {
    let (_dir, store) = store_with(vec![
        Task::new("TASK-001", "a"),
        protected_task("TASK-002"),
    ])
    .await;

    let before = std::fs::read_to_string(&store.paths().backlog).unwrap();
    let err = store
        .update_tasks(
            vec![
                (
                    "TASK-001".to_string(),
                    TaskPatch::new().with_status(TaskStatus::InProgress),
                ),
                (
                    "TASK-002".to_string(),
                    TaskPatch::new().with_title("rename a protected task"),
                ),
            ],
            "batch",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BacklogError::Validation { .. }));

    // Nothing was persisted.
    assert_eq!(
        std::fs::read_to_string(&store.paths().backlog).unwrap(),
        before
    );
}

#[tokio::test]
async fn events_record_every_mutation_in_order() {
    let (_dir, store) = store_with(vec![]).await;

    store
        .add_task(Task::new("TASK-001", "tracked"), "cli")
        .await
        .unwrap();
    store
        .update_task(
            "TASK-001",
            TaskPatch::new().with_status(TaskStatus::InProgress),
            "cli",
        )
        .await
        .unwrap();
    store
        .update_task("TASK-001", TaskPatch::new().with_progress(30), "tracker")
        .await
        .unwrap();

    let events = store.event_log().events_for_task("TASK-001").unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].operation, backlog::EventKind::AddTask);
    assert_eq!(events[1].operation, backlog::EventKind::UpdateTask);
    assert_eq!(events[2].source, "tracker");

    // Append order is chronological.
    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn filters_preserve_collection_order() {
    let (_dir, store) = store_with(vec![
        Task::new("TASK-003", "third").with_priority(backlog::Priority::P1),
        Task::new("TASK-001", "first").with_priority(backlog::Priority::P1),
        Task::new("TASK-002", "second").with_priority(backlog::Priority::P0),
    ])
    .await;

    let p1 = store
        .get_tasks(&TaskFilter::new().with_priority(backlog::Priority::P1))
        .await
        .unwrap();
    let ids: Vec<&str> = p1.iter().map(|t| t.id.as_str()).collect();
    // Matches come back in insertion order, not sorted by id.
    assert_eq!(ids, vec!["TASK-003", "TASK-001"]);
}

#[tokio::test]
async fn corrupt_backlog_fails_loudly() {
    let (_dir, store) = store_with(vec![]).await;
    std::fs::write(&store.paths().backlog, "{\"oops\": true}").unwrap();
    store.invalidate_cache();

    let err = store.get_tasks(&TaskFilter::new()).await.unwrap_err();
    assert!(matches!(err, BacklogError::CorruptStore { .. }));
    assert_eq!(err.exit_code(), 7);
}

#[tokio::test]
async fn uninitialized_store_names_the_missing_path() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = TaskStore::new(dir.path());

    let err = store.get_task("TASK-001").await.unwrap_err();
    let BacklogError::NotInitialized { path } = &err else {
        panic!("expected NotInitialized, got: {err}");
    };
    assert!(path.ends_with("tasks/backlog.json"));
    assert_eq!(err.exit_code(), 6);
}

#[tokio::test]
async fn report_generation_is_read_only() {
    let (_dir, store) = store_with(vec![
        Task::new("TASK-001", "a")
            .with_status(TaskStatus::InProgress)
            .with_progress(50),
        Task::new("TASK-002", "b")
            .with_status(TaskStatus::Completed)
            .with_progress(100),
    ])
    .await;

    let before = std::fs::read_to_string(&store.paths().backlog).unwrap();
    let events_before = store.event_log().read_all().unwrap().len();

    let report = store.generate_health_report(Utc::now()).await.unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.completed_tasks.len(), 1);

    assert_eq!(
        std::fs::read_to_string(&store.paths().backlog).unwrap(),
        before
    );
    assert_eq!(store.event_log().read_all().unwrap().len(), events_before);
}
