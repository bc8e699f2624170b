//! Timestamped backups of the backlog collection.
//!
//! A full snapshot of the pre-write collection is copied into
//! `tasks/backups/` before every mutating save, then the directory is
//! pruned to the 10 most recent snapshots. Backup failures are reported
//! to the caller, which logs and swallows them; a backup must never block
//! the primary save.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::task::Task;

/// Number of timestamped snapshots retained.
pub const RETAINED_BACKUPS: usize = 10;

/// File name for a snapshot taken at `now` by `source`.
///
/// Nanosecond precision keeps rapid successive saves from colliding, and
/// the zero-padded layout sorts lexicographically in timestamp order.
fn backup_file_name(now: DateTime<Utc>, source: &str) -> String {
    let stamp = now.format("%Y-%m-%dT%H-%M-%S-%9f");
    format!("backlog-{stamp}-{source}.json")
}

/// Copy the current collection file into the backups directory and prune.
///
/// A missing collection file is not an error; there is simply nothing to
/// snapshot yet.
pub async fn create_backup(
    backlog_path: &Path,
    backups_dir: &Path,
    source: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    if tokio::fs::metadata(backlog_path).await.is_err() {
        return Ok(());
    }

    tokio::fs::create_dir_all(backups_dir)
        .await
        .with_context(|| format!("failed to create backup directory {}", backups_dir.display()))?;

    let target = backups_dir.join(backup_file_name(now, source));
    tokio::fs::copy(backlog_path, &target)
        .await
        .with_context(|| format!("failed to write backup {}", target.display()))?;

    prune_backups(backups_dir).await
}

/// Delete snapshots beyond the [`RETAINED_BACKUPS`] most recent.
pub async fn prune_backups(backups_dir: &Path) -> Result<()> {
    let mut names: Vec<PathBuf> = Vec::new();
    let mut entries = tokio::fs::read_dir(backups_dir)
        .await
        .with_context(|| format!("failed to list backups in {}", backups_dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("backlog-") && name.ends_with(".json") {
            names.push(entry.path());
        }
    }

    // Lexicographic order is chronological for these names.
    names.sort();
    names.reverse();

    for stale in names.into_iter().skip(RETAINED_BACKUPS) {
        tokio::fs::remove_file(&stale)
            .await
            .with_context(|| format!("failed to prune backup {}", stale.display()))?;
    }
    Ok(())
}

/// Write the single safety snapshot the remediation engine takes before
/// its first corrective write (`tasks/backlog.backup.json`).
pub async fn write_safety_backup(path: &Path, tasks: &[Task]) -> Result<()> {
    let json = serde_json::to_string_pretty(tasks).context("failed to serialize safety backup")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write safety backup {}", path.display()))?;
    Ok(())
}
