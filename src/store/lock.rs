//! Advisory file lock for the store write path.
//!
//! The backing collection file is a shared resource with no transaction
//! log. Mutating operations serialize their load-modify-write cycle by
//! holding an exclusive advisory lock on a sidecar lock file; cooperating
//! processes block until the holder releases. Readers never take the lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::Result;

/// RAII guard for the store's advisory write lock.
///
/// The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the exclusive lock, blocking until it is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created or locked.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        file.lock_exclusive()?;
        tracing::debug!(path = %path.display(), "acquired store lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release store lock");
        }
    }
}
