//! Custom error types for the backlog toolkit.
//!
//! This module provides structured error types that enable better
//! error handling, reporting, and recovery throughout the application.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for backlog operations
#[derive(Error, Debug)]
pub enum BacklogError {
    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Backing store file absent on first read
    #[error("Backlog not initialized: {path} does not exist (run `backlog init` first)")]
    NotInitialized { path: PathBuf },

    /// Backing file present but not parseable JSON or not an array
    #[error("Corrupt backlog store at {path}: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    /// Referenced task id does not exist
    #[error("Task {id} not found")]
    TaskNotFound { id: String },

    /// Task with the same id already exists
    #[error("Task {id} already exists")]
    DuplicateTask { id: String },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// Attempted mutation violates a protected-task rule or the transition table
    #[error("Validation failed for task {id}: {reason}")]
    Validation { id: String, reason: String },

    /// Task record is structurally invalid (missing id or title)
    #[error("Invalid task record: {reason}")]
    InvalidRecord { reason: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BacklogError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a validation error for a task
    pub fn validation(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a task-not-found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::TaskNotFound { id: id.into() }
    }

    /// Create a corrupt-store error
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is fatal to the whole store (not just one call)
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotInitialized { .. } | Self::CorruptStore { .. })
    }

    /// Check if this error means the caller sent a bad request
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::InvalidRecord { .. }
                | Self::TaskNotFound { .. }
                | Self::DuplicateTask { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } | Self::InvalidRecord { .. } => 2,
            Self::TaskNotFound { .. } | Self::DuplicateTask { .. } => 3,
            Self::NotInitialized { .. } => 6,
            Self::CorruptStore { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for backlog results
pub type Result<T> = std::result::Result<T, BacklogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BacklogError::not_found("TASK-042");
        assert!(err.to_string().contains("TASK-042"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_validation_display() {
        let err = BacklogError::validation("TASK-001", "invalid status transition");
        assert!(err.to_string().contains("TASK-001"));
        assert!(err.to_string().contains("invalid status transition"));
    }

    #[test]
    fn test_is_fatal() {
        assert!(BacklogError::NotInitialized {
            path: PathBuf::from("tasks/backlog.json")
        }
        .is_fatal());
        assert!(BacklogError::corrupt("tasks/backlog.json", "not an array").is_fatal());
        assert!(!BacklogError::not_found("TASK-001").is_fatal());
    }

    #[test]
    fn test_is_rejection() {
        assert!(BacklogError::validation("TASK-001", "protected").is_rejection());
        assert!(BacklogError::not_found("TASK-001").is_rejection());
        assert!(!BacklogError::corrupt("x.json", "bad").is_rejection());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BacklogError::validation("t", "r").exit_code(), 2);
        assert_eq!(BacklogError::not_found("t").exit_code(), 3);
        assert_eq!(
            BacklogError::NotInitialized {
                path: PathBuf::from("x")
            }
            .exit_code(),
            6
        );
        assert_eq!(BacklogError::corrupt("x", "r").exit_code(), 7);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: BacklogError = io_err.into();
        assert!(matches!(err, BacklogError::Io(_)));
        assert!(err.to_string().contains("access denied"));
        assert_eq!(err.exit_code(), 1);
    }
}
