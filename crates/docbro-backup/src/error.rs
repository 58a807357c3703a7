//! Error types for docbro-backup

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackupError>;

#[derive(Error, Debug)]
pub enum BackupError {
    /// Building the uninstall archive failed; nothing was left on disk
    #[error("Backup failed: {message}")]
    Archive { message: String },

    #[error("Snapshot not found: {snapshot_id}")]
    SnapshotNotFound { snapshot_id: String },

    /// Rollback stopped (or finished with failures when partial results are allowed)
    #[error("Rollback of snapshot {snapshot_id} failed: {}", failures.join("; "))]
    Rollback {
        snapshot_id: String,
        failures: Vec<String>,
    },

    #[error(transparent)]
    Store(#[from] docbro_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackupError {
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }
}
