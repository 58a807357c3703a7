//! # docbro-backup
//!
//! Recovery artifacts for DocBro:
//! - [`UninstallBackup`]: compressed archive of user data taken before removal
//! - [`SnapshotManager`]: per-phase install snapshots with rollback

pub mod archive;
pub mod compression;
pub mod error;
pub mod manifest;
pub mod snapshot;

pub use archive::{sidecar_path, BackupResult, UninstallBackup};
pub use error::{BackupError, Result};
pub use manifest::{BackupEntry, BackupManifest, BackupStatistics, ChecksumInfo};
pub use snapshot::{InstallationSnapshot, RollbackReport, SnapshotManager, SnapshotRequest};
