//! Install-phase snapshots and rollback
//!
//! A snapshot records the files a phase is about to create, copies of the
//! files it is about to modify, and the serialized installation state. Once
//! persisted under `snapshot/<id>` it is never rewritten; rolling back reads
//! it and leaves it intact so the same rollback can run again.

use crate::error::{BackupError, Result};
use chrono::{DateTime, Utc};
use docbro_backends::{Filesystem, LocalFilesystem};
use docbro_core::store::{self, load_json, save_json, StateStore, SNAPSHOT_NAMESPACE};
use docbro_core::types::{InstallPhase, InstallationState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Point-in-time capture enabling rollback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationSnapshot {
    pub snapshot_id: String,
    pub installation_id: String,
    pub phase: InstallPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,

    /// Paths to delete on rollback
    pub created_files: Vec<PathBuf>,

    /// Original path to backup copy
    pub modified_files: BTreeMap<PathBuf, PathBuf>,

    pub installation_state: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl InstallationSnapshot {
    /// Deserialize the embedded installation state
    pub fn state(&self) -> Result<InstallationState> {
        Ok(serde_json::from_value(self.installation_state.clone())?)
    }
}

/// What a phase is about to touch
#[derive(Debug, Clone)]
pub struct SnapshotRequest {
    pub state: InstallationState,
    pub step: Option<String>,
    pub description: String,
    pub created_files: Vec<PathBuf>,
    pub modified_files: Vec<PathBuf>,
    pub profile: Option<Value>,
}

impl SnapshotRequest {
    pub fn new(state: &InstallationState, description: impl Into<String>) -> Self {
        Self {
            state: state.clone(),
            step: None,
            description: description.into(),
            created_files: Vec::new(),
            modified_files: Vec::new(),
            profile: None,
        }
    }

    pub fn creates(mut self, path: impl Into<PathBuf>) -> Self {
        self.created_files.push(path.into());
        self
    }

    pub fn modifies(mut self, path: impl Into<PathBuf>) -> Self {
        self.modified_files.push(path.into());
        self
    }

    pub fn with_profile(mut self, profile: Value) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }
}

/// Outcome of a rollback
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RollbackReport {
    pub snapshot_id: String,
    pub deleted: Vec<PathBuf>,
    pub already_absent: Vec<PathBuf>,
    pub restored: Vec<PathBuf>,
    pub state_restored: bool,
    pub failures: Vec<String>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Creates, restores and prunes snapshots
pub struct SnapshotManager {
    store: Arc<dyn StateStore>,
    files_root: PathBuf,
    fs: Arc<dyn Filesystem>,
}

impl SnapshotManager {
    /// `files_root` holds the backup copies of modified files
    pub fn new(store: Arc<dyn StateStore>, files_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            files_root: files_root.into(),
            fs: Arc::new(LocalFilesystem::new()),
        }
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = fs;
        self
    }

    fn key(snapshot_id: &str) -> String {
        store::key(SNAPSHOT_NAMESPACE, snapshot_id)
    }

    fn files_dir(&self, snapshot_id: &str) -> PathBuf {
        self.files_root.join(snapshot_id)
    }

    /// Capture and persist a snapshot
    pub fn create_snapshot(&self, request: SnapshotRequest) -> Result<InstallationSnapshot> {
        let state = &request.state;
        let snapshot_id = format!(
            "{}-{}-{}",
            state.installation_id,
            state.current_phase,
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let files_dir = self.files_dir(&snapshot_id);

        let mut created_files: Vec<PathBuf> = Vec::new();
        for path in request.created_files {
            if !created_files.contains(&path) {
                created_files.push(path);
            }
        }

        let mut modified_files = BTreeMap::new();
        for (index, path) in request.modified_files.into_iter().enumerate() {
            if modified_files.contains_key(&path) {
                continue;
            }
            if !self.fs.exists(&path) {
                // Nothing to restore; the phase will create it
                if !created_files.contains(&path) {
                    created_files.push(path);
                }
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string());
            let backup = files_dir.join(format!("{:03}_{}", index, name));
            self.fs.copy_recursive(&path, &backup).map_err(|e| {
                std::io::Error::other(format!("failed to back up {}: {}", path.display(), e))
            })?;
            modified_files.insert(path, backup);
        }

        let snapshot = InstallationSnapshot {
            snapshot_id: snapshot_id.clone(),
            installation_id: state.installation_id.clone(),
            phase: state.current_phase,
            step: request.step,
            created_files,
            modified_files,
            installation_state: serde_json::to_value(state)?,
            profile: request.profile,
            description: request.description,
            created_at: Utc::now(),
        };
        save_json(self.store.as_ref(), &Self::key(&snapshot_id), &snapshot)?;

        info!(
            snapshot = %snapshot_id,
            phase = %snapshot.phase,
            created = snapshot.created_files.len(),
            modified = snapshot.modified_files.len(),
            "created snapshot"
        );
        Ok(snapshot)
    }

    pub fn load(&self, snapshot_id: &str) -> Result<InstallationSnapshot> {
        load_json(self.store.as_ref(), &Self::key(snapshot_id))?.ok_or_else(|| {
            BackupError::SnapshotNotFound {
                snapshot_id: snapshot_id.to_string(),
            }
        })
    }

    /// Snapshots of one installation, oldest first
    pub fn list_for(&self, installation_id: &str) -> Result<Vec<InstallationSnapshot>> {
        let prefix = format!("{}/", SNAPSHOT_NAMESPACE);
        let mut snapshots = Vec::new();
        for key in self.store.keys(&prefix)? {
            let Some(snapshot) = load_json::<InstallationSnapshot>(self.store.as_ref(), &key)? else {
                continue;
            };
            if snapshot.installation_id == installation_id {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by_key(|s| s.created_at);
        Ok(snapshots)
    }

    /// Undo everything recorded in a snapshot
    ///
    /// With `partial_ok` every step is attempted and failures are collected in
    /// the report; otherwise the first failure aborts with
    /// [`BackupError::Rollback`].
    pub fn rollback(
        &self,
        snapshot: &InstallationSnapshot,
        partial_ok: bool,
    ) -> Result<RollbackReport> {
        warn!(snapshot = %snapshot.snapshot_id, "rolling back to snapshot");
        let mut report = RollbackReport {
            snapshot_id: snapshot.snapshot_id.clone(),
            ..RollbackReport::default()
        };

        let fail = |report: &mut RollbackReport, message: String| -> Result<()> {
            if partial_ok {
                warn!("Rollback step failed: {}", message);
                report.failures.push(message);
                Ok(())
            } else {
                Err(BackupError::Rollback {
                    snapshot_id: snapshot.snapshot_id.clone(),
                    failures: vec![message],
                })
            }
        };

        for path in snapshot.created_files.iter().rev() {
            match self.remove_created(path) {
                Ok(true) => report.deleted.push(path.clone()),
                Ok(false) => report.already_absent.push(path.clone()),
                Err(message) => fail(&mut report, message)?,
            }
        }

        for (original, backup) in &snapshot.modified_files {
            // Directories are replaced wholesale so files added later do not survive
            if self.fs.is_dir(backup) && self.fs.exists(original) {
                if let Err(e) = self.fs.remove_all(original) {
                    fail(&mut report, format!("clear {}: {}", original.display(), e))?;
                    continue;
                }
            }
            match self.fs.copy_recursive(backup, original) {
                Ok(_) => report.restored.push(original.clone()),
                Err(e) => fail(
                    &mut report,
                    format!("restore {}: {}", original.display(), e),
                )?,
            }
        }

        match self.restore_documents(snapshot) {
            Ok(()) => report.state_restored = true,
            Err(e) => fail(&mut report, format!("restore state: {}", e))?,
        }

        info!(
            snapshot = %snapshot.snapshot_id,
            deleted = report.deleted.len(),
            restored = report.restored.len(),
            failures = report.failures.len(),
            "rollback finished"
        );
        Ok(report)
    }

    /// Delete a created path; `Ok(false)` when it was already gone
    fn remove_created(&self, path: &Path) -> std::result::Result<bool, String> {
        if !self.fs.exists(path) {
            return Ok(false);
        }
        match self.fs.remove_all(path) {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(format!("delete {}: {}", path.display(), e)),
        }
    }

    fn restore_documents(&self, snapshot: &InstallationSnapshot) -> Result<()> {
        self.store.write(
            &store::key(store::STATE_NAMESPACE, &snapshot.installation_id),
            &snapshot.installation_state,
        )?;
        if let Some(profile) = &snapshot.profile {
            self.store.write(
                &store::key(store::PROFILE_NAMESPACE, &snapshot.installation_id),
                profile,
            )?;
        }
        Ok(())
    }

    /// Remove a snapshot document and its file copies
    pub fn delete(&self, snapshot_id: &str) -> Result<bool> {
        let existed = self.store.delete(&Self::key(snapshot_id))?;
        let files_dir = self.files_dir(snapshot_id);
        if self.fs.exists(&files_dir) {
            if let Err(e) = self.fs.remove_all(&files_dir) {
                warn!("Could not remove snapshot files {}: {}", files_dir.display(), e);
            }
        }
        debug!(snapshot = %snapshot_id, existed, "deleted snapshot");
        Ok(existed)
    }

    /// Drop every snapshot of an installation; returns how many were removed
    pub fn cleanup_installation(&self, installation_id: &str) -> Result<usize> {
        let snapshots = self.list_for(installation_id)?;
        let mut removed = 0;
        for snapshot in snapshots {
            if self.delete(&snapshot.snapshot_id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbro_core::store::MemoryStore;
    use std::fs;
    use tempfile::TempDir;

    fn manager(temp: &TempDir) -> (SnapshotManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let manager = SnapshotManager::new(store.clone(), temp.path().join("snapshots"));
        (manager, store)
    }

    fn state_in_configuration() -> InstallationState {
        let mut state = InstallationState::new("inst-1");
        for phase in &InstallPhase::PIPELINE[..3] {
            state.enter_phase(*phase, 1).unwrap();
            state.complete_phase(*phase).unwrap();
        }
        state
    }

    #[test]
    fn test_missing_modified_file_is_recorded_as_created() {
        let temp = TempDir::new().unwrap();
        let (manager, _store) = manager(&temp);
        let target = temp.path().join("settings.yaml");

        let snapshot = manager
            .create_snapshot(
                SnapshotRequest::new(&state_in_configuration(), "before configuration")
                    .modifies(&target),
            )
            .unwrap();

        assert_eq!(snapshot.created_files, vec![target]);
        assert!(snapshot.modified_files.is_empty());
    }

    #[test]
    fn test_rollback_is_repeatable() {
        let temp = TempDir::new().unwrap();
        let (manager, _store) = manager(&temp);
        let existing = temp.path().join("existing.conf");
        fs::write(&existing, "original").unwrap();

        let snapshot = manager
            .create_snapshot(
                SnapshotRequest::new(&state_in_configuration(), "before").modifies(&existing),
            )
            .unwrap();
        fs::write(&existing, "changed").unwrap();

        manager.rollback(&snapshot, false).unwrap();
        fs::write(&existing, "changed again").unwrap();
        let report = manager.rollback(&snapshot, false).unwrap();

        assert_eq!(fs::read_to_string(&existing).unwrap(), "original");
        assert_eq!(report.restored, vec![existing]);
        assert_eq!(manager.load(&snapshot.snapshot_id).unwrap(), snapshot);
    }

    #[test]
    fn test_list_delete_and_cleanup() {
        let temp = TempDir::new().unwrap();
        let (manager, _store) = manager(&temp);
        let state = state_in_configuration();

        let first = manager
            .create_snapshot(SnapshotRequest::new(&state, "one"))
            .unwrap();
        manager
            .create_snapshot(SnapshotRequest::new(&state, "two"))
            .unwrap();
        manager
            .create_snapshot(SnapshotRequest::new(&InstallationState::new("other"), "x"))
            .unwrap();

        assert_eq!(manager.list_for("inst-1").unwrap().len(), 2);
        assert!(manager.delete(&first.snapshot_id).unwrap());
        assert!(matches!(
            manager.load(&first.snapshot_id),
            Err(BackupError::SnapshotNotFound { .. })
        ));
        assert_eq!(manager.cleanup_installation("inst-1").unwrap(), 1);
        assert_eq!(manager.list_for("other").unwrap().len(), 1);
    }
}
