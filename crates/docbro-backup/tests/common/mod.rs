//! Shared fixtures for docbro-backup integration tests

#![allow(dead_code)]

use docbro_backends::{Filesystem, FsError, LocalFilesystem};
use docbro_core::types::{InstallPhase, InstallationState};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Local filesystem that refuses to delete selected paths and records removals
#[derive(Default, Clone)]
pub struct FlakyFilesystem {
    inner: LocalFilesystem,
    deny_remove: Arc<Mutex<HashSet<PathBuf>>>,
    removed: Arc<Mutex<Vec<PathBuf>>>,
}

impl FlakyFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_remove(&self, path: impl Into<PathBuf>) {
        self.deny_remove.lock().unwrap().insert(path.into());
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed.lock().unwrap().clone()
    }
}

impl Filesystem for FlakyFilesystem {
    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, FsError> {
        self.inner.list_dir(path)
    }

    fn remove_all(&self, path: &Path) -> Result<(), FsError> {
        if self.deny_remove.lock().unwrap().contains(path) {
            return Err(FsError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        self.inner.remove_all(path)?;
        self.removed.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn copy_recursive(&self, src: &Path, dst: &Path) -> Result<u64, FsError> {
        self.inner.copy_recursive(src, dst)
    }

    fn size_of(&self, path: &Path) -> Result<u64, FsError> {
        self.inner.size_of(path)
    }
}

/// State with every phase before configuration completed
pub fn state_entering_configuration(installation_id: &str) -> InstallationState {
    let mut state = InstallationState::new(installation_id);
    for phase in &InstallPhase::PIPELINE[..3] {
        state.enter_phase(*phase, 2).unwrap();
        state.complete_phase(*phase).unwrap();
    }
    state.enter_phase(InstallPhase::Configuration, 3).unwrap();
    state
}
