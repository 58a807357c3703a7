//! Pre-uninstall backup archive
//!
//! Directory and config-file contents are staged together with container and
//! volume metadata (not volume data), then packed into one `.tar.gz`. A failed
//! backup never leaves a partial archive or staging directory behind.

use crate::compression::{calculate_checksum, write_tar_gz, DEFAULT_COMPRESSION_LEVEL};
use crate::error::{BackupError, Result};
use crate::manifest::{BackupEntry, BackupManifest, BackupStatistics, ChecksumInfo, MANIFEST_FILENAME};
use chrono::Utc;
use docbro_backends::{Filesystem, LocalFilesystem};
use docbro_core::types::{Component, Inventory};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Result of a successful backup
#[derive(Debug, Clone)]
pub struct BackupResult {
    pub archive_path: PathBuf,
    pub manifest: BackupManifest,
}

/// Sidecar manifest written next to an archive
pub fn sidecar_path(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_os_string();
    name.push(".manifest.json");
    PathBuf::from(name)
}

/// Builds backup archives under a backup directory
pub struct UninstallBackup {
    backup_dir: PathBuf,
    compression_level: u32,
    fs: Arc<dyn Filesystem>,
}

impl UninstallBackup {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            fs: Arc::new(LocalFilesystem::new()),
        }
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.clamp(1, 9);
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Back up everything restorable in the inventory
    pub fn create(&self, inventory: &Inventory) -> Result<BackupResult> {
        let start = Instant::now();
        fs::create_dir_all(&self.backup_dir)?;

        let archive_name = format!(
            "docbro_backup_{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let archive_path = self.backup_dir.join(format!("{}.tar.gz", archive_name));

        // Dropping the staging dir purges it on every exit path
        let staging = tempfile::Builder::new()
            .prefix(".docbro-staging-")
            .tempdir_in(&self.backup_dir)?;

        info!("Creating backup {}", archive_path.display());
        let built = self.build(inventory, &archive_name, staging.path(), &archive_path);

        match built {
            Ok(mut manifest) => {
                manifest.statistics = manifest
                    .statistics
                    .clone()
                    .with_duration(start.elapsed().as_secs_f64());
                if let Err(e) = self.write_sidecar(&archive_path, &manifest) {
                    self.discard(&archive_path);
                    return Err(BackupError::archive(format!("{:#}", e)));
                }
                info!("Backup complete: {}", manifest.summary());
                Ok(BackupResult {
                    archive_path,
                    manifest,
                })
            }
            Err(e) => {
                warn!("Backup failed, removing partial archive: {:#}", e);
                self.discard(&archive_path);
                Err(BackupError::archive(format!("{:#}", e)))
            }
        }
    }

    fn build(
        &self,
        inventory: &Inventory,
        archive_name: &str,
        staging: &Path,
        archive_path: &Path,
    ) -> anyhow::Result<BackupManifest> {
        let mut manifest =
            BackupManifest::new(archive_name, inventory.counts(), inventory.total_size_bytes());

        for (index, component) in inventory.directories.iter().enumerate() {
            if let Some(entry) = self.stage_path(component, staging, "directories", index)? {
                manifest.entries.push(entry);
            }
        }
        for (index, component) in inventory.config_files.iter().enumerate() {
            if let Some(entry) = self.stage_path(component, staging, "config", index)? {
                manifest.entries.push(entry);
            }
        }

        let metadata_dir = staging.join("metadata");
        fs::create_dir_all(&metadata_dir)?;
        write_metadata(&metadata_dir.join("containers.json"), &inventory.containers)?;
        write_metadata(&metadata_dir.join("volumes.json"), &inventory.volumes)?;
        write_metadata(&metadata_dir.join("packages.json"), &inventory.packages)?;

        // The archived manifest carries a pending checksum; the sidecar has the final one
        fs::write(staging.join(MANIFEST_FILENAME), manifest.to_json()?)?;

        let (files_included, staged_bytes) = staged_totals(staging)?;
        write_tar_gz(staging, archive_path, self.compression_level)?;

        let compressed = fs::metadata(archive_path)?.len();
        manifest.statistics = BackupStatistics::new(files_included, staged_bytes, compressed);
        manifest.checksum = ChecksumInfo::sha256(calculate_checksum(archive_path)?);
        Ok(manifest)
    }

    fn stage_path(
        &self,
        component: &Component,
        staging: &Path,
        group: &str,
        index: usize,
    ) -> anyhow::Result<Option<BackupEntry>> {
        let Some(source) = component.path.as_deref() else {
            return Ok(None);
        };
        if !self.fs.exists(source) {
            debug!("Skipping missing path {}", source.display());
            return Ok(None);
        }

        let base = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        let archived_as = format!("{}/{:02}_{}", group, index, base);
        let size_bytes = self
            .fs
            .copy_recursive(source, &staging.join(&archived_as))
            .map_err(|e| anyhow::anyhow!("Failed to stage {}: {}", source.display(), e))?;

        Ok(Some(BackupEntry {
            source: source.to_path_buf(),
            archived_as,
            size_bytes,
        }))
    }

    fn write_sidecar(&self, archive_path: &Path, manifest: &BackupManifest) -> anyhow::Result<()> {
        fs::write(sidecar_path(archive_path), manifest.to_json()?)?;
        Ok(())
    }

    fn discard(&self, archive_path: &Path) {
        for path in [archive_path.to_path_buf(), sidecar_path(archive_path)] {
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Could not remove {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Compare an archive against its recorded checksum
    pub fn verify(archive_path: &Path, manifest: &BackupManifest) -> Result<bool> {
        let actual = calculate_checksum(archive_path).map_err(|e| BackupError::archive(e.to_string()))?;
        Ok(actual == manifest.checksum.value)
    }

    /// Read the sidecar manifest of an archive
    pub fn read_manifest(archive_path: &Path) -> Result<BackupManifest> {
        let json = fs::read_to_string(sidecar_path(archive_path))?;
        BackupManifest::from_json(&json).map_err(|e| BackupError::archive(e.to_string()))
    }
}

fn write_metadata(path: &Path, components: &[Component]) -> anyhow::Result<()> {
    fs::write(path, serde_json::to_string_pretty(components)?)?;
    Ok(())
}

fn staged_totals(staging: &Path) -> anyhow::Result<(usize, u64)> {
    let mut files = 0;
    let mut bytes = 0;
    for entry in WalkDir::new(staging) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files += 1;
            bytes += entry.metadata()?.len();
        }
    }
    Ok((files, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::list_archive;
    use docbro_backends::FsError;
    use tempfile::TempDir;

    fn inventory_with_data(root: &Path) -> Inventory {
        let data = root.join("data");
        fs::create_dir_all(data.join("projects")).unwrap();
        fs::write(data.join("projects/docs.db"), vec![b'x'; 4096]).unwrap();
        let settings = root.join("settings.yaml");
        fs::write(&settings, "vector-store: sqlite_vec\n").unwrap();

        let mut inventory = Inventory::new();
        inventory.push(Component::container("docbro-qdrant"));
        inventory.push(Component::volume("docbro_data"));
        inventory.push(Component::directory(&data).with_size(4096));
        inventory.push(Component::config_file(&settings));
        inventory.push(Component::directory(root.join("missing")));
        inventory
    }

    #[test]
    fn test_create_backup() {
        let temp = TempDir::new().unwrap();
        let inventory = inventory_with_data(temp.path());
        let backup_dir = temp.path().join("backups");

        let result = UninstallBackup::new(&backup_dir).create(&inventory).unwrap();

        assert!(result.archive_path.exists());
        assert!(sidecar_path(&result.archive_path).exists());
        assert_eq!(result.manifest.component_counts.total(), 5);
        assert_eq!(result.manifest.entries.len(), 2);
        assert!(result.manifest.statistics.compression_ratio > 0.0);
        assert!(UninstallBackup::verify(&result.archive_path, &result.manifest).unwrap());

        let entries = list_archive(&result.archive_path).unwrap();
        assert!(entries.iter().any(|p| p.ends_with("metadata/containers.json")));
        assert!(entries.iter().any(|p| p.ends_with("directories/00_data/projects/docs.db")));

        // Only the archive and its sidecar remain
        assert_eq!(fs::read_dir(&backup_dir).unwrap().count(), 2);
        let sidecar = UninstallBackup::read_manifest(&result.archive_path).unwrap();
        assert_eq!(sidecar, result.manifest);
    }

    struct FailingCopy;

    impl Filesystem for FailingCopy {
        fn exists(&self, _path: &Path) -> bool {
            true
        }
        fn is_dir(&self, _path: &Path) -> bool {
            true
        }
        fn list_dir(&self, _path: &Path) -> std::result::Result<Vec<PathBuf>, FsError> {
            Ok(Vec::new())
        }
        fn remove_all(&self, _path: &Path) -> std::result::Result<(), FsError> {
            Ok(())
        }
        fn copy_recursive(&self, src: &Path, _dst: &Path) -> std::result::Result<u64, FsError> {
            Err(FsError::PermissionDenied {
                path: src.to_path_buf(),
            })
        }
        fn size_of(&self, _path: &Path) -> std::result::Result<u64, FsError> {
            Ok(0)
        }
    }

    #[test]
    fn test_failed_backup_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let inventory = inventory_with_data(temp.path());
        let backup_dir = temp.path().join("backups");

        let err = UninstallBackup::new(&backup_dir)
            .with_filesystem(Arc::new(FailingCopy))
            .create(&inventory)
            .unwrap_err();

        assert!(matches!(err, BackupError::Archive { .. }));
        assert_eq!(fs::read_dir(&backup_dir).unwrap().count(), 0);
    }
}
