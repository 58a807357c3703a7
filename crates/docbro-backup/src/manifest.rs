//! Backup manifest describing an uninstall archive

use chrono::{DateTime, Utc};
use docbro_core::types::ComponentCounts;
use docbro_core::utils::human_bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const MANIFEST_VERSION: &str = "1.0.0";
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Metadata for one uninstall backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub archive_name: String,

    /// Inventory counts at backup time
    pub component_counts: ComponentCounts,

    /// Sum of the known sizes of all inventoried components
    pub inventory_size_bytes: u64,

    /// Directories and files copied into the archive
    pub entries: Vec<BackupEntry>,

    pub compression: String,
    pub checksum: ChecksumInfo,
    pub statistics: BackupStatistics,
}

impl BackupManifest {
    pub fn new(
        archive_name: impl Into<String>,
        component_counts: ComponentCounts,
        inventory_size_bytes: u64,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            created_at: Utc::now(),
            created_by: format!("docbro-backup v{}", env!("CARGO_PKG_VERSION")),
            archive_name: archive_name.into(),
            component_counts,
            inventory_size_bytes,
            entries: Vec::new(),
            compression: "gzip".to_string(),
            checksum: ChecksumInfo::pending(),
            statistics: BackupStatistics::default(),
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize manifest: {}", e))
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| anyhow::anyhow!("Failed to deserialize manifest: {}", e))
    }

    /// One-line description for operator output
    pub fn summary(&self) -> String {
        format!(
            "{} components, {} staged, {} compressed ({:.0}% saved)",
            self.component_counts.total(),
            human_bytes(self.statistics.total_size_bytes),
            human_bytes(self.statistics.compressed_size_bytes),
            self.statistics.savings_percentage()
        )
    }
}

/// A source path captured in the archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub source: PathBuf,
    /// Path inside the archive
    pub archived_as: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecksumInfo {
    pub algorithm: String,
    pub value: String,
}

impl ChecksumInfo {
    pub fn pending() -> Self {
        Self {
            algorithm: "sha256".to_string(),
            value: "pending".to_string(),
        }
    }

    pub fn sha256(value: impl Into<String>) -> Self {
        Self {
            algorithm: "sha256".to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupStatistics {
    pub files_included: usize,

    /// Uncompressed bytes staged
    pub total_size_bytes: u64,

    pub compressed_size_bytes: u64,

    /// compressed / uncompressed (0.0 when nothing was staged)
    pub compression_ratio: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

impl BackupStatistics {
    pub fn new(files_included: usize, total_size_bytes: u64, compressed_size_bytes: u64) -> Self {
        let compression_ratio = if total_size_bytes > 0 {
            compressed_size_bytes as f64 / total_size_bytes as f64
        } else {
            0.0
        };
        Self {
            files_included,
            total_size_bytes,
            compressed_size_bytes,
            compression_ratio,
            duration_seconds: None,
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn savings_percentage(&self) -> f64 {
        if self.total_size_bytes == 0 {
            0.0
        } else {
            ((1.0 - self.compression_ratio) * 100.0).max(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_ratio() {
        let stats = BackupStatistics::new(3, 1000, 250);
        assert!((stats.compression_ratio - 0.25).abs() < f64::EPSILON);
        assert!((stats.savings_percentage() - 75.0).abs() < 1e-9);

        let empty = BackupStatistics::new(0, 0, 20);
        assert_eq!(empty.compression_ratio, 0.0);
        assert_eq!(empty.savings_percentage(), 0.0);
    }

    #[test]
    fn test_manifest_json() {
        let mut manifest = BackupManifest::new("docbro_backup_x", ComponentCounts::default(), 0);
        manifest.statistics = BackupStatistics::new(1, 2048, 512);
        let json = manifest.to_json().unwrap();
        let parsed = BackupManifest::from_json(&json).unwrap();
        assert_eq!(parsed.archive_name, "docbro_backup_x");
        assert_eq!(parsed.checksum.value, "pending");
        assert!(parsed.summary().contains("2.00 KB"));
    }
}
