//! Host facts the install phases depend on
//!
//! [`SetupEnvironment`] is the seam between the phase orchestrator and the
//! machine; [`HostEnvironment`] answers it with tool checks, a free-space
//! query and HTTP probes.

use crate::profile::{InstallationProfile, ServiceRecord};
use async_trait::async_trait;
use docbro_backends::{Filesystem, LocalFilesystem, ServiceProbe, ToolCheck, ToolRequirement};
use docbro_core::config::{PathsSettings, ServiceEndpoint};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What the system check found
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemReport {
    pub python_version: Option<String>,
    pub uv_version: Option<String>,
    pub docker_available: bool,
    pub free_disk_mb: Option<u64>,
}

#[async_trait]
pub trait SetupEnvironment: Send + Sync {
    /// Probe interpreter, tool and disk prerequisites
    async fn check_system(&self) -> anyhow::Result<SystemReport>;

    /// Probe the configured auxiliary services
    async fn detect_services(&self, endpoints: &[ServiceEndpoint])
        -> anyhow::Result<Vec<ServiceRecord>>;

    /// Problems with a finished installation; empty means healthy
    async fn validate_installation(
        &self,
        profile: &InstallationProfile,
        paths: &PathsSettings,
    ) -> Vec<String>;
}

/// The real machine
pub struct HostEnvironment {
    tools: ToolCheck,
    probe: ServiceProbe,
    fs: Arc<dyn Filesystem>,
    /// Directory whose filesystem must have room for DocBro data
    disk_root: PathBuf,
}

impl HostEnvironment {
    pub fn new(disk_root: impl Into<PathBuf>, probe_timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            tools: ToolCheck::new(),
            probe: ServiceProbe::new(probe_timeout)?,
            fs: Arc::new(LocalFilesystem::new()),
            disk_root: disk_root.into(),
        })
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Free space on the filesystem holding `path`, walking up to an existing ancestor
    fn free_disk_mb(path: &Path) -> Option<u64> {
        let existing = path.ancestors().find(|p| p.exists())?;
        match fs4::available_space(existing) {
            Ok(bytes) => Some(bytes / (1024 * 1024)),
            Err(e) => {
                warn!("Could not read free space for {}: {}", existing.display(), e);
                None
            }
        }
    }
}

#[async_trait]
impl SetupEnvironment for HostEnvironment {
    async fn check_system(&self) -> anyhow::Result<SystemReport> {
        let statuses = self
            .tools
            .check_all(&[
                ToolRequirement::new("python3"),
                ToolRequirement::new("uv"),
                ToolRequirement::new("docker"),
            ])
            .await;

        let version_of = |command: &str| {
            statuses
                .iter()
                .find(|s| s.command == command && s.is_available())
                .and_then(|s| s.version.clone())
        };
        let report = SystemReport {
            python_version: version_of("python3"),
            uv_version: version_of("uv"),
            docker_available: statuses
                .iter()
                .any(|s| s.command == "docker" && s.is_available()),
            free_disk_mb: Self::free_disk_mb(&self.disk_root),
        };
        debug!(?report, "system check finished");
        Ok(report)
    }

    async fn detect_services(
        &self,
        endpoints: &[ServiceEndpoint],
    ) -> anyhow::Result<Vec<ServiceRecord>> {
        let statuses = self.probe.probe_all(endpoints).await;
        Ok(statuses
            .into_iter()
            .map(|s| {
                if let Some(error) = &s.error {
                    debug!(service = %s.name, "service not available: {}", error);
                }
                ServiceRecord {
                    name: s.name,
                    url: s.url,
                    available: s.available,
                }
            })
            .collect())
    }

    async fn validate_installation(
        &self,
        profile: &InstallationProfile,
        paths: &PathsSettings,
    ) -> Vec<String> {
        let mut problems = Vec::new();
        for dir in [&profile.data_dir, &profile.config_dir] {
            if !self.fs.is_dir(dir) {
                problems.push(format!("directory {} is missing", dir.display()));
            }
        }
        for file in [paths.settings_file(), paths.installation_file()] {
            if !self.fs.exists(&file) {
                problems.push(format!("config file {} is missing", file.display()));
            }
        }

        if let Ok(text) = std::fs::read_to_string(paths.installation_file()) {
            match serde_json::from_str::<InstallationProfile>(&text) {
                Ok(written) if written.installation_id != profile.installation_id => problems
                    .push(format!(
                        "installation.json belongs to installation {}",
                        written.installation_id
                    )),
                Ok(_) => {}
                Err(e) => problems.push(format!("installation.json is not valid: {}", e)),
            }
        }
        problems
    }
}
