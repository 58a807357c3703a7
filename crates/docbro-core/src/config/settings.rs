//! Settings model for install and uninstall runs

use crate::retry::RetryPolicy;
use crate::utils::get_home_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "docbro";

/// Root settings document (`settings.yaml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DocbroSettings {
    pub app: AppSettings,
    pub paths: PathsSettings,
    pub uninstall: UninstallSettings,
    pub setup: SetupSettings,
    pub retry: RetryPolicy,
}

/// Identity of the application's resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AppSettings {
    pub name: String,

    /// Label key marking a container or volume as owned by DocBro
    pub ownership_label: String,

    /// Name prefixes that mark a container or volume as owned
    pub name_prefixes: Vec<String>,

    /// Label whose `true`/`false` value decides externality outright
    pub external_label: String,

    /// Mount points outside this prefix are treated as external
    pub managed_volume_prefix: String,

    pub package_name: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: APP_NAME.to_string(),
            ownership_label: "com.docbro.managed".to_string(),
            name_prefixes: vec![format!("{}-", APP_NAME), format!("{}_", APP_NAME)],
            external_label: "com.docbro.external".to_string(),
            managed_volume_prefix: "/var/lib/docker/volumes".to_string(),
            package_name: APP_NAME.to_string(),
        }
    }
}

impl AppSettings {
    /// Whether a resource name carries one of the owned prefixes
    pub fn has_owned_prefix(&self, name: &str) -> bool {
        let name = name.trim_start_matches('/');
        self.name_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// Filesystem locations owned by DocBro
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PathsSettings {
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,

    /// Persisted installation state, profiles, decisions and snapshots
    pub state_dir: PathBuf,

    /// Where uninstall backups and snapshot file copies are written
    pub backup_dir: PathBuf,

    /// Additional directories to remove on uninstall
    pub extra_paths: Vec<PathBuf>,

    /// Individual config files outside the directories above
    pub config_files: Vec<PathBuf>,
}

impl Default for PathsSettings {
    fn default() -> Self {
        Self::under_home(&get_home_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl PathsSettings {
    /// XDG-style layout below a home directory
    pub fn under_home(home: &Path) -> Self {
        let config_dir = home.join(".config").join(APP_NAME);
        Self {
            data_dir: home.join(".local").join("share").join(APP_NAME),
            cache_dir: home.join(".cache").join(APP_NAME),
            state_dir: home.join(".local").join("state").join(APP_NAME),
            backup_dir: home.join(format!("{}-backups", APP_NAME)),
            extra_paths: Vec::new(),
            config_files: vec![
                config_dir.join("settings.yaml"),
                config_dir.join("installation.json"),
                home.join(format!(".{}.env", APP_NAME)),
            ],
            config_dir,
        }
    }

    /// Directories removed on uninstall, in scan order
    pub fn removable_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![
            self.data_dir.clone(),
            self.config_dir.clone(),
            self.cache_dir.clone(),
            self.state_dir.clone(),
        ];
        for extra in &self.extra_paths {
            if !dirs.contains(extra) {
                dirs.push(extra.clone());
            }
        }
        dirs
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.yaml")
    }

    pub fn installation_file(&self) -> PathBuf {
        self.config_dir.join("installation.json")
    }
}

/// Uninstall behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct UninstallSettings {
    /// Skip confirmation and keep going after failures
    pub force: bool,
    pub dry_run: bool,
    /// Leave external volumes in place
    pub preserve_external: bool,
    pub create_backup: bool,
    pub stop_timeout_secs: u64,
    pub package_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for UninstallSettings {
    fn default() -> Self {
        Self {
            force: false,
            dry_run: false,
            preserve_external: true,
            create_backup: true,
            stop_timeout_secs: 10,
            package_timeout_secs: 60,
            max_retries: crate::types::DEFAULT_MAX_RETRIES,
        }
    }
}

/// Auxiliary service probed during setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceEndpoint {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub required: bool,
}

/// Install behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SetupSettings {
    pub min_python_version: String,
    pub min_free_disk_mb: u64,
    pub require_uv: bool,
    /// Vector store chosen when no decision is recorded
    pub vector_store: String,
    pub services: Vec<ServiceEndpoint>,
    pub probe_timeout_secs: u64,
    /// Snapshot before configuration and finalization
    pub snapshot_risky_phases: bool,
    pub rollback_on_failure: bool,
}

impl Default for SetupSettings {
    fn default() -> Self {
        Self {
            min_python_version: "3.13.0".to_string(),
            min_free_disk_mb: 2048,
            require_uv: true,
            vector_store: "sqlite_vec".to_string(),
            services: vec![
                ServiceEndpoint {
                    name: "qdrant".to_string(),
                    url: "http://localhost:6333/healthz".to_string(),
                    required: false,
                },
                ServiceEndpoint {
                    name: "ollama".to_string(),
                    url: "http://localhost:11434/api/tags".to_string(),
                    required: false,
                },
            ],
            probe_timeout_secs: 5,
            snapshot_risky_phases: true,
            rollback_on_failure: true,
        }
    }
}
