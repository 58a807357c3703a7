//! Settings loader with precedence
//!
//! Sources, low to high:
//! 1. Built-in defaults
//! 2. `<config_dir>/settings.yaml`
//! 3. Environment variables (`DOCBRO_*` prefix)
//! 4. CLI flags (handled by caller)

use super::settings::{DocbroSettings, PathsSettings};
use crate::error::{Error, Result};
use crate::utils::get_home_dir;
use camino::{Utf8Path, Utf8PathBuf};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

pub const SETTINGS_FILE: &str = "settings.yaml";

/// Loads [`DocbroSettings`] from defaults, file and environment
pub struct SettingsLoader {
    config_dir: Utf8PathBuf,
}

impl SettingsLoader {
    /// Loader for the standard config directory (`DOCBRO_CONFIG_DIR` wins)
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_dir: Self::default_config_dir()?,
        })
    }

    /// Loader with a custom config directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self { config_dir }
    }

    fn default_config_dir() -> Result<Utf8PathBuf> {
        let dir = match env::var("DOCBRO_CONFIG_DIR") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => {
                let home = get_home_dir().map_err(|e| Error::invalid_config(e.to_string()))?;
                PathsSettings::under_home(&home).config_dir
            }
        };
        Utf8PathBuf::from_path_buf(dir).map_err(|p| {
            Error::invalid_config(format!("config directory is not UTF-8: {}", p.display()))
        })
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Load settings with hierarchical precedence
    pub fn load(&self) -> Result<DocbroSettings> {
        let mut settings = DocbroSettings::default();

        let settings_path = self.config_dir.join(SETTINGS_FILE);
        if settings_path.exists() {
            let content = fs::read_to_string(&settings_path)?;
            settings = serde_yaml_ng::from_str(&content).map_err(|e| {
                Error::invalid_config(format!("Failed to parse {}: {}", settings_path, e))
            })?;
            tracing::debug!(path = %settings_path, "loaded settings file");
        }
        settings.paths.config_dir = self.config_dir.clone().into_std_path_buf();

        self.apply_env_overrides(settings)
    }

    fn apply_env_overrides(&self, mut settings: DocbroSettings) -> Result<DocbroSettings> {
        if let Some(dir) = env_path("DOCBRO_DATA_DIR") {
            settings.paths.data_dir = dir;
        }
        if let Some(dir) = env_path("DOCBRO_CONFIG_DIR") {
            settings.paths.config_dir = dir;
        }
        if let Some(dir) = env_path("DOCBRO_CACHE_DIR") {
            settings.paths.cache_dir = dir;
        }
        if let Some(dir) = env_path("DOCBRO_STATE_DIR") {
            settings.paths.state_dir = dir;
        }
        if let Some(dir) = env_path("DOCBRO_BACKUP_DIR") {
            settings.paths.backup_dir = dir;
        }
        if let Ok(val) = env::var("DOCBRO_EXTRA_PATHS") {
            settings.paths.extra_paths = val
                .split(':')
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .collect();
        }

        if let Ok(val) = env::var("DOCBRO_FORCE") {
            settings.uninstall.force = parse_bool("DOCBRO_FORCE", &val)?;
        }
        if let Ok(val) = env::var("DOCBRO_DRY_RUN") {
            settings.uninstall.dry_run = parse_bool("DOCBRO_DRY_RUN", &val)?;
        }
        if let Ok(val) = env::var("DOCBRO_MAX_RETRIES") {
            settings.uninstall.max_retries = parse_number("DOCBRO_MAX_RETRIES", &val)?;
        }
        if let Ok(val) = env::var("DOCBRO_PACKAGE_TIMEOUT_SECS") {
            settings.uninstall.package_timeout_secs =
                parse_number("DOCBRO_PACKAGE_TIMEOUT_SECS", &val)?;
        }

        Ok(settings)
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::invalid_config(format!("{} must be a valid number", name)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::invalid_config(format!(
            "{} must be a boolean (true/false)",
            name
        ))),
    }
}
