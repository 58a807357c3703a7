//! Installation profile: what setup learned about the host and chose

use chrono::{DateTime, Utc};
use docbro_core::store::{self, load_json, save_json, StateStore, PROFILE_NAMESPACE};
use docbro_core::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A probed auxiliary service as recorded in the profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub url: String,
    pub available: bool,
}

/// Persisted at `profile/<installation_id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationProfile {
    pub installation_id: String,
    pub docbro_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uv_version: Option<String>,
    #[serde(default)]
    pub docker_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_disk_mb: Option<u64>,
    pub vector_store: String,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl InstallationProfile {
    /// Skeleton written by the initializing phase
    pub fn new(
        installation_id: impl Into<String>,
        vector_store: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        config_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            installation_id: installation_id.into(),
            docbro_version: env!("CARGO_PKG_VERSION").to_string(),
            python_version: None,
            uv_version: None,
            docker_available: false,
            free_disk_mb: None,
            vector_store: vector_store.into(),
            services: Vec::new(),
            data_dir: data_dir.into(),
            config_dir: config_dir.into(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn service_available(&self, name: &str) -> bool {
        self.services.iter().any(|s| s.name == name && s.available)
    }

    fn key(installation_id: &str) -> String {
        store::key(PROFILE_NAMESPACE, installation_id)
    }

    pub fn load(store: &dyn StateStore, installation_id: &str) -> Result<Option<Self>> {
        load_json(store, &Self::key(installation_id))
    }

    pub fn save(&self, store: &dyn StateStore) -> Result<()> {
        save_json(store, &Self::key(&self.installation_id), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbro_core::MemoryStore;

    #[test]
    fn test_profile_persistence() {
        let store = MemoryStore::new();
        let mut profile = InstallationProfile::new("inst-1", "sqlite_vec", "/d", "/c");
        profile.services.push(ServiceRecord {
            name: "qdrant".to_string(),
            url: "http://localhost:6333/healthz".to_string(),
            available: true,
        });
        profile.save(&store).unwrap();

        let loaded = InstallationProfile::load(&store, "inst-1").unwrap().unwrap();
        assert_eq!(loaded, profile);
        assert!(loaded.service_available("qdrant"));
        assert!(!loaded.service_available("ollama"));
        assert!(InstallationProfile::load(&store, "other").unwrap().is_none());
    }
}
