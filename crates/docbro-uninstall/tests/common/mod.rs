//! Recording fakes for the uninstall integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use docbro_backends::{ContainerBackend, ContainerError, ContainerInfo, PackageManager, VolumeInfo};
use docbro_core::config::PathsSettings;
use docbro_core::retry::RetryPolicy;
use docbro_core::DocbroSettings;
use docbro_uninstall::{ConfirmationRequest, Confirmer};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct DockerState {
    containers: Vec<ContainerInfo>,
    volumes: Vec<VolumeInfo>,
    mounted: HashSet<String>,
    /// Call key to remaining failures (`u32::MAX` fails forever)
    failures: HashMap<String, u32>,
    calls: Vec<String>,
}

/// In-memory container runtime that records every mutating call
#[derive(Clone, Default)]
pub struct FakeContainerBackend {
    state: Arc<Mutex<DockerState>>,
}

impl FakeContainerBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, name: &str) -> Self {
        self.state.lock().unwrap().containers.push(ContainerInfo {
            id: format!("{}-id", name),
            name: name.to_string(),
            labels: BTreeMap::new(),
            status: "running".to_string(),
        });
        self
    }

    pub fn with_volume(self, name: &str, labels: &[(&str, &str)], mountpoint: Option<&str>) -> Self {
        self.state.lock().unwrap().volumes.push(VolumeInfo {
            name: name.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            mountpoint: mountpoint.map(str::to_string),
        });
        self
    }

    pub fn mount(&self, volume: &str) {
        self.state.lock().unwrap().mounted.insert(volume.to_string());
    }

    /// Fail the call `"<verb> <target>"` the given number of times
    pub fn fail(&self, call: &str, times: u32) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(call.to_string(), times);
    }

    pub fn fail_always(&self, call: &str) {
        self.fail(call, u32::MAX);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn container_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.containers.iter().map(|c| c.name.clone()).collect()
    }

    pub fn volume_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.volumes.iter().map(|v| v.name.clone()).collect()
    }

    /// Record the call and consume a scripted failure if one is armed
    fn record(&self, call: String) -> Result<(), ContainerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.clone());
        if let Some(remaining) = state.failures.get_mut(&call) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(ContainerError::CommandFailed {
                    command: call,
                    stderr: "daemon returned an error".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerBackend for FakeContainerBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn list_containers(&self) -> Vec<ContainerInfo> {
        self.state.lock().unwrap().containers.clone()
    }

    async fn list_volumes(&self) -> Vec<VolumeInfo> {
        self.state.lock().unwrap().volumes.clone()
    }

    async fn stop(&self, id: &str, _timeout: Duration) -> Result<(), ContainerError> {
        self.record(format!("stop {}", id))?;
        let mut state = self.state.lock().unwrap();
        match state.containers.iter_mut().find(|c| c.name == id) {
            Some(container) => {
                container.status = "exited".to_string();
                Ok(())
            }
            None => Err(ContainerError::NotFound {
                resource: id.to_string(),
            }),
        }
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<(), ContainerError> {
        self.record(format!("rm {}", id))?;
        let mut state = self.state.lock().unwrap();
        let before = state.containers.len();
        state.containers.retain(|c| c.name != id);
        if state.containers.len() == before {
            return Err(ContainerError::NotFound {
                resource: id.to_string(),
            });
        }
        Ok(())
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), ContainerError> {
        self.record(format!("volume rm {}", name))?;
        let mut state = self.state.lock().unwrap();
        if state.mounted.contains(name) && !force {
            return Err(ContainerError::InUse {
                resource: name.to_string(),
                detail: "volume is in use".to_string(),
            });
        }
        let before = state.volumes.len();
        state.volumes.retain(|v| v.name != name);
        if state.volumes.len() == before {
            return Err(ContainerError::NotFound {
                resource: name.to_string(),
            });
        }
        Ok(())
    }

    async fn is_mounted(&self, volume: &str) -> Result<bool, ContainerError> {
        Ok(self.state.lock().unwrap().mounted.contains(volume))
    }
}

/// Package manager fake with a scripted uninstall outcome
#[derive(Clone)]
pub struct FakePackageManager {
    installed: Arc<Mutex<HashSet<String>>>,
    uninstall_succeeds: bool,
    uninstall_calls: Arc<Mutex<Vec<String>>>,
}

impl FakePackageManager {
    pub fn installed(package: &str) -> Self {
        let mut installed = HashSet::new();
        installed.insert(package.to_string());
        Self {
            installed: Arc::new(Mutex::new(installed)),
            uninstall_succeeds: true,
            uninstall_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn absent() -> Self {
        Self {
            installed: Arc::new(Mutex::new(HashSet::new())),
            uninstall_succeeds: true,
            uninstall_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_uninstall(mut self) -> Self {
        self.uninstall_succeeds = false;
        self
    }

    pub fn uninstall_calls(&self) -> Vec<String> {
        self.uninstall_calls.lock().unwrap().clone()
    }

    pub fn is_present(&self, package: &str) -> bool {
        self.installed.lock().unwrap().contains(package)
    }
}

#[async_trait]
impl PackageManager for FakePackageManager {
    fn name(&self) -> &'static str {
        "fake-uv"
    }

    async fn is_installed(&self, package: &str) -> bool {
        self.is_present(package)
    }

    async fn uninstall(&self, package: &str) -> bool {
        self.uninstall_calls.lock().unwrap().push(package.to_string());
        if self.uninstall_succeeds {
            self.installed.lock().unwrap().remove(package);
        }
        self.uninstall_succeeds
    }
}

/// Confirmer that answers a fixed value and keeps every request
#[derive(Clone)]
pub struct ScriptedConfirmer {
    answer: bool,
    requests: Arc<Mutex<Vec<ConfirmationRequest>>>,
}

impl ScriptedConfirmer {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<ConfirmationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        self.requests.lock().unwrap().push(request.clone());
        self.answer
    }
}

/// Settings rooted in a temp home with immediate retries and no backup
pub fn test_settings(home: &Path) -> DocbroSettings {
    let mut settings = DocbroSettings::default();
    settings.paths = PathsSettings::under_home(home);
    settings.uninstall.create_backup = false;
    settings.retry = RetryPolicy::immediate(3);
    settings
}

/// Create the data directory with a little content
pub fn seed_data_dir(settings: &DocbroSettings) {
    let data = &settings.paths.data_dir;
    fs::create_dir_all(data.join("projects")).unwrap();
    fs::write(data.join("projects/index.db"), vec![b'd'; 2048]).unwrap();
}
