//! Scripted host and resolver for the setup integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use docbro_core::config::{PathsSettings, ServiceEndpoint};
use docbro_core::{DocbroSettings, MemoryStore};
use docbro_setup::{
    DecisionRecord, DecisionResolver, InstallationProfile, ServiceRecord, SetupContext,
    SetupEnvironment, SystemReport,
};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

struct HostState {
    report: SystemReport,
    available: HashSet<String>,
    /// One entry consumed per validation call; empty means healthy
    validation_failures: VecDeque<Vec<String>>,
    service_gate: Option<Arc<Notify>>,
    calls: Vec<String>,
}

/// In-memory host whose answers the test scripts
#[derive(Clone)]
pub struct FakeSetupEnvironment {
    state: Arc<Mutex<HostState>>,
}

impl FakeSetupEnvironment {
    /// Meets every default requirement; no services running
    pub fn healthy() -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState {
                report: SystemReport {
                    python_version: Some("3.13.1".to_string()),
                    uv_version: Some("0.5.4".to_string()),
                    docker_available: true,
                    free_disk_mb: Some(50_000),
                },
                available: HashSet::new(),
                validation_failures: VecDeque::new(),
                service_gate: None,
                calls: Vec::new(),
            })),
        }
    }

    pub fn with_python(self, version: Option<&str>) -> Self {
        self.set_python(version);
        self
    }

    pub fn set_python(&self, version: Option<&str>) {
        self.state.lock().unwrap().report.python_version = version.map(str::to_string);
    }

    pub fn with_service(self, name: &str) -> Self {
        self.state.lock().unwrap().available.insert(name.to_string());
        self
    }

    pub fn fail_validation_once(self, problem: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .validation_failures
            .push_back(vec![problem.to_string()]);
        self
    }

    /// Service detection waits until the returned notify fires
    pub fn gate_services(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().unwrap().service_gate = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: &str) {
        self.state.lock().unwrap().calls.push(call.to_string());
    }
}

#[async_trait]
impl SetupEnvironment for FakeSetupEnvironment {
    async fn check_system(&self) -> anyhow::Result<SystemReport> {
        self.record("check_system");
        Ok(self.state.lock().unwrap().report.clone())
    }

    async fn detect_services(
        &self,
        endpoints: &[ServiceEndpoint],
    ) -> anyhow::Result<Vec<ServiceRecord>> {
        self.record("detect_services");
        let gate = self.state.lock().unwrap().service_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let available = self.state.lock().unwrap().available.clone();
        Ok(endpoints
            .iter()
            .map(|e| ServiceRecord {
                name: e.name.clone(),
                url: e.url.clone(),
                available: available.contains(&e.name),
            })
            .collect())
    }

    async fn validate_installation(
        &self,
        _profile: &InstallationProfile,
        _paths: &PathsSettings,
    ) -> Vec<String> {
        self.record("validate_installation");
        self.state
            .lock()
            .unwrap()
            .validation_failures
            .pop_front()
            .unwrap_or_default()
    }
}

/// Answers decisions from a script; an exhausted script answers `None`
#[derive(Clone, Default)]
pub struct ScriptedResolver {
    answers: Arc<Mutex<VecDeque<Option<String>>>>,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedResolver {
    pub fn answering(answers: &[Option<&str>]) -> Self {
        Self {
            answers: Arc::new(Mutex::new(
                answers.iter().map(|a| a.map(str::to_string)).collect(),
            )),
            asked: Arc::default(),
        }
    }

    /// Decision ids in the order they were asked
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionResolver for ScriptedResolver {
    async fn resolve(&self, decision: &DecisionRecord) -> Option<String> {
        self.asked.lock().unwrap().push(decision.decision_id.clone());
        self.answers.lock().unwrap().pop_front().flatten()
    }
}

/// Settings rooted in a temp home with two optional services
pub fn test_settings(home: &Path) -> DocbroSettings {
    let mut settings = DocbroSettings {
        paths: PathsSettings::under_home(home),
        ..DocbroSettings::default()
    };
    settings.setup.services = vec![
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
    ];
    settings
}

pub fn context(
    settings: DocbroSettings,
    store: Arc<MemoryStore>,
    env: &FakeSetupEnvironment,
) -> SetupContext {
    SetupContext::new(settings, store, Arc::new(env.clone()))
}
