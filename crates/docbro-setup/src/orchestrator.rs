//! Phase orchestrator
//!
//! Runs the install pipeline `initializing -> system_check -> service_setup
//! -> configuration -> finalization`, persisting [`InstallationState`] after
//! every change so an interrupted or failed run can be resumed. Configuration
//! and finalization are snapshotted first and rolled back on failure.

use crate::decisions::{
    decide, DecisionLog, DecisionOption, DecisionRecord, DecisionResolver, DefaultResolver,
};
use crate::environment::{SetupEnvironment, SystemReport};
use crate::error::{Result, SetupError};
use crate::profile::InstallationProfile;
use anyhow::{bail, Context as _};
use chrono::Utc;
use docbro_backends::tools::version_satisfies;
use docbro_backup::{SnapshotManager, SnapshotRequest};
use docbro_core::config::{PathsSettings, SetupSettings};
use docbro_core::recovery::{ErrorClassifier, ErrorContext, ErrorHistory};
use docbro_core::store::{self, load_json, save_json, StateStore, STATE_NAMESPACE};
use docbro_core::types::{InstallPhase, InstallationState};
use docbro_core::DocbroSettings;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const SQLITE_VEC: &str = "sqlite_vec";
pub const QDRANT: &str = "qdrant";

pub const VECTOR_STORE_DECISION: &str = "vector_store";
pub const EXISTING_CONFIG_DECISION: &str = "existing_config";

/// Collaborators shared by every phase
#[derive(Clone)]
pub struct SetupContext {
    pub settings: DocbroSettings,
    pub store: Arc<dyn StateStore>,
    pub env: Arc<dyn SetupEnvironment>,
    pub resolver: Arc<dyn DecisionResolver>,
}

impl SetupContext {
    pub fn new(
        settings: DocbroSettings,
        store: Arc<dyn StateStore>,
        env: Arc<dyn SetupEnvironment>,
    ) -> Self {
        Self {
            settings,
            store,
            env,
            resolver: Arc::new(DefaultResolver),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DecisionResolver>) -> Self {
        self.resolver = resolver;
        self
    }
}

/// Notified after every persisted state change
pub trait StateObserver: Send + Sync {
    fn on_state_change(&self, state: &InstallationState);
}

impl<F> StateObserver for F
where
    F: Fn(&InstallationState) + Send + Sync,
{
    fn on_state_change(&self, state: &InstallationState) {
        self(state)
    }
}

/// Fresh installation id, e.g. `docbro-3f2a9c1e0b7d`
pub fn new_installation_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("docbro-{}", &id[..12])
}

/// Read the persisted state of an installation
pub fn load_state(
    store: &dyn StateStore,
    installation_id: &str,
) -> Result<Option<InstallationState>> {
    Ok(load_json(store, &store::key(STATE_NAMESPACE, installation_id))?)
}

fn phase_steps(phase: InstallPhase) -> u32 {
    match phase {
        InstallPhase::Initializing => 1,
        InstallPhase::SystemCheck => 3,
        InstallPhase::ServiceSetup => 2,
        InstallPhase::Configuration => 3,
        InstallPhase::Finalization => 2,
        InstallPhase::Complete | InstallPhase::Error => 0,
    }
}

fn is_risky(phase: InstallPhase) -> bool {
    matches!(phase, InstallPhase::Configuration | InstallPhase::Finalization)
}

/// Requirements the system report does not meet, one message each
pub fn unmet_requirements(report: &SystemReport, setup: &SetupSettings) -> Vec<String> {
    let mut unmet = Vec::new();
    match &report.python_version {
        Some(found) if version_satisfies(found, &setup.min_python_version) => {}
        Some(found) => unmet.push(format!(
            "Python {} is older than the required {}",
            found, setup.min_python_version
        )),
        None => unmet.push(format!(
            "Python {} or newer is not installed",
            setup.min_python_version
        )),
    }
    if setup.require_uv && report.uv_version.is_none() {
        unmet.push("uv is not installed".to_string());
    }
    if let Some(free) = report.free_disk_mb {
        if free < setup.min_free_disk_mb {
            unmet.push(format!(
                "only {} MB of disk space free, {} MB required",
                free, setup.min_free_disk_mb
            ));
        }
    }
    unmet
}

/// Resolves once `cancel` turns true; never resolves if the sender is gone
async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Drives one installation through its phases
pub struct PhaseOrchestrator {
    ctx: SetupContext,
    state: InstallationState,
    profile: InstallationProfile,
    decisions: DecisionLog,
    snapshots: SnapshotManager,
    classifier: ErrorClassifier,
    history: ErrorHistory,
    observers: Vec<Arc<dyn StateObserver>>,
}

impl PhaseOrchestrator {
    fn with_state(ctx: SetupContext, state: InstallationState) -> Self {
        let paths = &ctx.settings.paths;
        let profile = InstallationProfile::new(
            state.installation_id.clone(),
            ctx.settings.setup.vector_store.clone(),
            &paths.data_dir,
            &paths.config_dir,
        );
        let snapshots = SnapshotManager::new(ctx.store.clone(), paths.state_dir.join("snapshots"));
        Self {
            decisions: DecisionLog::new(state.installation_id.clone()),
            profile,
            snapshots,
            classifier: ErrorClassifier::new(),
            history: ErrorHistory::new(),
            observers: Vec::new(),
            state,
            ctx,
        }
    }

    /// Begin a fresh installation
    ///
    /// Any persisted state under the same id is a conflict unless
    /// `force_reinstall` is set, in which case its records are discarded.
    pub fn start(
        ctx: SetupContext,
        installation_id: impl Into<String>,
        force_reinstall: bool,
    ) -> Result<Self> {
        let installation_id = installation_id.into();
        if let Some(existing) = load_state(ctx.store.as_ref(), &installation_id)? {
            if !force_reinstall {
                return Err(SetupError::Conflict {
                    installation_id,
                    phase: existing.current_phase,
                });
            }
            warn!(
                installation = %installation_id,
                phase = %existing.current_phase,
                "discarding existing installation records"
            );
            let manager = SnapshotManager::new(
                ctx.store.clone(),
                ctx.settings.paths.state_dir.join("snapshots"),
            );
            manager.cleanup_installation(&installation_id)?;
            for namespace in [store::PROFILE_NAMESPACE, store::DECISIONS_NAMESPACE] {
                ctx.store.delete(&store::key(namespace, &installation_id))?;
            }
        }

        let orchestrator = Self::with_state(ctx, InstallationState::new(installation_id));
        orchestrator.persist()?;
        info!(installation = %orchestrator.state.installation_id, "installation created");
        Ok(orchestrator)
    }

    /// Pick up a persisted installation; an errored one retries its failed phase
    pub fn resume(ctx: SetupContext, installation_id: &str) -> Result<Self> {
        let mut state = load_state(ctx.store.as_ref(), installation_id)?.ok_or_else(|| {
            SetupError::NotFound {
                installation_id: installation_id.to_string(),
            }
        })?;
        state.validate()?;
        if !state.is_resumable() {
            let reason = if state.current_phase == InstallPhase::Complete {
                "installation is already complete"
            } else {
                "installation is marked as not resumable"
            };
            return Err(SetupError::NotResumable {
                installation_id: installation_id.to_string(),
                reason: reason.to_string(),
            });
        }
        if state.current_phase == InstallPhase::Error {
            let phase = state.clear_error_for_retry()?;
            info!(installation = %installation_id, %phase, "retrying failed phase");
        }

        let mut orchestrator = Self::with_state(ctx, state);
        let store = orchestrator.ctx.store.clone();
        if let Some(profile) = InstallationProfile::load(store.as_ref(), installation_id)? {
            orchestrator.profile = profile;
        }
        orchestrator.decisions = DecisionLog::load(store.as_ref(), installation_id)?;
        orchestrator.persist()?;
        info!(
            installation = %installation_id,
            completed = orchestrator.state.completed_phases.len(),
            "installation resumed"
        );
        Ok(orchestrator)
    }

    pub fn with_observer(mut self, observer: Arc<dyn StateObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn state(&self) -> &InstallationState {
        &self.state
    }

    pub fn profile(&self) -> &InstallationProfile {
        &self.profile
    }

    pub fn decisions(&self) -> &DecisionLog {
        &self.decisions
    }

    /// Classified failures seen by this orchestrator
    pub fn errors(&self) -> &ErrorHistory {
        &self.history
    }

    fn persist(&self) -> docbro_core::Result<()> {
        save_json(
            self.ctx.store.as_ref(),
            &store::key(STATE_NAMESPACE, &self.state.installation_id),
            &self.state,
        )?;
        for observer in &self.observers {
            observer.on_state_change(&self.state);
        }
        Ok(())
    }

    fn step(&mut self, message: &str) -> docbro_core::Result<()> {
        debug!(phase = %self.state.current_phase, "{}", message);
        self.state.advance_step(message);
        self.persist()
    }

    /// Run the remaining phases; a `true` on `cancel` stops the run
    pub async fn run(&mut self, mut cancel: watch::Receiver<bool>) -> Result<InstallationState> {
        if self.state.current_phase == InstallPhase::Error {
            self.state.clear_error_for_retry()?;
        }

        while let Some(phase) = self.state.resume_phase() {
            let cancelled = *cancel.borrow();
            if cancelled {
                return Err(self.cancel(phase));
            }

            let outcome = tokio::select! {
                result = self.run_phase(phase) => Some(result),
                () = wait_for_cancel(&mut cancel) => None,
            };
            match outcome {
                Some(Ok(())) => {}
                Some(Err(e)) => return Err(self.fail(phase, e)),
                None => return Err(self.cancel(phase)),
            }
        }

        self.state.mark_complete()?;
        self.state.last_snapshot_id = None;
        self.persist()?;
        match self.snapshots.cleanup_installation(&self.state.installation_id) {
            Ok(removed) => debug!(removed, "removed installation snapshots"),
            Err(e) => warn!("Could not remove installation snapshots: {}", e),
        }
        info!(installation = %self.state.installation_id, "installation complete");
        Ok(self.state.clone())
    }

    /// Run on a tokio task, observable through the returned handle
    pub fn spawn(mut self) -> SetupHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(self.state.clone());
        self.observers.push(Arc::new(move |state: &InstallationState| {
            state_tx.send_replace(state.clone());
        }));
        let task = tokio::spawn(async move { self.run(cancel_rx).await });
        SetupHandle {
            cancel: cancel_tx,
            state: state_rx,
            task,
        }
    }

    async fn run_phase(&mut self, phase: InstallPhase) -> anyhow::Result<()> {
        self.state.enter_phase(phase, phase_steps(phase))?;
        if self.ctx.settings.setup.snapshot_risky_phases && is_risky(phase) {
            self.snapshot_phase(phase)?;
        }
        self.persist()?;
        info!(%phase, "entering phase");

        match phase {
            InstallPhase::Initializing => self.initialize()?,
            InstallPhase::SystemCheck => self.check_system().await?,
            InstallPhase::ServiceSetup => self.setup_services().await?,
            InstallPhase::Configuration => self.configure().await?,
            InstallPhase::Finalization => self.finalize().await?,
            other => bail!(docbro_core::Error::invariant(format!(
                "{} is not a pipeline phase",
                other
            ))),
        }

        self.state.complete_phase(phase)?;
        self.persist()?;
        info!(%phase, progress = self.state.progress_percentage, "phase complete");
        Ok(())
    }

    fn snapshot_phase(&mut self, phase: InstallPhase) -> anyhow::Result<()> {
        let paths = &self.ctx.settings.paths;
        let mut request = SnapshotRequest::new(&self.state, format!("before {}", phase));
        if phase == InstallPhase::Configuration {
            for dir in [&paths.data_dir, &paths.config_dir, &paths.cache_dir] {
                if !dir.exists() {
                    request = request.creates(dir.clone());
                }
            }
            request = request.modifies(paths.settings_file());
        }
        request = request.modifies(paths.installation_file());
        if let Ok(profile) = serde_json::to_value(&self.profile) {
            request = request.with_profile(profile);
        }

        let snapshot = self
            .snapshots
            .create_snapshot(request)
            .with_context(|| format!("failed to snapshot before {}", phase))?;
        self.state.last_snapshot_id = Some(snapshot.snapshot_id);
        Ok(())
    }

    fn initialize(&mut self) -> anyhow::Result<()> {
        let paths = &self.ctx.settings.paths;
        self.profile = InstallationProfile::new(
            self.state.installation_id.clone(),
            self.ctx.settings.setup.vector_store.clone(),
            &paths.data_dir,
            &paths.config_dir,
        );
        self.profile.save(self.ctx.store.as_ref())?;
        self.step("Created installation profile")?;
        Ok(())
    }

    async fn check_system(&mut self) -> anyhow::Result<()> {
        let report = self
            .ctx
            .env
            .check_system()
            .await
            .context("could not inspect the host")?;
        self.step("Checked prerequisites")?;

        let unmet = unmet_requirements(&report, &self.ctx.settings.setup);
        self.profile.python_version = report.python_version;
        self.profile.uv_version = report.uv_version;
        self.profile.docker_available = report.docker_available;
        self.profile.free_disk_mb = report.free_disk_mb;
        self.profile.save(self.ctx.store.as_ref())?;
        self.step("Recorded host profile")?;

        if !unmet.is_empty() {
            bail!("System requirement not met: {}", unmet.join("; "));
        }
        self.step("System requirements met")?;
        Ok(())
    }

    async fn setup_services(&mut self) -> anyhow::Result<()> {
        let endpoints = &self.ctx.settings.setup.services;
        let records = self.ctx.env.detect_services(endpoints).await?;
        let missing: Vec<&str> = endpoints
            .iter()
            .filter(|e| e.required)
            .filter(|e| !records.iter().any(|r| r.name == e.name && r.available))
            .map(|e| e.name.as_str())
            .collect();
        if !missing.is_empty() {
            bail!("Required service unavailable: {}", missing.join(", "));
        }
        for record in &records {
            info!(service = %record.name, available = record.available, "detected service");
        }
        self.profile.services = records;
        self.step("Detected services")?;

        let configured = self.ctx.settings.setup.vector_store.clone();
        let vector_store = if self.profile.service_available(QDRANT) {
            let default_option = if configured == QDRANT { QDRANT } else { SQLITE_VEC };
            let decision = DecisionRecord::new(
                VECTOR_STORE_DECISION,
                InstallPhase::ServiceSetup,
                "Which vector store should DocBro use?",
                vec![
                    DecisionOption::new(SQLITE_VEC, "SQLite with sqlite-vec (embedded)"),
                    DecisionOption::new(QDRANT, "Qdrant (detected running service)"),
                ],
                default_option,
            );
            decide(
                &mut self.decisions,
                self.ctx.store.as_ref(),
                self.ctx.resolver.as_ref(),
                decision,
            )
            .await?
        } else if configured == QDRANT {
            warn!("Qdrant is not reachable; using the embedded vector store");
            SQLITE_VEC.to_string()
        } else {
            configured
        };
        self.profile.vector_store = vector_store;
        self.profile.save(self.ctx.store.as_ref())?;
        self.step("Selected vector store")?;
        Ok(())
    }

    async fn configure(&mut self) -> anyhow::Result<()> {
        let paths = self.ctx.settings.paths.clone();
        for dir in [&paths.data_dir, &paths.config_dir, &paths.cache_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        self.step("Created DocBro directories")?;

        let settings_file = paths.settings_file();
        let overwrite = if settings_file.exists() {
            let decision = DecisionRecord::new(
                EXISTING_CONFIG_DECISION,
                InstallPhase::Configuration,
                format!("{} already exists", settings_file.display()),
                vec![
                    DecisionOption::new("keep", "Keep the existing settings"),
                    DecisionOption::new("overwrite", "Replace them with fresh settings"),
                ],
                "keep",
            );
            let choice = decide(
                &mut self.decisions,
                self.ctx.store.as_ref(),
                self.ctx.resolver.as_ref(),
                decision,
            )
            .await?;
            choice == "overwrite"
        } else {
            true
        };
        if overwrite {
            let mut settings = self.ctx.settings.clone();
            settings.setup.vector_store = self.profile.vector_store.clone();
            let yaml = serde_yaml_ng::to_string(&settings).context("failed to render settings")?;
            std::fs::write(&settings_file, yaml)
                .with_context(|| format!("failed to write {}", settings_file.display()))?;
        } else {
            info!("Keeping existing {}", settings_file.display());
        }
        self.step("Wrote settings")?;

        self.write_installation_file(&paths)?;
        self.step("Wrote installation record")?;
        Ok(())
    }

    async fn finalize(&mut self) -> anyhow::Result<()> {
        let problems = self
            .ctx
            .env
            .validate_installation(&self.profile, &self.ctx.settings.paths)
            .await;
        if !problems.is_empty() {
            bail!("Installation validation failed: {}", problems.join("; "));
        }
        self.step("Validated installation")?;

        self.profile.completed_at = Some(Utc::now());
        let paths = self.ctx.settings.paths.clone();
        self.write_installation_file(&paths)?;
        self.step("Recorded completion")?;
        Ok(())
    }

    fn write_installation_file(&self, paths: &PathsSettings) -> anyhow::Result<()> {
        let file = paths.installation_file();
        let json = serde_json::to_string_pretty(&self.profile)?;
        std::fs::write(&file, json).with_context(|| format!("failed to write {}", file.display()))?;
        self.profile.save(self.ctx.store.as_ref())?;
        Ok(())
    }

    fn classify(&self, error: &anyhow::Error, phase: InstallPhase, step: &str) -> ErrorContext {
        let previous = self
            .history
            .iter()
            .filter(|c| c.phase == Some(phase))
            .count() as u32;
        self.classifier.classify(error, Some(phase), Some(step), previous)
    }

    /// Undo the snapshot taken for `phase`, if any; never fails
    fn rollback_phase(&mut self, phase: InstallPhase) {
        let Some(snapshot_id) = self.state.last_snapshot_id.clone() else {
            return;
        };
        let snapshot = match self.snapshots.load(&snapshot_id) {
            Ok(snapshot) if snapshot.phase == phase => snapshot,
            Ok(_) => return,
            Err(e) => {
                warn!("Cannot roll back {}: {}", phase, e);
                return;
            }
        };
        match self.snapshots.rollback(&snapshot, true) {
            Ok(report) if report.is_clean() => {
                info!(snapshot = %snapshot_id, "rolled back {}", phase)
            }
            Ok(report) => warn!(
                snapshot = %snapshot_id,
                failures = report.failures.len(),
                "partial rollback of {}",
                phase
            ),
            Err(e) => warn!(snapshot = %snapshot_id, "Rollback failed: {}", e),
        }
        match InstallationProfile::load(self.ctx.store.as_ref(), &self.state.installation_id) {
            Ok(Some(profile)) => self.profile = profile,
            Ok(None) => {}
            Err(e) => warn!("Could not reload profile after rollback: {}", e),
        }
    }

    fn fail(&mut self, phase: InstallPhase, error: anyhow::Error) -> SetupError {
        let step = self.state.status_message.clone();
        let context = self.classify(&error, phase, &step);
        error!(
            %phase,
            category = %context.category,
            severity = %context.severity,
            "Phase failed: {:#}",
            error
        );
        debug!(error = ?error, "phase failure detail");
        self.history.push(context.clone());

        if self.ctx.settings.setup.rollback_on_failure {
            self.rollback_phase(phase);
        }
        // Rollback rewrote the stored state; record the error over it
        self.state.mark_error(format!("{:#}", error));
        if let Err(e) = self.persist() {
            warn!("Could not persist error state: {}", e);
        }
        SetupError::PhaseFailed {
            phase,
            context: Box::new(context),
        }
    }

    fn cancel(&mut self, phase: InstallPhase) -> SetupError {
        let error = anyhow::Error::new(docbro_core::Error::cancelled(format!(
            "installation cancelled during {}",
            phase
        )));
        let step = self.state.status_message.clone();
        let context = self.classify(&error, phase, &step);
        warn!(%phase, "Installation cancelled");
        self.history.push(context.clone());

        self.rollback_phase(phase);
        self.state.mark_error(format!("Cancelled during {}", phase));
        if let Err(e) = self.persist() {
            warn!("Could not persist cancelled state: {}", e);
        }
        SetupError::Cancelled {
            phase,
            context: Box::new(context),
        }
    }
}

/// Handle to an installation running on a tokio task
pub struct SetupHandle {
    cancel: watch::Sender<bool>,
    state: watch::Receiver<InstallationState>,
    task: JoinHandle<Result<InstallationState>>,
}

impl SetupHandle {
    /// Ask the run to stop before its next phase completes
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Latest state published by the run
    pub fn state(&self) -> InstallationState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<InstallationState> {
        self.state.clone()
    }

    pub async fn wait(self) -> Result<InstallationState> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                Err(docbro_core::Error::invariant(format!("setup task failed: {}", e)).into())
            }
        }
    }
}
