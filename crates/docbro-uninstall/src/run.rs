//! End-to-end uninstall: scan, plan, back up, confirm, remove, report

use crate::executor::{ExecuteOptions, ExecutionObserver, OperationExecutor};
use crate::progress::{ExitCode, Progress, ProgressSummary};
use crate::queue::{OperationQueue, OperationQueueBuilder};
use crate::scanner::InventoryScanner;
use async_trait::async_trait;
use docbro_backends::{ContainerBackend, Filesystem, PackageManager};
use docbro_backup::UninstallBackup;
use docbro_core::recovery::{ErrorClassifier, ErrorContext, ErrorHistory};
use docbro_core::types::{
    ComponentCounts, ComponentKind, ComponentStatus, Inventory, RemovalOperation,
};
use docbro_core::{DocbroSettings, Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// What happened to the pre-removal backup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackupOutcome {
    Disabled,
    Created { path: PathBuf, summary: String },
    Failed { error: String },
}

/// Everything the operator is shown before removal starts
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationRequest {
    pub counts: ComponentCounts,
    pub total_size_bytes: u64,
    pub operations: usize,
    pub preserved_volumes: Vec<String>,
    pub backup: BackupOutcome,
}

/// Asks the operator to approve the removal
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool;
}

/// Result of an uninstall run
#[derive(Debug, Clone, Serialize)]
pub struct UninstallReport {
    pub exit_code: ExitCode,
    pub summary: ProgressSummary,
    pub inventory: Inventory,
    pub operations: Vec<RemovalOperation>,
    pub preserved_volumes: Vec<String>,
    pub backup: BackupOutcome,
    pub errors: Vec<ErrorContext>,
    pub warnings: Vec<String>,
    pub dry_run: bool,
    pub aborted: bool,
}

impl UninstallReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Drives one uninstall from scan to report
pub struct UninstallRun {
    settings: DocbroSettings,
    scanner: InventoryScanner,
    executor: OperationExecutor,
    backup: UninstallBackup,
    confirmer: Arc<dyn Confirmer>,
    classifier: ErrorClassifier,
}

impl UninstallRun {
    pub fn new(
        settings: DocbroSettings,
        containers: Arc<dyn ContainerBackend>,
        packages: Arc<dyn PackageManager>,
        fs: Arc<dyn Filesystem>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        let scanner = InventoryScanner::new(
            settings.app.clone(),
            settings.paths.clone(),
            containers.clone(),
            packages.clone(),
            fs.clone(),
        );
        let backup = UninstallBackup::new(&settings.paths.backup_dir).with_filesystem(fs.clone());
        let executor = OperationExecutor::new(containers, packages, fs);
        Self {
            settings,
            scanner,
            executor,
            backup,
            confirmer,
            classifier: ErrorClassifier::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.executor = self.executor.with_observer(observer);
        self
    }

    fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            force: self.settings.uninstall.force,
            stop_timeout: Duration::from_secs(self.settings.uninstall.stop_timeout_secs),
            retry: self.settings.retry.clone(),
        }
    }

    /// Run the uninstall; a `true` on `cancel` stops before the next operation
    pub async fn run(&self, cancel: watch::Receiver<bool>) -> Result<UninstallReport> {
        let uninstall = &self.settings.uninstall;
        let mut inventory = self.scanner.scan().await;
        let mut run = RunState::new(uninstall.dry_run);

        if inventory.is_empty() {
            info!("No DocBro components found; nothing to uninstall");
            return Ok(run.finish(inventory, Progress::new(0), &OperationQueue::default()));
        }

        let queue = OperationQueueBuilder::new()
            .with_max_retries(uninstall.max_retries)
            .build(&inventory, uninstall.preserve_external)?;
        for name in queue.preserved() {
            if let Some(volume) = inventory.find_mut(ComponentKind::Volume, name) {
                volume.mark_skipped("external volume preserved")?;
            }
        }
        let mut progress = Progress::new(queue.component_count());
        if queue.is_empty() {
            info!(preserved = queue.preserved().len(), "Only preserved components found");
            return Ok(run.finish(inventory, progress, &queue));
        }

        if uninstall.dry_run {
            for op in queue.operations() {
                info!(operation = %op.operation_id, "[dry-run] would {}", op.describe());
            }
            for op in queue.operations() {
                settle_skipped(&mut inventory, &mut progress, op, "dry run")?;
            }
            return Ok(run.finish(inventory, progress, &queue));
        }

        if uninstall.create_backup {
            run.backup = match self.backup.create(&inventory) {
                Ok(result) => {
                    progress.record_backup(&result.archive_path);
                    BackupOutcome::Created {
                        summary: result.manifest.summary(),
                        path: result.archive_path,
                    }
                }
                Err(e) => {
                    let message = format!("Backup failed, continuing without it: {}", e);
                    warn!("{}", message);
                    run.warnings.push(message);
                    BackupOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
        }

        if !uninstall.force {
            let request = ConfirmationRequest {
                counts: inventory.counts(),
                total_size_bytes: inventory.total_size_bytes(),
                operations: queue.len(),
                preserved_volumes: queue.preserved().to_vec(),
                backup: run.backup.clone(),
            };
            if !self.confirmer.confirm(&request).await {
                info!("Uninstall declined");
                run.aborted = true;
                return Ok(run.finish(inventory, progress, &queue));
            }
        }

        let executed = self
            .execute_queue(&queue, &mut inventory, &mut progress, &mut run, &cancel)
            .await?;
        let mut report = run.finish(inventory, progress, &queue);
        report.operations = executed;
        Ok(report)
    }

    /// Execute in dependency-ready order; returns the operations as run
    async fn execute_queue(
        &self,
        queue: &OperationQueue,
        inventory: &mut Inventory,
        progress: &mut Progress,
        run: &mut RunState,
        cancel: &watch::Receiver<bool>,
    ) -> Result<Vec<RemovalOperation>> {
        let options = self.execute_options();
        let mut waiting: Vec<RemovalOperation> = queue.operations().to_vec();
        let mut finished: HashMap<String, bool> = HashMap::new();
        let mut executed = Vec::new();

        while !waiting.is_empty() {
            if *cancel.borrow() {
                warn!(remaining = waiting.len(), "Uninstall cancelled");
                run.aborted = true;
                settle_interrupted(inventory, progress, "cancelled before removal finished")?;
                break;
            }

            // A failed dependency still counts as settled
            let Some(index) = waiting
                .iter()
                .position(|op| op.dependencies.iter().all(|d| finished.contains_key(d)))
            else {
                return Err(Error::invariant("no removal operation is ready to run"));
            };
            let mut op = waiting.remove(index);

            let Some(component) = inventory.find_mut(op.component_kind, &op.component_name)
            else {
                return Err(Error::invariant(format!(
                    "operation {} has no component",
                    op.operation_id
                )));
            };
            if component.is_terminal() {
                finished.insert(op.operation_id.clone(), false);
                executed.push(op);
                continue;
            }
            if component.status() == ComponentStatus::Pending {
                component.mark_removing()?;
            }

            let ok = self.executor.execute(&mut op, &options).await;
            finished.insert(op.operation_id.clone(), ok);

            let halt = !ok && !self.settings.uninstall.force;
            if ok && op.operation_type.is_final_for_component() {
                component.mark_removed()?;
                progress.increment_removed()?;
            } else if !ok {
                let message = op
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string());
                error!(operation = %op.operation_id, "Failed to {}: {}", op.describe(), message);
                run.errors.push(self.classifier.classify_message(
                    &message,
                    None,
                    Some(&op.describe()),
                    op.retry_count,
                ));
                if op.operation_type.is_final_for_component() || halt {
                    component.mark_failed(message)?;
                    progress.increment_failed()?;
                }
            }
            executed.push(op);

            if halt {
                warn!("Stopping after failure; rerun with force to continue past errors");
                settle_interrupted(inventory, progress, "halted before removal finished")?;
                for op in waiting.drain(..) {
                    settle_skipped(inventory, progress, &op, "halted after an earlier failure")?;
                    executed.push(op);
                }
            }
        }

        executed.extend(waiting);
        Ok(executed)
    }
}

/// Mark the operation's component skipped once and count it
fn settle_skipped(
    inventory: &mut Inventory,
    progress: &mut Progress,
    op: &RemovalOperation,
    reason: &str,
) -> Result<()> {
    if let Some(component) = inventory.find_mut(op.component_kind, &op.component_name) {
        if component.status() == ComponentStatus::Pending {
            component.mark_skipped(reason)?;
            progress.increment_skipped()?;
        }
    }
    Ok(())
}

/// Fail and count every component whose removal started but did not finish
fn settle_interrupted(
    inventory: &mut Inventory,
    progress: &mut Progress,
    reason: &str,
) -> Result<()> {
    for component in inventory
        .iter_mut()
        .filter(|c| c.status() == ComponentStatus::Removing)
    {
        warn!(component = %component.name, "{}", reason);
        component.mark_failed(reason)?;
        progress.increment_failed()?;
    }
    Ok(())
}

/// Report fields gathered while the run progresses
struct RunState {
    backup: BackupOutcome,
    errors: ErrorHistory,
    warnings: Vec<String>,
    dry_run: bool,
    aborted: bool,
}

impl RunState {
    fn new(dry_run: bool) -> Self {
        Self {
            backup: BackupOutcome::Disabled,
            errors: ErrorHistory::new(),
            warnings: Vec::new(),
            dry_run,
            aborted: false,
        }
    }

    fn finish(self, inventory: Inventory, mut progress: Progress, queue: &OperationQueue) -> UninstallReport {
        progress.mark_complete();
        let exit_code = progress.exit_code(self.aborted);
        let summary = progress.summary();
        info!(
            exit_code = exit_code.code(),
            removed = summary.removed,
            failed = summary.failed,
            skipped = summary.skipped,
            "uninstall finished"
        );
        UninstallReport {
            exit_code,
            summary,
            inventory,
            operations: queue.operations().to_vec(),
            preserved_volumes: queue.preserved().to_vec(),
            backup: self.backup,
            errors: self.errors.into_vec(),
            warnings: self.warnings,
            dry_run: self.dry_run,
            aborted: self.aborted,
        }
    }
}
