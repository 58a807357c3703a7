//! Runs single removal operations against the host backends

use docbro_backends::{ContainerBackend, ContainerError, Filesystem, FsError, PackageManager};
use docbro_core::retry::{calculate_delay, RetryObserver, RetryPolicy, TracingObserver};
use docbro_core::types::{OperationType, RemovalOperation};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Per-run execution settings
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Remove volumes even while mounted, and force container removal
    pub force: bool,
    pub stop_timeout: Duration,
    /// Delay between attempts; the attempt count comes from the operation
    pub retry: RetryPolicy,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            force: false,
            stop_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Progress notifications emitted while an operation runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    Started {
        operation_id: String,
        attempt: u32,
    },
    Retrying {
        operation_id: String,
        attempt: u32,
        error: String,
        delay_ms: u64,
    },
    Succeeded {
        operation_id: String,
        attempts: u32,
    },
    Failed {
        operation_id: String,
        attempts: u32,
        error: String,
    },
}

/// Receives [`ExecutionEvent`]s
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

impl<F> ExecutionObserver for F
where
    F: Fn(&ExecutionEvent) + Send + Sync,
{
    fn on_event(&self, event: &ExecutionEvent) {
        self(event)
    }
}

/// Outcome of one attempt
enum AttemptError {
    /// Retrying cannot help (mounted volume, permission denied)
    Fatal(String),
    Retryable(String),
}

/// Executes [`RemovalOperation`]s with bounded retries
pub struct OperationExecutor {
    containers: Arc<dyn ContainerBackend>,
    packages: Arc<dyn PackageManager>,
    fs: Arc<dyn Filesystem>,
    retry_observer: Arc<dyn RetryObserver>,
    observer: Option<Arc<dyn ExecutionObserver>>,
}

impl OperationExecutor {
    pub fn new(
        containers: Arc<dyn ContainerBackend>,
        packages: Arc<dyn PackageManager>,
        fs: Arc<dyn Filesystem>,
    ) -> Self {
        Self {
            containers,
            packages,
            fs,
            retry_observer: Arc::new(TracingObserver),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_retry_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.retry_observer = observer;
        self
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(&event);
        }
    }

    /// Run an operation until it succeeds, fails fatally, or exhausts its retries
    ///
    /// `retry_count` grows by one per failed attempt and `error_message`
    /// holds the last failure.
    pub async fn execute(&self, op: &mut RemovalOperation, options: &ExecuteOptions) -> bool {
        let max_attempts = op.max_retries.max(1);
        let started = Instant::now();

        loop {
            let attempt = op.retry_count + 1;
            self.retry_observer
                .on_attempt_start(&op.operation_id, attempt, max_attempts);
            self.emit(ExecutionEvent::Started {
                operation_id: op.operation_id.clone(),
                attempt,
            });

            let error = match self.attempt(op, options).await {
                Ok(()) => {
                    op.error_message = None;
                    self.retry_observer
                        .on_success(&op.operation_id, attempt, started.elapsed());
                    self.emit(ExecutionEvent::Succeeded {
                        operation_id: op.operation_id.clone(),
                        attempts: attempt,
                    });
                    return true;
                }
                Err(error) => error,
            };

            op.retry_count += 1;
            match error {
                AttemptError::Fatal(message) => {
                    self.retry_observer
                        .on_cancelled(&op.operation_id, attempt, &message);
                    return self.fail(op, message);
                }
                AttemptError::Retryable(message) if op.retry_count >= max_attempts => {
                    self.retry_observer
                        .on_exhausted(&op.operation_id, op.retry_count, &message);
                    return self.fail(op, message);
                }
                AttemptError::Retryable(message) => {
                    let delay = calculate_delay(&options.retry, attempt);
                    self.retry_observer
                        .on_attempt_failed(&op.operation_id, attempt, &message, delay);
                    self.emit(ExecutionEvent::Retrying {
                        operation_id: op.operation_id.clone(),
                        attempt,
                        error: message,
                        delay_ms: delay.as_millis() as u64,
                    });
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    fn fail(&self, op: &mut RemovalOperation, message: String) -> bool {
        self.emit(ExecutionEvent::Failed {
            operation_id: op.operation_id.clone(),
            attempts: op.retry_count,
            error: message.clone(),
        });
        op.error_message = Some(message);
        false
    }

    async fn attempt(
        &self,
        op: &RemovalOperation,
        options: &ExecuteOptions,
    ) -> Result<(), AttemptError> {
        debug!(operation = %op.operation_id, "executing {}", op.describe());
        match op.operation_type {
            OperationType::StopContainer => container_result(
                self.containers.stop(&op.target, options.stop_timeout).await,
            ),
            OperationType::RemoveContainer => container_result(
                self.containers
                    .remove_container(&op.target, options.force)
                    .await,
            ),
            OperationType::RemoveVolume => self.remove_volume(&op.target, options.force).await,
            OperationType::DeleteDirectory | OperationType::DeleteConfig => {
                self.delete_path(Path::new(&op.target))
            }
            OperationType::UninstallPackage => {
                if self.packages.uninstall(&op.target).await {
                    Ok(())
                } else {
                    Err(AttemptError::Retryable(format!(
                        "{} could not uninstall {}",
                        self.packages.name(),
                        op.target
                    )))
                }
            }
        }
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), AttemptError> {
        if !force {
            match self.containers.is_mounted(name).await {
                Ok(true) => {
                    return Err(AttemptError::Fatal(format!(
                        "volume {} is mounted by a running container",
                        name
                    )))
                }
                Ok(false) => {}
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(AttemptError::Retryable(e.to_string())),
            }
        }
        match self.containers.remove_volume(name, force).await {
            Err(ContainerError::InUse { detail, .. }) if !force => Err(AttemptError::Fatal(
                format!("volume {} is in use: {}", name, detail),
            )),
            other => container_result(other),
        }
    }

    fn delete_path(&self, path: &Path) -> Result<(), AttemptError> {
        match self.fs.remove_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("{} already absent", path.display());
                Ok(())
            }
            Err(e @ FsError::PermissionDenied { .. }) => {
                warn!("Cannot delete {}: {}", path.display(), e);
                Err(AttemptError::Fatal(e.to_string()))
            }
            Err(e) => Err(AttemptError::Retryable(e.to_string())),
        }
    }
}

/// A resource that is already gone counts as removed
fn container_result(result: Result<(), ContainerError>) -> Result<(), AttemptError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => {
            debug!("{}; treating as done", e);
            Ok(())
        }
        Err(e) => Err(AttemptError::Retryable(e.to_string())),
    }
}
