//! # docbro-uninstall
//!
//! Removes every DocBro resource from a host:
//! - [`InventoryScanner`] discovers containers, volumes, directories, config files and the package
//! - [`OperationQueueBuilder`] turns the inventory into a priority-ordered plan
//! - [`OperationExecutor`] runs each operation with bounded retries
//! - [`UninstallRun`] ties it together with backup, confirmation and progress

pub mod executor;
pub mod progress;
pub mod queue;
pub mod run;
pub mod scanner;

pub use executor::{ExecuteOptions, ExecutionEvent, ExecutionObserver, OperationExecutor};
pub use progress::{ExitCode, Progress, ProgressSummary};
pub use queue::{OperationQueue, OperationQueueBuilder};
pub use run::{BackupOutcome, ConfirmationRequest, Confirmer, UninstallReport, UninstallRun};
pub use scanner::{external_reason, InventoryScanner};
