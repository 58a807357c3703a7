//! Error types for docbro-setup

use docbro_core::recovery::ErrorContext;
use docbro_core::types::InstallPhase;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SetupError>;

#[derive(Error, Debug)]
pub enum SetupError {
    /// An installation with this id already exists
    #[error("Installation {installation_id} already exists (phase {phase}); resume it or force a reinstall")]
    Conflict {
        installation_id: String,
        phase: InstallPhase,
    },

    #[error("No installation state found for {installation_id}")]
    NotFound { installation_id: String },

    #[error("Installation {installation_id} cannot be resumed: {reason}")]
    NotResumable {
        installation_id: String,
        reason: String,
    },

    /// A phase failed; the context carries the classification and advice
    #[error("Phase {phase} failed: {context}")]
    PhaseFailed {
        phase: InstallPhase,
        context: Box<ErrorContext>,
    },

    #[error("Installation cancelled during {phase}")]
    Cancelled {
        phase: InstallPhase,
        context: Box<ErrorContext>,
    },

    #[error("Unknown decision {decision_id}")]
    UnknownDecision { decision_id: String },

    #[error("Option '{choice}' is not valid for decision {decision_id}")]
    InvalidChoice { decision_id: String, choice: String },

    #[error(transparent)]
    Core(#[from] docbro_core::Error),

    #[error(transparent)]
    Backup(#[from] docbro_backup::BackupError),
}

impl SetupError {
    /// Classified context for phase failures and cancellations
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            SetupError::PhaseFailed { context, .. } | SetupError::Cancelled { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SetupError::Cancelled { .. })
    }
}
