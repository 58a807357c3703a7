//! Error types for docbro-core

use thiserror::Error;

/// Result type alias using docbro-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for DocBro lifecycle tooling
#[derive(Error, Debug)]
pub enum Error {
    /// A status or phase transition that the state machine does not allow
    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// A pipeline phase was entered before its predecessors completed
    #[error("Cannot enter phase {phase}: missing completed phases [{missing}]")]
    PhaseOrder { phase: String, missing: String },

    /// A model invariant does not hold
    #[error("Invariant violated: {message}")]
    Invariant { message: String },

    /// Progress counters would exceed the declared total
    #[error("Progress overflow: {processed} processed of {total} total")]
    ProgressOverflow { processed: usize, total: usize },

    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Persisted document was not found
    #[error("State not found: {key}")]
    StateNotFound { key: String },

    /// Store key failed validation
    #[error("Invalid store key: {key}")]
    InvalidKey { key: String },

    /// The operation was cancelled by the operator
    #[error("Operation cancelled: {reason}")]
    Cancelled { reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),
}

impl Error {
    /// Create an invalid transition error
    pub fn invalid_transition(
        entity: impl Into<String>,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity: entity.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create an invariant error
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a state not found error
    pub fn state_not_found(key: impl Into<String>) -> Self {
        Self::StateNotFound { key: key.into() }
    }

    /// Create a cancellation error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Whether this error represents an operator cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
