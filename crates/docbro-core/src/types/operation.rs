//! Atomic removal operations derived from components

use super::component::ComponentKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Default number of attempts for a removal operation
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Kind of removal action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    StopContainer,
    RemoveContainer,
    RemoveVolume,
    DeleteDirectory,
    DeleteConfig,
    UninstallPackage,
}

impl OperationType {
    /// Fixed priority band; lower runs first
    pub fn priority(&self) -> i32 {
        match self {
            OperationType::StopContainer => 10,
            OperationType::RemoveContainer => 20,
            OperationType::RemoveVolume => 30,
            OperationType::DeleteConfig => 35,
            OperationType::DeleteDirectory => 40,
            OperationType::UninstallPackage => 50,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::StopContainer => "stop_container",
            OperationType::RemoveContainer => "remove_container",
            OperationType::RemoveVolume => "remove_volume",
            OperationType::DeleteDirectory => "delete_directory",
            OperationType::DeleteConfig => "delete_config",
            OperationType::UninstallPackage => "uninstall_package",
        }
    }

    /// Prefix used when generating operation ids
    pub fn id_prefix(&self) -> &'static str {
        match self {
            OperationType::StopContainer => "stop",
            OperationType::RemoveContainer => "rm",
            OperationType::RemoveVolume => "vol",
            OperationType::DeleteDirectory => "dir",
            OperationType::DeleteConfig => "cfg",
            OperationType::UninstallPackage => "pkg",
        }
    }

    /// Whether the outcome of this operation decides the component's terminal status.
    ///
    /// Stopping a container is preparatory; the paired removal settles it.
    pub fn is_final_for_component(&self) -> bool {
        !matches!(self, OperationType::StopContainer)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One atomic removal action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalOperation {
    pub operation_id: String,
    pub operation_type: OperationType,

    /// Container id, volume name, path, or package name
    pub target: String,

    pub component_kind: ComponentKind,
    pub component_name: String,

    pub priority: i32,

    /// Operation ids that must reach a terminal state first
    #[serde(default)]
    pub dependencies: BTreeSet<String>,

    #[serde(default)]
    pub retry_count: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl RemovalOperation {
    /// Create an operation whose priority is taken from its type
    pub fn new(
        operation_type: OperationType,
        target: impl Into<String>,
        component_kind: ComponentKind,
        component_name: impl Into<String>,
    ) -> Self {
        let target = target.into();
        Self {
            operation_id: format!("{}:{}", operation_type.id_prefix(), target),
            operation_type,
            target,
            component_kind,
            component_name: component_name.into(),
            priority: operation_type.priority(),
            dependencies: BTreeSet::new(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            error_message: None,
        }
    }

    pub fn depends_on(mut self, operation_id: impl Into<String>) -> Self {
        self.dependencies.insert(operation_id.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Attempts left before the operation is considered exhausted
    pub fn attempts_remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.retry_count)
    }

    pub fn describe(&self) -> String {
        format!("{} {}", self.operation_type, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_bands() {
        assert!(OperationType::StopContainer.priority() < OperationType::RemoveContainer.priority());
        assert!(OperationType::RemoveContainer.priority() < OperationType::RemoveVolume.priority());
        assert!(OperationType::RemoveVolume.priority() < OperationType::DeleteConfig.priority());
        assert!(OperationType::DeleteConfig.priority() < OperationType::DeleteDirectory.priority());
        assert!(
            OperationType::DeleteDirectory.priority() < OperationType::UninstallPackage.priority()
        );
    }

    #[test]
    fn test_new_operation_defaults() {
        let op = RemovalOperation::new(
            OperationType::RemoveVolume,
            "docbro_data",
            ComponentKind::Volume,
            "docbro_data",
        );
        assert_eq!(op.operation_id, "vol:docbro_data");
        assert_eq!(op.priority, 30);
        assert_eq!(op.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(op.retry_count, 0);
        assert!(op.dependencies.is_empty());
    }

    #[test]
    fn test_depends_on_and_attempts() {
        let mut op = RemovalOperation::new(
            OperationType::RemoveContainer,
            "abc123",
            ComponentKind::Container,
            "docbro-qdrant",
        )
        .depends_on("stop:abc123")
        .with_max_retries(2);

        assert!(op.dependencies.contains("stop:abc123"));
        assert_eq!(op.attempts_remaining(), 2);
        op.retry_count = 2;
        assert_eq!(op.attempts_remaining(), 0);
    }

    #[test]
    fn test_stop_is_not_final() {
        assert!(!OperationType::StopContainer.is_final_for_component());
        assert!(OperationType::RemoveContainer.is_final_for_component());
        assert!(OperationType::UninstallPackage.is_final_for_component());
    }
}
