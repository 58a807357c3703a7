//! Error taxonomy shared by the install and uninstall flows

use crate::types::InstallPhase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    SystemRequirements,
    NetworkConnectivity,
    PermissionDenied,
    ServiceUnavailable,
    Configuration,
    DiskSpace,
    DependencyMissing,
    Timeout,
    Cancellation,
    DataCorruption,
    VersionConflict,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::SystemRequirements => "system_requirements",
            ErrorCategory::NetworkConnectivity => "network_connectivity",
            ErrorCategory::PermissionDenied => "permission_denied",
            ErrorCategory::ServiceUnavailable => "service_unavailable",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::DiskSpace => "disk_space",
            ErrorCategory::DependencyMissing => "dependency_missing",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Cancellation => "cancellation",
            ErrorCategory::DataCorruption => "data_corruption",
            ErrorCategory::VersionConflict => "version_conflict",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How serious a failure is; ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Suggested next step after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    Rollback,
    Skip,
    Manual,
    Abort,
    Cleanup,
}

impl RecoveryAction {
    /// One-line description shown next to the action
    pub fn describe(&self) -> &'static str {
        match self {
            RecoveryAction::Retry => "Retry the failed step",
            RecoveryAction::Rollback => "Roll back to the last snapshot",
            RecoveryAction::Skip => "Skip this step and continue",
            RecoveryAction::Manual => "Fix the problem manually, then resume",
            RecoveryAction::Abort => "Abort the operation",
            RecoveryAction::Cleanup => "Clean up partial changes",
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecoveryAction::Retry => "retry",
            RecoveryAction::Rollback => "rollback",
            RecoveryAction::Skip => "skip",
            RecoveryAction::Manual => "manual",
            RecoveryAction::Abort => "abort",
            RecoveryAction::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// Classified failure record; immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub category: ErrorCategory,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<InstallPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Raw error text for diagnostics
    pub error_message: String,
    /// Plain-language message for the operator
    pub user_message: String,
    pub suggested_actions: Vec<RecoveryAction>,
    pub retry_count: u32,
    pub can_retry: bool,
    pub occurred_at: DateTime<Utc>,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.user_message)
    }
}
