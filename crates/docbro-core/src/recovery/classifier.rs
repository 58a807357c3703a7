use super::taxonomy::{ErrorCategory, ErrorContext, RecoveryAction, Severity};
use crate::types::InstallPhase;
use chrono::Utc;
use std::io;

/// Keyword table consulted after the typed checks, first match wins
const KEYWORD_TABLE: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::Cancellation,
        &["cancelled", "canceled", "interrupted", "aborted by user"],
    ),
    (
        ErrorCategory::Timeout,
        &["timed out", "timeout", "deadline exceeded"],
    ),
    (
        ErrorCategory::PermissionDenied,
        &[
            "permission denied",
            "access denied",
            "operation not permitted",
            "eacces",
            "eperm",
        ],
    ),
    (
        ErrorCategory::DiskSpace,
        &[
            "no space left",
            "disk full",
            "disk space",
            "insufficient space",
            "quota exceeded",
        ],
    ),
    (
        ErrorCategory::DataCorruption,
        &[
            "corrupt",
            "checksum mismatch",
            "malformed",
            "unexpected end of file",
            "invalid json",
        ],
    ),
    (
        ErrorCategory::VersionConflict,
        &[
            "version conflict",
            "incompatible version",
            "version mismatch",
            "requires python",
        ],
    ),
    (
        ErrorCategory::SystemRequirements,
        &[
            "python version",
            "unsupported platform",
            "system requirement",
            "minimum requirement",
            "insufficient memory",
        ],
    ),
    (
        ErrorCategory::DependencyMissing,
        &[
            "command not found",
            "not installed",
            "executable not found",
            "cannot find binary",
            "missing dependency",
            "no module named",
        ],
    ),
    (
        ErrorCategory::ServiceUnavailable,
        &[
            "docker",
            "qdrant",
            "ollama",
            "redis",
            "daemon",
            "service unavailable",
            "container",
        ],
    ),
    (
        ErrorCategory::NetworkConnectivity,
        &[
            "connection refused",
            "connection reset",
            "network",
            "unreachable",
            "could not resolve",
            "dns",
        ],
    ),
    (
        ErrorCategory::Configuration,
        &["config", "settings", "yaml", "invalid value", "missing key"],
    ),
];

/// Stateless failure classifier and recovery advisor
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Categorize a failure: typed checks over the error chain, then keywords
    pub fn categorize(&self, error: &anyhow::Error, context: &str) -> ErrorCategory {
        for cause in error.chain() {
            if let Some(category) = Self::categorize_typed(cause) {
                return category;
            }
        }
        let text = format!("{:#} {}", error, context);
        Self::categorize_message(&text)
    }

    /// Keyword-only categorization of a message
    pub fn categorize_message(message: &str) -> ErrorCategory {
        let haystack = message.to_lowercase();
        KEYWORD_TABLE
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| haystack.contains(k)))
            .map(|(category, _)| *category)
            .unwrap_or(ErrorCategory::Unknown)
    }

    fn categorize_typed(cause: &(dyn std::error::Error + 'static)) -> Option<ErrorCategory> {
        if let Some(err) = cause.downcast_ref::<crate::Error>() {
            return match err {
                crate::Error::Cancelled { .. } => Some(ErrorCategory::Cancellation),
                crate::Error::InvalidConfig { .. } | crate::Error::YamlParse(_) => {
                    Some(ErrorCategory::Configuration)
                }
                crate::Error::JsonParse(_) => Some(ErrorCategory::DataCorruption),
                crate::Error::Io(io_err) => Self::categorize_io(io_err),
                _ => None,
            };
        }
        if cause.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
            return Some(ErrorCategory::Timeout);
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return Self::categorize_io(io_err);
        }
        None
    }

    fn categorize_io(err: &io::Error) -> Option<ErrorCategory> {
        match err.kind() {
            io::ErrorKind::TimedOut => Some(ErrorCategory::Timeout),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::BrokenPipe => Some(ErrorCategory::NetworkConnectivity),
            io::ErrorKind::PermissionDenied => Some(ErrorCategory::PermissionDenied),
            io::ErrorKind::StorageFull => Some(ErrorCategory::DiskSpace),
            io::ErrorKind::Interrupted => Some(ErrorCategory::Cancellation),
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                Some(ErrorCategory::DataCorruption)
            }
            _ => None,
        }
    }

    /// Severity of a category in the given phase
    pub fn severity(&self, category: ErrorCategory, phase: Option<InstallPhase>) -> Severity {
        let strict_phase = matches!(
            phase,
            Some(InstallPhase::SystemCheck) | Some(InstallPhase::Finalization)
        );
        match category {
            ErrorCategory::SystemRequirements
            | ErrorCategory::PermissionDenied
            | ErrorCategory::DiskSpace => Severity::Critical,
            ErrorCategory::NetworkConnectivity
            | ErrorCategory::Configuration
            | ErrorCategory::DataCorruption => {
                if strict_phase {
                    Severity::High
                } else {
                    Severity::Medium
                }
            }
            ErrorCategory::ServiceUnavailable => Severity::Medium,
            ErrorCategory::Cancellation => Severity::Info,
            ErrorCategory::Timeout
            | ErrorCategory::DependencyMissing
            | ErrorCategory::VersionConflict => Severity::High,
            ErrorCategory::Unknown => Severity::Medium,
        }
    }

    /// Fixed recovery table keyed by category and severity
    pub fn recommend(&self, category: ErrorCategory, severity: Severity) -> Vec<RecoveryAction> {
        use RecoveryAction::*;
        let high = severity >= Severity::High;
        let actions: &[RecoveryAction] = match category {
            ErrorCategory::SystemRequirements => &[Manual, Abort],
            ErrorCategory::NetworkConnectivity if high => &[Retry, Manual, Abort],
            ErrorCategory::NetworkConnectivity => &[Retry, Skip],
            ErrorCategory::PermissionDenied => &[Manual, Retry, Abort],
            ErrorCategory::ServiceUnavailable => &[Retry, Skip, Manual],
            ErrorCategory::Configuration if high => &[Rollback, Manual],
            ErrorCategory::Configuration => &[Manual, Retry],
            ErrorCategory::DiskSpace => &[Cleanup, Manual, Abort],
            ErrorCategory::DependencyMissing => &[Manual, Retry],
            ErrorCategory::Timeout => &[Retry, Skip],
            ErrorCategory::Cancellation => &[Cleanup, Abort],
            ErrorCategory::DataCorruption if high => &[Rollback, Cleanup, Manual],
            ErrorCategory::DataCorruption => &[Cleanup, Retry],
            ErrorCategory::VersionConflict => &[Manual, Rollback],
            ErrorCategory::Unknown if severity == Severity::Critical => &[Abort, Manual],
            ErrorCategory::Unknown => &[Retry, Manual],
        };
        actions.to_vec()
    }

    /// Plain-language message for the operator
    pub fn user_message(&self, category: ErrorCategory) -> &'static str {
        match category {
            ErrorCategory::SystemRequirements => {
                "Your system does not meet the minimum requirements for DocBro."
            }
            ErrorCategory::NetworkConnectivity => {
                "A network connection failed. Check your connection and try again."
            }
            ErrorCategory::PermissionDenied => {
                "DocBro does not have permission to access a required file or directory."
            }
            ErrorCategory::ServiceUnavailable => {
                "A required service (such as Docker or the vector store) is not available."
            }
            ErrorCategory::Configuration => "The DocBro configuration is invalid or incomplete.",
            ErrorCategory::DiskSpace => "There is not enough free disk space to continue.",
            ErrorCategory::DependencyMissing => "A required tool or dependency is not installed.",
            ErrorCategory::Timeout => "The operation took too long and was stopped.",
            ErrorCategory::Cancellation => "The operation was cancelled.",
            ErrorCategory::DataCorruption => "Stored DocBro data appears to be damaged.",
            ErrorCategory::VersionConflict => {
                "An installed component has an incompatible version."
            }
            ErrorCategory::Unknown => "An unexpected error occurred.",
        }
    }

    /// Build a full error context for a failure
    pub fn classify(
        &self,
        error: &anyhow::Error,
        phase: Option<InstallPhase>,
        step: Option<&str>,
        retry_count: u32,
    ) -> ErrorContext {
        let context = match (phase, step) {
            (Some(phase), Some(step)) => format!("{} {}", phase, step),
            (Some(phase), None) => phase.to_string(),
            (None, Some(step)) => step.to_string(),
            (None, None) => String::new(),
        };
        let category = self.categorize(error, &context);
        let severity = self.severity(category, phase);
        let suggested_actions = self.recommend(category, severity);
        let can_retry = suggested_actions.contains(&RecoveryAction::Retry);

        tracing::debug!(error = ?error, category = %category, severity = %severity, "classified error");

        ErrorContext {
            category,
            severity,
            phase,
            step: step.map(str::to_string),
            error_message: format!("{:#}", error),
            user_message: self.user_message(category).to_string(),
            suggested_actions,
            retry_count,
            can_retry,
            occurred_at: Utc::now(),
        }
    }

    /// Classify a failure known only by its message
    pub fn classify_message(
        &self,
        message: &str,
        phase: Option<InstallPhase>,
        step: Option<&str>,
        retry_count: u32,
    ) -> ErrorContext {
        self.classify(&anyhow::anyhow!("{}", message), phase, step, retry_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Cannot connect to the Docker daemon", ErrorCategory::ServiceUnavailable ; "docker daemon")]
    #[test_case("qdrant health check returned 503", ErrorCategory::ServiceUnavailable ; "vector store")]
    #[test_case("No space left on device", ErrorCategory::DiskSpace ; "disk full")]
    #[test_case("connection refused by 10.0.0.1", ErrorCategory::NetworkConnectivity ; "network")]
    #[test_case("uv: command not found", ErrorCategory::DependencyMissing ; "missing tool")]
    #[test_case("System requirement not met: Python 3.13.0 or newer is not installed", ErrorCategory::SystemRequirements ; "requirement names a missing tool")]
    #[test_case("invalid settings.yaml", ErrorCategory::Configuration ; "config")]
    #[test_case("checksum mismatch in archive", ErrorCategory::DataCorruption ; "corruption")]
    #[test_case("something odd", ErrorCategory::Unknown ; "fallback")]
    fn test_keyword_categorization(message: &str, expected: ErrorCategory) {
        assert_eq!(ErrorClassifier::categorize_message(message), expected);
    }

    #[test]
    fn test_typed_checks_win_over_keywords() {
        let classifier = ErrorClassifier::new();

        let err = anyhow::Error::new(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "docker socket",
        ));
        assert_eq!(
            classifier.categorize(&err, ""),
            ErrorCategory::PermissionDenied
        );

        let err = anyhow::Error::new(io::Error::new(io::ErrorKind::TimedOut, "network"));
        assert_eq!(classifier.categorize(&err, ""), ErrorCategory::Timeout);

        let err = anyhow::Error::new(crate::Error::cancelled("ctrl-c"));
        assert_eq!(classifier.categorize(&err, ""), ErrorCategory::Cancellation);
    }

    #[test]
    fn test_typed_check_through_context_chain() {
        let classifier = ErrorClassifier::new();
        let err = anyhow::Error::new(io::Error::new(io::ErrorKind::ConnectionRefused, "x"))
            .context("probing service");
        assert_eq!(
            classifier.categorize(&err, ""),
            ErrorCategory::NetworkConnectivity
        );
    }

    #[test]
    fn test_context_participates_in_keywords() {
        let classifier = ErrorClassifier::new();
        let err = anyhow::anyhow!("exit status 1");
        assert_eq!(
            classifier.categorize(&err, "docker volume rm"),
            ErrorCategory::ServiceUnavailable
        );
    }

    #[test_case(ErrorCategory::PermissionDenied, None, Severity::Critical ; "permission always critical")]
    #[test_case(ErrorCategory::DiskSpace, Some(InstallPhase::Initializing), Severity::Critical ; "disk always critical")]
    #[test_case(ErrorCategory::NetworkConnectivity, Some(InstallPhase::SystemCheck), Severity::High ; "network in system check")]
    #[test_case(ErrorCategory::NetworkConnectivity, Some(InstallPhase::ServiceSetup), Severity::Medium ; "network in service setup")]
    #[test_case(ErrorCategory::Configuration, Some(InstallPhase::Finalization), Severity::High ; "config in finalization")]
    #[test_case(ErrorCategory::ServiceUnavailable, Some(InstallPhase::SystemCheck), Severity::Medium ; "service stays medium")]
    #[test_case(ErrorCategory::Cancellation, None, Severity::Info ; "cancellation info")]
    fn test_severity(category: ErrorCategory, phase: Option<InstallPhase>, expected: Severity) {
        assert_eq!(ErrorClassifier::new().severity(category, phase), expected);
    }

    #[test]
    fn test_recommendations_are_deterministic() {
        let classifier = ErrorClassifier::new();
        let first = classifier.recommend(ErrorCategory::DataCorruption, Severity::High);
        let second = classifier.recommend(ErrorCategory::DataCorruption, Severity::High);
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                RecoveryAction::Rollback,
                RecoveryAction::Cleanup,
                RecoveryAction::Manual
            ]
        );
        assert_eq!(
            classifier.recommend(ErrorCategory::ServiceUnavailable, Severity::Medium)[0],
            RecoveryAction::Retry
        );
    }

    #[test]
    fn test_classify_builds_context() {
        let classifier = ErrorClassifier::new();
        let err = anyhow::anyhow!("Cannot connect to the Docker daemon");
        let ctx = classifier.classify(&err, Some(InstallPhase::ServiceSetup), Some("detect"), 1);

        assert_eq!(ctx.category, ErrorCategory::ServiceUnavailable);
        assert_eq!(ctx.severity, Severity::Medium);
        assert_eq!(ctx.retry_count, 1);
        assert!(ctx.can_retry);
        assert!(!ctx.user_message.contains("daemon"));
        assert!(ctx.error_message.contains("Docker daemon"));
    }
}
