//! Error classification and recovery advice
//!
//! Every failure raised during an install or uninstall is funnelled through
//! [`ErrorClassifier::classify`], which produces an immutable
//! [`ErrorContext`] carrying a category, a severity, a plain-language message
//! and an ordered list of suggested recovery actions.

mod classifier;
mod history;
mod taxonomy;

pub use classifier::ErrorClassifier;
pub use history::{ErrorHistory, DEFAULT_HISTORY_CAPACITY};
pub use taxonomy::{ErrorCategory, ErrorContext, RecoveryAction, Severity};
