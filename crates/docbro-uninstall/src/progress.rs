//! Uninstall progress counters and exit codes

use chrono::{DateTime, Utc};
use docbro_core::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Process exit status of an uninstall run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCode {
    /// Nothing failed (includes all-skipped and dry runs)
    Success,
    /// Some components removed, some failed
    Partial,
    /// Declined at confirmation or cancelled
    Aborted,
    /// Nothing removed and at least one failure
    Failure,
    /// No components were found
    NothingToDo,
}

impl ExitCode {
    pub fn code(&self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Partial => 1,
            ExitCode::Aborted => 2,
            ExitCode::Failure => 3,
            ExitCode::NothingToDo => 4,
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Snapshot of the counters for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub total: usize,
    pub processed: usize,
    pub removed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed: Duration,
    pub success_rate: f64,
}

/// Counts components as they reach a terminal status
///
/// `processed == removed + failed + skipped` and `processed <= total` hold
/// after every call; an increment past `total` is refused.
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    total: usize,
    removed: usize,
    failed: usize,
    skipped: usize,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    backup_created: bool,
    backup_location: Option<PathBuf>,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            removed: 0,
            failed: 0,
            skipped: 0,
            start_time: Utc::now(),
            end_time: None,
            backup_created: false,
            backup_location: None,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn processed(&self) -> usize {
        self.removed + self.failed + self.skipped
    }

    pub fn removed(&self) -> usize {
        self.removed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn backup_created(&self) -> bool {
        self.backup_created
    }

    pub fn backup_location(&self) -> Option<&Path> {
        self.backup_location.as_deref()
    }

    fn check_room(&self) -> Result<()> {
        if self.processed() >= self.total {
            return Err(Error::ProgressOverflow {
                processed: self.processed() + 1,
                total: self.total,
            });
        }
        Ok(())
    }

    pub fn increment_removed(&mut self) -> Result<()> {
        self.check_room()?;
        self.removed += 1;
        Ok(())
    }

    pub fn increment_failed(&mut self) -> Result<()> {
        self.check_room()?;
        self.failed += 1;
        Ok(())
    }

    pub fn increment_skipped(&mut self) -> Result<()> {
        self.check_room()?;
        self.skipped += 1;
        Ok(())
    }

    /// Stamp the end time; later calls keep the first stamp
    pub fn mark_complete(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
    }

    /// Every component has been counted
    pub fn is_complete(&self) -> bool {
        self.processed() >= self.total
    }

    pub fn record_backup(&mut self, location: impl Into<PathBuf>) {
        self.backup_created = true;
        self.backup_location = Some(location.into());
    }

    /// Percentage of processed components that were removed
    pub fn success_rate(&self) -> f64 {
        let processed = self.processed();
        if processed == 0 {
            0.0
        } else {
            self.removed as f64 / processed as f64 * 100.0
        }
    }

    pub fn elapsed(&self) -> Duration {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).to_std().unwrap_or_default()
    }

    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary {
            total: self.total,
            processed: self.processed(),
            removed: self.removed,
            failed: self.failed,
            skipped: self.skipped,
            elapsed: self.elapsed(),
            success_rate: self.success_rate(),
        }
    }

    pub fn exit_code(&self, aborted: bool) -> ExitCode {
        if self.total == 0 {
            ExitCode::NothingToDo
        } else if aborted {
            ExitCode::Aborted
        } else if self.failed == 0 {
            ExitCode::Success
        } else if self.removed > 0 {
            ExitCode::Partial
        } else {
            ExitCode::Failure
        }
    }
}
