//! Installation phase machine state
//!
//! `InstallationState` is the persisted, resumable record of one install run.
//! All transitions go through methods on the state so the phase-order and
//! error invariants are checked in one place.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress is held below this value until the run is complete
pub const MAX_INCOMPLETE_PROGRESS: u8 = 95;

/// Installation lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPhase {
    Initializing,
    SystemCheck,
    ServiceSetup,
    Configuration,
    Finalization,
    Complete,
    Error,
}

impl InstallPhase {
    /// Fixed order of the work-performing phases
    pub const PIPELINE: [InstallPhase; 5] = [
        InstallPhase::Initializing,
        InstallPhase::SystemCheck,
        InstallPhase::ServiceSetup,
        InstallPhase::Configuration,
        InstallPhase::Finalization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallPhase::Initializing => "initializing",
            InstallPhase::SystemCheck => "system_check",
            InstallPhase::ServiceSetup => "service_setup",
            InstallPhase::Configuration => "configuration",
            InstallPhase::Finalization => "finalization",
            InstallPhase::Complete => "complete",
            InstallPhase::Error => "error",
        }
    }

    /// Position in the pipeline, `None` for complete/error
    pub fn pipeline_index(&self) -> Option<usize> {
        Self::PIPELINE.iter().position(|p| p == self)
    }

    /// Progress weight contributed once the phase completes
    pub fn weight(&self) -> u8 {
        match self {
            InstallPhase::Initializing => 5,
            InstallPhase::SystemCheck => 15,
            InstallPhase::ServiceSetup => 40,
            InstallPhase::Configuration => 25,
            InstallPhase::Finalization => 15,
            InstallPhase::Complete | InstallPhase::Error => 0,
        }
    }

    /// Phases that must be completed before this one may be entered
    pub fn predecessors(&self) -> &'static [InstallPhase] {
        match self.pipeline_index() {
            Some(idx) => &Self::PIPELINE[..idx],
            None => &Self::PIPELINE[..],
        }
    }

    /// Next pipeline phase, or `Complete` after finalization
    pub fn next(&self) -> Option<InstallPhase> {
        match self.pipeline_index() {
            Some(idx) if idx + 1 < Self::PIPELINE.len() => Some(Self::PIPELINE[idx + 1]),
            Some(_) => Some(InstallPhase::Complete),
            None => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallPhase::Complete | InstallPhase::Error)
    }
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InstallPhase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "initializing" => Ok(InstallPhase::Initializing),
            "system_check" => Ok(InstallPhase::SystemCheck),
            "service_setup" => Ok(InstallPhase::ServiceSetup),
            "configuration" => Ok(InstallPhase::Configuration),
            "finalization" => Ok(InstallPhase::Finalization),
            "complete" => Ok(InstallPhase::Complete),
            "error" => Ok(InstallPhase::Error),
            other => Err(Error::invalid_config(format!("unknown phase '{}'", other))),
        }
    }
}

/// Persisted, resumable phase-machine state for one install run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationState {
    pub installation_id: String,
    pub current_phase: InstallPhase,
    pub completed_phases: Vec<InstallPhase>,
    pub current_step: u32,
    pub total_steps: u32,
    pub progress_percentage: u8,
    pub status_message: String,
    pub can_resume: bool,
    pub error_occurred: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    /// Phase that was running when the error state was entered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<InstallPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_snapshot_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstallationState {
    pub fn new(installation_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            installation_id: installation_id.into(),
            current_phase: InstallPhase::Initializing,
            completed_phases: Vec::new(),
            current_step: 0,
            total_steps: 0,
            progress_percentage: 0,
            status_message: "Installation created".to_string(),
            can_resume: true,
            error_occurred: false,
            error_details: None,
            failed_phase: None,
            last_snapshot_id: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self, phase: InstallPhase) -> bool {
        self.completed_phases.contains(&phase)
    }

    /// Enter a pipeline phase; all earlier phases must already be complete
    pub fn enter_phase(&mut self, phase: InstallPhase, total_steps: u32) -> Result<()> {
        if phase.pipeline_index().is_none() {
            return Err(Error::invalid_transition(
                "installation phase",
                self.current_phase,
                phase,
            ));
        }
        if self.current_phase == InstallPhase::Complete {
            return Err(Error::invalid_transition(
                "installation phase",
                self.current_phase,
                phase,
            ));
        }

        let missing: Vec<&str> = phase
            .predecessors()
            .iter()
            .filter(|p| !self.is_completed(**p))
            .map(|p| p.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::PhaseOrder {
                phase: phase.to_string(),
                missing: missing.join(", "),
            });
        }

        self.current_phase = phase;
        self.current_step = 0;
        self.total_steps = total_steps;
        self.status_message = format!("Running {}", phase);
        self.touch();
        Ok(())
    }

    /// Record progress within the current phase
    pub fn advance_step(&mut self, message: impl Into<String>) {
        if self.current_step < self.total_steps {
            self.current_step += 1;
        }
        self.status_message = message.into();
        self.touch();
    }

    /// Mark the current phase complete
    pub fn complete_phase(&mut self, phase: InstallPhase) -> Result<()> {
        if self.current_phase != phase {
            return Err(Error::invalid_transition(
                "installation phase",
                self.current_phase,
                format!("{} (completed)", phase),
            ));
        }
        if !self.is_completed(phase) {
            self.completed_phases.push(phase);
        }
        self.current_step = self.total_steps;
        self.status_message = format!("Completed {}", phase);
        self.recompute_progress();
        self.touch();
        Ok(())
    }

    /// Transition to `complete`; requires every pipeline phase to be done
    pub fn mark_complete(&mut self) -> Result<()> {
        let missing: Vec<&str> = InstallPhase::PIPELINE
            .iter()
            .filter(|p| !self.is_completed(**p))
            .map(|p| p.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::PhaseOrder {
                phase: InstallPhase::Complete.to_string(),
                missing: missing.join(", "),
            });
        }
        if self.error_occurred {
            return Err(Error::invalid_transition(
                "installation phase",
                InstallPhase::Error,
                InstallPhase::Complete,
            ));
        }

        self.current_phase = InstallPhase::Complete;
        self.progress_percentage = 100;
        self.can_resume = false;
        self.status_message = "Installation complete".to_string();
        self.touch();
        Ok(())
    }

    /// Enter the error state from any phase; details are always recorded
    pub fn mark_error(&mut self, details: impl Into<String>) {
        let details = details.into();
        let details = if details.trim().is_empty() {
            "unknown error".to_string()
        } else {
            details
        };

        if self.current_phase != InstallPhase::Error {
            self.failed_phase = Some(self.current_phase);
        }
        self.current_phase = InstallPhase::Error;
        self.error_occurred = true;
        self.can_resume = true;
        self.status_message = format!("Installation failed: {}", details);
        self.error_details = Some(details);
        self.touch();
    }

    /// Leave the error state so the failed phase can be retried
    pub fn clear_error_for_retry(&mut self) -> Result<InstallPhase> {
        if self.current_phase != InstallPhase::Error {
            return Err(Error::invalid_transition(
                "installation phase",
                self.current_phase,
                "retry",
            ));
        }
        let phase = self.failed_phase.unwrap_or_else(|| self.first_incomplete_phase());
        self.current_phase = phase;
        self.error_occurred = false;
        self.error_details = None;
        self.failed_phase = None;
        self.status_message = format!("Retrying {}", phase);
        self.touch();
        Ok(phase)
    }

    /// Whether a persisted state can be picked up again
    pub fn is_resumable(&self) -> bool {
        self.can_resume && self.current_phase != InstallPhase::Complete
    }

    /// Phase the pipeline should continue from
    pub fn resume_phase(&self) -> Option<InstallPhase> {
        match self.current_phase {
            InstallPhase::Complete => None,
            InstallPhase::Error => Some(
                self.failed_phase
                    .unwrap_or_else(|| self.first_incomplete_phase()),
            ),
            phase if self.is_completed(phase) => phase.next().filter(|p| !p.is_terminal()),
            phase => Some(phase),
        }
    }

    /// First pipeline phase not yet completed
    pub fn first_incomplete_phase(&self) -> InstallPhase {
        InstallPhase::PIPELINE
            .iter()
            .copied()
            .find(|p| !self.is_completed(*p))
            .unwrap_or(InstallPhase::Finalization)
    }

    /// Check the model invariants; used after loading persisted state
    pub fn validate(&self) -> Result<()> {
        if self.current_phase == InstallPhase::Error {
            if !self.error_occurred {
                return Err(Error::invariant("error phase without error_occurred"));
            }
            if self
                .error_details
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .is_empty()
            {
                return Err(Error::invariant("error phase without error_details"));
            }
        }
        if self.current_phase == InstallPhase::Complete {
            if self.progress_percentage != 100 {
                return Err(Error::invariant("complete phase with progress below 100"));
            }
            if self.error_occurred {
                return Err(Error::invariant("complete phase with error_occurred"));
            }
            if self.can_resume {
                return Err(Error::invariant("complete phase marked resumable"));
            }
        }
        if self.progress_percentage > 100 {
            return Err(Error::invariant("progress above 100"));
        }
        for (idx, phase) in self.completed_phases.iter().enumerate() {
            if phase.pipeline_index() != Some(idx) {
                return Err(Error::invariant(format!(
                    "completed phases out of order at position {}: {}",
                    idx, phase
                )));
            }
        }
        Ok(())
    }

    fn recompute_progress(&mut self) {
        let sum: u32 = self
            .completed_phases
            .iter()
            .map(|p| u32::from(p.weight()))
            .sum();
        self.progress_percentage = sum.min(u32::from(MAX_INCOMPLETE_PROGRESS)) as u8;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
