//! # docbro-setup
//!
//! Resumable DocBro installation:
//! - [`PhaseOrchestrator`] runs the ordered install phases and persists state after every change
//! - Configuration and finalization are snapshotted and rolled back on failure
//! - [`DecisionLog`] records operator decisions so a resumed run does not ask twice
//! - [`SetupEnvironment`] abstracts the host; [`HostEnvironment`] is the real one

pub mod decisions;
pub mod environment;
pub mod error;
pub mod orchestrator;
pub mod profile;

pub use decisions::{
    decide, DecisionLog, DecisionOption, DecisionRecord, DecisionResolver, DefaultResolver,
    MAX_DECISION_ATTEMPTS,
};
pub use environment::{HostEnvironment, SetupEnvironment, SystemReport};
pub use error::{Result, SetupError};
pub use orchestrator::{
    load_state, new_installation_id, PhaseOrchestrator, SetupContext, SetupHandle, StateObserver,
};
pub use profile::{InstallationProfile, ServiceRecord};
