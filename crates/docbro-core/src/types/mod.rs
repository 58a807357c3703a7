//! Type definitions for the DocBro lifecycle model

mod component;
mod installation;
mod operation;

pub use component::{Component, ComponentCounts, ComponentKind, ComponentStatus, Inventory};
pub use installation::{InstallPhase, InstallationState, MAX_INCOMPLETE_PROGRESS};
pub use operation::{OperationType, RemovalOperation, DEFAULT_MAX_RETRIES};
