//! # docbro-core
//!
//! Core library for DocBro lifecycle tooling providing:
//! - The removal and installation data model
//! - Error classification and recovery advice
//! - Retry policies
//! - Persisted key/JSON state storage
//! - Settings loading and tracing setup

pub mod config;
pub mod error;
pub mod logging;
pub mod recovery;
pub mod retry;
pub mod store;
pub mod types;
pub mod utils;

pub use config::{DocbroSettings, SettingsLoader};
pub use error::{Error, Result};
pub use store::{JsonFileStore, MemoryStore, StateStore};
pub use utils::get_home_dir;
