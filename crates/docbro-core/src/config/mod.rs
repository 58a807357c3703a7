//! Settings and settings loading

mod loader;
mod settings;

pub use loader::{SettingsLoader, SETTINGS_FILE};
pub use settings::{
    AppSettings, DocbroSettings, PathsSettings, ServiceEndpoint, SetupSettings,
    UninstallSettings, APP_NAME,
};
