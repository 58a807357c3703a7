//! # docbro-backends
//!
//! Host integrations consumed by the DocBro install and uninstall flows:
//! - [`ContainerBackend`] with the `docker` CLI implementation
//! - [`Filesystem`] with a local implementation
//! - [`PackageManager`] probing `uv tool` / `pipx`
//! - Prerequisite tool checks and HTTP service probes

pub mod container;
pub mod filesystem;
pub mod package;
pub mod probe;
pub mod tools;

pub use container::{ContainerBackend, ContainerError, ContainerInfo, DockerCli, VolumeInfo};
pub use filesystem::{FsError, Filesystem, LocalFilesystem};
pub use package::{CliPackageManager, PackageManager, PackageTool};
pub use probe::{ServiceProbe, ServiceStatus};
pub use tools::{ToolCheck, ToolRequirement, ToolState, ToolStatus};
