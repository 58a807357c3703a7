//! Removable system components and the inventory that groups them

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Kind of removable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Container,
    Volume,
    Directory,
    ConfigFile,
    Package,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 5] = [
        ComponentKind::Container,
        ComponentKind::Volume,
        ComponentKind::Directory,
        ComponentKind::ConfigFile,
        ComponentKind::Package,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Container => "container",
            ComponentKind::Volume => "volume",
            ComponentKind::Directory => "directory",
            ComponentKind::ConfigFile => "config_file",
            ComponentKind::Package => "package",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Removal status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    #[default]
    Pending,
    Removing,
    Removed,
    Failed,
    Skipped,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Pending => "pending",
            ComponentStatus::Removing => "removing",
            ComponentStatus::Removed => "removed",
            ComponentStatus::Failed => "failed",
            ComponentStatus::Skipped => "skipped",
        }
    }

    /// Removed, failed and skipped are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ComponentStatus::Removed | ComponentStatus::Failed | ComponentStatus::Skipped
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: ComponentStatus) -> bool {
        matches!(
            (self, next),
            (ComponentStatus::Pending, ComponentStatus::Removing)
                | (ComponentStatus::Pending, ComponentStatus::Skipped)
                | (ComponentStatus::Removing, ComponentStatus::Removed)
                | (ComponentStatus::Removing, ComponentStatus::Failed)
        )
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single removable system resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub kind: ComponentKind,

    /// Container id/name, volume name, path string, or package name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,

    /// Not owned by this application; never force-removed
    #[serde(default)]
    pub is_external: bool,

    /// Which rule classified the component as external
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_reason: Option<String>,

    /// Container/volume labels as reported by the backend
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Volume mount point on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,

    #[serde(default)]
    status: ComponentStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Component {
    pub fn new(kind: ComponentKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            path: None,
            size_bytes: None,
            is_external: false,
            external_reason: None,
            labels: BTreeMap::new(),
            mountpoint: None,
            status: ComponentStatus::Pending,
            error_message: None,
        }
    }

    pub fn container(name: impl Into<String>) -> Self {
        Self::new(ComponentKind::Container, name)
    }

    pub fn volume(name: impl Into<String>) -> Self {
        Self::new(ComponentKind::Volume, name)
    }

    pub fn package(name: impl Into<String>) -> Self {
        Self::new(ComponentKind::Package, name)
    }

    /// Directory component named after its path
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut component = Self::new(ComponentKind::Directory, path.display().to_string());
        component.path = Some(path);
        component
    }

    /// Config file component named after its path
    pub fn config_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut component = Self::new(ComponentKind::ConfigFile, path.display().to_string());
        component.path = Some(path);
        component
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_mountpoint(mut self, mountpoint: impl Into<String>) -> Self {
        self.mountpoint = Some(mountpoint.into());
        self
    }

    pub fn external(mut self, reason: impl Into<String>) -> Self {
        self.is_external = true;
        self.external_reason = Some(reason.into());
        self
    }

    pub fn status(&self) -> ComponentStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn mark_removing(&mut self) -> Result<()> {
        self.transition(ComponentStatus::Removing)
    }

    pub fn mark_removed(&mut self) -> Result<()> {
        self.transition(ComponentStatus::Removed)
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(ComponentStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn mark_skipped(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(ComponentStatus::Skipped)?;
        self.error_message = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, next: ComponentStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::invalid_transition(
                format!("{} '{}'", self.kind, self.name),
                self.status,
                next,
            ));
        }
        tracing::trace!(kind = %self.kind, name = %self.name, from = %self.status, to = %next, "component transition");
        self.status = next;
        Ok(())
    }
}

/// Per-kind component counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentCounts {
    pub containers: usize,
    pub volumes: usize,
    pub directories: usize,
    pub config_files: usize,
    pub packages: usize,
}

impl ComponentCounts {
    pub fn total(&self) -> usize {
        self.containers + self.volumes + self.directories + self.config_files + self.packages
    }
}

/// All components discovered for one uninstall run, grouped by kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub containers: Vec<Component>,
    pub volumes: Vec<Component>,
    pub directories: Vec<Component>,
    pub config_files: Vec<Component>,
    pub packages: Vec<Component>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component to the group matching its kind
    pub fn push(&mut self, component: Component) {
        self.group_mut(component.kind).push(component);
    }

    pub fn group(&self, kind: ComponentKind) -> &[Component] {
        match kind {
            ComponentKind::Container => &self.containers,
            ComponentKind::Volume => &self.volumes,
            ComponentKind::Directory => &self.directories,
            ComponentKind::ConfigFile => &self.config_files,
            ComponentKind::Package => &self.packages,
        }
    }

    fn group_mut(&mut self, kind: ComponentKind) -> &mut Vec<Component> {
        match kind {
            ComponentKind::Container => &mut self.containers,
            ComponentKind::Volume => &mut self.volumes,
            ComponentKind::Directory => &mut self.directories,
            ComponentKind::ConfigFile => &mut self.config_files,
            ComponentKind::Package => &mut self.packages,
        }
    }

    pub fn total(&self) -> usize {
        self.counts().total()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn counts(&self) -> ComponentCounts {
        ComponentCounts {
            containers: self.containers.len(),
            volumes: self.volumes.len(),
            directories: self.directories.len(),
            config_files: self.config_files.len(),
            packages: self.packages.len(),
        }
    }

    /// Sum of known component sizes
    pub fn total_size_bytes(&self) -> u64 {
        self.iter().filter_map(|c| c.size_bytes).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.containers
            .iter()
            .chain(self.volumes.iter())
            .chain(self.directories.iter())
            .chain(self.config_files.iter())
            .chain(self.packages.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Component> {
        self.containers
            .iter_mut()
            .chain(self.volumes.iter_mut())
            .chain(self.directories.iter_mut())
            .chain(self.config_files.iter_mut())
            .chain(self.packages.iter_mut())
    }

    pub fn find(&self, kind: ComponentKind, name: &str) -> Option<&Component> {
        self.group(kind).iter().find(|c| c.name == name)
    }

    pub fn find_mut(&mut self, kind: ComponentKind, name: &str) -> Option<&mut Component> {
        self.group_mut(kind).iter_mut().find(|c| c.name == name)
    }

    /// Components that are neither external nor already terminal
    pub fn removable(&self, preserve_external: bool) -> impl Iterator<Item = &Component> {
        self.iter()
            .filter(move |c| !c.is_terminal() && !(preserve_external && c.is_external))
    }
}
