//! Discovery of every DocBro-owned resource on the host

use docbro_backends::{ContainerBackend, ContainerInfo, Filesystem, PackageManager, VolumeInfo};
use docbro_core::config::{AppSettings, PathsSettings};
use docbro_core::types::{Component, Inventory};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds the uninstall inventory from the container backend, the
/// filesystem and the package manager
pub struct InventoryScanner {
    app: AppSettings,
    paths: PathsSettings,
    containers: Arc<dyn ContainerBackend>,
    packages: Arc<dyn PackageManager>,
    fs: Arc<dyn Filesystem>,
}

impl InventoryScanner {
    pub fn new(
        app: AppSettings,
        paths: PathsSettings,
        containers: Arc<dyn ContainerBackend>,
        packages: Arc<dyn PackageManager>,
        fs: Arc<dyn Filesystem>,
    ) -> Self {
        Self {
            app,
            paths,
            containers,
            packages,
            fs,
        }
    }

    /// Scan all sources; a failing source contributes nothing
    pub async fn scan(&self) -> Inventory {
        let (containers, volumes, package) = tokio::join!(
            self.scan_containers(),
            self.scan_volumes(),
            self.scan_package()
        );

        let mut inventory = Inventory::new();
        for component in containers
            .into_iter()
            .chain(volumes)
            .chain(self.scan_directories())
            .chain(self.scan_config_files())
            .chain(package)
        {
            inventory.push(component);
        }

        let counts = inventory.counts();
        info!(
            containers = counts.containers,
            volumes = counts.volumes,
            directories = counts.directories,
            config_files = counts.config_files,
            packages = counts.packages,
            "inventory scan complete"
        );
        inventory
    }

    fn is_owned(&self, name: &str, labels: &BTreeMap<String, String>) -> bool {
        labels.contains_key(&self.app.ownership_label) || self.app.has_owned_prefix(name)
    }

    async fn scan_containers(&self) -> Vec<Component> {
        let listed = self.containers.list_containers().await;
        listed
            .into_iter()
            .filter(|c| self.is_owned(&c.name, &c.labels))
            .map(|c: ContainerInfo| {
                debug!(container = %c.name, status = %c.status, "found container");
                Component::container(c.name.trim_start_matches('/')).with_labels(c.labels)
            })
            .collect()
    }

    async fn scan_volumes(&self) -> Vec<Component> {
        let listed = self.containers.list_volumes().await;
        listed
            .into_iter()
            .filter(|v| self.is_owned(&v.name, &v.labels))
            .map(|v| {
                let reason = external_reason(&self.app, &v);
                let mut component = Component::volume(&v.name).with_labels(v.labels);
                if let Some(mountpoint) = v.mountpoint {
                    component = component.with_mountpoint(mountpoint);
                }
                match reason {
                    Some(reason) => {
                        debug!(volume = %component.name, %reason, "volume is external");
                        component.external(reason)
                    }
                    None => component,
                }
            })
            .collect()
    }

    fn scan_directories(&self) -> Vec<Component> {
        self.paths
            .removable_dirs()
            .into_iter()
            .filter(|dir| self.fs.is_dir(dir))
            .map(|dir| {
                let component = Component::directory(&dir);
                match self.sized(&dir) {
                    Some(size) => component.with_size(size),
                    None => component,
                }
            })
            .collect()
    }

    fn scan_config_files(&self) -> Vec<Component> {
        let mut seen = Vec::new();
        let mut found = Vec::new();
        for file in &self.paths.config_files {
            if seen.contains(file) || !self.fs.exists(file) || self.fs.is_dir(file) {
                continue;
            }
            seen.push(file.clone());
            let component = Component::config_file(file);
            found.push(match self.sized(file) {
                Some(size) => component.with_size(size),
                None => component,
            });
        }
        found
    }

    fn sized(&self, path: &Path) -> Option<u64> {
        match self.fs.size_of(path) {
            Ok(size) => Some(size),
            Err(e) => {
                warn!("Could not size {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn scan_package(&self) -> Option<Component> {
        let name = &self.app.package_name;
        if self.packages.is_installed(name).await {
            debug!(package = %name, manager = self.packages.name(), "package installed");
            Some(Component::package(name))
        } else {
            None
        }
    }
}

/// Why a volume counts as external, if it does
///
/// An explicit `true`/`false` label decides outright; otherwise a mount
/// point outside the managed prefix, then the volume name.
pub fn external_reason(app: &AppSettings, volume: &VolumeInfo) -> Option<String> {
    if let Some(value) = volume.labels.get(&app.external_label) {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" => return Some(format!("label {}=true", app.external_label)),
            "false" => return None,
            other => warn!(
                volume = %volume.name,
                "ignoring label {}={}",
                app.external_label,
                other
            ),
        }
    }

    if let Some(mountpoint) = volume.mountpoint.as_deref() {
        if !mountpoint.is_empty()
            && !Path::new(mountpoint).starts_with(&app.managed_volume_prefix)
        {
            return Some(format!("mounted outside {}", app.managed_volume_prefix));
        }
    }

    let name = volume.name.to_ascii_lowercase();
    if name.contains("external") || name.contains("shared") {
        return Some("name marks it as shared".to_string());
    }
    None
}
