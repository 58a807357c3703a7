//! Ordered removal plan derived from an inventory

use docbro_core::types::{
    ComponentKind, ComponentStatus, Inventory, OperationType, RemovalOperation,
    DEFAULT_MAX_RETRIES,
};
use docbro_core::{Error, Result};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Removal operations sorted by priority, plus the volumes left in place
#[derive(Debug, Clone, Default)]
pub struct OperationQueue {
    operations: Vec<RemovalOperation>,
    preserved: Vec<String>,
}

impl OperationQueue {
    pub fn operations(&self) -> &[RemovalOperation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<RemovalOperation> {
        self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// External volumes filtered out of the plan
    pub fn preserved(&self) -> &[String] {
        &self.preserved
    }

    /// Distinct components touched by the plan
    pub fn component_count(&self) -> usize {
        self.operations
            .iter()
            .map(|op| (op.component_kind, op.component_name.as_str()))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Check ids are unique, dependencies exist and form no cycle
    pub fn validate(&self) -> Result<()> {
        let mut index: HashMap<&str, &RemovalOperation> = HashMap::new();
        for op in &self.operations {
            if index.insert(op.operation_id.as_str(), op).is_some() {
                return Err(Error::invariant(format!(
                    "duplicate operation id {}",
                    op.operation_id
                )));
            }
        }
        for op in &self.operations {
            if let Some(missing) = op.dependencies.iter().find(|d| !index.contains_key(d.as_str())) {
                return Err(Error::invariant(format!(
                    "operation {} depends on unknown operation {}",
                    op.operation_id, missing
                )));
            }
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            id: &'a str,
            index: &HashMap<&'a str, &'a RemovalOperation>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<()> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    return Err(Error::invariant(format!(
                        "dependency cycle through operation {}",
                        id
                    )))
                }
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            if let Some(&op) = index.get(id) {
                for dep in &op.dependencies {
                    visit(dep.as_str(), index, marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for op in &self.operations {
            visit(op.operation_id.as_str(), &index, &mut marks)?;
        }
        Ok(())
    }
}

/// Turns an inventory into an [`OperationQueue`]
#[derive(Debug, Clone)]
pub struct OperationQueueBuilder {
    max_retries: u32,
}

impl Default for OperationQueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationQueueBuilder {
    pub fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    fn op(
        &self,
        operation_type: OperationType,
        target: &str,
        kind: ComponentKind,
        name: &str,
    ) -> RemovalOperation {
        RemovalOperation::new(operation_type, target, kind, name).with_max_retries(self.max_retries)
    }

    /// Plan removal of every pending component
    pub fn build(&self, inventory: &Inventory, preserve_external: bool) -> Result<OperationQueue> {
        let pending = |status: ComponentStatus| status == ComponentStatus::Pending;
        let mut operations = Vec::new();
        let mut preserved = Vec::new();

        for container in inventory.containers.iter().filter(|c| pending(c.status())) {
            let stop = self.op(
                OperationType::StopContainer,
                &container.name,
                ComponentKind::Container,
                &container.name,
            );
            let remove = self
                .op(
                    OperationType::RemoveContainer,
                    &container.name,
                    ComponentKind::Container,
                    &container.name,
                )
                .depends_on(stop.operation_id.clone());
            operations.push(stop);
            operations.push(remove);
        }

        for volume in inventory.volumes.iter().filter(|c| pending(c.status())) {
            if preserve_external && volume.is_external {
                debug!(volume = %volume.name, "preserving external volume");
                preserved.push(volume.name.clone());
                continue;
            }
            operations.push(self.op(
                OperationType::RemoveVolume,
                &volume.name,
                ComponentKind::Volume,
                &volume.name,
            ));
        }

        for file in inventory.config_files.iter().filter(|c| pending(c.status())) {
            let target = path_target(file.path.as_deref(), &file.name);
            operations.push(self.op(
                OperationType::DeleteConfig,
                &target,
                ComponentKind::ConfigFile,
                &file.name,
            ));
        }

        for dir in inventory.directories.iter().filter(|c| pending(c.status())) {
            let target = path_target(dir.path.as_deref(), &dir.name);
            operations.push(self.op(
                OperationType::DeleteDirectory,
                &target,
                ComponentKind::Directory,
                &dir.name,
            ));
        }

        if let Some(package) = inventory.packages.iter().find(|c| pending(c.status())) {
            operations.push(self.op(
                OperationType::UninstallPackage,
                &package.name,
                ComponentKind::Package,
                &package.name,
            ));
        }

        // Stable: equal priorities keep discovery order
        operations.sort_by_key(|op| op.priority);

        let queue = OperationQueue {
            operations,
            preserved,
        };
        queue.validate()?;
        debug!(
            operations = queue.len(),
            preserved = queue.preserved.len(),
            "built removal queue"
        );
        Ok(queue)
    }
}

fn path_target(path: Option<&std::path::Path>, fallback: &str) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| fallback.to_string())
}
