//! Property: every plan runs dependencies first and never lowers priority

use docbro_core::types::{Component, Inventory};
use docbro_uninstall::OperationQueueBuilder;
use proptest::prelude::*;
use std::collections::HashSet;

fn inventory_strategy() -> impl Strategy<Value = (Inventory, bool)> {
    (
        prop::collection::vec("[a-z]{1,8}", 0..5),
        prop::collection::vec(("[a-z]{1,8}", any::<bool>()), 0..5),
        prop::collection::vec("[a-z]{1,8}", 0..4),
        prop::collection::vec("[a-z]{1,8}", 0..4),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(containers, volumes, dirs, files, package, preserve)| {
            let mut inventory = Inventory::new();
            for name in dedup(containers) {
                inventory.push(Component::container(format!("docbro-{}", name)));
            }
            let mut seen = HashSet::new();
            for (name, external) in volumes {
                if !seen.insert(name.clone()) {
                    continue;
                }
                let volume = Component::volume(format!("docbro_{}", name));
                inventory.push(if external { volume.external("test") } else { volume });
            }
            for name in dedup(dirs) {
                inventory.push(Component::directory(format!("/data/{}", name)));
            }
            for name in dedup(files) {
                inventory.push(Component::config_file(format!("/conf/{}.yaml", name)));
            }
            if package {
                inventory.push(Component::package("docbro"));
            }
            (inventory, preserve)
        })
}

fn dedup(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names.into_iter().filter(|n| seen.insert(n.clone())).collect()
}

proptest! {
    #[test]
    fn prop_dependencies_precede_dependents((inventory, preserve) in inventory_strategy()) {
        let queue = OperationQueueBuilder::new().build(&inventory, preserve).unwrap();
        let ops = queue.operations();

        for (i, op) in ops.iter().enumerate() {
            for dep in &op.dependencies {
                let pos = ops.iter().position(|o| &o.operation_id == dep);
                prop_assert!(pos.is_some_and(|p| p < i), "{} runs before {}", op.operation_id, dep);
            }
        }
        for pair in ops.windows(2) {
            prop_assert!(pair[0].priority <= pair[1].priority);
        }
    }

    #[test]
    fn prop_preserved_volumes_are_never_planned((inventory, preserve) in inventory_strategy()) {
        let queue = OperationQueueBuilder::new().build(&inventory, preserve).unwrap();
        for name in queue.preserved() {
            prop_assert!(preserve);
            prop_assert!(queue.operations().iter().all(|o| &o.target != name));
        }
        let externals = inventory.volumes.iter().filter(|v| v.is_external).count();
        prop_assert_eq!(queue.preserved().len(), if preserve { externals } else { 0 });
    }
}
