//! Snapshot and rollback behaviour against a real temp directory

mod common;

use common::{state_entering_configuration, FlakyFilesystem};
use docbro_backup::{BackupError, SnapshotManager, SnapshotRequest};
use docbro_core::store::{self, load_json, JsonFileStore, StateStore};
use docbro_core::types::{InstallPhase, InstallationState};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    temp: TempDir,
    store: Arc<JsonFileStore>,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(temp.path().join("state")));
        Self { temp, store }
    }

    fn manager(&self) -> SnapshotManager {
        SnapshotManager::new(self.store.clone(), self.temp.path().join("snapshot-files"))
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.temp.path().join(name)
    }
}

#[test]
fn test_rollback_restores_files_and_state() {
    let fixture = Fixture::new();
    let manager = fixture.manager();

    let settings = fixture.path("settings.yaml");
    fs::write(&settings, "vector-store: sqlite_vec\n").unwrap();
    let projects = fixture.path("projects");

    let state = state_entering_configuration("inst-42");
    store::save_json(
        fixture.store.as_ref(),
        &store::key(store::STATE_NAMESPACE, "inst-42"),
        &state,
    )
    .unwrap();

    let snapshot = manager
        .create_snapshot(
            SnapshotRequest::new(&state, "before configuration")
                .creates(&projects)
                .modifies(&settings)
                .with_profile(json!({"vector_store": "sqlite_vec"})),
        )
        .unwrap();

    // The phase then does its work and fails
    fs::create_dir_all(projects.join("rust-docs")).unwrap();
    fs::write(&settings, "vector-store: qdrant\n").unwrap();
    let mut failed = state.clone();
    failed.mark_error("qdrant unreachable");
    store::save_json(
        fixture.store.as_ref(),
        &store::key(store::STATE_NAMESPACE, "inst-42"),
        &failed,
    )
    .unwrap();

    let report = manager.rollback(&snapshot, false).unwrap();

    assert!(report.is_clean());
    assert_eq!(report.deleted, vec![projects.clone()]);
    assert!(!projects.exists());
    assert_eq!(
        fs::read_to_string(&settings).unwrap(),
        "vector-store: sqlite_vec\n"
    );

    let restored: InstallationState = load_json(
        fixture.store.as_ref(),
        &store::key(store::STATE_NAMESPACE, "inst-42"),
    )
    .unwrap()
    .unwrap();
    assert_eq!(restored, state);
    assert_eq!(restored.current_phase, InstallPhase::Configuration);
    assert!(!restored.error_occurred);

    let profile = fixture
        .store
        .read(&store::key(store::PROFILE_NAMESPACE, "inst-42"))
        .unwrap();
    assert_eq!(profile, Some(json!({"vector_store": "sqlite_vec"})));
}

#[test]
fn test_created_files_already_absent_are_not_failures() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let state = state_entering_configuration("inst-1");

    let snapshot = manager
        .create_snapshot(SnapshotRequest::new(&state, "before").creates(fixture.path("never-made")))
        .unwrap();

    let report = manager.rollback(&snapshot, false).unwrap();
    assert!(report.is_clean());
    assert!(report.deleted.is_empty());
    assert_eq!(report.already_absent, vec![fixture.path("never-made")]);
    assert!(report.state_restored);
}

#[test]
fn test_partial_rollback_collects_failures() {
    let fixture = Fixture::new();
    let flaky = FlakyFilesystem::new();
    let manager = fixture.manager().with_filesystem(Arc::new(flaky.clone()));
    let state = state_entering_configuration("inst-1");

    let locked = fixture.path("locked");
    let loose = fixture.path("loose");
    let snapshot = manager
        .create_snapshot(SnapshotRequest::new(&state, "before").creates(&locked).creates(&loose))
        .unwrap();
    fs::write(&locked, "x").unwrap();
    fs::write(&loose, "y").unwrap();
    flaky.deny_remove(&locked);

    let report = manager.rollback(&snapshot, true).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].contains("locked"));
    assert_eq!(flaky.removed(), vec![loose.clone()]);
    assert!(locked.exists());
    assert!(!loose.exists());
    assert!(report.state_restored);
}

#[test]
fn test_strict_rollback_stops_at_first_failure() {
    let fixture = Fixture::new();
    let flaky = FlakyFilesystem::new();
    let manager = fixture.manager().with_filesystem(Arc::new(flaky.clone()));
    let state = state_entering_configuration("inst-1");

    let first = fixture.path("first");
    let second = fixture.path("second");
    let snapshot = manager
        .create_snapshot(SnapshotRequest::new(&state, "before").creates(&first).creates(&second))
        .unwrap();
    fs::write(&first, "x").unwrap();
    fs::write(&second, "y").unwrap();
    // Created files are removed newest first
    flaky.deny_remove(&second);

    let err = manager.rollback(&snapshot, false).unwrap_err();

    match err {
        BackupError::Rollback { failures, .. } => assert_eq!(failures.len(), 1),
        other => panic!("unexpected error: {other}"),
    }
    assert!(first.exists());
    assert!(flaky.removed().is_empty());
}

#[test]
fn test_snapshot_survives_in_store() {
    let fixture = Fixture::new();
    let state = state_entering_configuration("inst-9");
    let snapshot = fixture
        .manager()
        .create_snapshot(SnapshotRequest::new(&state, "before").with_step("write settings"))
        .unwrap();

    // A fresh manager over the same store sees it
    let loaded = fixture.manager().load(&snapshot.snapshot_id).unwrap();
    assert_eq!(loaded.step.as_deref(), Some("write settings"));
    assert_eq!(loaded.state().unwrap(), state);
}
