use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{TimeZone, Utc};

use cadence_core::models::{CoreErrorKind, ExecutionStatus};
use cadence_core::persistence::{ExecutionStore, MigrationStore};
use cadence_core::sqlite::{SqliteStore, current_schema_version, migration, migrations};

fn test_db_path(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("cadence-{test_name}-{nanos}.sqlite3"))
}

#[test]
fn migration_versions_are_strictly_increasing() {
    let entries = migrations();
    assert!(!entries.is_empty());

    let mut previous = 0;
    for entry in entries {
        assert!(entry.version > previous);
        previous = entry.version;
    }
}

#[test]
fn migration_lookup_and_schema_version_are_consistent() {
    let latest = current_schema_version();
    let latest_entry = migration(latest).unwrap();
    assert_eq!(latest_entry.version, latest);
    assert!(migration(latest + 1).is_none());
}

#[test]
fn migration_sql_is_defined_for_up_and_down_paths() {
    for entry in migrations() {
        assert!(!entry.up_sql.trim().is_empty(), "up sql must not be empty");
        assert!(
            !entry.down_sql.trim().is_empty(),
            "down sql must not be empty"
        );
    }
}

#[test]
fn planned_migrations_start_after_requested_version() {
    let store = SqliteStore::new(test_db_path("planned"));
    let planned = store.planned_migrations(1);

    assert_eq!(planned.len() as i64, current_schema_version() - 1);
    assert_eq!(planned[0].version, 2);
}

#[test]
fn migrating_up_down_and_up_again_round_trips_the_schema() {
    let path = test_db_path("migrate-cycle");
    let store = SqliteStore::new(&path);
    assert_eq!(store.current_version().unwrap(), 0);

    store.migrate_to_latest().unwrap();
    assert_eq!(store.current_version().unwrap(), current_schema_version());

    store.apply_migration(2).unwrap();
    assert_eq!(store.current_version().unwrap(), 2);

    store.apply_migration(0).unwrap();
    assert_eq!(store.current_version().unwrap(), 0);

    store.migrate_to_latest().unwrap();
    store.migrate_to_latest().unwrap();
    assert_eq!(store.current_version().unwrap(), current_schema_version());

    let _ = std::fs::remove_file(path);
}

#[test]
fn out_of_range_targets_are_storage_errors() {
    let store = SqliteStore::new(test_db_path("bad-target"));

    let error = store
        .apply_migration(current_schema_version() + 1)
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::StorageFailure);

    let error = store.apply_migration(-1).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::StorageFailure);
}

#[test]
fn replaying_migrations_keeps_recorded_statuses() {
    let path = test_db_path("status-replay");
    let store = SqliteStore::new(&path);
    store.migrate_to_latest().unwrap();

    let started_at = Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap();
    let failed = store.create_execution("Sales Export", started_at).unwrap();
    store
        .finish_execution(failed.id, ExecutionStatus::Failed, started_at)
        .unwrap();
    let unfinished = store.create_execution("Payroll Export", started_at).unwrap();

    store.migrate_to_latest().unwrap();

    let failed = store.execution(failed.id).unwrap().unwrap();
    assert_eq!(failed.status, ExecutionStatus::Failed);
    assert!(failed.ended_at.is_some());
    let unfinished = store.execution(unfinished.id).unwrap().unwrap();
    assert_eq!(unfinished.status, ExecutionStatus::Running);

    let _ = std::fs::remove_file(path);
}

#[test]
fn adding_the_status_column_marks_finished_history_completed() {
    let path = test_db_path("status-backfill");
    let store = SqliteStore::new(&path);
    store.migrate_to_latest().unwrap();

    let started_at = Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap();
    let finished = store.create_execution("Sales Export", started_at).unwrap();
    store
        .finish_execution(finished.id, ExecutionStatus::Failed, started_at)
        .unwrap();
    let interrupted = store.create_execution("Payroll Export", started_at).unwrap();

    store.apply_migration(3).unwrap();
    store.migrate_to_latest().unwrap();

    let finished = store.execution(finished.id).unwrap().unwrap();
    assert_eq!(finished.status, ExecutionStatus::Completed);
    let interrupted = store.execution(interrupted.id).unwrap().unwrap();
    assert_eq!(interrupted.status, ExecutionStatus::Running);
    assert!(interrupted.ended_at.is_none());

    let _ = std::fs::remove_file(path);
}
