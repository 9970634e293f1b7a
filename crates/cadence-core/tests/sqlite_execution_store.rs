use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use cadence_core::models::{CoreErrorKind, ExecutionStatus, NewTaskLogRecord, TaskLogLevel};
use cadence_core::persistence::ExecutionStore;
use cadence_core::sqlite::SqliteStore;

fn test_db_path(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("cadence-{test_name}-{nanos}.sqlite3"))
}

fn migrated_store(test_name: &str) -> SqliteStore {
    let store = SqliteStore::new(test_db_path(test_name));
    store.migrate_to_latest().unwrap();
    store
}

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).single().unwrap() + TimeDelta::seconds(seconds)
}

#[test]
fn execution_lifecycle_round_trips_through_sqlite() {
    let store = migrated_store("lifecycle");

    let created = store.create_execution("Sales Export", at(0)).unwrap();
    assert_eq!(created.status, ExecutionStatus::Running);
    assert_eq!(created.ended_at, None);

    let loaded = store.execution(created.id).unwrap().unwrap();
    assert_eq!(loaded, created);

    let finished = store
        .finish_execution(created.id, ExecutionStatus::Completed, at(45))
        .unwrap();
    assert_eq!(finished.ended_at, Some(at(45)));
    assert_eq!(finished.duration(), Some(TimeDelta::seconds(45)));
    assert_eq!(store.execution(created.id).unwrap(), Some(finished));

    let _ = std::fs::remove_file(store.database_path());
}

#[test]
fn finished_executions_cannot_be_finished_again() {
    let store = migrated_store("finish-twice");
    let created = store.create_execution("Payroll Load", at(0)).unwrap();
    store
        .finish_execution(created.id, ExecutionStatus::Failed, at(3))
        .unwrap();

    let error = store
        .finish_execution(created.id, ExecutionStatus::Completed, at(9))
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::StorageFailure);

    let error = store
        .finish_execution(created.id, ExecutionStatus::Running, at(9))
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidInput);

    let stored = store.execution(created.id).unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Failed);
    assert_eq!(stored.ended_at, Some(at(3)));

    let _ = std::fs::remove_file(store.database_path());
}

#[test]
fn log_messages_keep_order_level_and_attachment() {
    let store = migrated_store("messages");
    let execution = store.create_execution("Vendor Import", at(0)).unwrap();
    let other = store.create_execution("Other Task", at(1)).unwrap();

    for (offset, level, message, attachment) in [
        (2, TaskLogLevel::Info, "connected", None),
        (1, TaskLogLevel::Info, "started", None),
        (
            5,
            TaskLogLevel::Error,
            "failed",
            Some("Traceback: connection refused".to_string()),
        ),
    ] {
        store
            .append_log(&NewTaskLogRecord {
                execution_id: execution.id,
                created_at: at(offset),
                level,
                message: message.to_string(),
                attachment,
            })
            .unwrap();
    }
    store
        .append_log(&NewTaskLogRecord {
            execution_id: other.id,
            created_at: at(2),
            level: TaskLogLevel::Warn,
            message: "unrelated".to_string(),
            attachment: None,
        })
        .unwrap();

    let logs = store.list_logs(execution.id).unwrap();
    let messages: Vec<&str> = logs.iter().map(|log| log.message.as_str()).collect();
    assert_eq!(messages, ["started", "connected", "failed"]);
    assert_eq!(logs[2].level, TaskLogLevel::Error);
    assert_eq!(
        logs[2].attachment.as_deref(),
        Some("Traceback: connection refused")
    );

    let other_logs = store.list_logs(other.id).unwrap();
    assert_eq!(other_logs.len(), 1);
    assert_eq!(other_logs[0].level, TaskLogLevel::Warn);

    let _ = std::fs::remove_file(store.database_path());
}

#[test]
fn recent_executions_are_newest_first_and_limited() {
    let store = migrated_store("recent");
    for (offset, name) in [(0, "First"), (60, "Second"), (120, "Third")] {
        store.create_execution(name, at(offset)).unwrap();
    }

    let recent = store.list_recent_executions(2).unwrap();
    let names: Vec<&str> = recent.iter().map(|record| record.name.as_str()).collect();
    assert_eq!(names, ["Third", "Second"]);
    assert!(store.list_recent_executions(0).unwrap().is_empty());

    let _ = std::fs::remove_file(store.database_path());
}

#[test]
fn operations_require_a_migrated_schema() {
    let store = SqliteStore::new(test_db_path("unmigrated"));
    let error = store.create_execution("Too Early", at(0)).unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::StorageFailure);
    assert!(error.message.contains("apply migrations"));

    let _ = std::fs::remove_file(store.database_path());
}
