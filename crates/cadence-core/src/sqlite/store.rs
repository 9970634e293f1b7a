use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{
    CoreError, CoreErrorKind, ExecutionId, ExecutionRecord, ExecutionStatus, NewTaskLogRecord,
    TaskLogLevel, TaskLogRecord,
};
use crate::persistence::{ExecutionStore, MigrationStore, PersistenceResult};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "cadence_schema_migrations";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_EXECUTION: &str = "
SELECT id, name, start_datetime, end_datetime, status
FROM etl_task
";

pub struct SqliteStore {
    database_path: PathBuf,
}

impl SqliteStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error))
    }
}

impl MigrationStore for SqliteStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version == current_version {
                // Recorded version may outlive dropped tables; replay the DDL.
                for version in 1..=target_version {
                    execute_batch_tolerant(connection, defined_migration(version)?.up_sql)?;
                }
                return Ok(());
            }

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    apply_up_migration(connection, defined_migration(version)?)?;
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    apply_down_migration(connection, defined_migration(version)?)?;
                }
            }

            Ok(())
        })
    }
}

impl ExecutionStore for SqliteStore {
    fn create_execution(
        &self,
        name: &str,
        started_at: DateTime<Utc>,
    ) -> PersistenceResult<ExecutionRecord> {
        self.with_connection("create_execution", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            transaction.execute(
                "
INSERT INTO etl_task (name, start_datetime, end_datetime, status)
VALUES (?1, ?2, NULL, ?3)
",
                params![
                    name,
                    timestamp_to_sql(started_at),
                    ExecutionStatus::Running.as_str()
                ],
            )?;
            let id = ExecutionId(transaction.last_insert_rowid());
            transaction.commit()?;

            Ok(ExecutionRecord {
                id,
                name: name.to_string(),
                started_at,
                ended_at: None,
                status: ExecutionStatus::Running,
            })
        })
    }

    fn finish_execution(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        ended_at: DateTime<Utc>,
    ) -> PersistenceResult<ExecutionRecord> {
        if !status.is_terminal() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("'{}' is not a terminal execution status", status.as_str()),
            ));
        }

        self.with_connection("finish_execution", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            let updated = transaction.execute(
                "
UPDATE etl_task
SET end_datetime = ?2, status = ?3
WHERE id = ?1 AND status = 'running'
",
                params![id.0, timestamp_to_sql(ended_at), status.as_str()],
            )?;
            if updated == 0 {
                return Err(storage_error_sqlite(&format!(
                    "execution {} was not found or is already finished",
                    id.0
                )));
            }

            let record = transaction.query_row(
                &format!("{SELECT_EXECUTION} WHERE id = ?1"),
                [id.0],
                execution_from_row,
            )?;
            transaction.commit()?;
            Ok(record)
        })
    }

    fn append_log(&self, entry: &NewTaskLogRecord) -> PersistenceResult<TaskLogRecord> {
        self.with_connection("append_log", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            transaction.execute(
                "
INSERT INTO etl_task_message (
    etl_task_id, message_datetime, message_type, message, attachment
) VALUES (?1, ?2, ?3, ?4, ?5)
",
                params![
                    entry.execution_id.0,
                    timestamp_to_sql(entry.created_at),
                    entry.level.as_str(),
                    entry.message.as_str(),
                    entry.attachment.as_deref(),
                ],
            )?;
            let id = transaction.last_insert_rowid();
            transaction.commit()?;

            Ok(TaskLogRecord {
                id,
                execution_id: entry.execution_id,
                created_at: entry.created_at,
                level: entry.level,
                message: entry.message.clone(),
                attachment: entry.attachment.clone(),
            })
        })
    }

    fn execution(&self, id: ExecutionId) -> PersistenceResult<Option<ExecutionRecord>> {
        self.with_connection("execution", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    &format!("{SELECT_EXECUTION} WHERE id = ?1"),
                    [id.0],
                    execution_from_row,
                )
                .optional()
        })
    }

    fn list_recent_executions(&self, limit: usize) -> PersistenceResult<Vec<ExecutionRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.with_connection("list_recent_executions", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(&format!(
                "{SELECT_EXECUTION} ORDER BY start_datetime DESC, id DESC LIMIT ?1"
            ))?;
            let rows = statement.query_map(params![to_i64(limit)?], execution_from_row)?;
            rows.collect()
        })
    }

    fn list_logs(&self, id: ExecutionId) -> PersistenceResult<Vec<TaskLogRecord>> {
        self.with_connection("list_logs", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT id, etl_task_id, message_datetime, message_type, message, attachment
FROM etl_task_message
WHERE etl_task_id = ?1
ORDER BY message_datetime ASC, id ASC
",
            )?;
            let rows = statement.query_map([id.0], |row| {
                let created_at_raw: String = row.get(2)?;
                let level_raw: String = row.get(3)?;

                Ok(TaskLogRecord {
                    id: row.get(0)?,
                    execution_id: ExecutionId(row.get(1)?),
                    created_at: timestamp_from_sql(&created_at_raw)?,
                    level: parse_log_level(&level_raw)?,
                    message: row.get(4)?,
                    attachment: row.get(5)?,
                })
            })?;
            rows.collect()
        })
    }
}

pub(crate) fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    let connection = Connection::open(database_path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    Ok(connection)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "
CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
"
    ))
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version < current_schema_version() {
        return Err(storage_error_sqlite(&format!(
            "database schema is at version {version}; apply migrations before recording executions"
        )));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version).ok_or_else(|| {
        storage_error_sqlite(&format!("migration version '{version}' is not defined"))
    })
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    execute_batch_tolerant(&transaction, migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()
}

/// `ALTER TABLE ADD COLUMN` is not idempotent in SQLite, so replays tolerate
/// "duplicate column name".
fn execute_batch_tolerant(connection: &Connection, sql: &str) -> rusqlite::Result<()> {
    match connection.execute_batch(sql) {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("duplicate column name") => Ok(()),
        Err(e) => Err(e),
    }
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()
}

fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    let started_at_raw: String = row.get(2)?;
    let ended_at_raw: Option<String> = row.get(3)?;
    let status_raw: String = row.get(4)?;

    Ok(ExecutionRecord {
        id: ExecutionId(row.get(0)?),
        name: row.get(1)?,
        started_at: timestamp_from_sql(&started_at_raw)?,
        ended_at: ended_at_raw
            .as_deref()
            .map(timestamp_from_sql)
            .transpose()?,
        status: parse_execution_status(&status_raw)?,
    })
}

fn parse_execution_status(raw: &str) -> rusqlite::Result<ExecutionStatus> {
    match raw {
        "running" => Ok(ExecutionStatus::Running),
        "completed" => Ok(ExecutionStatus::Completed),
        "failed" => Ok(ExecutionStatus::Failed),
        _ => Err(storage_error_sqlite(&format!(
            "unknown execution status '{raw}' in sqlite record"
        ))),
    }
}

fn parse_log_level(raw: &str) -> rusqlite::Result<TaskLogLevel> {
    match raw {
        "INFO" => Ok(TaskLogLevel::Info),
        "WARN" | "WARNING" => Ok(TaskLogLevel::Warn),
        "ERROR" => Ok(TaskLogLevel::Error),
        _ => Err(storage_error_sqlite(&format!(
            "unknown message type '{raw}' in sqlite record"
        ))),
    }
}

// Fixed-width UTC text keeps lexical and chronological order identical.
fn timestamp_to_sql(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_from_sql(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            storage_error_sqlite(&format!("invalid timestamp '{raw}' in sqlite record: {error}"))
        })
}

fn to_i64(value: usize) -> rusqlite::Result<i64> {
    i64::try_from(value).map_err(|_| storage_error_sqlite("value exceeds i64 range"))
}

pub(crate) fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
}
