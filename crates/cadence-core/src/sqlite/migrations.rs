#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "create_etl_task",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS etl_task (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    start_datetime TEXT NOT NULL,
    end_datetime TEXT
);
"#,
    down_sql: r#"
DROP TABLE IF EXISTS etl_task;
"#,
};

const MIGRATION_0002: SqliteMigration = SqliteMigration {
    version: 2,
    name: "create_etl_task_message",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS etl_task_message (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    etl_task_id INTEGER NOT NULL REFERENCES etl_task (id),
    message_datetime TEXT NOT NULL,
    message_type TEXT NOT NULL,
    message TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_etl_task_message_task
    ON etl_task_message (etl_task_id, message_datetime);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_etl_task_message_task;
DROP TABLE IF EXISTS etl_task_message;
"#,
};

const MIGRATION_0003: SqliteMigration = SqliteMigration {
    version: 3,
    name: "add_etl_task_message_attachment",
    up_sql: r#"
ALTER TABLE etl_task_message ADD COLUMN attachment TEXT;
"#,
    down_sql: r#"
ALTER TABLE etl_task_message DROP COLUMN attachment;
"#,
};

const MIGRATION_0004: SqliteMigration = SqliteMigration {
    version: 4,
    name: "add_etl_task_status",
    up_sql: r#"
ALTER TABLE etl_task ADD COLUMN status TEXT NOT NULL DEFAULT 'running';

UPDATE etl_task SET status = 'completed'
WHERE end_datetime IS NOT NULL AND status = 'running';
"#,
    down_sql: r#"
ALTER TABLE etl_task DROP COLUMN status;
"#,
};

const MIGRATIONS: [SqliteMigration; 4] = [
    MIGRATION_0001,
    MIGRATION_0002,
    MIGRATION_0003,
    MIGRATION_0004,
];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
