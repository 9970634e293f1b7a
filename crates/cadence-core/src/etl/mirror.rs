use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params_from_iter};

use crate::etl::context::TaskContext;
use crate::etl::error::{TaskError, TaskResult};
use crate::models::TaskLogLevel;
use crate::sqlite::session::{Session, placeholders, quote_identifier, scoped_session};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MirrorSummary {
    pub rows_by_table: Vec<(String, usize)>,
}

impl MirrorSummary {
    pub fn total_rows(&self) -> usize {
        self.rows_by_table.iter().map(|(_, rows)| rows).sum()
    }
}

/// Copies whole tables from one SQLite database into another by deleting the
/// destination rows and reinserting the source rows. All tables are replaced
/// in one transaction, so readers never see a half-mirrored set.
#[derive(Clone, Debug)]
pub struct TableMirror {
    source: PathBuf,
    destination: PathBuf,
    tables: Vec<String>,
}

impl TableMirror {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            tables: Vec::new(),
        }
    }

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.tables.push(name.into());
        self
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn run(&self, ctx: &TaskContext<'_>) -> TaskResult<MirrorSummary> {
        let source = open_source(&self.source)?;

        scoped_session(&self.destination, |session| -> TaskResult<MirrorSummary> {
            let mut summary = MirrorSummary::default();
            for table in &self.tables {
                ctx.check_cancelled()?;
                ensure_destination_table(&source, session, table, ctx)?;
                session.delete_all(table)?;
                let copied = copy_rows(&source, session, table)?;
                ctx.log(format!("Mirrored {copied} rows into {table}"));
                summary.rows_by_table.push((table.clone(), copied));
            }
            Ok(summary)
        })
    }
}

fn open_source(path: &Path) -> TaskResult<Connection> {
    if !path.exists() {
        return Err(TaskError::failed(format!(
            "source database '{}' does not exist",
            path.display()
        )));
    }
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

fn ensure_destination_table(
    source: &Connection,
    session: &Session<'_>,
    table: &str,
    ctx: &TaskContext<'_>,
) -> TaskResult {
    let exists: bool = session.connection().query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )?;
    if exists {
        return Ok(());
    }

    let ddl: Option<String> = source
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    let Some(ddl) = ddl else {
        return Err(TaskError::failed(format!(
            "table '{table}' does not exist in the source database"
        )));
    };

    session.execute(&ddl, [])?;
    ctx.log_with(
        TaskLogLevel::Info,
        format!("Created destination table {table}"),
        Some(ddl),
    );
    Ok(())
}

fn copy_rows(source: &Connection, session: &Session<'_>, table: &str) -> TaskResult<usize> {
    let mut select = source.prepare(&format!("SELECT * FROM {}", quote_identifier(table)))?;
    let columns = select
        .column_names()
        .into_iter()
        .map(quote_identifier)
        .collect::<Vec<_>>();
    let mut insert = session.connection().prepare(&format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        columns.join(", "),
        placeholders(columns.len())
    ))?;

    let mut rows = select.query([])?;
    let mut copied = 0;
    while let Some(row) = rows.next()? {
        let values = (0..columns.len())
            .map(|index| row.get::<_, Value>(index))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        insert.execute(params_from_iter(values))?;
        copied += 1;
    }
    Ok(copied)
}
