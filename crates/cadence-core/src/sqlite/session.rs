use std::path::Path;

use rusqlite::types::ToSql;
use rusqlite::{Connection, Params, Transaction};

use crate::sqlite::store::open_connection;

/// A unit of work against one database. Dropping a session without
/// committing rolls it back, which covers early returns and unwinding.
pub struct Session<'conn> {
    transaction: Transaction<'conn>,
}

/// Runs `operation` inside a fresh transaction: commit when it returns `Ok`,
/// roll back when it returns `Err` or panics. The connection is closed on
/// every path.
pub fn scoped_session<T, E>(
    database_path: &Path,
    operation: impl FnOnce(&mut Session<'_>) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<rusqlite::Error>,
{
    let mut connection = open_connection(database_path)?;
    let mut session = Session {
        transaction: connection.transaction()?,
    };
    let value = operation(&mut session)?;
    session.transaction.commit()?;
    Ok(value)
}

impl Session<'_> {
    pub fn connection(&self) -> &Connection {
        &self.transaction
    }

    pub fn execute(&self, sql: &str, params: impl Params) -> rusqlite::Result<usize> {
        self.transaction.execute(sql, params)
    }

    /// Inserts one row and returns its rowid.
    pub fn add(
        &self,
        table: &str,
        columns: &[&str],
        values: &[&dyn ToSql],
    ) -> rusqlite::Result<i64> {
        check_arity(columns, values)?;
        self.transaction.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_identifier(table),
                column_list(columns),
                placeholders(values.len())
            ),
            values,
        )?;
        Ok(self.transaction.last_insert_rowid())
    }

    /// Inserts a row, or updates the non-key columns of the row whose
    /// `key_columns` match. The table needs a unique index over those keys.
    pub fn merge(
        &self,
        table: &str,
        key_columns: &[&str],
        columns: &[&str],
        values: &[&dyn ToSql],
    ) -> rusqlite::Result<usize> {
        check_arity(columns, values)?;
        let updates = columns
            .iter()
            .filter(|column| !key_columns.contains(*column))
            .map(|column| {
                let column = quote_identifier(column);
                format!("{column} = excluded.{column}")
            })
            .collect::<Vec<_>>();
        let on_conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        self.transaction.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {on_conflict}",
                quote_identifier(table),
                column_list(columns),
                placeholders(values.len()),
                column_list(key_columns)
            ),
            values,
        )
    }

    pub fn delete_all(&self, table: &str) -> rusqlite::Result<usize> {
        self.transaction
            .execute(&format!("DELETE FROM {}", quote_identifier(table)), [])
    }
}

fn check_arity(columns: &[&str], values: &[&dyn ToSql]) -> rusqlite::Result<()> {
    if columns.len() != values.len() {
        return Err(rusqlite::Error::InvalidParameterCount(
            values.len(),
            columns.len(),
        ));
    }
    Ok(())
}

fn column_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

pub(crate) fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::{placeholders, quote_identifier};

    #[test]
    fn identifiers_are_quoted_and_escaped() {
        assert_eq!(quote_identifier("etl_task"), "\"etl_task\"");
        assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn placeholders_are_numbered_from_one() {
        assert_eq!(placeholders(3), "?1, ?2, ?3");
        assert_eq!(placeholders(0), "");
    }
}
