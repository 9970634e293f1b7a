use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;

use cadence_core::etl::{
    EtlStep, MirrorSummary, RunOutcome, TableMirror, TaskContext, TaskResult, TaskRunner,
};
use cadence_core::notify::LogNotifier;
use cadence_core::persistence::{ExecutionStore, InMemoryExecutionStore};

fn test_db_path(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("cadence-{test_name}-{nanos}.sqlite3"))
}

fn seed_source(path: &Path) {
    let connection = Connection::open(path).unwrap();
    connection
        .execute_batch(
            "
CREATE TABLE regional_sales (id INTEGER PRIMARY KEY, region TEXT NOT NULL, amount REAL);
INSERT INTO regional_sales (id, region, amount) VALUES (1, 'north', 120.5);
INSERT INTO regional_sales (id, region, amount) VALUES (2, 'south', NULL);
INSERT INTO regional_sales (id, region, amount) VALUES (3, 'east', 87.25);
",
        )
        .unwrap();
}

fn rows(path: &Path) -> Vec<(i64, String, Option<f64>)> {
    let connection = Connection::open(path).unwrap();
    let mut statement = connection
        .prepare("SELECT id, region, amount FROM regional_sales ORDER BY id")
        .unwrap();
    statement
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap()
}

struct SalesMirror {
    mirror: TableMirror,
    summary: Option<MirrorSummary>,
}

impl EtlStep for SalesMirror {
    fn do_etl(&mut self, ctx: &TaskContext<'_>) -> TaskResult {
        self.summary = Some(self.mirror.run(ctx)?);
        Ok(())
    }
}

fn runner(store: &Arc<InMemoryExecutionStore>) -> TaskRunner {
    TaskRunner::new(store.clone(), Arc::new(LogNotifier))
}

#[test]
fn mirror_creates_missing_tables_and_copies_every_row() {
    let source = test_db_path("mirror-source");
    let destination = test_db_path("mirror-destination");
    seed_source(&source);
    let store = Arc::new(InMemoryExecutionStore::new());

    let mut task = SalesMirror {
        mirror: TableMirror::new(&source, &destination).table("regional_sales"),
        summary: None,
    };
    let outcome = runner(&store).run(&mut task).unwrap();

    assert!(outcome.is_completed());
    assert_eq!(task.summary.unwrap().total_rows(), 3);
    assert_eq!(rows(&destination), rows(&source));

    let logs = store.list_logs(outcome.execution().unwrap().id).unwrap();
    let created = logs
        .iter()
        .find(|log| log.message == "Created destination table regional_sales")
        .unwrap();
    assert!(
        created
            .attachment
            .as_deref()
            .unwrap()
            .starts_with("CREATE TABLE regional_sales")
    );

    let _ = std::fs::remove_file(source);
    let _ = std::fs::remove_file(destination);
}

#[test]
fn rerunning_replaces_destination_rows() {
    let source = test_db_path("mirror-rerun-source");
    let destination = test_db_path("mirror-rerun-destination");
    seed_source(&source);
    let store = Arc::new(InMemoryExecutionStore::new());
    let mirror = TableMirror::new(&source, &destination).table("regional_sales");

    let mut task = SalesMirror {
        mirror: mirror.clone(),
        summary: None,
    };
    runner(&store).run(&mut task).unwrap();

    Connection::open(&source)
        .unwrap()
        .execute_batch(
            "
DELETE FROM regional_sales WHERE id = 2;
UPDATE regional_sales SET amount = 99.0 WHERE id = 1;
",
        )
        .unwrap();
    let mut task = SalesMirror {
        mirror,
        summary: None,
    };
    runner(&store).run(&mut task).unwrap();

    assert_eq!(
        rows(&destination),
        [
            (1, "north".to_string(), Some(99.0)),
            (3, "east".to_string(), Some(87.25)),
        ]
    );

    let _ = std::fs::remove_file(source);
    let _ = std::fs::remove_file(destination);
}

#[test]
fn a_missing_source_table_rolls_back_the_whole_mirror() {
    let source = test_db_path("mirror-rollback-source");
    let destination = test_db_path("mirror-rollback-destination");
    seed_source(&source);
    let store = Arc::new(InMemoryExecutionStore::new());

    let mut first = SalesMirror {
        mirror: TableMirror::new(&source, &destination).table("regional_sales"),
        summary: None,
    };
    runner(&store).run(&mut first).unwrap();
    let before = rows(&destination);

    Connection::open(&source)
        .unwrap()
        .execute("DELETE FROM regional_sales", [])
        .unwrap();
    let mut second = SalesMirror {
        mirror: TableMirror::new(&source, &destination)
            .table("regional_sales")
            .table("regional_targets"),
        summary: None,
    };
    let outcome = runner(&store).run(&mut second).unwrap();

    let RunOutcome::Failed { error, .. } = outcome else {
        panic!("expected failure");
    };
    assert!(error.contains("regional_targets"));
    assert_eq!(rows(&destination), before);

    let _ = std::fs::remove_file(source);
    let _ = std::fs::remove_file(destination);
}
