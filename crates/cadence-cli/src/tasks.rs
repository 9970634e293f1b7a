//! Tasks shipped with the `cadence` binary. Deployments add their own
//! registrations here.

use std::path::PathBuf;

use cadence_core::config::Settings;
use cadence_core::etl::{EtlStep, EtlTask, TableMirror, TaskContext, TaskResult};
use cadence_core::models::CoreError;
use cadence_core::registry::TaskRegistry;
use cadence_core::schedule::Recurrence;

const HISTORY_TABLES: [&str; 2] = ["etl_task", "etl_task_message"];

/// Copies the execution history into the reporting database every evening.
pub struct ExecutionHistoryMirror {
    mirror: TableMirror,
}

impl ExecutionHistoryMirror {
    pub fn new(history: impl Into<PathBuf>, reporting: impl Into<PathBuf>) -> Self {
        let mirror = HISTORY_TABLES
            .iter()
            .fold(TableMirror::new(history, reporting), |mirror, table| {
                mirror.table(*table)
            });
        Self { mirror }
    }
}

impl EtlStep for ExecutionHistoryMirror {
    fn do_etl(&mut self, ctx: &TaskContext<'_>) -> TaskResult {
        let summary = self.mirror.run(ctx)?;
        ctx.log(format!("Mirrored {} history rows", summary.total_rows()));
        Ok(())
    }
}

impl EtlTask for ExecutionHistoryMirror {
    fn recurrence(&self) -> Recurrence {
        Recurrence::daily_at(22, 30)
    }
}

pub fn registry(settings: &Settings) -> Result<TaskRegistry, CoreError> {
    let mut registry = TaskRegistry::new();
    if let Some(reporting) = settings.database.reporting_path.clone() {
        let history = settings.database.path.clone();
        registry.register_with(move || {
            ExecutionHistoryMirror::new(history.clone(), reporting.clone())
        })?;
    }
    Ok(registry)
}
