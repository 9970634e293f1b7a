use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::models::{
    CoreError, CoreErrorKind, ExecutionId, ExecutionRecord, ExecutionStatus, NewTaskLogRecord,
    TaskLogRecord,
};
use crate::persistence::{ExecutionStore, PersistenceResult};

#[derive(Default)]
pub struct InMemoryExecutionStore {
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    executions: Vec<ExecutionRecord>,
    logs: Vec<TaskLogRecord>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executions(&self) -> PersistenceResult<Vec<ExecutionRecord>> {
        Ok(self.lock_state()?.executions.clone())
    }

    fn lock_state(&self) -> PersistenceResult<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|_| {
            CoreError::new(
                CoreErrorKind::Internal,
                "execution store mutex poisoned",
            )
        })
    }
}

impl ExecutionStore for InMemoryExecutionStore {
    fn create_execution(
        &self,
        name: &str,
        started_at: DateTime<Utc>,
    ) -> PersistenceResult<ExecutionRecord> {
        let mut state = self.lock_state()?;
        let record = ExecutionRecord {
            id: ExecutionId(state.executions.len() as i64 + 1),
            name: name.to_string(),
            started_at,
            ended_at: None,
            status: ExecutionStatus::Running,
        };
        state.executions.push(record.clone());
        Ok(record)
    }

    fn finish_execution(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        ended_at: DateTime<Utc>,
    ) -> PersistenceResult<ExecutionRecord> {
        let mut state = self.lock_state()?;
        let record = state
            .executions
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or_else(|| unknown_execution(id))?;

        if record.status.is_terminal() || !status.is_terminal() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!(
                    "execution {} cannot move from '{}' to '{}'",
                    id.0,
                    record.status.as_str(),
                    status.as_str()
                ),
            ));
        }

        record.status = status;
        record.ended_at = Some(ended_at);
        Ok(record.clone())
    }

    fn append_log(&self, entry: &NewTaskLogRecord) -> PersistenceResult<TaskLogRecord> {
        let mut state = self.lock_state()?;
        if !state
            .executions
            .iter()
            .any(|record| record.id == entry.execution_id)
        {
            return Err(unknown_execution(entry.execution_id));
        }

        let record = TaskLogRecord {
            id: state.logs.len() as i64 + 1,
            execution_id: entry.execution_id,
            created_at: entry.created_at,
            level: entry.level,
            message: entry.message.clone(),
            attachment: entry.attachment.clone(),
        };
        state.logs.push(record.clone());
        Ok(record)
    }

    fn execution(&self, id: ExecutionId) -> PersistenceResult<Option<ExecutionRecord>> {
        let state = self.lock_state()?;
        Ok(state
            .executions
            .iter()
            .find(|record| record.id == id)
            .cloned())
    }

    fn list_recent_executions(&self, limit: usize) -> PersistenceResult<Vec<ExecutionRecord>> {
        let state = self.lock_state()?;
        Ok(state.executions.iter().rev().take(limit).cloned().collect())
    }

    fn list_logs(&self, id: ExecutionId) -> PersistenceResult<Vec<TaskLogRecord>> {
        let state = self.lock_state()?;
        Ok(state
            .logs
            .iter()
            .filter(|log| log.execution_id == id)
            .cloned()
            .collect())
    }
}

fn unknown_execution(id: ExecutionId) -> CoreError {
    CoreError::new(
        CoreErrorKind::InvalidInput,
        format!("execution {} was not found", id.0),
    )
}
