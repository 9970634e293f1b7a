use chrono::{DateTime, Utc};

use crate::models::{
    CoreError, ExecutionId, ExecutionRecord, ExecutionStatus, NewTaskLogRecord, TaskLogRecord,
};

pub mod in_memory;

pub use in_memory::InMemoryExecutionStore;

pub type PersistenceResult<T> = Result<T, CoreError>;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

pub trait ExecutionStore: Send + Sync {
    fn create_execution(
        &self,
        name: &str,
        started_at: DateTime<Utc>,
    ) -> PersistenceResult<ExecutionRecord>;

    fn finish_execution(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        ended_at: DateTime<Utc>,
    ) -> PersistenceResult<ExecutionRecord>;

    fn append_log(&self, entry: &NewTaskLogRecord) -> PersistenceResult<TaskLogRecord>;

    fn execution(&self, id: ExecutionId) -> PersistenceResult<Option<ExecutionRecord>>;

    fn list_recent_executions(&self, limit: usize) -> PersistenceResult<Vec<ExecutionRecord>>;

    fn list_logs(&self, id: ExecutionId) -> PersistenceResult<Vec<TaskLogRecord>>;
}
