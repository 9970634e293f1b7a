pub mod error;
pub mod execution;
pub mod task_log;

pub use error::{CoreError, CoreErrorKind};
pub use execution::{ExecutionId, ExecutionRecord, ExecutionStatus};
pub use task_log::{NewTaskLogRecord, TaskLogLevel, TaskLogRecord};
