use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::ExecutionId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskLogLevel {
    Info,
    Warn,
    Error,
}

impl TaskLogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TaskLogRecord {
    pub id: i64,
    pub execution_id: ExecutionId,
    pub created_at: DateTime<Utc>,
    pub level: TaskLogLevel,
    pub message: String,
    pub attachment: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewTaskLogRecord {
    pub execution_id: ExecutionId,
    pub created_at: DateTime<Utc>,
    pub level: TaskLogLevel,
    pub message: String,
    pub attachment: Option<String>,
}
