use chrono::{DateTime, Utc};

use crate::etl::EtlStep;
use crate::etl::browser::BrowserSession;
use crate::etl::error::{TaskError, TaskResult};
use crate::etl::runner::{RunOutcome, TaskRunner};
use crate::models::{ExecutionId, NewTaskLogRecord, TaskLogLevel};

pub struct TaskContext<'a> {
    runner: &'a TaskRunner,
    execution_id: ExecutionId,
    task_name: &'a str,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(
        runner: &'a TaskRunner,
        execution_id: ExecutionId,
        task_name: &'a str,
    ) -> Self {
        Self {
            runner,
            execution_id,
            task_name,
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn task_name(&self) -> &str {
        self.task_name
    }

    pub fn log(&self, message: impl Into<String>) {
        self.log_with(TaskLogLevel::Info, message, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log_with(TaskLogLevel::Warn, message, None);
    }

    pub fn log_with(
        &self,
        level: TaskLogLevel,
        message: impl Into<String>,
        attachment: Option<String>,
    ) {
        let created_at = self.runner.now();
        self.log_at(created_at, level, message.into(), attachment);
    }

    pub(crate) fn log_at(
        &self,
        created_at: DateTime<Utc>,
        level: TaskLogLevel,
        message: String,
        attachment: Option<String>,
    ) {
        let task = self.task_name;
        let execution_id = self.execution_id.0;
        match level {
            TaskLogLevel::Info => tracing::info!(task, execution_id, "{message}"),
            TaskLogLevel::Warn => tracing::warn!(task, execution_id, "{message}"),
            TaskLogLevel::Error => tracing::error!(task, execution_id, "{message}"),
        }

        let entry = NewTaskLogRecord {
            execution_id: self.execution_id,
            created_at,
            level,
            message,
            attachment,
        };
        if let Err(error) = self.runner.store().append_log(&entry) {
            tracing::warn!(
                task = self.task_name,
                execution_id = self.execution_id.0,
                error = %error,
                "could not persist task log message"
            );
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.runner.cancellation().is_cancelled()
    }

    pub fn check_cancelled(&self) -> TaskResult {
        if self.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        Ok(())
    }

    pub fn browser_session(&self) -> TaskResult<BrowserSession> {
        let provider = self
            .runner
            .browser_sessions()
            .ok_or_else(|| TaskError::failed("no browser session provider is configured"))?;
        let driver = provider.acquire().map_err(|error| {
            TaskError::from(error.context("could not acquire browser session"))
        })?;
        Ok(BrowserSession::new(driver))
    }

    pub fn run_step(&self, step: &mut dyn EtlStep) -> TaskResult<RunOutcome> {
        self.runner.run(step).map_err(TaskError::from)
    }

    pub(crate) fn runner(&self) -> &'a TaskRunner {
        self.runner
    }
}
