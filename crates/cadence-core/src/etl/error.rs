use std::fmt::{Display, Formatter};

use crate::models::CoreError;

pub type TaskResult<T = ()> = Result<T, TaskError>;

/// Marker for an operator interrupt. Task bodies may return it directly or
/// bury it inside an `anyhow::Error` chain; either way the run is treated as
/// cancelled rather than failed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Cancelled;

impl Display for Cancelled {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("run was cancelled by interrupt")
    }
}

impl std::error::Error for Cancelled {}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("run was cancelled by interrupt")]
    Cancelled,
    #[error(transparent)]
    Failed(#[from] TaskFailure),
}

#[derive(Debug, thiserror::Error)]
#[error("{error:#}")]
pub struct TaskFailure {
    pub error: anyhow::Error,
    pub screenshot: Option<Vec<u8>>,
}

impl TaskError {
    pub fn failed(message: impl Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        anyhow::Error::msg(message).into()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Attaches a PNG screenshot to a failure. Cancellations pass through.
    pub fn with_screenshot(self, png: Vec<u8>) -> Self {
        match self {
            Self::Failed(failure) => Self::Failed(TaskFailure {
                screenshot: Some(png),
                ..failure
            }),
            Self::Cancelled => Self::Cancelled,
        }
    }
}

impl From<Cancelled> for TaskError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(error: anyhow::Error) -> Self {
        if error.chain().any(|cause| cause.is::<Cancelled>()) {
            return Self::Cancelled;
        }
        Self::Failed(TaskFailure {
            error,
            screenshot: None,
        })
    }
}

impl From<rusqlite::Error> for TaskError {
    fn from(error: rusqlite::Error) -> Self {
        anyhow::Error::new(error).into()
    }
}

impl From<std::io::Error> for TaskError {
    fn from(error: std::io::Error) -> Self {
        anyhow::Error::new(error).into()
    }
}

impl From<CoreError> for TaskError {
    fn from(error: CoreError) -> Self {
        anyhow::Error::new(error).into()
    }
}
