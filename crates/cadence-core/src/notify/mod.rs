pub mod smtp;

pub use smtp::{SmtpNotifier, SmtpSettings};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build failure message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("invalid attachment content type: {0}")]
    ContentType(#[from] lettre::message::header::ContentTypeErr),
    #[error("smtp delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("notification rejected: {0}")]
    Rejected(String),
}

pub trait FailureNotifier: Send + Sync {
    fn notify_failure(
        &self,
        task_name: &str,
        error_text: &str,
        screenshot: Option<&[u8]>,
    ) -> Result<(), NotifyError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl FailureNotifier for LogNotifier {
    fn notify_failure(
        &self,
        task_name: &str,
        error_text: &str,
        screenshot: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        tracing::error!(
            task = task_name,
            screenshot_bytes = screenshot.map(<[u8]>::len),
            "task failed\n{error_text}"
        );
        Ok(())
    }
}
