use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::{Message, SmtpTransport, Transport};

use crate::notify::{FailureNotifier, NotifyError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub from_address: String,
    pub recipient: String,
}

pub struct SmtpNotifier {
    from: Mailbox,
    to: Mailbox,
    transport: SmtpTransport,
}

impl SmtpNotifier {
    pub fn new(settings: &SmtpSettings) -> Result<Self, NotifyError> {
        Ok(Self {
            from: settings.from_address.parse()?,
            to: settings.recipient.parse()?,
            transport: SmtpTransport::builder_dangerous(settings.server.as_str())
                .port(settings.port)
                .build(),
        })
    }

    pub fn compose(
        &self,
        task_name: &str,
        error_text: &str,
        screenshot: Option<&[u8]>,
    ) -> Result<Message, NotifyError> {
        let builder = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(format!("ETL: Error in {task_name}"));

        let body = SinglePart::plain(error_text.to_string());
        let message = match screenshot {
            Some(png) => {
                let attachment = Attachment::new("screenshot.png".to_string())
                    .body(png.to_vec(), ContentType::parse("image/png")?);
                builder.multipart(MultiPart::mixed().singlepart(body).singlepart(attachment))?
            }
            None => builder.singlepart(body)?,
        };
        Ok(message)
    }
}

impl FailureNotifier for SmtpNotifier {
    fn notify_failure(
        &self,
        task_name: &str,
        error_text: &str,
        screenshot: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        let message = self.compose(task_name, error_text, screenshot)?;
        self.transport.send(&message)?;
        tracing::info!(task = task_name, "failure notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{SmtpNotifier, SmtpSettings};
    use crate::notify::NotifyError;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            server: "mail.internal".to_string(),
            port: 25,
            from_address: "etl@example.com".to_string(),
            recipient: "data-team@example.com".to_string(),
        }
    }

    #[test]
    fn failure_mail_carries_subject_trace_and_screenshot() {
        let notifier = SmtpNotifier::new(&settings()).unwrap();
        let message = notifier
            .compose("Daily Sales Report", "sales export timed out", Some(&[0x89, b'P', b'N', b'G']))
            .unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();

        assert!(raw.contains("Subject: ETL: Error in Daily Sales Report"));
        assert!(raw.contains("sales export timed out"));
        assert!(raw.contains("screenshot.png"));
        assert!(raw.contains("image/png"));
    }

    #[test]
    fn failure_mail_without_screenshot_is_a_single_part() {
        let notifier = SmtpNotifier::new(&settings()).unwrap();
        let message = notifier.compose("Payroll Export", "boom", None).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();

        assert!(!raw.contains("multipart/mixed"));
        assert!(raw.contains("boom"));
    }

    #[test]
    fn malformed_addresses_are_rejected_up_front() {
        let mut broken = settings();
        broken.recipient = "not an address".to_string();
        assert!(matches!(
            SmtpNotifier::new(&broken),
            Err(NotifyError::Address(_))
        ));
    }
}
