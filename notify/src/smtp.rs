//! SMTP client using Lettre.
//!
//! Lettre's blocking transport runs on `spawn_blocking`. A transient (4xx)
//! reply or a connection failure is retryable; a permanent (5xx) reply is not.

use crate::client::{ClientError, NotificationClient};
use crate::message::EmailMessage;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

/// SMTP email client.
///
/// # Examples
///
/// ```ignore
/// let client = SmtpEmailClient::new(
///     "smtp.example.com".to_string(),
///     587,
///     "user".to_string(),
///     "password".to_string(),
///     "noreply@example.com".to_string(),
///     "Slotbook".to_string(),
/// );
/// ```
#[derive(Clone)]
pub struct SmtpEmailClient {
    smtp_server: String,
    smtp_port: u16,
    credentials: Credentials,
    from_email: String,
    from_name: String,
}

impl SmtpEmailClient {
    /// Create a new SMTP client.
    #[must_use]
    pub fn new(
        smtp_server: String,
        smtp_port: u16,
        smtp_username: String,
        smtp_password: String,
        from_email: String,
        from_name: String,
    ) -> Self {
        Self {
            smtp_server,
            smtp_port,
            credentials: Credentials::new(smtp_username, smtp_password),
            from_email,
            from_name,
        }
    }

    fn build_transport(&self) -> Result<SmtpTransport, ClientError> {
        Ok(SmtpTransport::relay(&self.smtp_server)
            .map_err(|e| ClientError::Transport(format!("SMTP relay error: {e}")))?
            .port(self.smtp_port)
            .credentials(self.credentials.clone())
            .build())
    }

    fn build_message(&self, message: &EmailMessage) -> Result<Message, ClientError> {
        let from: Mailbox = format!("{} <{}>", self.from_name, self.from_email)
            .parse()
            .map_err(|e| ClientError::InvalidMessage(format!("Invalid from address: {e}")))?;
        let to: Mailbox = message
            .to_header()
            .parse()
            .map_err(|e| ClientError::InvalidMessage(format!("Invalid to address: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.text_body.clone())
            .map_err(|e| ClientError::InvalidMessage(format!("Failed to build email: {e}")))
    }
}

fn classify(error: &lettre::transport::smtp::Error) -> ClientError {
    let status = error
        .status()
        .and_then(|code| code.to_string().parse::<u16>().ok())
        .unwrap_or(0);
    if error.is_permanent() {
        ClientError::Rejected {
            status,
            body: error.to_string(),
        }
    } else if error.is_transient() {
        ClientError::Unavailable {
            status,
            body: error.to_string(),
        }
    } else {
        ClientError::Transport(error.to_string())
    }
}

impl NotificationClient for SmtpEmailClient {
    async fn send(&self, message: &EmailMessage) -> Result<(), ClientError> {
        let email = self.build_message(message)?;
        let mailer = self.build_transport()?;

        tokio::task::spawn_blocking(move || mailer.send(&email).map_err(|e| classify(&e)))
            .await
            .map_err(|e| ClientError::Transport(format!("Email task failed: {e}")))?
            .map(|_| ())
    }
}
