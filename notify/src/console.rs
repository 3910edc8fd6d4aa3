//! Console client for development.

use crate::client::{ClientError, NotificationClient};
use crate::message::EmailMessage;
use tracing::info;

/// Logs messages instead of sending them.
#[derive(Clone, Debug, Default)]
pub struct ConsoleClient;

impl ConsoleClient {
    /// Create a new console client.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl NotificationClient for ConsoleClient {
    async fn send(&self, message: &EmailMessage) -> Result<(), ClientError> {
        if message.to.trim().is_empty() {
            return Err(ClientError::InvalidMessage("missing recipient".to_string()));
        }
        info!(
            to = %message.to_header(),
            subject = %message.subject,
            body = %message.text_body,
            "Email (development mode)"
        );
        Ok(())
    }
}
