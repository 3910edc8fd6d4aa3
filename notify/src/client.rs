//! Provider client abstraction.

use crate::message::EmailMessage;
use std::future::Future;
use thiserror::Error;

/// Errors returned by a provider client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Connection, TLS or timeout failure before a response arrived
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider answered with a server error or throttling status
    #[error("Provider unavailable ({status}): {body}")]
    Unavailable {
        /// Status code (5xx or 429, or an SMTP 4xx reply code)
        status: u16,
        /// Response body or reply text
        body: String,
    },

    /// Provider refused the message
    #[error("Provider rejected message ({status}): {body}")]
    Rejected {
        /// Status code (4xx, or an SMTP 5xx reply code)
        status: u16,
        /// Response body or reply text
        body: String,
    },

    /// The message could not be built (bad address, missing field)
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl ClientError {
    /// Whether another attempt may succeed.
    ///
    /// Network failures and provider-side errors are retried; rejections
    /// and malformed messages are not.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Unavailable { .. })
    }
}

/// Sends one message through an external provider.
pub trait NotificationClient: Send + Sync + 'static {
    /// Channel name stored on the booking (`email`).
    fn channel(&self) -> &'static str {
        "email"
    }

    /// Deliver a message.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`]; callers consult [`ClientError::should_retry`].
    fn send(&self, message: &EmailMessage) -> impl Future<Output = Result<(), ClientError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ClientError::Transport("reset".into()).should_retry());
        assert!(
            ClientError::Unavailable {
                status: 503,
                body: String::new()
            }
            .should_retry()
        );
        assert!(
            !ClientError::Rejected {
                status: 400,
                body: String::new()
            }
            .should_retry()
        );
        assert!(!ClientError::InvalidMessage("no recipient".into()).should_retry());
    }
}
