//! HTTP JSON email API client.
//!
//! Posts one JSON document per message to `{api_url}/send` with bearer
//! authentication. Connection failures, timeouts, 5xx and 429 responses are
//! retryable; other 4xx responses are not.

use crate::client::{ClientError, NotificationClient};
use crate::message::EmailMessage;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: Address<'a>,
    to: [Address<'a>; 1],
    subject: &'a str,
    text: &'a str,
}

/// Email API client
#[derive(Clone)]
pub struct HttpEmailClient {
    client: Client,
    api_url: String,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl HttpEmailClient {
    /// Create a client with an explicit timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        from_email: impl Into<String>,
        from_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            from_email: from_email.into(),
            from_name: from_name.into(),
        })
    }

    fn classify(status: StatusCode, body: String) -> ClientError {
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            ClientError::Unavailable {
                status: status.as_u16(),
                body,
            }
        } else {
            ClientError::Rejected {
                status: status.as_u16(),
                body,
            }
        }
    }
}

impl NotificationClient for HttpEmailClient {
    async fn send(&self, message: &EmailMessage) -> Result<(), ClientError> {
        if message.to.trim().is_empty() {
            return Err(ClientError::InvalidMessage("missing recipient".to_string()));
        }

        let request = SendRequest {
            from: Address {
                email: &self.from_email,
                name: Some(&self.from_name),
            },
            to: [Address {
                email: &message.to,
                name: message.to_name.as_deref(),
            }],
            subject: &message.subject,
            text: &message.text_body,
        };

        let response = self
            .client
            .post(format!("{}/send", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(to = %message.to, status = status.as_u16(), "Email accepted by provider");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(Self::classify(status, body))
    }
}
