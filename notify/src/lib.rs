//! # Slotbook Notify
//!
//! Asynchronous delivery of booking and appointment notifications.
//!
//! - [`client`]: the provider abstraction and its retry signal
//! - [`console`], [`http`], [`smtp`]: provider clients
//! - [`message`]: email rendering from domain events
//! - [`dispatcher`]: bounded queue, adaptive worker pool, retries and shutdown
//!
//! Delivery is at-least-once with bounded retries. Failures never reach the
//! booking caller; they surface through the [`dispatcher::DeliveryObserver`].

pub mod client;
pub mod console;
pub mod dispatcher;
pub mod http;
pub mod message;
pub mod smtp;

pub use client::{ClientError, NotificationClient};
pub use console::ConsoleClient;
pub use dispatcher::{
    DeliveryObserver, DeliveryOutcome, DispatchError, DispatcherConfig, DispatcherStats,
    NotificationDispatcher, NotificationJob,
};
pub use http::HttpEmailClient;
pub use message::EmailMessage;
pub use smtp::SmtpEmailClient;

/// Provider selected at startup.
#[derive(Clone)]
pub enum EmailClient {
    /// Log only
    Console(ConsoleClient),
    /// JSON email API
    Http(HttpEmailClient),
    /// SMTP relay
    Smtp(SmtpEmailClient),
}

impl NotificationClient for EmailClient {
    async fn send(&self, message: &EmailMessage) -> Result<(), ClientError> {
        match self {
            Self::Console(client) => client.send(message).await,
            Self::Http(client) => client.send(message).await,
            Self::Smtp(client) => client.send(message).await,
        }
    }
}
