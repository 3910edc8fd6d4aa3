//! Synchronous in-process publish/subscribe.
//!
//! [`EventBus::publish`] awaits every subscribed [`EventHandler`] in
//! registration order on the caller's task. Handler failures are logged and
//! aggregated into [`EventBusError`]; the bus never retries. Back-pressure and
//! delivery retries belong to the notification dispatcher one layer down.
//!
//! Handlers receive every event and filter by [`EventName`](crate::event::EventName)
//! themselves.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut bus = EventBus::new();
//! bus.subscribe(Arc::new(NotificationSubscriber::new(dispatcher, store)));
//! let bus = Arc::new(bus);
//!
//! bus.publish(&event).await?;
//! ```

use crate::event::DomainEvent;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a single handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Create a handler error from any message
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Aggregated handler failures from one publish call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} handler(s) failed for {event}: {}", failures.len(), describe(failures))]
pub struct EventBusError {
    /// Event that was being published
    pub event: String,
    /// `(handler name, error)` pairs in registration order
    pub failures: Vec<(String, HandlerError)>,
}

fn describe(failures: &[(String, HandlerError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A subscriber to domain events.
///
/// Dyn-compatible so handlers of different types can share one bus.
pub trait EventHandler: Send + Sync {
    /// Name used in logs and aggregated errors.
    fn name(&self) -> &str;

    /// React to an event.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the handler could not process the event.
    fn handle<'a>(
        &'a self,
        event: &'a DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;
}

/// In-process event bus.
#[derive(Default, Clone)]
pub struct EventBus {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for every event.
    pub fn subscribe(&mut self, handler: Arc<dyn EventHandler>) {
        tracing::debug!(handler = handler.name(), "Subscribed event handler");
        self.handlers.push(handler);
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Invoke every handler in registration order.
    ///
    /// All handlers run even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError`] listing every handler that failed.
    pub async fn publish(&self, event: &DomainEvent) -> Result<(), EventBusError> {
        let mut failures = Vec::new();
        for handler in &self.handlers {
            if let Err(error) = handler.handle(event).await {
                tracing::warn!(
                    event = %event.name,
                    handler = handler.name(),
                    error = %error,
                    "Event handler failed"
                );
                failures.push((handler.name().to_string(), error));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EventBusError {
                event: event.name.to_string(),
                failures,
            })
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
