//! Glue between domain events, the dispatcher and `notification_status`.

use slotbook_core::event::DomainEvent;
use slotbook_core::event_bus::{EventHandler, HandlerError};
use slotbook_core::store::{BookingStore, StoreError};
use slotbook_core::types::NotificationStatus;
use slotbook_notify::message::render;
use slotbook_notify::{
    DeliveryObserver, DeliveryOutcome, NotificationClient, NotificationDispatcher,
    NotificationJob,
};
use std::future::Future;
use std::pin::Pin;

/// Turns domain events into dispatcher jobs.
///
/// The booking is marked `queued` before the job is enqueued, so a fast
/// worker's `sent` can never be overwritten. A failed enqueue marks it `failed`.
pub struct NotificationSubscriber<S, C: NotificationClient> {
    store: S,
    dispatcher: NotificationDispatcher<C>,
}

impl<S: BookingStore, C: NotificationClient> NotificationSubscriber<S, C> {
    /// Create a subscriber publishing to `dispatcher`.
    pub const fn new(store: S, dispatcher: NotificationDispatcher<C>) -> Self {
        Self { store, dispatcher }
    }

    async fn deliver(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let Some(message) = render(event) else {
            tracing::trace!(event = %event.name, "No notification for event");
            return Ok(());
        };
        let booking_code = event.booking_code().cloned();
        let channel = self.dispatcher.channel();

        if let Some(code) = &booking_code {
            self.store
                .set_notification_status(code, NotificationStatus::Queued, Some(channel))
                .await
                .map_err(|e| HandlerError::new(format!("recording queued status: {e}")))?;
        }

        let job = NotificationJob {
            message,
            event: event.name,
            booking_code,
        };
        let Err(error) = self.dispatcher.publish(job.clone()).await else {
            return Ok(());
        };

        tracing::warn!(event = %event.name, error = %error, "Notification could not be enqueued");
        if let Some(code) = &job.booking_code {
            if let Err(store_error) = self
                .store
                .set_notification_status(code, NotificationStatus::Failed, Some(channel))
                .await
            {
                tracing::warn!(booking_code = %code, error = %store_error, "Recording failed status failed");
            }
        }
        Err(HandlerError::new(error.to_string()))
    }
}

impl<S: BookingStore, C: NotificationClient> EventHandler for NotificationSubscriber<S, C> {
    fn name(&self) -> &str {
        "notifications"
    }

    fn handle<'a>(
        &'a self,
        event: &'a DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(self.deliver(event))
    }
}

/// Records the final delivery outcome on the booking.
pub struct NotificationStatusRecorder<S> {
    store: S,
}

impl<S: BookingStore> NotificationStatusRecorder<S> {
    /// Create a recorder writing through `store`.
    pub const fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: BookingStore> DeliveryObserver for NotificationStatusRecorder<S> {
    fn record<'a>(
        &'a self,
        job: &'a NotificationJob,
        outcome: &'a DeliveryOutcome,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Some(code) = &job.booking_code else {
                return;
            };
            let status = match outcome {
                DeliveryOutcome::Sent { .. } => NotificationStatus::Sent,
                DeliveryOutcome::Failed { .. } => NotificationStatus::Failed,
            };
            let mut result = self.store.set_notification_status(code, status, None).await;
            if matches!(result, Err(StoreError::NotFound(_))) {
                // A reschedule may have moved the code to another row meanwhile.
                tracing::debug!(booking_code = %code, "Booking row moved, retrying status update");
                result = self.store.set_notification_status(code, status, None).await;
            }
            if let Err(error) = result {
                tracing::warn!(booking_code = %code, status = %status, error = %error, "Recording delivery outcome failed");
            }
        })
    }
}
