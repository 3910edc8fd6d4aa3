//! # Slotbook Testing
//!
//! Testing utilities and helpers for the Slotbook workspace.
//!
//! This crate provides:
//! - [`InMemoryBookingStore`]: a store with real row-lock and rollback semantics
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`MockNotificationClient`] and [`RecordingHandler`]
//! - [`fixtures`] for appointments and booking requests
//!
//! ## Example
//!
//! ```ignore
//! use slotbook_testing::{InMemoryBookingStore, fixtures, test_clock};
//!
//! #[tokio::test]
//! async fn books_a_group_slot() {
//!     let store = InMemoryBookingStore::new();
//!     let engine = SlotReservationEngine::new(store.clone(), Arc::new(test_clock()), ..);
//!     let booking = engine
//!         .book_appointment(fixtures::guest_request(&code, date, time, 2, "a@example.com"), BookerIdentity::Guest)
//!         .await?;
//!     assert_eq!(store.slot(&code, booking.key()).unwrap().seats_booked, 2);
//! }
//! ```

use chrono::{DateTime, Utc};
use slotbook_core::environment::Clock;

pub mod fixtures;
pub mod store;

/// Mock implementations of injected dependencies.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use slotbook_core::event::{DomainEvent, EventName};
    use slotbook_core::event_bus::{EventHandler, HandlerError};
    use slotbook_notify::{ClientError, EmailMessage, NotificationClient};
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use slotbook_testing::mocks::FixedClock;
    /// use slotbook_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that only moves when told to.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Jump to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }

        /// Move forward by `by`.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Notification client with scripted results.
    ///
    /// Each call pops the next scripted result; an empty script succeeds.
    /// Clones share the script and the record of sent messages.
    #[derive(Clone, Default)]
    pub struct MockNotificationClient {
        script: Arc<Mutex<VecDeque<Result<(), ClientError>>>>,
        sent: Arc<Mutex<Vec<EmailMessage>>>,
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl MockNotificationClient {
        /// Client that accepts everything
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail the next `n` calls with `error`.
        #[must_use]
        pub fn failing(self, n: usize, error: &ClientError) -> Self {
            {
                let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
                script.extend(std::iter::repeat_n(Err(error.clone()), n));
            }
            self
        }

        /// Sleep for `delay` inside every call.
        #[must_use]
        pub const fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Number of `send` calls so far, including failed ones.
        #[must_use]
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Messages accepted so far.
        #[must_use]
        pub fn sent(&self) -> Vec<EmailMessage> {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl NotificationClient for MockNotificationClient {
        fn channel(&self) -> &'static str {
            "mock"
        }

        async fn send(&self, message: &EmailMessage) -> Result<(), ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self
                .script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .unwrap_or(Ok(()));
            if next.is_ok() {
                self.sent
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(message.clone());
            }
            next
        }
    }

    /// Event handler that records every event it sees.
    #[derive(Default)]
    pub struct RecordingHandler {
        events: Mutex<Vec<DomainEvent>>,
        fail_with: Option<String>,
    }

    impl RecordingHandler {
        /// Handler that records and succeeds
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Handler that records and then fails with `message`.
        #[must_use]
        pub fn failing(message: impl Into<String>) -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail_with: Some(message.into()),
            }
        }

        /// Events received so far.
        #[must_use]
        pub fn events(&self) -> Vec<DomainEvent> {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Names of the events received so far, in order.
        #[must_use]
        pub fn names(&self) -> Vec<EventName> {
            self.events().iter().map(|e| e.name).collect()
        }
    }

    impl EventHandler for RecordingHandler {
        fn name(&self) -> &str {
            "recording"
        }

        fn handle<'a>(
            &'a self,
            event: &'a DomainEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
            Box::pin(async move {
                self.events
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(event.clone());
                match &self.fail_with {
                    Some(message) => Err(HandlerError::new(message.clone())),
                    None => Ok(()),
                }
            })
        }
    }
}

/// Install a test-friendly tracing subscriber; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, MockNotificationClient, RecordingHandler, test_clock};
pub use store::InMemoryBookingStore;
