//! # Slotbook Core
//!
//! Domain model and pure rules for the Slotbook reservation engine.
//!
//! Owners publish **appointments** (single, group or party); guests and
//! registered users reserve capacity against them. This crate holds
//! everything that does not perform I/O:
//!
//! - [`types`]: appointments, slot/reservation rows, statuses, public codes
//! - [`ledger`]: saturating seat accounting on locked rows
//! - [`transitions`]: data-driven status allow-lists
//! - [`slots`]: slot fan-out for new appointments
//! - [`error`]: the error taxonomy and stable machine codes
//! - [`event`] and [`event_bus`]: domain events and synchronous fan-out
//! - [`store`]: repository traits implemented by the persistence crates
//! - [`environment`]: injected clock
//!
//! ## Architecture Principles
//!
//! - Capacity checks happen only on rows held under a row lock
//! - Booking codes are generated once and never regenerated
//! - Terminal statuses admit no further transition
//! - Dependencies (store, clock, token verifier) are injected, never global

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod error;
pub mod event;
pub mod event_bus;
pub mod ledger;
pub mod slots;
pub mod store;
pub mod transitions;
pub mod types;

pub use error::{BookingError, DuplicateReason, ErrorKind, FieldError};
pub use event::{DomainEvent, EventName, EventSubject, Recipient};
pub use event_bus::{EventBus, EventBusError, EventHandler, HandlerError};
pub use store::{
    BookingLookup, BookingStore, BookingTx, StatusRefreshCounts, StatusRefresher, StoreError,
};
pub use transitions::TransitionTable;

/// Environment module - injected dependencies
///
/// Time is read through [`Clock`](environment::Clock) so tests can pin or
/// advance it.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
