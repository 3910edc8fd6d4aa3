//! Repository traits for the reservation engine.
//!
//! Persistence is reached through three capabilities:
//!
//! - [`BookingStore`]: unlocked reads, notification bookkeeping and opening a
//!   transaction;
//! - [`BookingTx`]: a transaction-scoped repository whose `lock_*` reads take
//!   row locks held until [`BookingTx::commit`] or [`BookingTx::rollback`];
//! - [`BookingLookup`]: non-locking duplicate checks for the anti-scalping
//!   guard.
//!
//! [`StatusRefresher`] performs the time-driven, set-based status promotions.
//!
//! Dropping a transaction without committing must roll it back.
//!
//! # Lock order
//!
//! Appointment row, then slot rows in [`SlotKey`] order, then the reservation
//! row. Every implementation serialises writers on the same row; there is
//! no in-process mutex standing in for storage-level locks.

use crate::types::{
    AppCode, Appointment, AppointmentId, Booking, BookingCode, NotificationStatus, SlotKey,
    UserId, UserProfile,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::future::Future;
use thiserror::Error;

/// Errors reported at the persistence boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed record does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated (payload names the constraint)
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Deadlock or serialization failure
    #[error("Lock conflict: {0}")]
    LockConflict(String),

    /// Statement or pool acquisition timed out
    #[error("Store operation timed out")]
    Timeout,

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(String),
}

/// Rows changed by one status refresh pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusRefreshCounts {
    /// Appointments promoted `pending -> ongoing`
    pub appointments_started: u64,
    /// Appointments promoted `ongoing -> completed`
    pub appointments_completed: u64,
    /// Bookings promoted `active|confirmed -> ongoing`
    pub bookings_started: u64,
    /// Bookings moved to `expired` (unconfirmed at start, or past their end)
    pub bookings_expired: u64,
}

impl StatusRefreshCounts {
    /// Total rows changed.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.appointments_started
            + self.appointments_completed
            + self.bookings_started
            + self.bookings_expired
    }
}

/// Non-locking duplicate checks used before the reservation transaction.
pub trait BookingLookup: Send + Sync {
    /// Whether a holding booking exists for this appointment and (normalised) email.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn has_holding_booking_for_email(
        &self,
        appointment_id: AppointmentId,
        email: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Whether a holding booking exists for this appointment and device.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn has_holding_booking_for_device(
        &self,
        appointment_id: AppointmentId,
        device_id: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// A transaction-scoped repository.
///
/// `lock_*` methods behave like `SELECT ... FOR UPDATE`: they block while
/// another transaction holds the row and keep the lock until the transaction
/// ends. Writes become visible to others only on commit.
pub trait BookingTx: Send {
    /// Lock an appointment row by public code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn lock_appointment(
        &mut self,
        app_code: &AppCode,
    ) -> impl Future<Output = Result<Option<Appointment>, StoreError>> + Send;

    /// Lock the slot row at `key` (`is_slot = true`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn lock_slot(
        &mut self,
        app_code: &AppCode,
        key: SlotKey,
    ) -> impl Future<Output = Result<Option<Booking>, StoreError>> + Send;

    /// Lock the row carrying `code` (a reservation row or a booked single slot).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn lock_booking(
        &mut self,
        code: &BookingCode,
    ) -> impl Future<Output = Result<Option<Booking>, StoreError>> + Send;

    /// Insert a new appointment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure, [`StoreError::UniqueViolation`] on a code clash.
    fn insert_appointment(
        &mut self,
        appointment: &Appointment,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persist changes to a locked appointment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    fn update_appointment(
        &mut self,
        appointment: &Appointment,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Insert slot or reservation rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] when a slot key, booking code or
    /// anti-scalping index would be duplicated.
    fn insert_bookings(
        &mut self,
        bookings: &[Booking],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persist changes to a locked slot or reservation row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] when an anti-scalping index
    /// would be duplicated.
    fn update_booking(
        &mut self,
        booking: &Booking,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Set every holding booking of an appointment to `canceled`; returns the row count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    fn cancel_holding_bookings(
        &mut self,
        appointment_id: AppointmentId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Make every write visible and release all locks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the commit fails; nothing is applied then.
    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Discard every write and release all locks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the rollback fails.
    fn rollback(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Entry point to persistence for the engine.
pub trait BookingStore: BookingLookup + Clone + Send + Sync + 'static {
    /// Transaction type
    type Tx: BookingTx + 'static;

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when no connection is available.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, StoreError>> + Send;

    /// Unlocked appointment read.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn find_appointment(
        &self,
        app_code: &AppCode,
    ) -> impl Future<Output = Result<Option<Appointment>, StoreError>> + Send;

    /// Unlocked read of the row carrying `code`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn find_booking(
        &self,
        code: &BookingCode,
    ) -> impl Future<Output = Result<Option<Booking>, StoreError>> + Send;

    /// Every slot and reservation row of an appointment, ordered by date and start time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn list_bookings(
        &self,
        app_code: &AppCode,
    ) -> impl Future<Output = Result<Vec<Booking>, StoreError>> + Send;

    /// Resolve a registered user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn find_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<UserProfile>, StoreError>> + Send;

    /// Record the outcome of asynchronous delivery for a booking.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no row carries `code`.
    fn set_notification_status(
        &self,
        code: &BookingCode,
        status: NotificationStatus,
        channel: Option<&str>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Bulk, idempotent time-driven status promotion.
pub trait StatusRefresher: Send + Sync + 'static {
    /// Apply every promotion due at `now` in set-based statements.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any statement fails.
    fn refresh_statuses(
        &self,
        now: NaiveDateTime,
    ) -> impl Future<Output = Result<StatusRefreshCounts, StoreError>> + Send;
}
