//! Slot reservation engine.
//!
//! Every operation reads what it needs without locks, then opens one
//! transaction, locks the rows it will mutate and re-checks everything that
//! matters under the lock. Capacity is only ever computed on locked rows.
//!
//! Lock order is appointment, then slots in [`SlotKey`] order, then the
//! reservation row. Events are published after commit; subscriber failures
//! never fail the operation.

use crate::guard::{AntiScalpingGuard, DeviceTokenVerifier};
use chrono::{NaiveDate, NaiveTime};
use slotbook_core::environment::Clock;
use slotbook_core::error::BookingError;
use slotbook_core::event::{DomainEvent, EventName};
use slotbook_core::event_bus::EventBus;
use slotbook_core::ledger;
use slotbook_core::store::{BookingStore, BookingTx};
use slotbook_core::transitions::TransitionTable;
use slotbook_core::types::{
    Appointment, AppointmentType, Booker, BookerIdentity, Booking, BookingCode, BookingRequest,
    BookingStatus, GuestDetails, NotificationStatus, RescheduleRequest, Reservation, SlotKey,
    UserId,
};
use slotbook_runtime::metrics::BookingMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default deadline for one reservation operation.
pub const DEFAULT_RESERVATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a booking should land.
#[derive(Clone, Copy, Debug)]
struct Target {
    key: SlotKey,
    /// Requested end; only party bookings choose their own end.
    end: NaiveTime,
}

/// Commit on success, roll back on failure.
pub(crate) async fn settle<T, X: BookingTx>(
    tx: X,
    result: Result<T, BookingError>,
) -> Result<T, BookingError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "Rollback failed");
            }
            Err(error)
        }
    }
}

fn validation_error(field: &str, message: impl Into<String>) -> BookingError {
    BookingError::invalid(field, message)
}

fn check_guest(guest: Option<&GuestDetails>) -> Result<&GuestDetails, BookingError> {
    let guest = guest.ok_or_else(|| validation_error("guest", "guest details are required"))?;
    let mut fields = Vec::new();
    if guest.name.trim().is_empty() {
        fields.push(slotbook_core::FieldError::new("guest.name", "is required"));
    }
    let email = guest.email.trim();
    if email.is_empty() || !email.contains('@') {
        fields.push(slotbook_core::FieldError::new(
            "guest.email",
            "must be a valid email address",
        ));
    }
    if fields.is_empty() {
        Ok(guest)
    } else {
        Err(BookingError::Validation(fields))
    }
}

/// Per-booking seat rules that do not need a lock.
fn check_attendees(appointment: &Appointment, count: u32) -> Result<(), BookingError> {
    if count == 0 {
        return Err(validation_error("attendee_count", "must be at least 1"));
    }
    match appointment.appointment_type {
        AppointmentType::Single if count != 1 => Err(validation_error(
            "attendee_count",
            "single appointments take exactly one attendee",
        )),
        AppointmentType::Group if count > appointment.max_attendees => Err(validation_error(
            "attendee_count",
            format!("at most {} attendees per booking", appointment.max_attendees),
        )),
        _ => Ok(()),
    }
}

/// Pending again after a confirmed booking moves.
const fn rescheduled_status(status: BookingStatus) -> BookingStatus {
    match status {
        BookingStatus::Confirmed => BookingStatus::Pending,
        other => other,
    }
}

fn reservation_of(row: &Booking) -> Result<&Reservation, BookingError> {
    row.reservation
        .as_ref()
        .ok_or_else(|| BookingError::BookingNotFound(row.id.to_string()))
}

fn reschedulable(code: &BookingCode, status: BookingStatus) -> Result<(), BookingError> {
    if status == BookingStatus::Ongoing {
        return Err(BookingError::BookingOngoing(code.to_string()));
    }
    if status.is_terminal() {
        return Err(BookingError::InvalidTransition {
            entity: "booking",
            from: status.to_string(),
            to: "rescheduled".to_string(),
        });
    }
    Ok(())
}

/// Creates, reschedules, cancels, rejects and confirms reservations.
pub struct SlotReservationEngine<S: BookingStore> {
    store: S,
    guard: Arc<AntiScalpingGuard<S>>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    transitions: Arc<TransitionTable<BookingStatus>>,
    timeout: Duration,
}

impl<S: BookingStore> Clone for SlotReservationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            guard: Arc::clone(&self.guard),
            bus: Arc::clone(&self.bus),
            clock: Arc::clone(&self.clock),
            transitions: Arc::clone(&self.transitions),
            timeout: self.timeout,
        }
    }
}

impl<S: BookingStore> SlotReservationEngine<S> {
    /// Create an engine with the default transition table and deadline.
    pub fn new(
        store: S,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        verifier: Option<Arc<dyn DeviceTokenVerifier>>,
    ) -> Self {
        let guard = Arc::new(AntiScalpingGuard::new(store.clone(), verifier));
        Self {
            store,
            guard,
            bus,
            clock,
            transitions: Arc::new(TransitionTable::booking_default()),
            timeout: DEFAULT_RESERVATION_TIMEOUT,
        }
    }

    /// Replace the booking transition table.
    #[must_use]
    pub fn with_transitions(mut self, transitions: TransitionTable<BookingStatus>) -> Self {
        self.transitions = Arc::new(transitions);
        self
    }

    /// Replace the per-operation deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reserve capacity against an appointment.
    ///
    /// Party bookings take seats from the appointment, group bookings from a
    /// slot (plus a reservation row), single bookings occupy the slot row
    /// itself. Returns the row that carries the new booking code.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] for malformed input or a window outside the appointment
    /// - [`BookingError::AppointmentNotFound`], [`BookingError::UserNotFound`]
    /// - [`BookingError::AppointmentClosed`] when the appointment no longer accepts bookings
    /// - [`BookingError::SlotUnavailable`], [`BookingError::CapacityExceeded`]
    /// - [`BookingError::DuplicateBooking`] and device token errors from the guard
    /// - [`BookingError::Timeout`] when the deadline elapses
    #[tracing::instrument(skip(self, request), fields(app_code = %request.app_code, date = %request.date))]
    pub async fn book_appointment(
        &self,
        request: BookingRequest,
        identity: BookerIdentity,
    ) -> Result<Booking, BookingError> {
        let (appointment, booking) = self
            .within_deadline("book", self.book(request, identity))
            .await?;

        BookingMetrics::record_created(appointment.appointment_type.as_str());
        tracing::info!(
            booking_code = %booking.booking_code().map(ToString::to_string).unwrap_or_default(),
            appointment_type = %appointment.appointment_type,
            "Booking created"
        );
        self.publish(EventName::BookingCreated, &appointment, booking.clone())
            .await;
        Ok(booking)
    }

    /// Move a booking to another slot or window, keeping its code.
    ///
    /// A confirmed booking goes back to `pending`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::BookingNotFound`]
    /// - [`BookingError::BookingOngoing`] for a booking in progress
    /// - [`BookingError::InvalidTransition`] for a terminal booking
    /// - [`BookingError::CapacityExceeded`], [`BookingError::SlotUnavailable`]
    /// - [`BookingError::BookingChanged`] when the booking moved concurrently
    #[tracing::instrument(skip(self, request), fields(booking_code = %code))]
    pub async fn update_booking_by_code(
        &self,
        code: &BookingCode,
        request: RescheduleRequest,
    ) -> Result<Booking, BookingError> {
        let (appointment, booking) = self
            .within_deadline("reschedule", self.reschedule(code, request))
            .await?;

        tracing::info!(date = %booking.date, start_time = %booking.start_time, "Booking rescheduled");
        self.publish(EventName::BookingUpdated, &appointment, booking.clone())
            .await;
        Ok(booking)
    }

    /// Cancel a booking and give its seats back.
    ///
    /// # Errors
    ///
    /// - [`BookingError::BookingNotFound`]
    /// - [`BookingError::InvalidTransition`] when the booking is already terminal
    #[tracing::instrument(skip(self), fields(booking_code = %code))]
    pub async fn cancel_booking_by_code(&self, code: &BookingCode) -> Result<Booking, BookingError> {
        let (appointment, booking) = self
            .within_deadline("cancel", self.release(code, BookingStatus::Canceled, None))
            .await?;

        tracing::info!("Booking cancelled");
        self.publish(EventName::BookingCancelled, &appointment, booking.clone())
            .await;
        Ok(booking)
    }

    /// Reject a booking on behalf of the appointment owner.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Forbidden`] unless `owner_id` owns the appointment
    /// - [`BookingError::BookingNotFound`], [`BookingError::InvalidTransition`]
    #[tracing::instrument(skip(self), fields(booking_code = %code))]
    pub async fn reject_booking(
        &self,
        code: &BookingCode,
        owner_id: UserId,
    ) -> Result<Booking, BookingError> {
        let (appointment, booking) = self
            .within_deadline(
                "reject",
                self.release(code, BookingStatus::Rejected, Some(owner_id)),
            )
            .await?;

        tracing::info!("Booking rejected");
        self.publish(EventName::BookingRejected, &appointment, booking.clone())
            .await;
        Ok(booking)
    }

    /// Confirm a pending booking on behalf of the appointment owner.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Forbidden`] unless `owner_id` owns the appointment
    /// - [`BookingError::InvalidTransition`] unless the booking is `pending`
    #[tracing::instrument(skip(self), fields(booking_code = %code))]
    pub async fn confirm_booking(
        &self,
        code: &BookingCode,
        owner_id: UserId,
    ) -> Result<Booking, BookingError> {
        let (appointment, booking) = self
            .within_deadline("confirm", self.confirm(code, owner_id))
            .await?;

        tracing::info!("Booking confirmed");
        self.publish(EventName::BookingConfirmed, &appointment, booking.clone())
            .await;
        Ok(booking)
    }

    /// Look up the row carrying `code`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::BookingNotFound`] for unknown or malformed codes.
    pub async fn get_booking_by_code(&self, code: &BookingCode) -> Result<Booking, BookingError> {
        if !code.is_well_formed() {
            return Err(BookingError::BookingNotFound(code.to_string()));
        }
        self.find(code).await
    }

    // ------------------------------------------------------------------
    // Operation bodies
    // ------------------------------------------------------------------

    async fn book(
        &self,
        request: BookingRequest,
        identity: BookerIdentity,
    ) -> Result<(Appointment, Booking), BookingError> {
        let guest = match identity {
            BookerIdentity::Guest => Some(check_guest(request.guest.as_ref())?),
            BookerIdentity::User(_) => None,
        };
        let appointment = self.find_appointment(&request.app_code).await?;
        if !appointment.status.accepts_bookings() {
            return Err(BookingError::AppointmentClosed(appointment.app_code.to_string()));
        }
        check_attendees(&appointment, request.attendee_count)?;
        let target = self.target(
            &appointment,
            request.date,
            request.start_time,
            request.end_time,
        )?;

        let booker = self.resolve_booker(identity, guest).await?;
        let pass = self
            .guard
            .check(&appointment, &booker.email, request.device_token.as_deref())
            .await?;

        let reservation = Reservation {
            booking_code: BookingCode::generate(),
            booker,
            device_id: pass.device_id,
            guard_email: pass.guard_email,
            attendee_count: request.attendee_count,
            description: request.description,
            status: appointment.initial_booking_status(),
            notification_status: NotificationStatus::NotSent,
            notification_channel: None,
        };

        let mut tx = self.store.begin().await?;
        let result = self.reserve(&mut tx, &appointment, target, reservation).await;
        let booking = settle(tx, result).await?;
        Ok((appointment, booking))
    }

    async fn reserve(
        &self,
        tx: &mut S::Tx,
        appointment: &Appointment,
        target: Target,
        reservation: Reservation,
    ) -> Result<Booking, BookingError> {
        let now = self.clock.now();
        match appointment.appointment_type {
            AppointmentType::Party => {
                let mut locked = Self::lock_appointment(tx, appointment).await?;
                if !locked.status.accepts_bookings() {
                    return Err(BookingError::AppointmentClosed(locked.app_code.to_string()));
                }
                ledger::reserve(&mut locked, reservation.attendee_count)?;
                locked.updated_at = now;
                tx.update_appointment(&locked).await?;

                let row = Booking::new_reservation(
                    &locked,
                    target.key.date,
                    target.key.start_time,
                    target.end,
                    reservation,
                    now,
                );
                tx.insert_bookings(std::slice::from_ref(&row)).await?;
                Ok(row)
            }
            AppointmentType::Group => {
                let mut slot = Self::lock_slot(tx, appointment, target.key).await?;
                ledger::reserve(&mut slot, reservation.attendee_count)?;
                slot.updated_at = now;
                tx.update_booking(&slot).await?;

                let row = Booking::new_reservation(
                    appointment,
                    slot.date,
                    slot.start_time,
                    slot.end_time,
                    reservation,
                    now,
                );
                tx.insert_bookings(std::slice::from_ref(&row)).await?;
                Ok(row)
            }
            AppointmentType::Single => {
                let mut slot = Self::lock_slot(tx, appointment, target.key).await?;
                ledger::occupy(&mut slot)?;
                slot.reservation = Some(reservation);
                slot.updated_at = now;
                tx.update_booking(&slot).await?;
                Ok(slot)
            }
        }
    }

    async fn reschedule(
        &self,
        code: &BookingCode,
        request: RescheduleRequest,
    ) -> Result<(Appointment, Booking), BookingError> {
        let current = self.find(code).await?;
        let held = reservation_of(&current)?;
        reschedulable(code, held.status)?;

        let appointment = self.find_appointment(&current.app_code).await?;
        if !appointment.status.accepts_bookings() {
            return Err(BookingError::AppointmentClosed(appointment.app_code.to_string()));
        }
        let count = request.attendee_count.unwrap_or(held.attendee_count);
        check_attendees(&appointment, count)?;
        let target = self.target(
            &appointment,
            request.date,
            request.start_time,
            request.end_time,
        )?;

        let mut tx = self.store.begin().await?;
        let result = match appointment.appointment_type {
            AppointmentType::Party => {
                self.reschedule_party(&mut tx, &appointment, &current, target, count)
                    .await
            }
            AppointmentType::Group => {
                self.reschedule_group(&mut tx, &appointment, &current, target, count)
                    .await
            }
            AppointmentType::Single => {
                self.reschedule_single(&mut tx, &appointment, &current, target)
                    .await
            }
        };
        let booking = settle(tx, result).await?;
        Ok((appointment, booking))
    }

    async fn reschedule_party(
        &self,
        tx: &mut S::Tx,
        appointment: &Appointment,
        current: &Booking,
        target: Target,
        count: u32,
    ) -> Result<Booking, BookingError> {
        let now = self.clock.now();
        let mut locked = Self::lock_appointment(tx, appointment).await?;
        if !locked.status.accepts_bookings() {
            return Err(BookingError::AppointmentClosed(locked.app_code.to_string()));
        }
        let mut row = Self::relock(tx, current).await?;
        let held = reservation_of(&row)?;
        reschedulable(&held.booking_code, held.status)?;
        let released = held.attendee_count;

        ledger::release(&mut locked, released);
        ledger::reserve(&mut locked, count)?;
        locked.updated_at = now;
        tx.update_appointment(&locked).await?;

        Self::move_reservation(&mut row, target.key, target.end, count, now);
        tx.update_booking(&row).await?;
        Ok(row)
    }

    async fn reschedule_group(
        &self,
        tx: &mut S::Tx,
        appointment: &Appointment,
        current: &Booking,
        target: Target,
        count: u32,
    ) -> Result<Booking, BookingError> {
        let now = self.clock.now();
        let old_key = current.key();
        let (mut old_slot, mut new_slot) = Self::lock_pair(tx, appointment, old_key, target.key).await?;

        let mut row = Self::relock(tx, current).await?;
        let held = reservation_of(&row)?;
        reschedulable(&held.booking_code, held.status)?;
        let released = held.attendee_count;

        ledger::release(&mut old_slot, released);
        old_slot.updated_at = now;
        let end = if let Some(new_slot) = new_slot.as_mut() {
            ledger::reserve(new_slot, count)?;
            new_slot.updated_at = now;
            tx.update_booking(&old_slot).await?;
            tx.update_booking(new_slot).await?;
            new_slot.end_time
        } else {
            ledger::reserve(&mut old_slot, count)?;
            tx.update_booking(&old_slot).await?;
            old_slot.end_time
        };

        Self::move_reservation(&mut row, target.key, end, count, now);
        tx.update_booking(&row).await?;
        Ok(row)
    }

    async fn reschedule_single(
        &self,
        tx: &mut S::Tx,
        appointment: &Appointment,
        current: &Booking,
        target: Target,
    ) -> Result<Booking, BookingError> {
        let now = self.clock.now();
        let (mut old_slot, new_slot) =
            Self::lock_pair(tx, appointment, current.key(), target.key).await?;
        if old_slot.id != current.id || old_slot.booking_code() != current.booking_code() {
            return Err(BookingError::BookingChanged(
                current.booking_code().map(ToString::to_string).unwrap_or_default(),
            ));
        }
        let held = reservation_of(&old_slot)?.clone();
        reschedulable(&held.booking_code, held.status)?;

        let Some(mut new_slot) = new_slot else {
            let end = old_slot.end_time;
            Self::move_reservation(&mut old_slot, target.key, end, 1, now);
            tx.update_booking(&old_slot).await?;
            return Ok(old_slot);
        };

        ledger::vacate(&mut old_slot);
        old_slot.updated_at = now;
        ledger::occupy(&mut new_slot)?;
        new_slot.reservation = Some(Reservation {
            status: rescheduled_status(held.status),
            ..held
        });
        new_slot.updated_at = now;

        // Clear the old row first so the code is never on two rows.
        tx.update_booking(&old_slot).await?;
        tx.update_booking(&new_slot).await?;
        Ok(new_slot)
    }

    async fn release(
        &self,
        code: &BookingCode,
        to: BookingStatus,
        owner_id: Option<UserId>,
    ) -> Result<(Appointment, Booking), BookingError> {
        let current = self.find(code).await?;
        let appointment = self.find_appointment(&current.app_code).await?;
        if let Some(owner_id) = owner_id {
            Self::check_owner(&appointment, owner_id)?;
        }
        self.transitions.check(reservation_of(&current)?.status, to)?;

        let mut tx = self.store.begin().await?;
        let result = self
            .release_in(&mut tx, &appointment, &current, to)
            .await;
        let booking = settle(tx, result).await?;
        Ok((appointment, booking))
    }

    async fn release_in(
        &self,
        tx: &mut S::Tx,
        appointment: &Appointment,
        current: &Booking,
        to: BookingStatus,
    ) -> Result<Booking, BookingError> {
        let now = self.clock.now();
        match appointment.appointment_type {
            AppointmentType::Party => {
                let mut locked = Self::lock_appointment(tx, appointment).await?;
                let mut row = Self::relock(tx, current).await?;
                let count = self.finish_reservation(&mut row, to, now)?;
                ledger::release(&mut locked, count);
                locked.updated_at = now;
                tx.update_appointment(&locked).await?;
                tx.update_booking(&row).await?;
                Ok(row)
            }
            AppointmentType::Group => {
                let mut slot = Self::lock_slot(tx, appointment, current.key()).await?;
                let mut row = Self::relock(tx, current).await?;
                let count = self.finish_reservation(&mut row, to, now)?;
                ledger::release(&mut slot, count);
                slot.updated_at = now;
                tx.update_booking(&slot).await?;
                tx.update_booking(&row).await?;
                Ok(row)
            }
            AppointmentType::Single => {
                let mut slot = Self::relock(tx, current).await?;
                let mut reservation = reservation_of(&slot)?.clone();
                self.transitions.check(reservation.status, to)?;
                reservation.status = to;

                // The slot goes back on sale; the reservation survives as history.
                let history = Booking::new_reservation(
                    appointment,
                    slot.date,
                    slot.start_time,
                    slot.end_time,
                    reservation,
                    now,
                );
                ledger::vacate(&mut slot);
                slot.updated_at = now;
                tx.update_booking(&slot).await?;
                tx.insert_bookings(std::slice::from_ref(&history)).await?;
                Ok(history)
            }
        }
    }

    async fn confirm(
        &self,
        code: &BookingCode,
        owner_id: UserId,
    ) -> Result<(Appointment, Booking), BookingError> {
        let current = self.find(code).await?;
        let appointment = self.find_appointment(&current.app_code).await?;
        Self::check_owner(&appointment, owner_id)?;
        self.transitions
            .check(reservation_of(&current)?.status, BookingStatus::Confirmed)?;

        let mut tx = self.store.begin().await?;
        let result = async {
            let mut row = Self::relock(&mut tx, &current).await?;
            self.finish_reservation(&mut row, BookingStatus::Confirmed, self.clock.now())?;
            tx.update_booking(&row).await?;
            Ok::<_, BookingError>(row)
        }
        .await;
        let booking = settle(tx, result).await?;
        Ok((appointment, booking))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn within_deadline<T, F>(&self, operation: &'static str, body: F) -> Result<T, BookingError>
    where
        F: Future<Output = Result<T, BookingError>>,
    {
        let started = Instant::now();
        let result = if let Ok(result) = tokio::time::timeout(self.timeout, body).await {
            result
        } else {
            tracing::warn!(
                operation,
                timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                "Reservation deadline elapsed"
            );
            Err(BookingError::Timeout)
        };
        BookingMetrics::record_duration(operation, started.elapsed());

        if let Err(error) = &result {
            if let Some(reason) = error.conflict_reason() {
                BookingMetrics::record_conflict(reason);
            }
            tracing::debug!(operation, code = error.code(), error = %error, "Reservation operation failed");
        }
        result
    }

    async fn publish(&self, name: EventName, appointment: &Appointment, booking: Booking) {
        let event = DomainEvent::for_booking(name, appointment, booking, self.clock.now());
        if let Err(error) = self.bus.publish(&event).await {
            tracing::warn!(event = %name, error = %error, "Event subscribers failed");
        }
    }

    async fn find(&self, code: &BookingCode) -> Result<Booking, BookingError> {
        self.store
            .find_booking(code)
            .await?
            .filter(|row| row.reservation.is_some())
            .ok_or_else(|| BookingError::BookingNotFound(code.to_string()))
    }

    async fn find_appointment(
        &self,
        app_code: &slotbook_core::types::AppCode,
    ) -> Result<Appointment, BookingError> {
        self.store
            .find_appointment(app_code)
            .await?
            .ok_or_else(|| BookingError::AppointmentNotFound(app_code.to_string()))
    }

    fn check_owner(appointment: &Appointment, owner_id: UserId) -> Result<(), BookingError> {
        if appointment.owner_id == owner_id {
            Ok(())
        } else {
            tracing::info!(app_code = %appointment.app_code, owner_id = %owner_id, "Caller does not own the appointment");
            Err(BookingError::Forbidden(format!(
                "user {owner_id} does not own appointment {}",
                appointment.app_code
            )))
        }
    }

    /// Validate the requested window against the appointment and the clock.
    fn target(
        &self,
        appointment: &Appointment,
        date: NaiveDate,
        start: NaiveTime,
        end: Option<NaiveTime>,
    ) -> Result<Target, BookingError> {
        if !appointment.covers_date(date) {
            return Err(validation_error(
                "date",
                format!(
                    "must be between {} and {}",
                    appointment.start_date, appointment.end_date
                ),
            ));
        }

        let end = match appointment.appointment_type {
            AppointmentType::Party => end.unwrap_or(appointment.end_time),
            AppointmentType::Single | AppointmentType::Group => appointment.end_time,
        };
        if !appointment.covers_window(start, end) {
            return Err(validation_error(
                "start_time",
                format!(
                    "must fall between {} and {}",
                    appointment.start_time.format("%H:%M"),
                    appointment.end_time.format("%H:%M")
                ),
            ));
        }

        if date.and_time(start) <= self.clock.now().naive_utc() {
            return Err(validation_error("start_time", "has already started"));
        }

        Ok(Target {
            key: SlotKey::new(date, start),
            end,
        })
    }

    async fn resolve_booker(
        &self,
        identity: BookerIdentity,
        guest: Option<&GuestDetails>,
    ) -> Result<Booker, BookingError> {
        match identity {
            BookerIdentity::User(user_id) => {
                let user = self
                    .store
                    .find_user(user_id)
                    .await?
                    .ok_or_else(|| BookingError::UserNotFound(user_id.to_string()))?;
                Ok(Booker {
                    user_id: Some(user.id),
                    name: user.name,
                    email: user.email,
                    phone: user.phone,
                })
            }
            BookerIdentity::Guest => guest
                .map(|guest| Booker {
                    user_id: None,
                    name: guest.name.trim().to_string(),
                    email: guest.email.trim().to_string(),
                    phone: guest.phone.clone(),
                })
                .ok_or_else(|| validation_error("guest", "guest details are required")),
        }
    }

    async fn lock_appointment(
        tx: &mut S::Tx,
        appointment: &Appointment,
    ) -> Result<Appointment, BookingError> {
        tx.lock_appointment(&appointment.app_code)
            .await?
            .ok_or_else(|| BookingError::AppointmentNotFound(appointment.app_code.to_string()))
    }

    async fn lock_slot(
        tx: &mut S::Tx,
        appointment: &Appointment,
        key: SlotKey,
    ) -> Result<Booking, BookingError> {
        tx.lock_slot(&appointment.app_code, key)
            .await?
            .ok_or_else(|| BookingError::SlotUnavailable(key.to_string()))
    }

    /// Lock the current and target slots in key order.
    ///
    /// The second value is `None` when both keys name the same slot.
    async fn lock_pair(
        tx: &mut S::Tx,
        appointment: &Appointment,
        current: SlotKey,
        target: SlotKey,
    ) -> Result<(Booking, Option<Booking>), BookingError> {
        if current == target {
            let slot = Self::lock_slot(tx, appointment, current).await?;
            return Ok((slot, None));
        }
        if current < target {
            let old = Self::lock_slot(tx, appointment, current).await?;
            let new = Self::lock_slot(tx, appointment, target).await?;
            Ok((old, Some(new)))
        } else {
            let new = Self::lock_slot(tx, appointment, target).await?;
            let old = Self::lock_slot(tx, appointment, current).await?;
            Ok((old, Some(new)))
        }
    }

    /// Lock the row carrying the booking and make sure it has not moved.
    async fn relock(tx: &mut S::Tx, current: &Booking) -> Result<Booking, BookingError> {
        let code = current
            .booking_code()
            .ok_or_else(|| BookingError::BookingNotFound(current.id.to_string()))?;
        let row = tx
            .lock_booking(code)
            .await?
            .ok_or_else(|| BookingError::BookingNotFound(code.to_string()))?;
        if row.id != current.id || row.key() != current.key() {
            return Err(BookingError::BookingChanged(code.to_string()));
        }
        Ok(row)
    }

    /// Apply a requested transition to a locked row; returns the seats it held.
    fn finish_reservation(
        &self,
        row: &mut Booking,
        to: BookingStatus,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<u32, BookingError> {
        let reservation = row
            .reservation
            .as_mut()
            .ok_or_else(|| BookingError::BookingNotFound(row.id.to_string()))?;
        self.transitions.check(reservation.status, to)?;
        reservation.status = to;
        row.updated_at = now;
        Ok(reservation.attendee_count)
    }

    fn move_reservation(
        row: &mut Booking,
        key: SlotKey,
        end: NaiveTime,
        count: u32,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        row.date = key.date;
        row.start_time = key.start_time;
        row.end_time = end;
        row.updated_at = now;
        if let Some(reservation) = row.reservation.as_mut() {
            reservation.attendee_count = count;
            reservation.status = rescheduled_status(reservation.status);
        }
    }
}
