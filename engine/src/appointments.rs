//! Appointment lifecycle: create with slot fan-out, edit, soft delete.

use crate::reservations::settle;
use slotbook_core::environment::Clock;
use slotbook_core::error::{BookingError, FieldError};
use slotbook_core::event::{DomainEvent, EventName, Recipient};
use slotbook_core::event_bus::EventBus;
use slotbook_core::slots::generate_slots;
use slotbook_core::store::{BookingStore, BookingTx};
use slotbook_core::transitions::TransitionTable;
use slotbook_core::types::{
    AppCode, Appointment, AppointmentDraft, AppointmentId, AppointmentPatch, AppointmentStatus,
    AppointmentType, UserId,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound on slots generated for one appointment.
pub const DEFAULT_MAX_SLOTS: u32 = 5_000;

/// Owner-facing appointment operations.
pub struct AppointmentService<S: BookingStore> {
    store: S,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    transitions: Arc<TransitionTable<AppointmentStatus>>,
    max_slots: u32,
    timeout: Duration,
}

impl<S: BookingStore> Clone for AppointmentService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            bus: Arc::clone(&self.bus),
            clock: Arc::clone(&self.clock),
            transitions: Arc::clone(&self.transitions),
            max_slots: self.max_slots,
            timeout: self.timeout,
        }
    }
}

fn validate_draft(draft: &AppointmentDraft) -> Result<(), BookingError> {
    let mut fields = Vec::new();
    if draft.title.trim().is_empty() {
        fields.push(FieldError::new("title", "is required"));
    }
    if draft.end_time <= draft.start_time {
        fields.push(FieldError::new("end_time", "must be after start_time"));
    }
    if draft.end_date < draft.start_date {
        fields.push(FieldError::new("end_date", "must not be before start_date"));
    }
    match draft.appointment_type {
        AppointmentType::Single | AppointmentType::Group if draft.booking_duration == 0 => {
            fields.push(FieldError::new("booking_duration", "must be at least 1 minute"));
        }
        _ => {}
    }
    if draft.appointment_type != AppointmentType::Single && draft.max_attendees == 0 {
        fields.push(FieldError::new("max_attendees", "must be at least 1"));
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(BookingError::Validation(fields))
    }
}

impl<S: BookingStore> AppointmentService<S> {
    /// Create the service with the default transition table and limits.
    pub fn new(store: S, bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            bus,
            clock,
            transitions: Arc::new(TransitionTable::appointment_default()),
            max_slots: DEFAULT_MAX_SLOTS,
            timeout: crate::reservations::DEFAULT_RESERVATION_TIMEOUT,
        }
    }

    /// Cap on generated slots.
    #[must_use]
    pub const fn with_max_slots(mut self, max_slots: u32) -> Self {
        self.max_slots = max_slots;
        self
    }

    /// Per-operation deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create an appointment and every one of its slots in one transaction.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] for an inconsistent draft or too many slots
    /// - [`BookingError::Conflict`] on an `app_code` clash
    #[tracing::instrument(skip(self, draft), fields(appointment_type = %draft.appointment_type))]
    pub async fn create_appointment(
        &self,
        owner_id: UserId,
        draft: AppointmentDraft,
    ) -> Result<Appointment, BookingError> {
        validate_draft(&draft)?;
        let now = self.clock.now();
        let appointment = Appointment {
            id: AppointmentId::new(),
            app_code: AppCode::generate(),
            owner_id,
            title: draft.title.trim().to_string(),
            description: draft.description,
            appointment_type: draft.appointment_type,
            start_time: draft.start_time,
            end_time: draft.end_time,
            start_date: draft.start_date,
            end_date: draft.end_date,
            booking_duration: draft.booking_duration,
            max_attendees: match draft.appointment_type {
                AppointmentType::Single => 1,
                AppointmentType::Group | AppointmentType::Party => draft.max_attendees,
            },
            attendees_booked: 0,
            anti_scalping_level: draft.anti_scalping_level,
            requires_confirmation: draft.requires_confirmation,
            status: AppointmentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let slots = generate_slots(&appointment, self.max_slots, now)?;

        self.within_deadline(async {
            let mut tx = self.store.begin().await?;
            let result = async {
                tx.insert_appointment(&appointment).await?;
                tx.insert_bookings(&slots).await?;
                Ok::<_, BookingError>(())
            }
            .await;
            settle(tx, result).await
        })
        .await?;

        tracing::info!(
            app_code = %appointment.app_code,
            slots = slots.len(),
            "Appointment created"
        );
        let recipient = self.owner_recipient(owner_id).await;
        self.publish(EventName::AppointmentCreated, appointment.clone(), recipient)
            .await;
        Ok(appointment)
    }

    /// Apply owner edits to an open appointment.
    ///
    /// `max_attendees` can only change on party appointments and never drops
    /// below the seats already taken.
    ///
    /// # Errors
    ///
    /// - [`BookingError::AppointmentNotFound`], [`BookingError::Forbidden`]
    /// - [`BookingError::AppointmentClosed`] for completed or canceled appointments
    /// - [`BookingError::Validation`] for an invalid capacity or title
    #[tracing::instrument(skip(self, patch), fields(app_code = %app_code))]
    pub async fn update_appointment(
        &self,
        app_code: &AppCode,
        owner_id: UserId,
        patch: AppointmentPatch,
    ) -> Result<Appointment, BookingError> {
        let appointment = self
            .within_deadline(async {
                let mut tx = self.store.begin().await?;
                let result = self.apply_patch(&mut tx, app_code, owner_id, patch).await;
                settle(tx, result).await
            })
            .await?;

        tracing::info!("Appointment updated");
        let recipient = self.owner_recipient(owner_id).await;
        self.publish(EventName::AppointmentUpdated, appointment.clone(), recipient)
            .await;
        Ok(appointment)
    }

    /// Cancel an appointment and every holding booking on it.
    ///
    /// Slot counters are left as they are; the appointment stops accepting bookings.
    ///
    /// # Errors
    ///
    /// - [`BookingError::AppointmentNotFound`], [`BookingError::Forbidden`]
    /// - [`BookingError::InvalidTransition`] when already completed or canceled
    #[tracing::instrument(skip(self), fields(app_code = %app_code))]
    pub async fn delete_appointment(
        &self,
        app_code: &AppCode,
        owner_id: UserId,
    ) -> Result<Appointment, BookingError> {
        let (appointment, canceled) = self
            .within_deadline(async {
                let mut tx = self.store.begin().await?;
                let result = self.cancel(&mut tx, app_code, owner_id).await;
                settle(tx, result).await
            })
            .await?;

        tracing::info!(canceled_bookings = canceled, "Appointment deleted");
        let recipient = self.owner_recipient(owner_id).await;
        self.publish(EventName::AppointmentDeleted, appointment.clone(), recipient)
            .await;
        Ok(appointment)
    }

    /// Unlocked read by public code.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::AppointmentNotFound`] when no appointment has this code.
    pub async fn get_appointment(&self, app_code: &AppCode) -> Result<Appointment, BookingError> {
        self.store
            .find_appointment(app_code)
            .await?
            .ok_or_else(|| BookingError::AppointmentNotFound(app_code.to_string()))
    }

    async fn lock_owned(
        tx: &mut S::Tx,
        app_code: &AppCode,
        owner_id: UserId,
    ) -> Result<Appointment, BookingError> {
        let appointment = tx
            .lock_appointment(app_code)
            .await?
            .ok_or_else(|| BookingError::AppointmentNotFound(app_code.to_string()))?;
        if appointment.owner_id != owner_id {
            return Err(BookingError::Forbidden(format!(
                "user {owner_id} does not own appointment {app_code}"
            )));
        }
        Ok(appointment)
    }

    async fn apply_patch(
        &self,
        tx: &mut S::Tx,
        app_code: &AppCode,
        owner_id: UserId,
        patch: AppointmentPatch,
    ) -> Result<Appointment, BookingError> {
        let mut appointment = Self::lock_owned(tx, app_code, owner_id).await?;
        if !appointment.status.accepts_bookings() {
            return Err(BookingError::AppointmentClosed(app_code.to_string()));
        }

        if let Some(title) = patch.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(BookingError::invalid("title", "is required"));
            }
            title.clone_into(&mut appointment.title);
        }
        if let Some(description) = patch.description {
            appointment.description = Some(description);
        }
        if let Some(level) = patch.anti_scalping_level {
            appointment.anti_scalping_level = level;
        }
        if let Some(requires_confirmation) = patch.requires_confirmation {
            appointment.requires_confirmation = requires_confirmation;
        }
        if let Some(max_attendees) = patch.max_attendees {
            if appointment.appointment_type != AppointmentType::Party {
                return Err(BookingError::invalid(
                    "max_attendees",
                    "can only be changed on party appointments",
                ));
            }
            if max_attendees == 0 || max_attendees < appointment.attendees_booked {
                return Err(BookingError::invalid(
                    "max_attendees",
                    format!(
                        "must be at least {}",
                        appointment.attendees_booked.max(1)
                    ),
                ));
            }
            appointment.max_attendees = max_attendees;
        }

        appointment.updated_at = self.clock.now();
        tx.update_appointment(&appointment).await?;
        Ok(appointment)
    }

    async fn cancel(
        &self,
        tx: &mut S::Tx,
        app_code: &AppCode,
        owner_id: UserId,
    ) -> Result<(Appointment, u64), BookingError> {
        let mut appointment = Self::lock_owned(tx, app_code, owner_id).await?;
        self.transitions
            .check(appointment.status, AppointmentStatus::Canceled)?;

        let now = self.clock.now();
        appointment.status = AppointmentStatus::Canceled;
        appointment.updated_at = now;
        tx.update_appointment(&appointment).await?;
        let canceled = tx.cancel_holding_bookings(appointment.id, now).await?;
        Ok((appointment, canceled))
    }

    async fn within_deadline<T>(
        &self,
        body: impl Future<Output = Result<T, BookingError>>,
    ) -> Result<T, BookingError> {
        tokio::time::timeout(self.timeout, body)
            .await
            .unwrap_or(Err(BookingError::Timeout))
    }

    async fn owner_recipient(&self, owner_id: UserId) -> Option<Recipient> {
        match self.store.find_user(owner_id).await {
            Ok(Some(user)) => Some(Recipient {
                name: user.name,
                email: user.email,
            }),
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(owner_id = %owner_id, error = %error, "Owner lookup failed");
                None
            }
        }
    }

    async fn publish(&self, name: EventName, appointment: Appointment, recipient: Option<Recipient>) {
        let event = DomainEvent::for_appointment(name, appointment, recipient, self.clock.now());
        if let Err(error) = self.bus.publish(&event).await {
            tracing::warn!(event = %name, error = %error, "Event subscribers failed");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use slotbook_testing::fixtures;

    #[test]
    fn test_draft_validation_collects_every_field() {
        let mut draft = fixtures::group_draft(0);
        draft.title = "  ".to_string();
        draft.end_time = draft.start_time;
        draft.booking_duration = 0;

        let err = validate_draft(&draft).unwrap_err();
        let fields: Vec<_> = err.field_errors().iter().map(|f| f.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["title", "end_time", "booking_duration", "max_attendees"]
        );
    }

    #[test]
    fn test_party_needs_no_duration() {
        let mut draft = fixtures::party_draft(20);
        draft.booking_duration = 0;
        assert!(validate_draft(&draft).is_ok());
    }
}
