//! Domain events published after committed reservation and appointment changes.
//!
//! Events carry the affected entity, the appointment owner and the contact
//! details of whoever should be told about the change. Subscribers filter on
//! [`EventName`].

use crate::types::{Appointment, Booking, BookingCode, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Names of every event the engine publishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    /// `booking.created`
    #[serde(rename = "booking.created")]
    BookingCreated,
    /// `booking.updated`
    #[serde(rename = "booking.updated")]
    BookingUpdated,
    /// `booking.cancelled`
    #[serde(rename = "booking.cancelled")]
    BookingCancelled,
    /// `booking.rejected`
    #[serde(rename = "booking.rejected")]
    BookingRejected,
    /// `booking.confirmed`
    #[serde(rename = "booking.confirmed")]
    BookingConfirmed,
    /// `appointment.created`
    #[serde(rename = "appointment.created")]
    AppointmentCreated,
    /// `appointment.updated`
    #[serde(rename = "appointment.updated")]
    AppointmentUpdated,
    /// `appointment.deleted`
    #[serde(rename = "appointment.deleted")]
    AppointmentDeleted,
}

impl EventName {
    /// Dotted wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BookingCreated => "booking.created",
            Self::BookingUpdated => "booking.updated",
            Self::BookingCancelled => "booking.cancelled",
            Self::BookingRejected => "booking.rejected",
            Self::BookingConfirmed => "booking.confirmed",
            Self::AppointmentCreated => "appointment.created",
            Self::AppointmentUpdated => "appointment.updated",
            Self::AppointmentDeleted => "appointment.deleted",
        }
    }

    /// Whether the event concerns a single booking.
    #[must_use]
    pub const fn is_booking_event(&self) -> bool {
        matches!(
            self,
            Self::BookingCreated
                | Self::BookingUpdated
                | Self::BookingCancelled
                | Self::BookingRejected
                | Self::BookingConfirmed
        )
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who should hear about an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
}

/// The entity an event is about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum EventSubject {
    /// A reservation (the row as committed)
    Booking(Box<Booking>),
    /// An appointment
    Appointment(Box<Appointment>),
}

/// A committed change, fanned out by the event bus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Event name
    pub name: EventName,
    /// Affected entity
    pub subject: EventSubject,
    /// Owner of the appointment involved
    pub owner_id: UserId,
    /// Title of the appointment involved
    pub appointment_title: String,
    /// Contact to notify, if any
    pub recipient: Option<Recipient>,
    /// Commit time
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Event about a booking; the recipient is the booker.
    #[must_use]
    pub fn for_booking(
        name: EventName,
        appointment: &Appointment,
        booking: Booking,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let recipient = booking.reservation.as_ref().map(|r| Recipient {
            name: r.booker.name.clone(),
            email: r.booker.email.clone(),
        });
        Self {
            name,
            subject: EventSubject::Booking(Box::new(booking)),
            owner_id: appointment.owner_id,
            appointment_title: appointment.title.clone(),
            recipient,
            occurred_at,
        }
    }

    /// Event about an appointment; the recipient is supplied by the caller.
    #[must_use]
    pub fn for_appointment(
        name: EventName,
        appointment: Appointment,
        recipient: Option<Recipient>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name,
            owner_id: appointment.owner_id,
            appointment_title: appointment.title.clone(),
            subject: EventSubject::Appointment(Box::new(appointment)),
            recipient,
            occurred_at,
        }
    }

    /// The booking, for booking events.
    #[must_use]
    pub fn booking(&self) -> Option<&Booking> {
        match &self.subject {
            EventSubject::Booking(b) => Some(b),
            EventSubject::Appointment(_) => None,
        }
    }

    /// The appointment, for appointment events.
    #[must_use]
    pub fn appointment(&self) -> Option<&Appointment> {
        match &self.subject {
            EventSubject::Appointment(a) => Some(a),
            EventSubject::Booking(_) => None,
        }
    }

    /// Booking code, for booking events.
    #[must_use]
    pub fn booking_code(&self) -> Option<&BookingCode> {
        self.booking().and_then(Booking::booking_code)
    }
}
