//! Outbound email messages and their rendering from domain events.

use serde::{Deserialize, Serialize};
use slotbook_core::event::{DomainEvent, EventName, EventSubject};
use slotbook_core::types::Booking;

/// A rendered email.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Recipient address
    pub to: String,
    /// Recipient display name
    pub to_name: Option<String>,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub text_body: String,
}

impl EmailMessage {
    /// `Name <address>` or the bare address.
    #[must_use]
    pub fn to_header(&self) -> String {
        match &self.to_name {
            Some(name) if !name.trim().is_empty() => format!("{name} <{}>", self.to),
            _ => self.to.clone(),
        }
    }
}

/// Render the email for an event, or `None` when there is nobody to tell.
#[must_use]
pub fn render(event: &DomainEvent) -> Option<EmailMessage> {
    let recipient = event.recipient.as_ref()?;
    if recipient.email.trim().is_empty() {
        return None;
    }

    let title = &event.appointment_title;
    let (subject, text_body) = match &event.subject {
        EventSubject::Booking(booking) => booking_text(event.name, title, booking)?,
        EventSubject::Appointment(appointment) => {
            let code = &appointment.app_code;
            match event.name {
                EventName::AppointmentCreated => (
                    format!("Appointment created: {title}"),
                    format!(
                        "Your appointment \"{title}\" is live.\nShare code {code} with your guests."
                    ),
                ),
                EventName::AppointmentUpdated => (
                    format!("Appointment updated: {title}"),
                    format!("Your appointment \"{title}\" ({code}) was updated."),
                ),
                EventName::AppointmentDeleted => (
                    format!("Appointment deleted: {title}"),
                    format!(
                        "Your appointment \"{title}\" ({code}) was deleted and its bookings were canceled."
                    ),
                ),
                _ => return None,
            }
        }
    };

    Some(EmailMessage {
        to: recipient.email.clone(),
        to_name: Some(recipient.name.clone()),
        subject,
        text_body,
    })
}

fn booking_text(name: EventName, title: &str, booking: &Booking) -> Option<(String, String)> {
    let reservation = booking.reservation.as_ref()?;
    let code = &reservation.booking_code;
    let when = format!(
        "{} {}-{}",
        booking.date,
        booking.start_time.format("%H:%M"),
        booking.end_time.format("%H:%M")
    );
    let seats = reservation.attendee_count;

    let rendered = match name {
        EventName::BookingCreated => (
            format!("Booking received: {title}"),
            format!(
                "Hi {},\n\nYour booking {code} for \"{title}\" on {when} ({seats} seat(s)) is {}.",
                reservation.booker.name, reservation.status
            ),
        ),
        EventName::BookingUpdated => (
            format!("Booking rescheduled: {title}"),
            format!(
                "Hi {},\n\nYour booking {code} for \"{title}\" now takes place on {when} ({seats} seat(s)). Status: {}.",
                reservation.booker.name, reservation.status
            ),
        ),
        EventName::BookingCancelled => (
            format!("Booking canceled: {title}"),
            format!(
                "Hi {},\n\nYour booking {code} for \"{title}\" on {when} was canceled.",
                reservation.booker.name
            ),
        ),
        EventName::BookingRejected => (
            format!("Booking rejected: {title}"),
            format!(
                "Hi {},\n\nThe organiser declined your booking {code} for \"{title}\" on {when}.",
                reservation.booker.name
            ),
        ),
        EventName::BookingConfirmed => (
            format!("Booking confirmed: {title}"),
            format!(
                "Hi {},\n\nYour booking {code} for \"{title}\" on {when} is confirmed.",
                reservation.booker.name
            ),
        ),
        _ => return None,
    };
    Some(rendered)
}
