//! Ready-made appointments and requests.
//!
//! Dates sit in February 2025, a month after [`test_clock`](crate::test_clock),
//! so every fixture is bookable under the default clock.

use crate::mocks::test_clock;
use slotbook_core::environment::Clock;
use slotbook_core::types::{
    AntiScalpingLevel, AppCode, Appointment, AppointmentDraft, AppointmentId, AppointmentStatus,
    AppointmentType, BookingRequest, GuestDetails, RescheduleRequest, UserId,
};
use chrono::{NaiveDate, NaiveTime};

/// Build a date; panics on an invalid calendar date.
#[must_use]
#[allow(clippy::expect_used)]
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid fixture date")
}

/// Build a clock-time; panics when out of range.
#[must_use]
#[allow(clippy::expect_used)]
pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid fixture time")
}

/// First bookable day of every draft.
#[must_use]
pub fn first_day() -> NaiveDate {
    date(2025, 2, 1)
}

fn draft(appointment_type: AppointmentType, max_attendees: u32) -> AppointmentDraft {
    AppointmentDraft {
        title: format!("{appointment_type} session"),
        description: Some("Fixture appointment".to_string()),
        appointment_type,
        start_time: time(9, 0),
        end_time: time(12, 0),
        start_date: first_day(),
        end_date: date(2025, 2, 2),
        booking_duration: 60,
        max_attendees,
        anti_scalping_level: AntiScalpingLevel::None,
        requires_confirmation: false,
    }
}

/// One-seat slots, 09:00-12:00 in 60-minute steps over two days.
#[must_use]
pub fn single_draft() -> AppointmentDraft {
    draft(AppointmentType::Single, 1)
}

/// Group slots of `capacity` seats, 09:00-12:00 in 60-minute steps over two days.
#[must_use]
pub fn group_draft(capacity: u32) -> AppointmentDraft {
    draft(AppointmentType::Group, capacity)
}

/// A party with `capacity` seats across the whole window.
#[must_use]
pub fn party_draft(capacity: u32) -> AppointmentDraft {
    draft(AppointmentType::Party, capacity)
}

/// Materialise a draft without going through the engine.
#[must_use]
pub fn appointment(draft: AppointmentDraft) -> Appointment {
    let now = test_clock().now();
    Appointment {
        id: AppointmentId::new(),
        app_code: AppCode::generate(),
        owner_id: UserId::new(),
        title: draft.title,
        description: draft.description,
        appointment_type: draft.appointment_type,
        start_time: draft.start_time,
        end_time: draft.end_time,
        start_date: draft.start_date,
        end_date: draft.end_date,
        booking_duration: draft.booking_duration,
        max_attendees: draft.max_attendees,
        attendees_booked: 0,
        anti_scalping_level: draft.anti_scalping_level,
        requires_confirmation: draft.requires_confirmation,
        status: AppointmentStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}

/// Guest contact details derived from `email`.
#[must_use]
pub fn guest(email: &str) -> GuestDetails {
    let name = email.split('@').next().unwrap_or(email).to_string();
    GuestDetails {
        name,
        email: email.to_string(),
        phone: None,
    }
}

/// A guest request for `attendee_count` seats starting at `start`.
#[must_use]
pub fn guest_request(
    app_code: &AppCode,
    date: NaiveDate,
    start: NaiveTime,
    attendee_count: u32,
    email: &str,
) -> BookingRequest {
    BookingRequest {
        app_code: app_code.clone(),
        date,
        start_time: start,
        end_time: None,
        attendee_count,
        guest: Some(guest(email)),
        description: None,
        device_token: None,
    }
}

/// A request with no guest details, for registered users.
#[must_use]
pub fn user_request(
    app_code: &AppCode,
    date: NaiveDate,
    start: NaiveTime,
    attendee_count: u32,
) -> BookingRequest {
    BookingRequest {
        guest: None,
        ..guest_request(app_code, date, start, attendee_count, "unused@example.com")
    }
}

/// Move to `start` on `date`, keeping the seat count.
#[must_use]
pub const fn reschedule(date: NaiveDate, start: NaiveTime) -> RescheduleRequest {
    RescheduleRequest {
        date,
        start_time: start,
        end_time: None,
        attendee_count: None,
    }
}
