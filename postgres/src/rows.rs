//! Row decoding and bind parameters.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use slotbook_core::store::StoreError;
use slotbook_core::types::{
    AppCode, Appointment, AppointmentId, Booker, Booking, BookingCode, BookingId, Reservation,
    UserId, UserProfile,
};
use sqlx::Row;
use sqlx::postgres::PgRow;
use std::str::FromStr;
use uuid::Uuid;

pub(crate) const APPOINTMENT_COLUMNS: &str = "id, app_code, owner_id, title, description, \
    appointment_type, start_time, end_time, start_date, end_date, booking_duration, \
    max_attendees, attendees_booked, anti_scalping_level, requires_confirmation, status, \
    created_at, updated_at";

pub(crate) const BOOKING_COLUMNS: &str = "id, appointment_id, app_code, is_slot, date, \
    start_time, end_time, capacity, seats_booked, available, booking_code, user_id, \
    booker_name, booker_email, booker_phone, device_id, guard_email, attendee_count, \
    description, status, notification_status, notification_channel, created_at, updated_at";

fn decode(column: &str, error: &sqlx::Error) -> StoreError {
    StoreError::Database(format!("failed to decode column {column}: {error}"))
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(|e| decode(column, &e))
}

fn parse<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = get(row, column)?;
    raw.parse()
        .map_err(|e: T::Err| StoreError::Database(format!("column {column}: {e}")))
}

fn unsigned(row: &PgRow, column: &str) -> Result<u32, StoreError> {
    let value: i32 = get(row, column)?;
    u32::try_from(value)
        .map_err(|_| StoreError::Database(format!("column {column} is negative: {value}")))
}

/// Convert a count for binding.
pub(crate) fn signed(value: u32, column: &str) -> Result<i32, StoreError> {
    i32::try_from(value)
        .map_err(|_| StoreError::Database(format!("column {column} out of range: {value}")))
}

pub(crate) fn appointment_from_row(row: &PgRow) -> Result<Appointment, StoreError> {
    Ok(Appointment {
        id: AppointmentId::from_uuid(get(row, "id")?),
        app_code: AppCode::new(get::<String>(row, "app_code")?),
        owner_id: UserId::from_uuid(get(row, "owner_id")?),
        title: get(row, "title")?,
        description: get(row, "description")?,
        appointment_type: parse(row, "appointment_type")?,
        start_time: get(row, "start_time")?,
        end_time: get(row, "end_time")?,
        start_date: get(row, "start_date")?,
        end_date: get(row, "end_date")?,
        booking_duration: unsigned(row, "booking_duration")?,
        max_attendees: unsigned(row, "max_attendees")?,
        attendees_booked: unsigned(row, "attendees_booked")?,
        anti_scalping_level: parse(row, "anti_scalping_level")?,
        requires_confirmation: get(row, "requires_confirmation")?,
        status: parse(row, "status")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

pub(crate) fn booking_from_row(row: &PgRow) -> Result<Booking, StoreError> {
    let code: Option<String> = get(row, "booking_code")?;
    let reservation = match code {
        Some(code) => {
            let user_id: Option<Uuid> = get(row, "user_id")?;
            Some(Reservation {
                booking_code: BookingCode::new(code),
                booker: Booker {
                    user_id: user_id.map(UserId::from_uuid),
                    name: get::<Option<String>>(row, "booker_name")?.unwrap_or_default(),
                    email: get::<Option<String>>(row, "booker_email")?.unwrap_or_default(),
                    phone: get(row, "booker_phone")?,
                },
                device_id: get(row, "device_id")?,
                guard_email: get(row, "guard_email")?,
                attendee_count: unsigned(row, "attendee_count")?,
                description: get(row, "description")?,
                status: parse(row, "status")?,
                notification_status: parse(row, "notification_status")?,
                notification_channel: get(row, "notification_channel")?,
            })
        }
        None => None,
    };

    Ok(Booking {
        id: BookingId::from_uuid(get(row, "id")?),
        appointment_id: AppointmentId::from_uuid(get(row, "appointment_id")?),
        app_code: AppCode::new(get::<String>(row, "app_code")?),
        is_slot: get(row, "is_slot")?,
        date: get(row, "date")?,
        start_time: get(row, "start_time")?,
        end_time: get(row, "end_time")?,
        capacity: unsigned(row, "capacity")?,
        seats_booked: unsigned(row, "seats_booked")?,
        available: get(row, "available")?,
        reservation,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

pub(crate) fn user_from_row(row: &PgRow) -> Result<UserProfile, StoreError> {
    Ok(UserProfile {
        id: UserId::from_uuid(get(row, "id")?),
        name: get(row, "name")?,
        email: get(row, "email")?,
        phone: get(row, "phone")?,
    })
}

/// Owned bind values for one `bookings` row, in [`BOOKING_COLUMNS`] order.
pub(crate) struct BookingParams {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub app_code: String,
    pub is_slot: bool,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: i32,
    pub seats_booked: i32,
    pub available: bool,
    pub booking_code: Option<String>,
    pub user_id: Option<Uuid>,
    pub booker_name: Option<String>,
    pub booker_email: Option<String>,
    pub booker_phone: Option<String>,
    pub device_id: String,
    pub guard_email: Option<String>,
    pub attendee_count: i32,
    pub description: Option<String>,
    pub status: Option<&'static str>,
    pub notification_status: &'static str,
    pub notification_channel: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingParams {
    pub(crate) fn new(booking: &Booking) -> Result<Self, StoreError> {
        let reservation = booking.reservation.as_ref();
        Ok(Self {
            id: *booking.id.as_uuid(),
            appointment_id: *booking.appointment_id.as_uuid(),
            app_code: booking.app_code.as_str().to_string(),
            is_slot: booking.is_slot,
            date: booking.date,
            start_time: booking.start_time,
            end_time: booking.end_time,
            capacity: signed(booking.capacity, "capacity")?,
            seats_booked: signed(booking.seats_booked, "seats_booked")?,
            available: booking.available,
            booking_code: reservation.map(|r| r.booking_code.as_str().to_string()),
            user_id: reservation.and_then(|r| r.booker.user_id).map(|id| *id.as_uuid()),
            booker_name: reservation.map(|r| r.booker.name.clone()),
            booker_email: reservation.map(|r| r.booker.email.clone()),
            booker_phone: reservation.and_then(|r| r.booker.phone.clone()),
            device_id: reservation.map(|r| r.device_id.clone()).unwrap_or_default(),
            guard_email: reservation.and_then(|r| r.guard_email.clone()),
            attendee_count: signed(
                reservation.map_or(0, |r| r.attendee_count),
                "attendee_count",
            )?,
            description: reservation.and_then(|r| r.description.clone()),
            status: reservation.map(|r| r.status.as_str()),
            notification_status: reservation
                .map_or("not_sent", |r| r.notification_status.as_str()),
            notification_channel: reservation.and_then(|r| r.notification_channel.clone()),
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_counts_beyond_i32_are_rejected() {
        assert!(signed(u32::MAX, "capacity").is_err());
        assert_eq!(signed(5, "capacity").unwrap(), 5);
    }

    #[test]
    fn test_column_lists_have_matching_arity() {
        assert_eq!(BOOKING_COLUMNS.split(',').count(), 24);
        assert_eq!(APPOINTMENT_COLUMNS.split(',').count(), 18);
    }
}
