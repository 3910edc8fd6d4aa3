//! Slot fan-out for single and group appointments.

use crate::error::BookingError;
use crate::types::{Appointment, AppointmentType, Booking};
use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Start/end pairs of one day's slot grid.
#[must_use]
pub fn daily_windows(
    start: NaiveTime,
    end: NaiveTime,
    duration_minutes: u32,
) -> Vec<(NaiveTime, NaiveTime)> {
    let mut windows = Vec::new();
    if duration_minutes == 0 {
        return windows;
    }
    let step = Duration::minutes(i64::from(duration_minutes));
    let mut cursor = start;
    loop {
        let (next, wrapped) = cursor.overflowing_add_signed(step);
        if wrapped != 0 || next > end || next <= cursor {
            break;
        }
        windows.push((cursor, next));
        cursor = next;
    }
    windows
}

/// Number of slots [`generate_slots`] would create.
#[must_use]
pub fn slot_count(appointment: &Appointment) -> u64 {
    if !appointment.appointment_type.has_slots() || appointment.end_date < appointment.start_date {
        return 0;
    }
    let days = (appointment.end_date - appointment.start_date).num_days() + 1;
    let per_day = daily_windows(
        appointment.start_time,
        appointment.end_time,
        appointment.booking_duration,
    )
    .len();
    u64::try_from(days).unwrap_or(0) * per_day as u64
}

/// Generate every slot row for an appointment.
///
/// Party appointments produce no slots. Single slots hold one seat, group
/// slots hold `max_attendees`.
///
/// # Errors
///
/// Returns a validation error when the grid is empty or exceeds `max_slots`.
pub fn generate_slots(
    appointment: &Appointment,
    max_slots: u32,
    now: DateTime<Utc>,
) -> Result<Vec<Booking>, BookingError> {
    let capacity = match appointment.appointment_type {
        AppointmentType::Party => return Ok(Vec::new()),
        AppointmentType::Single => 1,
        AppointmentType::Group => appointment.max_attendees.max(1),
    };

    let total = slot_count(appointment);
    if total == 0 {
        return Err(BookingError::invalid(
            "booking_duration",
            "time window does not fit a single slot",
        ));
    }
    if total > u64::from(max_slots) {
        return Err(BookingError::invalid(
            "end_date",
            format!("appointment would generate {total} slots, limit is {max_slots}"),
        ));
    }

    let windows = daily_windows(
        appointment.start_time,
        appointment.end_time,
        appointment.booking_duration,
    );
    let slots = appointment
        .start_date
        .iter_days()
        .take_while(|date| *date <= appointment.end_date)
        .flat_map(|date| {
            windows.iter().map(move |(start, end)| {
                Booking::new_slot(appointment, date, *start, *end, capacity, now)
            })
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        app_code = %appointment.app_code,
        slots = slots.len(),
        "Generated appointment slots"
    );
    Ok(slots)
}
