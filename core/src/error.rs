//! Error taxonomy for reservation operations.
//!
//! Every failure an engine operation can produce is a [`BookingError`]. Each
//! variant maps to one [`ErrorKind`], a stable machine code and a message that
//! is safe to show to callers. Persistence failures arrive as
//! [`StoreError`] and are translated exactly once through the `From` impl.

use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coarse classification of a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed or out-of-range input
    Validation,
    /// Caller is not authenticated
    Unauthorized,
    /// Caller may not act on the resource
    Forbidden,
    /// Appointment, booking, slot or user does not exist
    NotFound,
    /// Business rule rejected the request against current state
    Conflict,
    /// A required precondition (device token) is missing or invalid
    Precondition,
    /// Repository, transaction or deadline failure
    Internal,
}

impl ErrorKind {
    /// Stable lower-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Precondition => "precondition",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field-level validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Offending field
    pub field: String,
    /// Human-readable reason
    pub message: String,
}

impl FieldError {
    /// Create a field error
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Which anti-scalping rule fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateReason {
    /// Same booker email already holds a booking
    Email,
    /// Same device already holds a booking
    Device,
}

/// Errors produced by reservation and appointment operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Input failed validation
    #[error("Validation failed: {}", format_fields(.0))]
    Validation(Vec<FieldError>),

    /// Caller is not authenticated
    #[error("Unauthorized")]
    Unauthorized,

    /// Caller does not own the appointment
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No appointment with this code
    #[error("Appointment not found: {0}")]
    AppointmentNotFound(String),

    /// No booking with this code
    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    /// Registered user could not be resolved
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Generic missing record reported by the store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Slot does not exist or is already taken
    #[error("Slot unavailable: {0}")]
    SlotUnavailable(String),

    /// Not enough seats left
    #[error("Capacity exceeded: requested {requested}, remaining {remaining}")]
    CapacityExceeded {
        /// Seats asked for
        requested: u32,
        /// Seats left at lock time
        remaining: u32,
    },

    /// Anti-scalping rule rejected the booking
    #[error("Duplicate booking ({reason:?})")]
    DuplicateBooking {
        /// Rule that fired
        reason: DuplicateReason,
    },

    /// Booking is in progress and cannot be rescheduled
    #[error("Booking {0} is ongoing")]
    BookingOngoing(String),

    /// Booking moved between the unlocked read and the lock
    #[error("Booking {0} changed concurrently")]
    BookingChanged(String),

    /// Appointment no longer accepts bookings
    #[error("Appointment {0} is closed")]
    AppointmentClosed(String),

    /// Status change not in the allow-list
    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        /// `booking` or `appointment`
        entity: &'static str,
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Storage-level conflict (unique index, lock conflict)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Device token absent under strict anti-scalping
    #[error("Device token required")]
    DeviceTokenMissing,

    /// Device token failed verification
    #[error("Device token invalid: {0}")]
    DeviceTokenInvalid(String),

    /// Request deadline elapsed
    #[error("Request timed out")]
    Timeout,

    /// Repository or transaction failure
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl BookingError {
    /// Single-field validation failure.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::AppointmentNotFound(_)
            | Self::BookingNotFound(_)
            | Self::UserNotFound(_)
            | Self::NotFound(_) => ErrorKind::NotFound,
            Self::SlotUnavailable(_)
            | Self::CapacityExceeded { .. }
            | Self::DuplicateBooking { .. }
            | Self::BookingOngoing(_)
            | Self::BookingChanged(_)
            | Self::AppointmentClosed(_)
            | Self::InvalidTransition { .. }
            | Self::Conflict(_) => ErrorKind::Conflict,
            Self::DeviceTokenMissing | Self::DeviceTokenInvalid(_) => ErrorKind::Precondition,
            Self::Timeout | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::AppointmentNotFound(_) => "APPOINTMENT_NOT_FOUND",
            Self::BookingNotFound(_) => "BOOKING_NOT_FOUND",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::NotFound(_) => "NOT_FOUND",
            Self::SlotUnavailable(_) => "BOOKING_SLOT_UNAVAILABLE",
            Self::CapacityExceeded { .. } => "BOOKING_CAPACITY_EXCEEDED",
            Self::DuplicateBooking { .. } => "DUPLICATE_BOOKING",
            Self::BookingOngoing(_) => "BOOKING_ONGOING",
            Self::BookingChanged(_) => "BOOKING_CHANGED",
            Self::AppointmentClosed(_) => "APPOINTMENT_CLOSED",
            Self::InvalidTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::Conflict(_) => "CONFLICT",
            Self::DeviceTokenMissing => "DEVICE_TOKEN_REQUIRED",
            Self::DeviceTokenInvalid(_) => "DEVICE_TOKEN_INVALID",
            Self::Timeout => "REQUEST_TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message that is safe to return to callers.
    ///
    /// Internal details (driver messages, token parse errors) are not included.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(_) => "The request contains invalid fields".to_string(),
            Self::Unauthorized => "Authentication required".to_string(),
            Self::Forbidden(_) => "You do not have permission to modify this booking".to_string(),
            Self::AppointmentNotFound(_) => "Appointment not found".to_string(),
            Self::BookingNotFound(_) => "Booking not found".to_string(),
            Self::UserNotFound(_) => "User not found".to_string(),
            Self::NotFound(_) => "Resource not found".to_string(),
            Self::SlotUnavailable(_) => "The selected time slot is not available".to_string(),
            Self::CapacityExceeded { remaining, .. } => {
                format!("Not enough seats available ({remaining} remaining)")
            }
            Self::DuplicateBooking { .. } => {
                "A booking for this appointment already exists".to_string()
            }
            Self::BookingOngoing(_) => "An ongoing booking cannot be rescheduled".to_string(),
            Self::BookingChanged(_) => {
                "The booking was modified concurrently, please retry".to_string()
            }
            Self::AppointmentClosed(_) => "This appointment no longer accepts bookings".to_string(),
            Self::InvalidTransition { from, to, .. } => {
                format!("Cannot change status from {from} to {to}")
            }
            Self::Conflict(_) => "The request conflicts with the current state".to_string(),
            Self::DeviceTokenMissing => "A device token is required".to_string(),
            Self::DeviceTokenInvalid(_) => "The device token is invalid or expired".to_string(),
            Self::Timeout => "The request timed out".to_string(),
            Self::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Field-level details for validation errors.
    #[must_use]
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation(fields) => fields,
            _ => &[],
        }
    }

    /// Label used for the conflict metric.
    #[must_use]
    pub const fn conflict_reason(&self) -> Option<&'static str> {
        match self {
            Self::SlotUnavailable(_) => Some("slot_unavailable"),
            Self::CapacityExceeded { .. } => Some("capacity_exceeded"),
            Self::DuplicateBooking { .. } => Some("duplicate"),
            Self::Conflict(_) => Some("storage"),
            _ => None,
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::UniqueViolation(constraint) => {
                if constraint.contains("guard_email") {
                    Self::DuplicateBooking {
                        reason: DuplicateReason::Email,
                    }
                } else if constraint.contains("device") {
                    Self::DuplicateBooking {
                        reason: DuplicateReason::Device,
                    }
                } else {
                    Self::Conflict(constraint)
                }
            }
            StoreError::LockConflict(msg) => Self::Conflict(msg),
            StoreError::Timeout => Self::Timeout,
            StoreError::Database(msg) => Self::Internal(msg),
        }
    }
}
