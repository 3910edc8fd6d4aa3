//! Domain types for appointments, slots and reservations.
//!
//! A single row type, [`Booking`], plays two roles distinguished by
//! [`Booking::is_slot`]:
//!
//! - a generated **slot** for single/group appointments, carrying `capacity`,
//!   `seats_booked` and the derived `available` flag;
//! - a **reservation** row (`is_slot == false`) for group and party bookings.
//!
//! Single-type bookings live directly on their slot row: the slot's
//! [`Booking::reservation`] is filled in instead of inserting a separate row.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an appointment
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppointmentId(Uuid);

impl AppointmentId {
    /// Creates a new random `AppointmentId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `AppointmentId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AppointmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a slot or reservation row
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random `BookingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BookingId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a registered user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Public codes
// ============================================================================

/// Characters used in generated codes (no `0/O` or `1/I` look-alikes).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Prefix of every generated appointment code.
pub const APP_CODE_PREFIX: &str = "AP";

/// Prefix of every generated booking code.
pub const BOOKING_CODE_PREFIX: &str = "BK";

const APP_CODE_LEN: usize = 8;
const BOOKING_CODE_LEN: usize = 10;

fn random_code(prefix: &str, len: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(prefix.len() + len);
    code.push_str(prefix);
    for _ in 0..len {
        let idx = rng.gen_range(0..CODE_ALPHABET.len());
        code.push(char::from(CODE_ALPHABET[idx]));
    }
    code
}

/// Public identifier of an appointment, used in every slot/reservation lookup.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppCode(String);

impl AppCode {
    /// Wrap an existing code (trusted input, e.g. a database column).
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Generate a fresh code: `AP` followed by 8 characters.
    #[must_use]
    pub fn generate() -> Self {
        Self(random_code(APP_CODE_PREFIX, APP_CODE_LEN))
    }

    /// The code as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public identifier of a booking.
///
/// Assigned once when the reservation is created and never regenerated;
/// rescheduling moves the same code between slots.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BookingCode(String);

impl BookingCode {
    /// Wrap an existing code (trusted input, e.g. a database column).
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Generate a fresh code: `BK` followed by 10 characters.
    #[must_use]
    pub fn generate() -> Self {
        Self(random_code(BOOKING_CODE_PREFIX, BOOKING_CODE_LEN))
    }

    /// The code as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the code has the generated shape.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.0
            .strip_prefix(BOOKING_CODE_PREFIX)
            .is_some_and(|rest| {
                rest.len() == BOOKING_CODE_LEN && rest.bytes().all(|b| CODE_ALPHABET.contains(&b))
            })
    }
}

impl fmt::Display for BookingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Error returned when a stored enum value cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Appointment type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentType {
    /// One booker per generated slot
    Single,
    /// Several bookers share a generated slot up to its capacity
    Group,
    /// No slot grid; capacity is tracked on the appointment
    Party,
}

impl AppointmentType {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Group => "group",
            Self::Party => "party",
        }
    }

    /// Whether slots are generated for this type.
    #[must_use]
    pub const fn has_slots(&self) -> bool {
        !matches!(self, Self::Party)
    }
}

impl FromStr for AppointmentType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "group" => Ok(Self::Group),
            "party" => Ok(Self::Party),
            _ => Err(ParseEnumError::new("appointment type", s)),
        }
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Duplicate-booking prevention level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AntiScalpingLevel {
    /// No checks
    #[default]
    None,
    /// One holding booking per email address
    Standard,
    /// Email check plus one holding booking per verified device
    Strict,
}

impl AntiScalpingLevel {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Standard => "standard",
            Self::Strict => "strict",
        }
    }

    /// Whether the booker's email is checked for duplicates.
    #[must_use]
    pub const fn checks_email(&self) -> bool {
        matches!(self, Self::Standard | Self::Strict)
    }

    /// Whether a signed device token is required.
    #[must_use]
    pub const fn requires_device(&self) -> bool {
        matches!(self, Self::Strict)
    }
}

impl FromStr for AntiScalpingLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "standard" => Ok(Self::Standard),
            "strict" => Ok(Self::Strict),
            _ => Err(ParseEnumError::new("anti-scalping level", s)),
        }
    }
}

impl fmt::Display for AntiScalpingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Appointment lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    /// Not started yet
    Pending,
    /// Time window has started
    Ongoing,
    /// Time window has ended
    Completed,
    /// Withdrawn by the owner
    Canceled,
}

impl AppointmentStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }

    /// Whether new bookings may be made against the appointment.
    #[must_use]
    pub const fn accepts_bookings(&self) -> bool {
        matches!(self, Self::Pending | Self::Ongoing)
    }
}

impl FromStr for AppointmentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "ongoing" => Ok(Self::Ongoing),
            "completed" => Ok(Self::Completed),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            _ => Err(ParseEnumError::new("appointment status", s)),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reservation status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Booked, no confirmation required
    Active,
    /// Awaiting owner confirmation
    Pending,
    /// Confirmed by the owner
    Confirmed,
    /// The booked window has started
    Ongoing,
    /// Canceled by the booker (terminal)
    #[serde(alias = "cancelled")]
    Canceled,
    /// Rejected by the owner (terminal)
    Rejected,
    /// Window passed (terminal)
    Expired,
}

impl BookingStatus {
    /// Statuses that hold capacity and count as an existing booking.
    pub const HOLDING: [Self; 4] = [Self::Active, Self::Pending, Self::Confirmed, Self::Ongoing];

    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Ongoing => "ongoing",
            Self::Canceled => "canceled",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    /// Terminal statuses admit no further transition.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Rejected | Self::Expired)
    }

    /// Holding statuses occupy capacity.
    #[must_use]
    pub const fn is_holding(&self) -> bool {
        !self.is_terminal()
    }
}

impl FromStr for BookingStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "ongoing" => Ok(Self::Ongoing),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            _ => Err(ParseEnumError::new("booking status", s)),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the asynchronous notification for a reservation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Nothing enqueued yet
    #[default]
    NotSent,
    /// Enqueued on the dispatcher
    Queued,
    /// Delivered to the provider
    Sent,
    /// Enqueue failed or every delivery attempt failed
    Failed,
}

impl NotificationStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotSent => "not_sent",
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_sent" => Ok(Self::NotSent),
            "queued" => Ok(Self::Queued),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseEnumError::new("notification status", s)),
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entities
// ============================================================================

/// An owner's bookable time window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    /// Row identity
    pub id: AppointmentId,
    /// Public identifier
    pub app_code: AppCode,
    /// Owning user
    pub owner_id: UserId,
    /// Display title
    pub title: String,
    /// Optional free-form description
    pub description: Option<String>,
    /// Single, group or party
    pub appointment_type: AppointmentType,
    /// Daily start clock-time
    pub start_time: NaiveTime,
    /// Daily end clock-time
    pub end_time: NaiveTime,
    /// First bookable date
    pub start_date: NaiveDate,
    /// Last bookable date
    pub end_date: NaiveDate,
    /// Slot granularity in minutes (single/group)
    pub booking_duration: u32,
    /// Slot capacity for group, appointment capacity for party
    pub max_attendees: u32,
    /// Running attendee total (party only)
    pub attendees_booked: u32,
    /// Duplicate-booking prevention level
    pub anti_scalping_level: AntiScalpingLevel,
    /// New reservations start `pending` when set
    pub requires_confirmation: bool,
    /// Lifecycle status
    pub status: AppointmentStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Moment the appointment window opens.
    #[must_use]
    pub fn starts_at(&self) -> NaiveDateTime {
        self.start_date.and_time(self.start_time)
    }

    /// Moment the appointment window closes.
    #[must_use]
    pub fn ends_at(&self) -> NaiveDateTime {
        self.end_date.and_time(self.end_time)
    }

    /// Whether `date` lies within the bookable date range.
    #[must_use]
    pub fn covers_date(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// Whether `[start, end)` lies within the daily window.
    #[must_use]
    pub fn covers_window(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start >= self.start_time && end <= self.end_time && start < end
    }

    /// Status a new reservation starts in.
    #[must_use]
    pub const fn initial_booking_status(&self) -> BookingStatus {
        if self.requires_confirmation {
            BookingStatus::Pending
        } else {
            BookingStatus::Active
        }
    }
}

/// Position of a slot inside its appointment; also the lock order for slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    /// Slot date
    pub date: NaiveDate,
    /// Slot start clock-time
    pub start_time: NaiveTime,
}

impl SlotKey {
    /// Create a slot key
    #[must_use]
    pub const fn new(date: NaiveDate, start_time: NaiveTime) -> Self {
        Self { date, start_time }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.start_time.format("%H:%M"))
    }
}

/// Who holds a reservation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booker {
    /// Registered user, `None` for guests
    pub user_id: Option<UserId>,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub phone: Option<String>,
}

impl Booker {
    /// Case-normalised email used for duplicate detection.
    #[must_use]
    pub fn normalized_email(&self) -> String {
        normalize_email(&self.email)
    }
}

/// Trim and lower-case an email address.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// The party commitment carried by a reservation row (or a booked single slot).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Immutable public code
    pub booking_code: BookingCode,
    /// Who booked
    pub booker: Booker,
    /// Verified device (strict anti-scalping only, empty otherwise)
    pub device_id: String,
    /// Normalised email recorded when anti-scalping checks email
    pub guard_email: Option<String>,
    /// Seats held
    pub attendee_count: u32,
    /// Booker's note
    pub description: Option<String>,
    /// Lifecycle status
    pub status: BookingStatus,
    /// Async delivery outcome
    pub notification_status: NotificationStatus,
    /// Delivery channel used (e.g. `email`)
    pub notification_channel: Option<String>,
}

/// A slot row or a reservation row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Row identity
    pub id: BookingId,
    /// Owning appointment
    pub appointment_id: AppointmentId,
    /// Owning appointment's public code
    pub app_code: AppCode,
    /// `true` for generated slots, `false` for reservation rows
    pub is_slot: bool,
    /// Date of the window
    pub date: NaiveDate,
    /// Window start
    pub start_time: NaiveTime,
    /// Window end
    pub end_time: NaiveTime,
    /// Seat capacity (slots only)
    pub capacity: u32,
    /// Seats taken (slots only)
    pub seats_booked: u32,
    /// `seats_booked < capacity`, always recomputed by the ledger
    pub available: bool,
    /// Reservation details; `None` on an empty slot
    pub reservation: Option<Reservation>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// A fresh, empty slot.
    #[must_use]
    pub fn new_slot(
        appointment: &Appointment,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        capacity: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BookingId::new(),
            appointment_id: appointment.id,
            app_code: appointment.app_code.clone(),
            is_slot: true,
            date,
            start_time,
            end_time,
            capacity: capacity.max(1),
            seats_booked: 0,
            available: true,
            reservation: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A reservation row over the given window.
    #[must_use]
    pub fn new_reservation(
        appointment: &Appointment,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        reservation: Reservation,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BookingId::new(),
            appointment_id: appointment.id,
            app_code: appointment.app_code.clone(),
            is_slot: false,
            date,
            start_time,
            end_time,
            capacity: 0,
            seats_booked: 0,
            available: false,
            reservation: Some(reservation),
            created_at: now,
            updated_at: now,
        }
    }

    /// Slot position of this row.
    #[must_use]
    pub const fn key(&self) -> SlotKey {
        SlotKey::new(self.date, self.start_time)
    }

    /// Booking code, if the row carries a reservation.
    #[must_use]
    pub fn booking_code(&self) -> Option<&BookingCode> {
        self.reservation.as_ref().map(|r| &r.booking_code)
    }

    /// Reservation status, if the row carries a reservation.
    #[must_use]
    pub fn status(&self) -> Option<BookingStatus> {
        self.reservation.as_ref().map(|r| r.status)
    }

    /// Moment the booked window starts.
    #[must_use]
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// Moment the booked window ends.
    #[must_use]
    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time)
    }
}

/// Registered user as seen by the reservation engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User identity
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub phone: Option<String>,
}

// ============================================================================
// Requests
// ============================================================================

/// Already-authenticated caller identity supplied by the HTTP layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookerIdentity {
    /// A registered user
    User(UserId),
    /// An anonymous guest; contact details come from the request
    Guest,
}

/// Contact details supplied by a guest booker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestDetails {
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub phone: Option<String>,
}

/// Request to reserve capacity against an appointment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Target appointment
    pub app_code: AppCode,
    /// Requested date
    pub date: NaiveDate,
    /// Requested start (slot start for single/group)
    pub start_time: NaiveTime,
    /// Requested end (party only; defaults to the appointment's end)
    pub end_time: Option<NaiveTime>,
    /// Seats requested
    pub attendee_count: u32,
    /// Guest contact details (required for guests)
    pub guest: Option<GuestDetails>,
    /// Booker's note
    pub description: Option<String>,
    /// Signed device token (strict anti-scalping)
    pub device_token: Option<String>,
}

/// Request to move an existing booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleRequest {
    /// New date
    pub date: NaiveDate,
    /// New start (slot start for single/group)
    pub start_time: NaiveTime,
    /// New end (party only)
    pub end_time: Option<NaiveTime>,
    /// New seat count; keeps the current one when `None`
    pub attendee_count: Option<u32>,
}

/// Owner input for a new appointment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentDraft {
    /// Display title
    pub title: String,
    /// Optional description
    pub description: Option<String>,
    /// Single, group or party
    pub appointment_type: AppointmentType,
    /// Daily start clock-time
    pub start_time: NaiveTime,
    /// Daily end clock-time
    pub end_time: NaiveTime,
    /// First bookable date
    pub start_date: NaiveDate,
    /// Last bookable date
    pub end_date: NaiveDate,
    /// Slot granularity in minutes (single/group)
    pub booking_duration: u32,
    /// Capacity (slot capacity for group, total for party, ignored for single)
    pub max_attendees: u32,
    /// Duplicate-booking prevention level
    pub anti_scalping_level: AntiScalpingLevel,
    /// Whether reservations need owner confirmation
    pub requires_confirmation: bool,
}

/// Owner edits to an existing appointment; `None` leaves a field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentPatch {
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New capacity (party only)
    pub max_attendees: Option<u32>,
    /// New anti-scalping level
    pub anti_scalping_level: Option<AntiScalpingLevel>,
    /// New confirmation policy
    pub requires_confirmation: Option<bool>,
}
