//! Capacity accounting on locked rows.
//!
//! The ledger is pure: it mutates an already-loaded, already-locked slot or
//! party appointment and never performs I/O. Callers must hold the row lock
//! for the whole read-check-write sequence.
//!
//! All arithmetic is saturating. `available` is recomputed after every
//! mutation and never trusted from storage or caller input.

use crate::error::BookingError;
use crate::types::{Appointment, Booking};

/// A row that holds a bounded number of seats.
pub trait SeatLedger {
    /// Maximum seats
    fn capacity(&self) -> u32;

    /// Seats currently taken
    fn booked(&self) -> u32;

    /// Overwrite capacity and taken seats; implementors refresh derived fields.
    fn store(&mut self, capacity: u32, booked: u32);
}

impl SeatLedger for Booking {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn booked(&self) -> u32 {
        self.seats_booked
    }

    fn store(&mut self, capacity: u32, booked: u32) {
        self.capacity = capacity;
        self.seats_booked = booked;
        self.available = booked < capacity;
    }
}

impl SeatLedger for Appointment {
    fn capacity(&self) -> u32 {
        self.max_attendees
    }

    fn booked(&self) -> u32 {
        self.attendees_booked
    }

    fn store(&mut self, capacity: u32, booked: u32) {
        self.max_attendees = capacity;
        self.attendees_booked = booked;
    }
}

/// Clamp `capacity >= 1`, recompute derived fields and return the seats left.
///
/// Idempotent: a second call observes the same state and returns the same value.
pub fn normalize<L: SeatLedger + ?Sized>(row: &mut L) -> u32 {
    let capacity = row.capacity().max(1);
    let booked = row.booked();
    row.store(capacity, booked);
    remaining(row)
}

/// Seats left on a row without mutating it.
#[must_use]
pub fn remaining<L: SeatLedger + ?Sized>(row: &L) -> u32 {
    row.capacity().max(1).saturating_sub(row.booked())
}

/// Take `count` seats.
///
/// # Errors
///
/// Returns [`BookingError::CapacityExceeded`] when `booked + count > capacity`;
/// the row is left untouched in that case.
pub fn reserve<L: SeatLedger + ?Sized>(row: &mut L, count: u32) -> Result<u32, BookingError> {
    let left = normalize(row);
    if count > left {
        return Err(BookingError::CapacityExceeded {
            requested: count,
            remaining: left,
        });
    }
    let booked = row.booked().saturating_add(count);
    row.store(row.capacity(), booked);
    Ok(normalize(row))
}

/// Give back `count` seats, flooring at zero.
pub fn release<L: SeatLedger + ?Sized>(row: &mut L, count: u32) -> u32 {
    let booked = row.booked().saturating_sub(count);
    row.store(row.capacity(), booked);
    normalize(row)
}

/// Take every remaining seat (single-type booking).
///
/// # Errors
///
/// Returns [`BookingError::SlotUnavailable`] when any seat is already taken.
pub fn occupy(slot: &mut Booking) -> Result<(), BookingError> {
    normalize(slot);
    if slot.seats_booked > 0 || slot.reservation.is_some() {
        return Err(BookingError::SlotUnavailable(slot.key().to_string()));
    }
    slot.store(slot.capacity, slot.capacity);
    Ok(())
}

/// Empty a single-type slot so it can be booked again.
pub fn vacate(slot: &mut Booking) {
    slot.reservation = None;
    slot.store(slot.capacity, 0);
    normalize(slot);
}
