//! Property tests for seat accounting.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{NaiveDate, NaiveTime, Utc};
use proptest::prelude::*;
use slotbook_core::ledger::{self, SeatLedger};
use slotbook_core::types::{AppCode, AppointmentId, Booking, BookingId};

fn slot(capacity: u32, seats: u32) -> Booking {
    let now = Utc::now();
    Booking {
        id: BookingId::new(),
        appointment_id: AppointmentId::new(),
        app_code: AppCode::new("APPROPTEST"),
        is_slot: true,
        date: NaiveDate::from_ymd_opt(2030, 1, 1).expect("valid date"),
        start_time: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
        end_time: NaiveTime::from_hms_opt(9, 30, 0).expect("valid time"),
        capacity,
        seats_booked: seats,
        // Deliberately wrong; the ledger must recompute it.
        available: seats % 2 == 0,
        reservation: None,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Debug, Clone)]
enum Op {
    Reserve(u32),
    Release(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![(0u32..8).prop_map(Op::Reserve), (0u32..8).prop_map(Op::Release)]
}

proptest! {
    #[test]
    fn normalize_is_idempotent(capacity in 0u32..50, seats in 0u32..50) {
        let mut once = slot(capacity, seats);
        let first = ledger::normalize(&mut once);
        let mut twice = once.clone();
        let second = ledger::normalize(&mut twice);

        prop_assert_eq!(first, second);
        prop_assert_eq!(once.available, twice.available);
        prop_assert_eq!(once.available, once.seats_booked < once.capacity);
        prop_assert!(once.capacity >= 1);
    }

    #[test]
    fn seats_never_exceed_capacity(capacity in 1u32..20, ops in prop::collection::vec(op(), 0..64)) {
        let mut row = slot(capacity, 0);
        for op in ops {
            let before = row.seats_booked;
            match op {
                Op::Reserve(n) => {
                    if ledger::reserve(&mut row, n).is_err() {
                        prop_assert_eq!(row.seats_booked, before);
                        prop_assert!(before + n > row.capacity);
                    }
                }
                Op::Release(n) => {
                    ledger::release(&mut row, n);
                    prop_assert_eq!(row.seats_booked, before.saturating_sub(n));
                }
            }
            prop_assert!(row.booked() <= row.capacity());
            prop_assert_eq!(row.available, row.seats_booked < row.capacity);
            prop_assert_eq!(ledger::remaining(&row), row.capacity - row.seats_booked);
        }
    }

    #[test]
    fn release_then_reserve_restores_state(capacity in 1u32..20, taken in 0u32..20) {
        let taken = taken.min(capacity);
        let mut row = slot(capacity, 0);
        ledger::reserve(&mut row, taken).unwrap();
        let snapshot = row.clone();

        ledger::release(&mut row, taken);
        ledger::reserve(&mut row, taken).unwrap();

        prop_assert_eq!(row.seats_booked, snapshot.seats_booked);
        prop_assert_eq!(row.available, snapshot.available);
    }
}
