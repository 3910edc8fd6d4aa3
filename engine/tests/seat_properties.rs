//! Slot counters always equal the seats held by live reservations.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::Harness;
use proptest::prelude::*;
use slotbook_core::types::BookingCode;
use slotbook_testing::fixtures;

#[derive(Debug, Clone)]
enum Step {
    Book { hour: u32, count: u32 },
    Cancel(usize),
    Move { index: usize, hour: u32 },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (9u32..12, 1u32..4).prop_map(|(hour, count)| Step::Book { hour, count }),
        (0usize..16).prop_map(Step::Cancel),
        (0usize..16, 9u32..12).prop_map(|(index, hour)| Step::Move { index, hour }),
    ]
}

async fn run(steps: Vec<Step>) {
    let h = Harness::new();
    let appointment = h.open(fixtures::group_draft(4)).await;
    let app_code = appointment.app_code.clone();
    let mut codes: Vec<BookingCode> = Vec::new();

    for (i, step) in steps.into_iter().enumerate() {
        match step {
            Step::Book { hour, count } => {
                if let Ok(booking) = h.book(&app_code, hour, count, &format!("g{i}@example.com")).await {
                    codes.push(booking.booking_code().cloned().unwrap());
                }
            }
            Step::Cancel(index) => {
                if let Some(code) = codes.get(index) {
                    let _ = h.engine.cancel_booking_by_code(code).await;
                }
            }
            Step::Move { index, hour } => {
                if let Some(code) = codes.get(index) {
                    let _ = h
                        .engine
                        .update_booking_by_code(
                            code,
                            fixtures::reschedule(fixtures::first_day(), fixtures::time(hour, 0)),
                        )
                        .await;
                }
            }
        }
    }

    for hour in 9..12 {
        let slot = h.slot(&app_code, hour);
        let held: u32 = h
            .store
            .rows(&app_code)
            .iter()
            .filter(|row| !row.is_slot && row.key() == slot.key())
            .filter_map(|row| row.reservation.as_ref())
            .filter(|r| r.status.is_holding())
            .map(|r| r.attendee_count)
            .sum();
        assert_eq!(slot.seats_booked, held, "slot {hour}:00");
        assert!(slot.seats_booked <= slot.capacity);
        assert_eq!(slot.available, slot.seats_booked < slot.capacity);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn slot_counters_match_live_reservations(steps in prop::collection::vec(step(), 1..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run(steps));
    }
}
