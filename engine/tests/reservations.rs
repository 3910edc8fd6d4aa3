//! Booking, rescheduling, cancellation and confirmation flows per appointment type.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{Harness, key};
use slotbook_core::BookingError;
use slotbook_core::event::EventName;
use slotbook_core::types::{
    AppointmentDraft, BookerIdentity, BookingCode, BookingStatus, RescheduleRequest, UserId,
    UserProfile,
};
use slotbook_testing::{FixedClock, fixtures};
use std::sync::Arc;
use std::time::Duration;

fn needs_confirmation(mut draft: AppointmentDraft) -> AppointmentDraft {
    draft.requires_confirmation = true;
    draft
}

fn code_of(booking: &slotbook_core::types::Booking) -> BookingCode {
    booking.booking_code().cloned().expect("booking has a code")
}

#[tokio::test]
async fn test_party_booking_takes_seats_from_appointment() {
    let h = Harness::new();
    let appointment = h.open(fixtures::party_draft(10)).await;
    assert!(h.store.rows(&appointment.app_code).is_empty());

    let booking = h.book(&appointment.app_code, 9, 4, "ada@example.com").await.unwrap();
    assert!(!booking.is_slot);
    assert_eq!(booking.end_time, fixtures::time(12, 0));
    assert_eq!(booking.status(), Some(BookingStatus::Active));
    assert_eq!(h.seats(&appointment.app_code), 4);

    let err = h
        .book(&appointment.app_code, 10, 7, "bob@example.com")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BookingError::CapacityExceeded {
            requested: 7,
            remaining: 6
        }
    );
    assert_eq!(h.seats(&appointment.app_code), 4);
    assert_eq!(
        h.events.names(),
        vec![EventName::AppointmentCreated, EventName::BookingCreated]
    );
}

#[tokio::test]
async fn test_group_booking_fills_slot_then_refuses() {
    let h = Harness::new();
    let appointment = h.open(fixtures::group_draft(5)).await;
    let code = &appointment.app_code;

    let first = h.book(code, 9, 3, "ada@example.com").await.unwrap();
    assert!(!first.is_slot);
    assert_eq!(first.key(), key(9));
    let slot = h.slot(code, 9);
    assert_eq!((slot.seats_booked, slot.available), (3, true));

    h.book(code, 9, 2, "bob@example.com").await.unwrap();
    let slot = h.slot(code, 9);
    assert_eq!((slot.seats_booked, slot.available), (5, false));

    let err = h.book(code, 9, 1, "cy@example.com").await.unwrap_err();
    assert_eq!(
        err,
        BookingError::CapacityExceeded {
            requested: 1,
            remaining: 0
        }
    );

    let err = h.book(code, 10, 6, "dee@example.com").await.unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));
    assert_eq!(h.slot(code, 10).seats_booked, 0);
}

#[tokio::test]
async fn test_single_booking_occupies_slot() {
    let h = Harness::new();
    let appointment = h.open(fixtures::single_draft()).await;
    let code = &appointment.app_code;

    let booking = h.book(code, 9, 1, "ada@example.com").await.unwrap();
    assert!(booking.is_slot);
    let slot = h.slot(code, 9);
    assert_eq!(slot.booking_code(), booking.booking_code());
    assert_eq!((slot.seats_booked, slot.available), (1, false));

    let err = h.book(code, 9, 1, "bob@example.com").await.unwrap_err();
    assert!(matches!(err, BookingError::SlotUnavailable(_)));

    let err = h.book(code, 10, 2, "bob@example.com").await.unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));
}

#[tokio::test]
async fn test_unknown_slot_and_window_are_rejected() {
    let h = Harness::new();
    let appointment = h.open(fixtures::group_draft(3)).await;

    let mut request = fixtures::guest_request(
        &appointment.app_code,
        fixtures::first_day(),
        fixtures::time(9, 30),
        1,
        "ada@example.com",
    );
    let err = h
        .engine
        .book_appointment(request.clone(), BookerIdentity::Guest)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SlotUnavailable(_)));

    request.date = fixtures::date(2025, 3, 1);
    let err = h
        .engine
        .book_appointment(request, BookerIdentity::Guest)
        .await
        .unwrap_err();
    assert_eq!(err.field_errors()[0].field, "date");
}

#[tokio::test]
async fn test_started_slots_cannot_be_booked() {
    let now = fixtures::first_day().and_time(fixtures::time(9, 30)).and_utc();
    let h = Harness::build(Arc::new(FixedClock::new(now)), None);
    let appointment = h.open(fixtures::single_draft()).await;

    let err = h
        .book(&appointment.app_code, 9, 1, "ada@example.com")
        .await
        .unwrap_err();
    assert_eq!(err.field_errors()[0].field, "start_time");
    assert!(h.book(&appointment.app_code, 10, 1, "ada@example.com").await.is_ok());
}

#[tokio::test]
async fn test_registered_user_books_with_profile_details() {
    let h = Harness::new();
    let appointment = h.open(fixtures::group_draft(4)).await;
    let user = UserProfile {
        id: UserId::new(),
        name: "Grace".to_string(),
        email: "grace@example.com".to_string(),
        phone: None,
    };
    h.store.insert_user(user.clone());

    let request =
        fixtures::user_request(&appointment.app_code, fixtures::first_day(), fixtures::time(11, 0), 2);
    let booking = h
        .engine
        .book_appointment(request.clone(), BookerIdentity::User(user.id))
        .await
        .unwrap();
    let booker = &booking.reservation.as_ref().unwrap().booker;
    assert_eq!(booker.user_id, Some(user.id));
    assert_eq!(booker.email, "grace@example.com");

    let err = h
        .engine
        .book_appointment(request, BookerIdentity::User(UserId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::UserNotFound(_)));
}

#[tokio::test]
async fn test_cancelled_single_frees_slot_and_keeps_history() {
    let h = Harness::new();
    let appointment = h.open(fixtures::single_draft()).await;
    let app_code = &appointment.app_code;
    let booking = h.book(app_code, 9, 1, "ada@example.com").await.unwrap();
    let code = code_of(&booking);

    let cancelled = h.engine.cancel_booking_by_code(&code).await.unwrap();
    assert!(!cancelled.is_slot);
    assert_eq!(cancelled.status(), Some(BookingStatus::Canceled));

    let slot = h.slot(app_code, 9);
    assert!(slot.reservation.is_none());
    assert_eq!((slot.seats_booked, slot.available), (0, true));

    h.book(app_code, 9, 1, "bob@example.com").await.unwrap();
    let history = h.engine.get_booking_by_code(&code).await.unwrap();
    assert_eq!(history.status(), Some(BookingStatus::Canceled));

    let err = h.engine.cancel_booking_by_code(&code).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));
    assert_eq!(h.slot(app_code, 9).seats_booked, 1);
}

#[tokio::test]
async fn test_double_cancel_releases_seats_once() {
    let h = Harness::new();
    let appointment = h.open(fixtures::group_draft(5)).await;
    let app_code = &appointment.app_code;
    let first = h.book(app_code, 9, 3, "ada@example.com").await.unwrap();
    h.book(app_code, 9, 2, "bob@example.com").await.unwrap();

    h.engine.cancel_booking_by_code(&code_of(&first)).await.unwrap();
    assert_eq!(h.slot(app_code, 9).seats_booked, 2);

    let err = h
        .engine
        .cancel_booking_by_code(&code_of(&first))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));
    assert_eq!(h.slot(app_code, 9).seats_booked, 2);
    assert!(h.slot(app_code, 9).available);
}

#[tokio::test]
async fn test_group_reschedule_keeps_code_and_moves_seats() {
    let h = Harness::new();
    let appointment = h.open(fixtures::group_draft(2)).await;
    let app_code = &appointment.app_code;
    let full = h.book(app_code, 10, 2, "ada@example.com").await.unwrap();
    let mover = h.book(app_code, 9, 1, "bob@example.com").await.unwrap();
    let code = code_of(&mover);

    let err = h
        .engine
        .update_booking_by_code(&code, fixtures::reschedule(fixtures::first_day(), fixtures::time(10, 0)))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BookingError::CapacityExceeded {
            requested: 1,
            remaining: 0
        }
    );
    assert_eq!(h.slot(app_code, 9).seats_booked, 1);
    assert_eq!(h.slot(app_code, 10).seats_booked, 2);

    let moved = h
        .engine
        .update_booking_by_code(&code, fixtures::reschedule(fixtures::first_day(), fixtures::time(11, 0)))
        .await
        .unwrap();
    assert_eq!(moved.booking_code(), Some(&code));
    assert_eq!(moved.key(), key(11));
    assert_eq!(h.slot(app_code, 9).seats_booked, 0);
    assert_eq!(h.slot(app_code, 11).seats_booked, 1);

    let shrunk = h
        .engine
        .update_booking_by_code(
            &code_of(&full),
            RescheduleRequest {
                attendee_count: Some(1),
                ..fixtures::reschedule(fixtures::first_day(), fixtures::time(10, 0))
            },
        )
        .await
        .unwrap();
    assert_eq!(shrunk.reservation.unwrap().attendee_count, 1);
    assert_eq!(h.slot(app_code, 10).seats_booked, 1);
}

#[tokio::test]
async fn test_single_reschedule_moves_the_reservation() {
    let h = Harness::new();
    let appointment = h.open(fixtures::single_draft()).await;
    let app_code = &appointment.app_code;
    let booking = h.book(app_code, 9, 1, "ada@example.com").await.unwrap();
    h.book(app_code, 11, 1, "bob@example.com").await.unwrap();
    let code = code_of(&booking);

    let moved = h
        .engine
        .update_booking_by_code(&code, fixtures::reschedule(fixtures::first_day(), fixtures::time(10, 0)))
        .await
        .unwrap();
    assert_eq!(moved.booking_code(), Some(&code));
    assert!(h.slot(app_code, 9).reservation.is_none());
    assert_eq!(h.slot(app_code, 10).booking_code(), Some(&code));

    let err = h
        .engine
        .update_booking_by_code(&code, fixtures::reschedule(fixtures::first_day(), fixtures::time(11, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SlotUnavailable(_)));
    assert_eq!(h.slot(app_code, 10).booking_code(), Some(&code));

    let same = h
        .engine
        .update_booking_by_code(&code, fixtures::reschedule(fixtures::first_day(), fixtures::time(10, 0)))
        .await
        .unwrap();
    assert_eq!(same.key(), key(10));
    assert_eq!(h.slot(app_code, 10).seats_booked, 1);
}

#[tokio::test]
async fn test_party_reschedule_adjusts_appointment_seats() {
    let h = Harness::new();
    let appointment = h.open(fixtures::party_draft(5)).await;
    let app_code = &appointment.app_code;
    let booking = h.book(app_code, 9, 2, "ada@example.com").await.unwrap();

    let moved = h
        .engine
        .update_booking_by_code(
            &code_of(&booking),
            RescheduleRequest {
                attendee_count: Some(5),
                end_time: Some(fixtures::time(11, 0)),
                ..fixtures::reschedule(fixtures::date(2025, 2, 2), fixtures::time(10, 0))
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.date, fixtures::date(2025, 2, 2));
    assert_eq!(moved.end_time, fixtures::time(11, 0));
    assert_eq!(h.seats(app_code), 5);
}

#[tokio::test]
async fn test_confirmation_flow() {
    let h = Harness::new();
    let appointment = h.open(needs_confirmation(fixtures::group_draft(3))).await;
    let booking = h
        .book(&appointment.app_code, 9, 1, "ada@example.com")
        .await
        .unwrap();
    let code = code_of(&booking);
    assert_eq!(booking.status(), Some(BookingStatus::Pending));

    let err = h.engine.confirm_booking(&code, UserId::new()).await.unwrap_err();
    assert!(matches!(err, BookingError::Forbidden(_)));

    let confirmed = h.engine.confirm_booking(&code, h.owner).await.unwrap();
    assert_eq!(confirmed.status(), Some(BookingStatus::Confirmed));

    let err = h.engine.confirm_booking(&code, h.owner).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));

    let moved = h
        .engine
        .update_booking_by_code(&code, fixtures::reschedule(fixtures::first_day(), fixtures::time(10, 0)))
        .await
        .unwrap();
    assert_eq!(moved.status(), Some(BookingStatus::Pending));
    assert_eq!(
        h.events.names(),
        vec![
            EventName::AppointmentCreated,
            EventName::BookingCreated,
            EventName::BookingConfirmed,
            EventName::BookingUpdated,
        ]
    );
}

#[tokio::test]
async fn test_owner_rejection_releases_seats() {
    let h = Harness::new();
    let appointment = h.open(fixtures::party_draft(6)).await;
    let booking = h
        .book(&appointment.app_code, 9, 4, "ada@example.com")
        .await
        .unwrap();
    let code = code_of(&booking);

    let err = h.engine.reject_booking(&code, UserId::new()).await.unwrap_err();
    assert!(matches!(err, BookingError::Forbidden(_)));
    assert_eq!(h.seats(&appointment.app_code), 4);

    let rejected = h.engine.reject_booking(&code, h.owner).await.unwrap();
    assert_eq!(rejected.status(), Some(BookingStatus::Rejected));
    assert_eq!(h.seats(&appointment.app_code), 0);

    let err = h
        .engine
        .update_booking_by_code(&code, fixtures::reschedule(fixtures::first_day(), fixtures::time(10, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_lookup_of_malformed_or_unknown_code() {
    let h = Harness::new();
    let err = h
        .engine
        .get_booking_by_code(&BookingCode::new("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::BookingNotFound(_)));

    let err = h
        .engine
        .get_booking_by_code(&BookingCode::generate())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::BookingNotFound(_)));
}

#[tokio::test]
async fn test_failed_commit_rolls_back_and_publishes_nothing() {
    let h = Harness::new();
    let appointment = h.open(fixtures::group_draft(3)).await;
    h.store.fail_next_commit();

    let err = h
        .book(&appointment.app_code, 9, 2, "ada@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Internal(_)));
    assert_eq!(h.slot(&appointment.app_code, 9).seats_booked, 0);
    assert_eq!(h.store.rows(&appointment.app_code).len(), 6);
    assert_eq!(h.events.names(), vec![EventName::AppointmentCreated]);
}

#[tokio::test]
async fn test_slow_store_hits_the_deadline() {
    let h = Harness::new();
    let appointment = h.open(fixtures::group_draft(3)).await;
    let engine = h.engine.clone().with_timeout(Duration::from_millis(50));
    h.store.set_latency(Duration::from_millis(200));

    let err = engine
        .book_appointment(
            fixtures::guest_request(
                &appointment.app_code,
                fixtures::first_day(),
                fixtures::time(9, 0),
                1,
                "ada@example.com",
            ),
            BookerIdentity::Guest,
        )
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::Timeout);

    h.store.set_latency(Duration::ZERO);
    assert_eq!(h.slot(&appointment.app_code, 9).seats_booked, 0);
    assert!(h.book(&appointment.app_code, 9, 3, "bob@example.com").await.is_ok());
}

#[tokio::test]
async fn test_guest_details_are_checked_before_lookup() {
    let h = Harness::new();
    let request = slotbook_core::types::BookingRequest {
        guest: None,
        ..fixtures::guest_request(
            &slotbook_core::types::AppCode::generate(),
            fixtures::first_day(),
            fixtures::time(9, 0),
            1,
            "ada@example.com",
        )
    };
    let err = h
        .engine
        .book_appointment(request, BookerIdentity::Guest)
        .await
        .unwrap_err();
    assert_eq!(err.field_errors()[0].field, "guest");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_party_reschedule_rechecks_status_under_lock() {
    use slotbook_core::store::{BookingStore as _, BookingTx as _};
    use slotbook_core::types::AppointmentStatus;

    let h = Harness::new();
    let appointment = h.open(fixtures::party_draft(5)).await;
    let booking = h.book(&appointment.app_code, 9, 2, "ada@example.com").await.unwrap();

    let mut closing = h.store.begin().await.unwrap();
    let mut locked = closing
        .lock_appointment(&appointment.app_code)
        .await
        .unwrap()
        .unwrap();

    let reschedule = {
        let engine = h.engine.clone();
        let code = code_of(&booking);
        tokio::spawn(async move {
            engine
                .update_booking_by_code(
                    &code,
                    fixtures::reschedule(fixtures::first_day(), fixtures::time(10, 0)),
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!reschedule.is_finished());

    locked.status = AppointmentStatus::Canceled;
    closing.update_appointment(&locked).await.unwrap();
    closing.commit().await.unwrap();

    let err = reschedule.await.unwrap().unwrap_err();
    assert!(matches!(err, BookingError::AppointmentClosed(_)));
    assert_eq!(h.seats(&appointment.app_code), 2);
    let kept = h.store.booking(&code_of(&booking)).unwrap();
    assert_eq!(kept.start_time, fixtures::time(9, 0));
}
