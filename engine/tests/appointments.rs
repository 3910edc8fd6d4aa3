//! Appointment lifecycle: creation with slot generation, edits and deletion.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::Harness;
use slotbook_core::BookingError;
use slotbook_core::event::EventName;
use slotbook_core::types::{
    AppCode, AppointmentPatch, AppointmentStatus, AppointmentType, BookingStatus, UserId,
    UserProfile,
};
use slotbook_testing::fixtures;

#[tokio::test]
async fn test_create_generates_every_slot() {
    let h = Harness::new();
    let appointment = h.open(fixtures::group_draft(3)).await;
    assert_eq!(appointment.status, AppointmentStatus::Pending);

    let rows = h.store.rows(&appointment.app_code);
    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|r| r.is_slot && r.capacity == 3 && r.available));
    assert_eq!(rows[0].start_time, fixtures::time(9, 0));
    assert_eq!(rows[0].end_time, fixtures::time(10, 0));
    assert_eq!(rows[5].date, fixtures::date(2025, 2, 2));
    assert_eq!(rows[5].start_time, fixtures::time(11, 0));
}

#[tokio::test]
async fn test_single_appointments_hold_one_seat_per_slot() {
    let h = Harness::new();
    let mut draft = fixtures::single_draft();
    draft.max_attendees = 9;
    let appointment = h.open(draft).await;

    assert_eq!(appointment.appointment_type, AppointmentType::Single);
    assert_eq!(appointment.max_attendees, 1);
    assert!(h.store.rows(&appointment.app_code).iter().all(|r| r.capacity == 1));
}

#[tokio::test]
async fn test_create_notifies_a_registered_owner() {
    let h = Harness::new();
    h.store.insert_user(UserProfile {
        id: h.owner,
        name: "Owner".to_string(),
        email: "owner@example.com".to_string(),
        phone: None,
    });
    h.open(fixtures::party_draft(8)).await;

    let events = h.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, EventName::AppointmentCreated);
    assert_eq!(
        events[0].recipient.as_ref().map(|r| r.email.as_str()),
        Some("owner@example.com")
    );
}

#[tokio::test]
async fn test_invalid_or_oversized_drafts_are_refused() {
    let h = Harness::new();
    let mut draft = fixtures::group_draft(2);
    draft.end_date = fixtures::date(2025, 1, 15);
    let err = h
        .appointments
        .create_appointment(h.owner, draft)
        .await
        .unwrap_err();
    assert_eq!(err.field_errors()[0].field, "end_date");

    let limited = h.appointments.clone().with_max_slots(5);
    let err = limited
        .create_appointment(h.owner, fixtures::group_draft(2))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));
    assert!(h.events.names().is_empty());
}

#[tokio::test]
async fn test_owner_edits_are_applied() {
    let h = Harness::new();
    let appointment = h.open(fixtures::party_draft(6)).await;
    h.book(&appointment.app_code, 9, 4, "ada@example.com").await.unwrap();

    let updated = h
        .appointments
        .update_appointment(
            &appointment.app_code,
            h.owner,
            AppointmentPatch {
                title: Some("  Launch party ".to_string()),
                max_attendees: Some(10),
                requires_confirmation: Some(true),
                ..AppointmentPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "Launch party");
    assert_eq!(updated.max_attendees, 10);
    assert_eq!(updated.attendees_booked, 4);

    let booking = h.book(&appointment.app_code, 9, 1, "bob@example.com").await.unwrap();
    assert_eq!(booking.status(), Some(BookingStatus::Pending));
}

#[tokio::test]
async fn test_capacity_cannot_drop_below_booked_seats() {
    let h = Harness::new();
    let party = h.open(fixtures::party_draft(6)).await;
    h.book(&party.app_code, 9, 4, "ada@example.com").await.unwrap();

    let patch = AppointmentPatch {
        max_attendees: Some(3),
        ..AppointmentPatch::default()
    };
    let err = h
        .appointments
        .update_appointment(&party.app_code, h.owner, patch.clone())
        .await
        .unwrap_err();
    assert_eq!(err.field_errors()[0].field, "max_attendees");
    assert_eq!(h.store.appointment(&party.app_code).unwrap().max_attendees, 6);

    let group = h.open(fixtures::group_draft(2)).await;
    let err = h
        .appointments
        .update_appointment(&group.app_code, h.owner, patch)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));
}

#[tokio::test]
async fn test_only_the_owner_may_edit_or_delete() {
    let h = Harness::new();
    let appointment = h.open(fixtures::group_draft(2)).await;
    let stranger = UserId::new();

    let err = h
        .appointments
        .update_appointment(&appointment.app_code, stranger, AppointmentPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden(_)));

    let err = h
        .appointments
        .delete_appointment(&appointment.app_code, stranger)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden(_)));
    assert_eq!(
        h.store.appointment(&appointment.app_code).unwrap().status,
        AppointmentStatus::Pending
    );
}

#[tokio::test]
async fn test_delete_cancels_holding_bookings_and_closes_appointment() {
    let h = Harness::new();
    let appointment = h.open(fixtures::group_draft(4)).await;
    let app_code = &appointment.app_code;
    let kept = h.book(app_code, 9, 2, "ada@example.com").await.unwrap();
    let gone = h.book(app_code, 10, 1, "bob@example.com").await.unwrap();
    h.engine
        .cancel_booking_by_code(gone.booking_code().unwrap())
        .await
        .unwrap();

    let deleted = h
        .appointments
        .delete_appointment(app_code, h.owner)
        .await
        .unwrap();
    assert_eq!(deleted.status, AppointmentStatus::Canceled);

    let kept = h.store.booking(kept.booking_code().unwrap()).unwrap();
    assert_eq!(kept.status(), Some(BookingStatus::Canceled));

    let err = h.book(app_code, 11, 1, "cy@example.com").await.unwrap_err();
    assert!(matches!(err, BookingError::AppointmentClosed(_)));

    let err = h
        .appointments
        .update_appointment(app_code, h.owner, AppointmentPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::AppointmentClosed(_)));

    let err = h
        .appointments
        .delete_appointment(app_code, h.owner)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));
    assert_eq!(
        h.events.names().last(),
        Some(&EventName::AppointmentDeleted)
    );
}

#[tokio::test]
async fn test_unknown_appointment() {
    let h = Harness::new();
    let err = h
        .appointments
        .get_appointment(&AppCode::generate())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::AppointmentNotFound(_)));

    let err = h
        .book(&AppCode::generate(), 9, 1, "ada@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::AppointmentNotFound(_)));
}
