//! Duplicate-booking prevention by email and device token.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chrono::Duration as ChronoDuration;
use common::Harness;
use futures::future::join_all;
use slotbook_core::environment::Clock;
use slotbook_core::types::{
    AntiScalpingLevel, AppCode, AppointmentDraft, BookerIdentity, BookingRequest,
};
use slotbook_core::{BookingError, DuplicateReason};
use slotbook_engine::guard::DEFAULT_DEVICE_TOKEN_TTL;
use slotbook_engine::{DeviceTokenVerifier, JwtDeviceTokens};
use slotbook_testing::{ManualClock, fixtures, test_clock};
use std::sync::Arc;
use std::time::Duration;

const SECRET: &[u8] = b"device-token-secret";

fn guarded(level: AntiScalpingLevel) -> AppointmentDraft {
    AppointmentDraft {
        anti_scalping_level: level,
        ..fixtures::group_draft(5)
    }
}

fn request(app_code: &AppCode, email: &str, token: Option<String>) -> BookingRequest {
    BookingRequest {
        device_token: token,
        ..fixtures::guest_request(app_code, fixtures::first_day(), fixtures::time(9, 0), 1, email)
    }
}

struct Strict {
    h: Harness,
    clock: ManualClock,
    tokens: Arc<JwtDeviceTokens>,
}

fn strict() -> Strict {
    let clock = ManualClock::new(test_clock().now());
    let tokens = Arc::new(JwtDeviceTokens::new(
        SECRET,
        DEFAULT_DEVICE_TOKEN_TTL,
        Arc::new(clock.clone()),
    ));
    let h = Harness::build(
        Arc::new(clock.clone()),
        Some(Arc::clone(&tokens) as Arc<dyn DeviceTokenVerifier>),
    );
    Strict { h, clock, tokens }
}

#[tokio::test]
async fn test_no_level_allows_repeat_bookers() {
    let h = Harness::new();
    let appointment = h.open(guarded(AntiScalpingLevel::None)).await;
    h.book(&appointment.app_code, 9, 1, "ada@example.com").await.unwrap();
    h.book(&appointment.app_code, 9, 1, "ada@example.com").await.unwrap();
}

#[tokio::test]
async fn test_standard_level_refuses_second_booking_by_email() {
    let h = Harness::new();
    let appointment = h.open(guarded(AntiScalpingLevel::Standard)).await;
    let first = h.book(&appointment.app_code, 9, 1, "ada@example.com").await.unwrap();
    assert_eq!(
        first.reservation.as_ref().unwrap().guard_email.as_deref(),
        Some("ada@example.com")
    );

    let err = h
        .book(&appointment.app_code, 10, 1, "  ADA@Example.com ")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BookingError::DuplicateBooking {
            reason: DuplicateReason::Email
        }
    );

    h.engine
        .cancel_booking_by_code(first.booking_code().unwrap())
        .await
        .unwrap();
    h.book(&appointment.app_code, 10, 1, "ada@example.com").await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_are_caught_at_commit() {
    let h = Harness::new();
    let appointment = h.open(guarded(AntiScalpingLevel::Standard)).await;
    h.store.set_latency(Duration::from_millis(20));

    let tasks = [9, 10].map(|hour| {
        let engine = h.engine.clone();
        let request = fixtures::guest_request(
            &appointment.app_code,
            fixtures::first_day(),
            fixtures::time(hour, 0),
            1,
            "ada@example.com",
        );
        tokio::spawn(async move { engine.book_appointment(request, BookerIdentity::Guest).await })
    });
    let results: Vec<_> = join_all(tasks).await.into_iter().map(Result::unwrap).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(BookingError::DuplicateBooking {
            reason: DuplicateReason::Email
        })
    )));
}

#[tokio::test]
async fn test_strict_level_requires_a_device_token() {
    let s = strict();
    let appointment = s.h.open(guarded(AntiScalpingLevel::Strict)).await;

    let err = s
        .h
        .engine
        .book_appointment(request(&appointment.app_code, "ada@example.com", None), BookerIdentity::Guest)
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::DeviceTokenMissing);

    let token = s.tokens.issue("phone-1").unwrap();
    let booking = s
        .h
        .engine
        .book_appointment(
            request(&appointment.app_code, "ada@example.com", Some(token.clone())),
            BookerIdentity::Guest,
        )
        .await
        .unwrap();
    assert_eq!(booking.reservation.as_ref().unwrap().device_id, "phone-1");

    let err = s
        .h
        .engine
        .book_appointment(
            request(&appointment.app_code, "bob@example.com", Some(token)),
            BookerIdentity::Guest,
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BookingError::DuplicateBooking {
            reason: DuplicateReason::Device
        }
    );
}

#[tokio::test]
async fn test_strict_level_rejects_expired_and_forged_tokens() {
    let s = strict();
    let appointment = s.h.open(guarded(AntiScalpingLevel::Strict)).await;

    let stale = s.tokens.issue("phone-2").unwrap();
    s.clock.advance(ChronoDuration::minutes(11));
    let err = s
        .h
        .engine
        .book_appointment(
            request(&appointment.app_code, "ada@example.com", Some(stale)),
            BookerIdentity::Guest,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::DeviceTokenInvalid(_)));

    let forger = JwtDeviceTokens::new(b"not-the-secret", DEFAULT_DEVICE_TOKEN_TTL, Arc::new(s.clock.clone()));
    let forged = forger.issue("phone-2").unwrap();
    let err = s
        .h
        .engine
        .book_appointment(
            request(&appointment.app_code, "ada@example.com", Some(forged)),
            BookerIdentity::Guest,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::DeviceTokenInvalid(_)));
    assert_eq!(s.h.slot(&appointment.app_code, 9).seats_booked, 0);
}

#[tokio::test]
async fn test_strict_level_without_token_service_fails_closed() {
    let h = Harness::new();
    let appointment = h.open(guarded(AntiScalpingLevel::Strict)).await;

    let err = h
        .engine
        .book_appointment(
            request(&appointment.app_code, "ada@example.com", Some("anything".to_string())),
            BookerIdentity::Guest,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::DeviceTokenInvalid(_)));
}
