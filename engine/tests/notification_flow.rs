//! End-to-end wiring: bookings reach the provider and the outcome is recorded.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use slotbook_core::types::{
    AntiScalpingLevel, AppCode, AppointmentDraft, BookerIdentity, BookingCode, BookingRequest,
    NotificationStatus, UserId,
};
use slotbook_engine::{Config, DeviceTokenVerifier, Slotbook};
use slotbook_notify::ClientError;
use slotbook_testing::{InMemoryBookingStore, MockNotificationClient, fixtures, test_clock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("DEVICE_TOKEN_SECRET", "integration-secret"),
        ("NOTIFY_MAX_RETRIES", "1"),
        ("NOTIFY_BACKOFF", "constant"),
        ("NOTIFY_BACKOFF_MS", "5"),
        ("STATUS_REFRESH_INTERVAL_SECS", "3600"),
    ]
    .iter()
    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
    .collect();
    vars.extend(extra.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())));
    let config = Config::from_lookup(move |key| vars.get(key).cloned()).unwrap();
    config.validate().unwrap();
    config
}

fn start(
    client: MockNotificationClient,
    extra: &[(&str, &str)],
) -> (Slotbook<InMemoryBookingStore, MockNotificationClient>, InMemoryBookingStore) {
    slotbook_testing::init_tracing();
    let store = InMemoryBookingStore::new();
    let app = Slotbook::start(&config(extra), store.clone(), client, Arc::new(test_clock()));
    (app, store)
}

async fn wait_for_status(
    store: &InMemoryBookingStore,
    code: &BookingCode,
    want: NotificationStatus,
) -> NotificationStatus {
    let mut status = NotificationStatus::NotSent;
    for _ in 0..200 {
        status = store
            .booking(code)
            .and_then(|b| b.reservation)
            .map(|r| r.notification_status)
            .expect("booking exists");
        if status == want {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    status
}

async fn book(
    app: &Slotbook<InMemoryBookingStore, MockNotificationClient>,
    app_code: &AppCode,
    token: Option<String>,
) -> BookingCode {
    let request = BookingRequest {
        device_token: token,
        ..fixtures::guest_request(app_code, fixtures::first_day(), fixtures::time(9, 0), 1, "ada@example.com")
    };
    let booking = app
        .reservations
        .book_appointment(request, BookerIdentity::Guest)
        .await
        .unwrap();
    booking.booking_code().cloned().unwrap()
}

#[tokio::test]
async fn test_booking_confirmation_is_delivered_and_recorded() {
    let client = MockNotificationClient::new();
    let (mut app, store) = start(client.clone(), &[]);
    let appointment = app
        .appointments
        .create_appointment(UserId::new(), fixtures::single_draft())
        .await
        .unwrap();

    let code = book(&app, &appointment.app_code, None).await;

    assert_eq!(
        wait_for_status(&store, &code, NotificationStatus::Sent).await,
        NotificationStatus::Sent
    );
    let sent = client.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ada@example.com");
    let channel = store
        .booking(&code)
        .and_then(|b| b.reservation)
        .and_then(|r| r.notification_channel);
    assert_eq!(channel.as_deref(), Some("mock"));

    app.shutdown(Duration::from_secs(1)).await.unwrap();
    assert_eq!(app.dispatcher_stats().workers, 0);
}

#[tokio::test]
async fn test_exhausted_retries_mark_the_booking_failed() {
    let client = MockNotificationClient::new()
        .failing(5, &ClientError::Transport("connection reset".to_string()));
    let (mut app, store) = start(client.clone(), &[]);
    let appointment = app
        .appointments
        .create_appointment(UserId::new(), fixtures::group_draft(3))
        .await
        .unwrap();

    let code = book(&app, &appointment.app_code, None).await;

    assert_eq!(
        wait_for_status(&store, &code, NotificationStatus::Failed).await,
        NotificationStatus::Failed
    );
    assert_eq!(client.calls(), 2);
    assert!(client.sent().is_empty());
    app.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_issued_device_tokens_unlock_strict_appointments() {
    let (mut app, _store) = start(MockNotificationClient::new(), &[]);
    let draft = AppointmentDraft {
        anti_scalping_level: AntiScalpingLevel::Strict,
        ..fixtures::group_draft(2)
    };
    let appointment = app
        .appointments
        .create_appointment(UserId::new(), draft)
        .await
        .unwrap();

    let tokens = app.device_tokens().expect("secret configured");
    let token = tokens.issue("tablet-7").unwrap();
    assert_eq!(tokens.verify(&token).unwrap(), "tablet-7");
    book(&app, &appointment.app_code, Some(token)).await;

    app.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_disabled_strict_mode_refuses_strict_bookings() {
    let (mut app, _store) = start(
        MockNotificationClient::new(),
        &[("ANTI_SCALPING_STRICT_ENABLED", "false")],
    );
    let draft = AppointmentDraft {
        anti_scalping_level: AntiScalpingLevel::Strict,
        ..fixtures::group_draft(2)
    };
    let appointment = app
        .appointments
        .create_appointment(UserId::new(), draft)
        .await
        .unwrap();
    let token = app.device_tokens().unwrap().issue("tablet-7").unwrap();

    let request = BookingRequest {
        device_token: Some(token),
        ..fixtures::guest_request(
            &appointment.app_code,
            fixtures::first_day(),
            fixtures::time(9, 0),
            1,
            "ada@example.com",
        )
    };
    let err = app
        .reservations
        .book_appointment(request, BookerIdentity::Guest)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DEVICE_TOKEN_INVALID");

    app.shutdown(Duration::from_secs(1)).await.unwrap();
}
