//! HTTP provider client against a mock email API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use slotbook_core::event::EventName;
use slotbook_notify::{
    ClientError, DeliveryObserver, DeliveryOutcome, DispatcherConfig, EmailMessage,
    HttpEmailClient, NotificationClient, NotificationDispatcher, NotificationJob,
};
use slotbook_runtime::retry::{Backoff, RetryPolicy};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn message() -> EmailMessage {
    EmailMessage {
        to: "guest@example.com".to_string(),
        to_name: Some("Guest".to_string()),
        subject: "Booking received: Yoga".to_string(),
        text_body: "See you there".to_string(),
    }
}

fn client(server: &MockServer) -> HttpEmailClient {
    HttpEmailClient::new(
        server.uri(),
        "test-key",
        "noreply@example.com",
        "Slotbook",
        Duration::from_secs(5),
    )
    .unwrap()
}

async fn respond_with(status: u16) -> Result<(), ClientError> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(status).set_body_string("provider says no"))
        .mount(&server)
        .await;
    client(&server).send(&message()).await
}

#[tokio::test]
async fn sends_json_with_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "to": [{ "email": "guest@example.com", "name": "Guest" }],
            "subject": "Booking received: Yoga",
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).send(&message()).await.expect("accepted");
}

#[tokio::test]
async fn server_errors_and_throttling_are_retryable() {
    for status in [500, 503, 429] {
        let err = respond_with(status).await.unwrap_err();
        assert!(err.should_retry(), "{status} should be retried");
        assert!(matches!(err, ClientError::Unavailable { .. }));
    }
}

#[tokio::test]
async fn client_errors_are_not_retryable() {
    for status in [400, 401, 404, 422] {
        let err = respond_with(status).await.unwrap_err();
        assert!(!err.should_retry(), "{status} should not be retried");
        assert_eq!(
            err,
            ClientError::Rejected {
                status,
                body: "provider says no".to_string()
            }
        );
    }
}

#[tokio::test]
async fn connection_failure_is_retryable() {
    let client = HttpEmailClient::new(
        "http://127.0.0.1:1",
        "test-key",
        "noreply@example.com",
        "Slotbook",
        Duration::from_secs(2),
    )
    .unwrap();

    let err = client.send(&message()).await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    assert!(err.should_retry());
}

#[derive(Default)]
struct LastOutcome(Mutex<Option<DeliveryOutcome>>);

impl DeliveryObserver for LastOutcome {
    fn record<'a>(
        &'a self,
        _job: &'a NotificationJob,
        outcome: &'a DeliveryOutcome,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            *self.0.lock().unwrap() = Some(outcome.clone());
        })
    }
}

#[tokio::test]
async fn dispatcher_retries_provider_outage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(202))
        .with_priority(2)
        .mount(&server)
        .await;

    let observer = Arc::new(LastOutcome::default());
    let config = DispatcherConfig {
        supervisor_interval: Duration::from_millis(10),
        retry: RetryPolicy::builder()
            .max_retries(3)
            .base_delay(Duration::from_millis(5))
            .backoff(Backoff::exponential(2.0, Duration::from_millis(50)))
            .build(),
        ..DispatcherConfig::default()
    };
    let dispatcher = NotificationDispatcher::start(config, client(&server), Some(observer.clone()));

    dispatcher
        .publish(NotificationJob {
            message: message(),
            event: EventName::BookingCreated,
            booking_code: None,
        })
        .await
        .unwrap();

    let mut outcome = None;
    for _ in 0..200 {
        outcome = observer.0.lock().unwrap().clone();
        if outcome.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(outcome, Some(DeliveryOutcome::Sent { attempts: 3 }));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    dispatcher.shutdown(Duration::from_secs(1)).await.unwrap();
}
