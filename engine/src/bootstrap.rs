//! Wiring of the engine, dispatcher, event bus and scheduler.

use crate::appointments::AppointmentService;
use crate::config::{Config, EmailConfig, EmailProvider};
use crate::guard::{DeviceTokenVerifier, JwtDeviceTokens};
use crate::notifications::{NotificationStatusRecorder, NotificationSubscriber};
use crate::reservations::SlotReservationEngine;
use slotbook_core::environment::Clock;
use slotbook_core::event_bus::EventBus;
use slotbook_core::store::{BookingStore, StatusRefresher};
use slotbook_notify::{
    ClientError, ConsoleClient, DispatchError, DispatcherStats, EmailClient, HttpEmailClient,
    NotificationClient, NotificationDispatcher, SmtpEmailClient,
};
use slotbook_runtime::scheduler::{SchedulerHandle, StatusRefreshScheduler};
use std::sync::Arc;
use std::time::Duration;

/// Build the email client selected by `config`.
///
/// # Errors
///
/// Returns [`ClientError::Transport`] if the HTTP client cannot be built.
pub fn build_email_client(config: &EmailConfig) -> Result<EmailClient, ClientError> {
    let client = match config.provider {
        EmailProvider::Console => EmailClient::Console(ConsoleClient::new()),
        EmailProvider::Http => EmailClient::Http(HttpEmailClient::new(
            config.api_url.clone(),
            config.api_key.clone(),
            config.from_email.clone(),
            config.from_name.clone(),
            Duration::from_secs(config.api_timeout_secs),
        )?),
        EmailProvider::Smtp => EmailClient::Smtp(SmtpEmailClient::new(
            config.smtp_host.clone(),
            config.smtp_port,
            config.smtp_username.clone(),
            config.smtp_password.clone(),
            config.from_email.clone(),
            config.from_name.clone(),
        )),
    };
    tracing::info!(provider = ?config.provider, "Email client configured");
    Ok(client)
}

/// A running Slotbook instance.
pub struct Slotbook<S: BookingStore, C: NotificationClient> {
    /// Booking operations
    pub reservations: SlotReservationEngine<S>,
    /// Appointment lifecycle
    pub appointments: AppointmentService<S>,
    device_tokens: Option<Arc<JwtDeviceTokens>>,
    dispatcher: NotificationDispatcher<C>,
    scheduler: Option<SchedulerHandle>,
}

impl<S, C> Slotbook<S, C>
where
    S: BookingStore + StatusRefresher,
    C: NotificationClient,
{
    /// Start the dispatcher and scheduler and assemble the services.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(config: &Config, store: S, client: C, clock: Arc<dyn Clock>) -> Self {
        let recorder = Arc::new(NotificationStatusRecorder::new(store.clone()));
        let dispatcher =
            NotificationDispatcher::start(config.dispatcher_config(), client, Some(recorder));

        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(NotificationSubscriber::new(
            store.clone(),
            dispatcher.clone(),
        )));
        let bus = Arc::new(bus);

        let secret = &config.anti_scalping.device_token_secret;
        let device_tokens = (!secret.is_empty()).then(|| {
            Arc::new(JwtDeviceTokens::new(
                secret.as_bytes(),
                config.device_token_ttl(),
                Arc::clone(&clock),
            ))
        });
        let verifier = device_tokens
            .as_ref()
            .filter(|_| config.anti_scalping.strict_enabled)
            .map(|tokens| Arc::clone(tokens) as Arc<dyn DeviceTokenVerifier>);

        let reservations =
            SlotReservationEngine::new(store.clone(), Arc::clone(&bus), Arc::clone(&clock), verifier)
                .with_timeout(config.reservation_timeout());
        let appointments = AppointmentService::new(store.clone(), bus, Arc::clone(&clock))
            .with_max_slots(config.reservations.max_slots_per_appointment)
            .with_timeout(config.reservation_timeout());

        let scheduler =
            StatusRefreshScheduler::new(Arc::new(store), clock, config.refresh_interval()).spawn();

        tracing::info!(
            strict = config.anti_scalping.strict_enabled,
            channel = dispatcher.channel(),
            "Slotbook started"
        );

        Self {
            reservations,
            appointments,
            device_tokens,
            dispatcher,
            scheduler: Some(scheduler),
        }
    }

    /// Token service for issuing device tokens, when a secret is configured.
    #[must_use]
    pub fn device_tokens(&self) -> Option<&JwtDeviceTokens> {
        self.device_tokens.as_deref()
    }

    /// Dispatcher counters.
    #[must_use]
    pub fn dispatcher_stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }

    /// Stop the scheduler, then drain the dispatcher within `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ShutdownTimeout`] if jobs were still in flight.
    pub async fn shutdown(&mut self, deadline: Duration) -> Result<(), DispatchError> {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop().await;
        }
        self.dispatcher.shutdown(deadline).await
    }
}
