//! Periodic, time-driven status promotion.
//!
//! [`StatusRefreshScheduler`] runs one refresh pass immediately on start and
//! then once per interval until its [`SchedulerHandle`] is stopped. Each pass
//! is a handful of set-based updates issued by a [`StatusRefresher`]; passes
//! are idempotent, so a missed or repeated tick is harmless.

use crate::metrics::SchedulerMetrics;
use slotbook_core::environment::Clock;
use slotbook_core::store::{StatusRefreshCounts, StatusRefresher, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Default interval between passes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Background task promoting appointment and booking statuses by time.
pub struct StatusRefreshScheduler<R> {
    refresher: Arc<R>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl<R: StatusRefresher> StatusRefreshScheduler<R> {
    /// Create a scheduler; a zero interval falls back to the default.
    #[must_use]
    pub fn new(refresher: Arc<R>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_REFRESH_INTERVAL
        } else {
            interval
        };
        Self {
            refresher,
            clock,
            interval,
        }
    }

    /// Run a single pass.
    ///
    /// Logs at `info` only when at least one row changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the refresher fails.
    pub async fn run_once(&self) -> Result<StatusRefreshCounts, StoreError> {
        let now = self.clock.now().naive_utc();
        let counts = self.refresher.refresh_statuses(now).await?;

        SchedulerMetrics::record_rows("appointments_started", counts.appointments_started);
        SchedulerMetrics::record_rows("appointments_completed", counts.appointments_completed);
        SchedulerMetrics::record_rows("bookings_started", counts.bookings_started);
        SchedulerMetrics::record_rows("bookings_expired", counts.bookings_expired);

        if counts.total() > 0 {
            tracing::info!(
                appointments_started = counts.appointments_started,
                appointments_completed = counts.appointments_completed,
                bookings_started = counts.bookings_started,
                bookings_expired = counts.bookings_expired,
                "Refreshed statuses"
            );
        }
        Ok(counts)
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.run_once().await {
                        tracing::warn!(error = %error, "Status refresh failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Status refresh scheduler stopped");
    }

    /// Spawn the scheduler on the current runtime.
    #[must_use]
    pub fn spawn(self) -> SchedulerHandle
    where
        R: 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle { shutdown_tx, task }
    }
}

/// Handle to a spawned scheduler.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the scheduler and wait for the current pass to finish.
    pub async fn stop(self) {
        self.shutdown_tx.send_replace(true);
        if let Err(error) = self.task.await {
            tracing::warn!(error = %error, "Status refresh task ended abnormally");
        }
    }
}
