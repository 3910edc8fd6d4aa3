//! Prometheus metrics for reservations, notification delivery and status refresh.
//!
//! Components record through the small recorder structs below; the binary
//! installs the exporter once with [`MetricsServer::start`].
//!
//! # Example
//!
//! ```rust,no_run
//! use slotbook_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register descriptions, install the global recorder and spawn the HTTP listener.
    ///
    /// Must be called from within a Tokio runtime. A second call in the same
    /// process (common in tests) leaves the first recorder in place.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter cannot be built.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            if let Err(error) = exporter.await {
                tracing::error!(error = ?error, "Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(addr = %self.addr, "Metrics server started");
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "bookings_created_total",
        "Total number of reservations created"
    );
    describe_counter!(
        "booking_conflicts_total",
        "Reservations refused by capacity, slot or anti-scalping rules"
    );
    describe_histogram!(
        "reservation_duration_seconds",
        "Time spent inside reservation transactions"
    );

    describe_counter!(
        "notification_jobs_enqueued_total",
        "Notification jobs accepted by the dispatcher queue"
    );
    describe_counter!(
        "notification_deliveries_total",
        "Notification jobs finished, labelled by outcome"
    );
    describe_gauge!(
        "notification_queue_depth",
        "Jobs waiting in the dispatcher queue"
    );
    describe_gauge!("notification_workers", "Live dispatcher workers");

    describe_counter!(
        "status_refresh_rows_total",
        "Rows promoted by the status refresher, labelled by kind"
    );
}

/// Reservation metrics recorder.
pub struct BookingMetrics;

impl BookingMetrics {
    /// Record a created reservation.
    pub fn record_created(appointment_type: &'static str) {
        counter!("bookings_created_total", "type" => appointment_type).increment(1);
    }

    /// Record a refused reservation.
    pub fn record_conflict(reason: &'static str) {
        counter!("booking_conflicts_total", "reason" => reason).increment(1);
    }

    /// Record time spent in a reservation transaction.
    pub fn record_duration(operation: &'static str, duration: Duration) {
        histogram!("reservation_duration_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }
}

/// Notification dispatcher metrics recorder.
pub struct DispatcherMetrics;

impl DispatcherMetrics {
    /// Record an accepted job.
    pub fn record_enqueued() {
        counter!("notification_jobs_enqueued_total").increment(1);
    }

    /// Record a finished job (`sent`, `failed` or `dropped`).
    pub fn record_delivery(outcome: &'static str) {
        counter!("notification_deliveries_total", "outcome" => outcome).increment(1);
    }

    /// Record queue depth and live workers.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_pool(queue_depth: usize, workers: usize) {
        gauge!("notification_queue_depth").set(queue_depth as f64);
        gauge!("notification_workers").set(workers as f64);
    }
}

/// Status refresh metrics recorder.
pub struct SchedulerMetrics;

impl SchedulerMetrics {
    /// Record rows promoted in one pass for one kind of promotion.
    pub fn record_rows(kind: &'static str, rows: u64) {
        if rows > 0 {
            counter!("status_refresh_rows_total", "kind" => kind).increment(rows);
        }
    }
}
