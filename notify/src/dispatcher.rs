//! Bounded queue and adaptive worker pool for outbound notifications.
//!
//! The dispatcher decouples request handling from provider latency:
//!
//! - [`NotificationDispatcher::publish`] enqueues without blocking when the
//!   queue has room. Under backpressure it makes one more, bounded attempt and
//!   then fails with [`DispatchError::Timeout`]. It never drops a job silently.
//! - A supervisor ticks every `supervisor_interval` and grows the pool to
//!   `min(max_workers, queue_len / events_per_worker + 1)` (zero for an empty
//!   queue). It never stops workers; each worker exits on its own after
//!   `worker_idle_timeout` without a job.
//! - Each job gets `max_retries + 1` attempts through
//!   [`retry_with_predicate`], guided by [`ClientError::should_retry`]. The
//!   final outcome goes to an optional [`DeliveryObserver`].
//! - [`NotificationDispatcher::shutdown`] signals every task, then polls until
//!   no worker is alive or the deadline elapses.
//!
//! Queue depth and live worker count are tracked with channel semantics and
//! an atomic counter.

use crate::client::{ClientError, NotificationClient};
use crate::message::EmailMessage;
use slotbook_core::event::EventName;
use slotbook_core::types::BookingCode;
use slotbook_runtime::metrics::DispatcherMetrics;
use slotbook_runtime::retry::{Backoff, RetryPolicy, retry_with_predicate};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep, timeout};

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Errors from the dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Queue stayed full for the whole enqueue deadline
    #[error("Notification queue full, enqueue timed out")]
    Timeout,

    /// Dispatcher is shutting down
    #[error("Notification dispatcher is closed")]
    Closed,

    /// Workers still running when the shutdown deadline elapsed
    #[error("Shutdown timed out with {0} worker(s) still running")]
    ShutdownTimeout(usize),
}

/// Dispatcher tuning.
///
/// # Default Values
///
/// - `queue_capacity`: 10 000
/// - `max_workers`: 20
/// - `events_per_worker`: 50
/// - `worker_idle_timeout`: 30 seconds
/// - `supervisor_interval`: 1 second
/// - `enqueue_timeout`: 100ms
/// - `retry`: 3 retries, 500ms base, exponential with jitter capped at 10 seconds
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum queued jobs
    pub queue_capacity: usize,
    /// Upper bound on live workers
    pub max_workers: usize,
    /// Queue depth one worker is expected to absorb
    pub events_per_worker: usize,
    /// Idle time after which a worker exits
    pub worker_idle_timeout: Duration,
    /// Supervisor tick
    pub supervisor_interval: Duration,
    /// Second enqueue attempt budget under backpressure
    pub enqueue_timeout: Duration,
    /// Per-job retry policy
    pub retry: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            max_workers: 20,
            events_per_worker: 50,
            worker_idle_timeout: Duration::from_secs(30),
            supervisor_interval: Duration::from_secs(1),
            enqueue_timeout: Duration::from_millis(100),
            retry: RetryPolicy::builder()
                .max_retries(3)
                .base_delay(Duration::from_millis(500))
                .backoff(Backoff::exponential(2.0, Duration::from_secs(10)))
                .build(),
        }
    }
}

impl DispatcherConfig {
    /// Workers wanted for a given queue depth.
    #[must_use]
    pub fn needed_workers(&self, queue_len: usize) -> usize {
        if queue_len == 0 {
            return 0;
        }
        (queue_len / self.events_per_worker.max(1) + 1).min(self.max_workers)
    }
}

/// One outbound message plus what it is about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationJob {
    /// Rendered message
    pub message: EmailMessage,
    /// Event that produced the message
    pub event: EventName,
    /// Booking whose `notification_status` tracks this job
    pub booking_code: Option<BookingCode>,
}

/// Final outcome of a job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Provider accepted the message
    Sent {
        /// Attempts used
        attempts: usize,
    },
    /// Every allowed attempt failed, or the error was not retryable
    Failed {
        /// Attempts used
        attempts: usize,
        /// Last error
        error: ClientError,
    },
}

/// Receives the final outcome of every job.
pub trait DeliveryObserver: Send + Sync {
    /// Record an outcome.
    fn record<'a>(
        &'a self,
        job: &'a NotificationJob,
        outcome: &'a DeliveryOutcome,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Snapshot of the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Jobs waiting
    pub queue_len: usize,
    /// Live workers
    pub workers: usize,
    /// Queue capacity
    pub capacity: usize,
}

struct Inner<C> {
    config: DispatcherConfig,
    client: C,
    observer: Option<Arc<dyn DeliveryObserver>>,
    tx: mpsc::Sender<NotificationJob>,
    rx: Arc<Mutex<mpsc::Receiver<NotificationJob>>>,
    workers: AtomicUsize,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

/// Decrements the live-worker count when a worker exits, however it exits.
struct WorkerSlot<C: NotificationClient> {
    inner: Arc<Inner<C>>,
}

impl<C: NotificationClient> Drop for WorkerSlot<C> {
    fn drop(&mut self) {
        self.inner.workers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Notification dispatcher handle.
///
/// Cloning is cheap; every clone drives the same queue and pool.
pub struct NotificationDispatcher<C: NotificationClient> {
    inner: Arc<Inner<C>>,
}

impl<C: NotificationClient> Clone for NotificationDispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: NotificationClient> NotificationDispatcher<C> {
    /// Create the dispatcher and spawn its supervisor on the current runtime.
    #[must_use]
    pub fn start(
        config: DispatcherConfig,
        client: C,
        observer: Option<Arc<dyn DeliveryObserver>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);

        let inner = Arc::new(Inner {
            config,
            client,
            observer,
            tx,
            rx: Arc::new(Mutex::new(rx)),
            workers: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            shutdown_tx,
        });

        tokio::spawn(Inner::supervise(Arc::clone(&inner)));
        Self { inner }
    }

    /// Channel name of the underlying client.
    #[must_use]
    pub fn channel(&self) -> &'static str {
        self.inner.client.channel()
    }

    /// Enqueue a job, waiting at most `enqueue_timeout` under backpressure.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] after shutdown and
    /// [`DispatchError::Timeout`] if the queue stayed full.
    pub async fn publish(&self, job: NotificationJob) -> Result<(), DispatchError> {
        let deadline = Instant::now() + self.inner.config.enqueue_timeout;
        self.publish_until(job, deadline).await
    }

    /// Enqueue a job, waiting under backpressure until `deadline` at most.
    ///
    /// Dropping the returned future abandons the job.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] after shutdown and
    /// [`DispatchError::Timeout`] if the queue stayed full until `deadline`.
    pub async fn publish_until(
        &self,
        job: NotificationJob,
        deadline: Instant,
    ) -> Result<(), DispatchError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(DispatchError::Closed);
        }

        match self.inner.tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => return Err(DispatchError::Closed),
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::debug!("Notification queue full, waiting for room");
                match tokio::time::timeout_at(deadline, self.inner.tx.send(job)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => return Err(DispatchError::Closed),
                    Err(_) => {
                        tracing::warn!(
                            capacity = self.inner.config.queue_capacity,
                            "Notification enqueue timed out under backpressure"
                        );
                        return Err(DispatchError::Timeout);
                    }
                }
            }
        }

        DispatcherMetrics::record_enqueued();
        if self.inner.workers.load(Ordering::SeqCst) == 0 {
            Inner::scale(&self.inner);
        }
        Ok(())
    }

    /// Current queue depth and live worker count.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            queue_len: self.inner.queue_len(),
            workers: self.inner.workers.load(Ordering::SeqCst),
            capacity: self.inner.tx.max_capacity(),
        }
    }

    /// Stop accepting jobs, signal every task and wait for workers to exit.
    ///
    /// Workers finish the job they are delivering. Jobs still queued once
    /// the pool has drained are dropped and counted in the log.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ShutdownTimeout`] if workers are still alive
    /// when `deadline` elapses.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), DispatchError> {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.shutdown_tx.send_replace(true);

        let give_up = Instant::now() + deadline;
        loop {
            let live = self.inner.workers.load(Ordering::SeqCst);
            if live == 0 {
                break;
            }
            if Instant::now() >= give_up {
                tracing::warn!(workers = live, "Notification dispatcher shutdown timed out");
                return Err(DispatchError::ShutdownTimeout(live));
            }
            sleep(SHUTDOWN_POLL_INTERVAL).await;
        }

        let mut dropped = 0usize;
        {
            let mut rx = self.inner.rx.lock().await;
            while rx.try_recv().is_ok() {
                dropped += 1;
                DispatcherMetrics::record_delivery("dropped");
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, "Dropped queued notification jobs on shutdown");
        }
        tracing::info!("Notification dispatcher stopped");
        Ok(())
    }
}

impl<C: NotificationClient> Inner<C> {
    fn queue_len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    async fn supervise(inner: Arc<Self>) {
        let mut shutdown = inner.shutdown_tx.subscribe();
        let mut ticker = interval(inner.config.supervisor_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    Self::scale(&inner);
                    DispatcherMetrics::record_pool(
                        inner.queue_len(),
                        inner.workers.load(Ordering::SeqCst),
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Notification supervisor stopped");
    }

    /// Spawn workers until the live count reaches the target for the current depth.
    ///
    /// A queued job always gets at least one worker.
    fn scale(inner: &Arc<Self>) {
        if inner.closed.load(Ordering::SeqCst) {
            return;
        }
        let needed = inner.config.needed_workers(inner.queue_len());

        loop {
            let current = inner.workers.load(Ordering::SeqCst);
            if current >= needed {
                return;
            }
            if inner
                .workers
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let slot = WorkerSlot {
                    inner: Arc::clone(inner),
                };
                tracing::debug!(worker = current + 1, needed, "Spawning notification worker");
                tokio::spawn(Self::work(slot));
            }
        }
    }

    async fn work(slot: WorkerSlot<C>) {
        let inner = &slot.inner;
        let mut shutdown = inner.shutdown_tx.subscribe();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let rx = Arc::clone(&inner.rx);
            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = timeout(inner.config.worker_idle_timeout, async move {
                    rx.lock().await.recv().await
                }) => next,
            };

            match next {
                Ok(Some(job)) => inner.deliver(job).await,
                Ok(None) => break,
                Err(_) => {
                    tracing::debug!("Notification worker idle, exiting");
                    break;
                }
            }
        }
    }

    async fn deliver(&self, job: NotificationJob) {
        let mut attempts = 0usize;
        let result = retry_with_predicate(
            &self.config.retry,
            || {
                attempts += 1;
                self.client.send(&job.message)
            },
            ClientError::should_retry,
        )
        .await;

        let outcome = match result {
            Ok(()) => {
                DispatcherMetrics::record_delivery("sent");
                tracing::debug!(event = %job.event, to = %job.message.to, attempts, "Notification sent");
                DeliveryOutcome::Sent { attempts }
            }
            Err(error) => {
                DispatcherMetrics::record_delivery("failed");
                tracing::error!(
                    event = %job.event,
                    to = %job.message.to,
                    attempts,
                    error = %error,
                    "Notification delivery failed"
                );
                DeliveryOutcome::Failed { attempts, error }
            }
        };

        if let Some(observer) = &self.observer {
            observer.record(&job, &outcome).await;
        }
    }
}
