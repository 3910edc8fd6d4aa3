//! # Slotbook Runtime
//!
//! Background machinery shared by the Slotbook services.
//!
//! ## Core Components
//!
//! - **Retry**: constant or exponential-with-jitter backoff around fallible async work
//! - **Scheduler**: the periodic status refresher
//! - **Metrics**: Prometheus exporter and metric recorders
//!
//! ## Example
//!
//! ```ignore
//! use slotbook_runtime::scheduler::StatusRefreshScheduler;
//!
//! let handle = StatusRefreshScheduler::new(store, clock, Duration::from_secs(60)).spawn();
//! // ...
//! handle.stop().await;
//! ```

/// Retry logic with constant or exponential backoff
pub mod retry;

/// Periodic time-driven status promotion
pub mod scheduler;

/// Prometheus metrics for observability
pub mod metrics;

pub use retry::{Backoff, RetryPolicy};
pub use scheduler::{SchedulerHandle, StatusRefreshScheduler};
