//! # Slotbook Engine
//!
//! Slot and capacity reservations for appointments.
//!
//! An appointment is `single` (one booker per slot), `group` (shared seats
//! per slot) or `party` (one seat pool for the whole appointment). Every
//! reservation runs in one database transaction that locks the capacity row
//! it touches, so concurrent bookers can never oversell.
//!
//! - [`reservations`]: book, reschedule, cancel, reject, confirm, look up
//! - [`appointments`]: create (with slot generation), update, delete
//! - [`guard`]: anti-scalping by email and signed device token
//! - [`notifications`]: domain events to the notification dispatcher
//! - [`config`] and [`bootstrap`]: environment configuration and wiring
//!
//! Events are published after commit; a failing notification never fails
//! the booking that caused it.

pub mod appointments;
pub mod bootstrap;
pub mod config;
pub mod guard;
pub mod notifications;
pub mod reservations;

pub use appointments::AppointmentService;
pub use bootstrap::{Slotbook, build_email_client};
pub use config::{Config, ConfigError};
pub use guard::{AntiScalpingGuard, DeviceTokenError, DeviceTokenVerifier, JwtDeviceTokens};
pub use notifications::{NotificationStatusRecorder, NotificationSubscriber};
pub use reservations::SlotReservationEngine;
