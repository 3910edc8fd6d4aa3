//! Data-driven status transition tables.
//!
//! A [`TransitionTable`] is an allow-list of `(from, to)` pairs. The engine
//! receives its tables at construction, so tests can swap in alternate
//! policies. Time-driven promotions (`pending -> ongoing` and so on) are
//! applied by the status refresher and do not go through these tables.

use crate::error::BookingError;
use crate::types::{AppointmentStatus, BookingStatus};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;

/// Allowed status transitions for one entity kind.
#[derive(Clone, Debug)]
pub struct TransitionTable<S> {
    entity: &'static str,
    allowed: HashMap<S, HashSet<S>>,
}

impl<S> TransitionTable<S>
where
    S: Copy + Eq + Hash + Display,
{
    /// Build a table from explicit pairs.
    #[must_use]
    pub fn new(entity: &'static str, pairs: &[(S, &[S])]) -> Self {
        let allowed = pairs
            .iter()
            .map(|(from, tos)| (*from, tos.iter().copied().collect()))
            .collect();
        Self { entity, allowed }
    }

    /// Whether `from -> to` is listed.
    #[must_use]
    pub fn can_transition(&self, from: S, to: S) -> bool {
        self.allowed.get(&from).is_some_and(|tos| tos.contains(&to))
    }

    /// Check `from -> to`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidTransition`] when the pair is not listed.
    pub fn check(&self, from: S, to: S) -> Result<(), BookingError> {
        if self.can_transition(from, to) {
            Ok(())
        } else {
            Err(BookingError::InvalidTransition {
                entity: self.entity,
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl TransitionTable<BookingStatus> {
    /// Booking allow-list.
    ///
    /// `active -> {canceled, rejected}`, `pending -> {confirmed, canceled,
    /// rejected}`, `confirmed -> {canceled, rejected}`, `ongoing -> {canceled,
    /// rejected}`. Terminal statuses have no entry.
    #[must_use]
    pub fn booking_default() -> Self {
        use BookingStatus::{Active, Canceled, Confirmed, Ongoing, Pending, Rejected};
        Self::new(
            "booking",
            &[
                (Active, &[Canceled, Rejected][..]),
                (Pending, &[Confirmed, Canceled, Rejected][..]),
                (Confirmed, &[Canceled, Rejected][..]),
                (Ongoing, &[Canceled, Rejected][..]),
            ],
        )
    }
}

impl TransitionTable<AppointmentStatus> {
    /// Appointment allow-list: only cancellation is requestable.
    #[must_use]
    pub fn appointment_default() -> Self {
        use AppointmentStatus::{Canceled, Ongoing, Pending};
        Self::new(
            "appointment",
            &[(Pending, &[Canceled][..]), (Ongoing, &[Canceled][..])],
        )
    }
}
