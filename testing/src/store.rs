//! In-memory [`BookingStore`] with real row-lock semantics.
//!
//! Each row owns a `tokio::sync::Mutex`. A transaction acquires row locks on
//! `lock_*` reads (re-entrantly) and keeps the owned guards until it commits,
//! rolls back or is dropped, so concurrent writers on the same row serialise
//! exactly as they would behind `SELECT ... FOR UPDATE`.
//!
//! Writes are staged inside the transaction and applied atomically on commit,
//! after the same unique constraints the Postgres schema declares are
//! checked against the merged state.

use chrono::{DateTime, NaiveDateTime, Utc};
use slotbook_core::store::{
    BookingLookup, BookingStore, BookingTx, StatusRefreshCounts, StatusRefresher, StoreError,
};
use slotbook_core::types::{
    AppCode, Appointment, AppointmentId, AppointmentStatus, Booking, BookingCode, BookingId,
    BookingStatus, NotificationStatus, SlotKey, UserId, UserProfile, normalize_email,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

/// Constraint names shared with the SQL schema.
pub mod constraints {
    /// Unique public appointment code
    pub const APP_CODE: &str = "appointments_app_code_key";
    /// Unique booking code
    pub const BOOKING_CODE: &str = "bookings_booking_code_key";
    /// One slot per appointment, date and start time
    pub const SLOT_KEY: &str = "bookings_slot_key_idx";
    /// One holding booking per appointment and normalised email
    pub const GUARD_EMAIL: &str = "bookings_guard_email_holding_idx";
    /// One holding booking per appointment and device
    pub const DEVICE: &str = "bookings_device_holding_idx";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum RowId {
    Appointment(AppointmentId),
    Booking(BookingId),
}

#[derive(Clone, Default)]
struct Tables {
    appointments: HashMap<AppointmentId, Appointment>,
    bookings: HashMap<BookingId, Booking>,
    users: HashMap<UserId, UserProfile>,
}

impl Tables {
    fn appointment_by_code(&self, app_code: &AppCode) -> Option<&Appointment> {
        self.appointments.values().find(|a| &a.app_code == app_code)
    }

    fn slot_id(&self, app_code: &AppCode, key: SlotKey) -> Option<BookingId> {
        self.bookings
            .values()
            .find(|b| b.is_slot && &b.app_code == app_code && b.key() == key)
            .map(|b| b.id)
    }

    fn booking_id(&self, code: &BookingCode) -> Option<BookingId> {
        self.bookings
            .values()
            .find(|b| b.booking_code() == Some(code))
            .map(|b| b.id)
    }

    fn holding(&self, appointment_id: AppointmentId) -> impl Iterator<Item = &Booking> {
        self.bookings.values().filter(move |b| {
            b.appointment_id == appointment_id && b.status().is_some_and(|s| s.is_holding())
        })
    }

    fn check_constraints(&self) -> Result<(), StoreError> {
        let mut app_codes = HashSet::new();
        for appointment in self.appointments.values() {
            if !app_codes.insert(&appointment.app_code) {
                return Err(StoreError::UniqueViolation(constraints::APP_CODE.to_string()));
            }
        }

        let mut codes = HashSet::new();
        let mut slots = HashSet::new();
        let mut emails = HashSet::new();
        let mut devices = HashSet::new();
        for booking in self.bookings.values() {
            if booking.is_slot && !slots.insert((booking.appointment_id, booking.key())) {
                return Err(StoreError::UniqueViolation(constraints::SLOT_KEY.to_string()));
            }
            let Some(reservation) = &booking.reservation else {
                continue;
            };
            if !codes.insert(&reservation.booking_code) {
                return Err(StoreError::UniqueViolation(
                    constraints::BOOKING_CODE.to_string(),
                ));
            }
            if !reservation.status.is_holding() {
                continue;
            }
            if let Some(email) = &reservation.guard_email {
                if !emails.insert((booking.appointment_id, email)) {
                    return Err(StoreError::UniqueViolation(
                        constraints::GUARD_EMAIL.to_string(),
                    ));
                }
            }
            if !reservation.device_id.is_empty()
                && !devices.insert((booking.appointment_id, &reservation.device_id))
            {
                return Err(StoreError::UniqueViolation(constraints::DEVICE.to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<RowId, Arc<RowLock<()>>>>,
    latency_ms: AtomicU64,
    fail_next_commit: AtomicBool,
    commits: AtomicUsize,
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, row: RowId) -> Arc<RowLock<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(row).or_default())
    }

    async fn simulate_latency(&self) {
        let millis = self.latency_ms.load(Ordering::Relaxed);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}

/// In-memory booking store.
///
/// Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct InMemoryBookingStore {
    shared: Arc<Shared>,
}

impl InMemoryBookingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user profile.
    pub fn insert_user(&self, user: UserProfile) {
        self.shared.tables().users.insert(user.id, user);
    }

    /// Add latency before every row lock, emulating a slow database.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.shared.latency_ms.store(millis, Ordering::Relaxed);
    }

    /// Make the next commit fail with [`StoreError::Database`].
    pub fn fail_next_commit(&self) {
        self.shared.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of successful commits so far.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }

    /// Committed appointment by code.
    #[must_use]
    pub fn appointment(&self, app_code: &AppCode) -> Option<Appointment> {
        self.shared.tables().appointment_by_code(app_code).cloned()
    }

    /// Committed row carrying `code`.
    #[must_use]
    pub fn booking(&self, code: &BookingCode) -> Option<Booking> {
        let tables = self.shared.tables();
        tables
            .booking_id(code)
            .and_then(|id| tables.bookings.get(&id).cloned())
    }

    /// Committed slot row at `key`.
    #[must_use]
    pub fn slot(&self, app_code: &AppCode, key: SlotKey) -> Option<Booking> {
        let tables = self.shared.tables();
        tables
            .slot_id(app_code, key)
            .and_then(|id| tables.bookings.get(&id).cloned())
    }

    /// Every committed row of an appointment, ordered by slot key then slots first.
    #[must_use]
    pub fn rows(&self, app_code: &AppCode) -> Vec<Booking> {
        let mut rows: Vec<Booking> = self
            .shared
            .tables()
            .bookings
            .values()
            .filter(|b| &b.app_code == app_code)
            .cloned()
            .collect();
        rows.sort_by_key(|b| (b.key(), !b.is_slot, b.created_at));
        rows
    }
}

impl BookingLookup for InMemoryBookingStore {
    async fn has_holding_booking_for_email(
        &self,
        appointment_id: AppointmentId,
        email: &str,
    ) -> Result<bool, StoreError> {
        let email = normalize_email(email);
        let tables = self.shared.tables();
        Ok(tables.holding(appointment_id).any(|b| {
            b.reservation
                .as_ref()
                .is_some_and(|r| r.booker.normalized_email() == email)
        }))
    }

    async fn has_holding_booking_for_device(
        &self,
        appointment_id: AppointmentId,
        device_id: &str,
    ) -> Result<bool, StoreError> {
        if device_id.is_empty() {
            return Ok(false);
        }
        let tables = self.shared.tables();
        Ok(tables.holding(appointment_id).any(|b| {
            b.reservation
                .as_ref()
                .is_some_and(|r| r.device_id == device_id)
        }))
    }
}

impl BookingStore for InMemoryBookingStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(InMemoryTx {
            shared: Arc::clone(&self.shared),
            held: HashMap::new(),
            appointments: HashMap::new(),
            bookings: HashMap::new(),
        })
    }

    async fn find_appointment(&self, app_code: &AppCode) -> Result<Option<Appointment>, StoreError> {
        Ok(self.appointment(app_code))
    }

    async fn find_booking(&self, code: &BookingCode) -> Result<Option<Booking>, StoreError> {
        Ok(self.booking(code))
    }

    async fn list_bookings(&self, app_code: &AppCode) -> Result<Vec<Booking>, StoreError> {
        Ok(self.rows(app_code))
    }

    async fn find_user(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.shared.tables().users.get(&user_id).cloned())
    }

    async fn set_notification_status(
        &self,
        code: &BookingCode,
        status: NotificationStatus,
        channel: Option<&str>,
    ) -> Result<(), StoreError> {
        let id = self
            .shared
            .tables()
            .booking_id(code)
            .ok_or_else(|| StoreError::NotFound(code.to_string()))?;

        let lock = self.shared.row_lock(RowId::Booking(id));
        let _guard = lock.lock().await;

        let mut tables = self.shared.tables();
        let reservation = tables
            .bookings
            .get_mut(&id)
            .and_then(|b| b.reservation.as_mut())
            .filter(|r| &r.booking_code == code)
            .ok_or_else(|| StoreError::NotFound(code.to_string()))?;
        reservation.notification_status = status;
        if let Some(channel) = channel {
            reservation.notification_channel = Some(channel.to_string());
        }
        Ok(())
    }
}

fn promote_appointment(
    appointment: &mut Appointment,
    now: NaiveDateTime,
    stamp: DateTime<Utc>,
    counts: &mut StatusRefreshCounts,
) {
    if appointment.status == AppointmentStatus::Pending && now >= appointment.starts_at() {
        appointment.status = AppointmentStatus::Ongoing;
        appointment.updated_at = stamp;
        counts.appointments_started += 1;
    }
    if appointment.status == AppointmentStatus::Ongoing && now >= appointment.ends_at() {
        appointment.status = AppointmentStatus::Completed;
        appointment.updated_at = stamp;
        counts.appointments_completed += 1;
    }
}

fn promote_booking(
    booking: &mut Booking,
    now: NaiveDateTime,
    stamp: DateTime<Utc>,
    counts: &mut StatusRefreshCounts,
) {
    let (starts_at, ends_at) = (booking.starts_at(), booking.ends_at());
    let Some(reservation) = booking.reservation.as_mut() else {
        return;
    };
    let before = reservation.status;
    match reservation.status {
        BookingStatus::Pending if now >= starts_at => {
            reservation.status = BookingStatus::Expired;
            counts.bookings_expired += 1;
        }
        BookingStatus::Active | BookingStatus::Confirmed if now >= starts_at => {
            reservation.status = BookingStatus::Ongoing;
            counts.bookings_started += 1;
        }
        _ => {}
    }
    if reservation.status == BookingStatus::Ongoing && now >= ends_at {
        reservation.status = BookingStatus::Expired;
        counts.bookings_expired += 1;
    }
    if reservation.status != before {
        booking.updated_at = stamp;
    }
}

/// Each row is promoted under its row lock, so a refresh waits for open
/// transactions on that row the way a bulk `UPDATE` waits on `FOR UPDATE`.
impl StatusRefresher for InMemoryBookingStore {
    async fn refresh_statuses(&self, now: NaiveDateTime) -> Result<StatusRefreshCounts, StoreError> {
        let mut counts = StatusRefreshCounts::default();
        let stamp = now.and_utc();
        let (appointment_ids, booking_ids): (Vec<AppointmentId>, Vec<BookingId>) = {
            let tables = self.shared.tables();
            (
                tables.appointments.keys().copied().collect(),
                tables
                    .bookings
                    .values()
                    .filter(|b| b.reservation.is_some())
                    .map(|b| b.id)
                    .collect(),
            )
        };

        for id in appointment_ids {
            let _row = self.shared.row_lock(RowId::Appointment(id)).lock_owned().await;
            let mut tables = self.shared.tables();
            if let Some(appointment) = tables.appointments.get_mut(&id) {
                promote_appointment(appointment, now, stamp, &mut counts);
            }
        }

        for id in booking_ids {
            let _row = self.shared.row_lock(RowId::Booking(id)).lock_owned().await;
            let mut tables = self.shared.tables();
            if let Some(booking) = tables.bookings.get_mut(&id) {
                promote_booking(booking, now, stamp, &mut counts);
            }
        }

        Ok(counts)
    }
}

/// Transaction over an [`InMemoryBookingStore`].
///
/// Dropping it without committing discards staged writes and releases its locks.
pub struct InMemoryTx {
    shared: Arc<Shared>,
    held: HashMap<RowId, OwnedMutexGuard<()>>,
    appointments: HashMap<AppointmentId, Appointment>,
    bookings: HashMap<BookingId, Booking>,
}

impl InMemoryTx {
    async fn lock_row(&mut self, row: RowId) {
        if self.held.contains_key(&row) {
            return;
        }
        let lock = self.shared.row_lock(row);
        let guard = lock.lock_owned().await;
        self.held.insert(row, guard);
    }

    fn view_booking(&self, id: BookingId) -> Option<Booking> {
        self.bookings
            .get(&id)
            .cloned()
            .or_else(|| self.shared.tables().bookings.get(&id).cloned())
    }

    fn view_appointment(&self, id: AppointmentId) -> Option<Appointment> {
        self.appointments
            .get(&id)
            .cloned()
            .or_else(|| self.shared.tables().appointments.get(&id).cloned())
    }

    fn staged_booking_id(&self, code: &BookingCode) -> Option<BookingId> {
        self.bookings
            .values()
            .find(|b| b.booking_code() == Some(code))
            .map(|b| b.id)
    }
}

impl BookingTx for InMemoryTx {
    async fn lock_appointment(
        &mut self,
        app_code: &AppCode,
    ) -> Result<Option<Appointment>, StoreError> {
        self.shared.simulate_latency().await;
        let staged = self
            .appointments
            .values()
            .find(|a| &a.app_code == app_code)
            .map(|a| a.id);
        let id = staged.or_else(|| {
            self.shared
                .tables()
                .appointment_by_code(app_code)
                .map(|a| a.id)
        });
        let Some(id) = id else {
            return Ok(None);
        };
        self.lock_row(RowId::Appointment(id)).await;
        Ok(self.view_appointment(id))
    }

    async fn lock_slot(
        &mut self,
        app_code: &AppCode,
        key: SlotKey,
    ) -> Result<Option<Booking>, StoreError> {
        self.shared.simulate_latency().await;
        let staged = self
            .bookings
            .values()
            .find(|b| b.is_slot && &b.app_code == app_code && b.key() == key)
            .map(|b| b.id);
        let id = staged.or_else(|| self.shared.tables().slot_id(app_code, key));
        let Some(id) = id else {
            return Ok(None);
        };
        self.lock_row(RowId::Booking(id)).await;
        Ok(self.view_booking(id))
    }

    async fn lock_booking(&mut self, code: &BookingCode) -> Result<Option<Booking>, StoreError> {
        self.shared.simulate_latency().await;
        // The code may move to another row while we wait (single-slot release),
        // so look it up again after every acquisition.
        for _ in 0..3 {
            let id = self
                .staged_booking_id(code)
                .or_else(|| self.shared.tables().booking_id(code));
            let Some(id) = id else {
                return Ok(None);
            };
            self.lock_row(RowId::Booking(id)).await;
            if let Some(row) = self.view_booking(id).filter(|b| b.booking_code() == Some(code)) {
                return Ok(Some(row));
            }
        }
        Err(StoreError::LockConflict(format!(
            "booking {code} kept moving while waiting for its lock"
        )))
    }

    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<(), StoreError> {
        self.lock_row(RowId::Appointment(appointment.id)).await;
        self.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn update_appointment(&mut self, appointment: &Appointment) -> Result<(), StoreError> {
        if self.view_appointment(appointment.id).is_none() {
            return Err(StoreError::NotFound(appointment.app_code.to_string()));
        }
        self.lock_row(RowId::Appointment(appointment.id)).await;
        self.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn insert_bookings(&mut self, bookings: &[Booking]) -> Result<(), StoreError> {
        for booking in bookings {
            self.lock_row(RowId::Booking(booking.id)).await;
            self.bookings.insert(booking.id, booking.clone());
        }
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        if self.view_booking(booking.id).is_none() {
            return Err(StoreError::NotFound(booking.id.to_string()));
        }
        self.lock_row(RowId::Booking(booking.id)).await;
        self.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn cancel_holding_bookings(
        &mut self,
        appointment_id: AppointmentId,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut candidates: Vec<(SlotKey, bool, BookingId)> = {
            let tables = self.shared.tables();
            tables
                .bookings
                .values()
                .chain(self.bookings.values())
                .filter(|b| b.appointment_id == appointment_id && b.reservation.is_some())
                .map(|b| (b.key(), !b.is_slot, b.id))
                .collect()
        };
        candidates.sort();
        candidates.dedup();

        let mut canceled = 0;
        for (_, _, id) in candidates {
            self.lock_row(RowId::Booking(id)).await;
            let Some(mut row) = self.view_booking(id) else {
                continue;
            };
            let Some(reservation) = row.reservation.as_mut() else {
                continue;
            };
            if !reservation.status.is_holding() {
                continue;
            }
            reservation.status = BookingStatus::Canceled;
            row.updated_at = now;
            self.bookings.insert(id, row);
            canceled += 1;
        }
        Ok(canceled)
    }

    async fn commit(self) -> Result<(), StoreError> {
        if self.shared.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database("injected commit failure".to_string()));
        }

        let mut tables = self.shared.tables();
        let mut merged = tables.clone();
        merged.appointments.extend(self.appointments);
        merged.bookings.extend(self.bookings);
        merged.check_constraints()?;
        *tables = merged;
        drop(tables);

        self.shared.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::fixtures;

    async fn seeded() -> (InMemoryBookingStore, Appointment, Booking) {
        let store = InMemoryBookingStore::new();
        let appointment = fixtures::appointment(fixtures::group_draft(2));
        let slot = Booking::new_slot(
            &appointment,
            appointment.start_date,
            appointment.start_time,
            fixtures::time(10, 0),
            2,
            appointment.created_at,
        );
        let mut tx = store.begin().await.unwrap();
        tx.insert_appointment(&appointment).await.unwrap();
        tx.insert_bookings(std::slice::from_ref(&slot)).await.unwrap();
        tx.commit().await.unwrap();
        (store, appointment, slot)
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible_and_dropped() {
        let (store, appointment, slot) = seeded().await;

        let mut tx = store.begin().await.unwrap();
        let mut row = tx
            .lock_slot(&appointment.app_code, slot.key())
            .await
            .unwrap()
            .unwrap();
        row.seats_booked = 2;
        tx.update_booking(&row).await.unwrap();
        assert_eq!(store.slot(&appointment.app_code, slot.key()).unwrap().seats_booked, 0);
        drop(tx);

        assert_eq!(store.slot(&appointment.app_code, slot.key()).unwrap().seats_booked, 0);
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_transaction_until_commit() {
        let (store, appointment, slot) = seeded().await;

        let mut first = store.begin().await.unwrap();
        let mut row = first
            .lock_slot(&appointment.app_code, slot.key())
            .await
            .unwrap()
            .unwrap();

        let waiter = {
            let store = store.clone();
            let code = appointment.app_code.clone();
            tokio::spawn(async move {
                let mut second = store.begin().await.unwrap();
                let row = second.lock_slot(&code, slot.key()).await.unwrap().unwrap();
                second.rollback().await.unwrap();
                row.seats_booked
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        row.seats_booked = 1;
        first.update_booking(&row).await.unwrap();
        first.commit().await.unwrap();

        assert_eq!(waiter.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        let (store, appointment, slot) = seeded().await;
        store.fail_next_commit();

        let mut tx = store.begin().await.unwrap();
        let mut row = tx
            .lock_slot(&appointment.app_code, slot.key())
            .await
            .unwrap()
            .unwrap();
        row.seats_booked = 1;
        tx.update_booking(&row).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Database(_))));

        assert_eq!(store.slot(&appointment.app_code, slot.key()).unwrap().seats_booked, 0);
    }

    #[tokio::test]
    async fn test_duplicate_slot_key_is_rejected_on_commit() {
        let (store, appointment, slot) = seeded().await;

        let mut duplicate = slot.clone();
        duplicate.id = BookingId::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_bookings(&[duplicate]).await.unwrap();
        assert_eq!(
            tx.commit().await,
            Err(StoreError::UniqueViolation(constraints::SLOT_KEY.to_string()))
        );
        assert_eq!(store.rows(&appointment.app_code).len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_waits_for_locked_rows() {
        let (store, appointment, _slot) = seeded().await;

        let mut tx = store.begin().await.unwrap();
        let mut locked = tx
            .lock_appointment(&appointment.app_code)
            .await
            .unwrap()
            .unwrap();

        let refresh = {
            let store = store.clone();
            let now = appointment.starts_at() + chrono::Duration::minutes(5);
            tokio::spawn(async move { store.refresh_statuses(now).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!refresh.is_finished());

        locked.title = "Renamed".to_string();
        tx.update_appointment(&locked).await.unwrap();
        tx.commit().await.unwrap();

        let counts = refresh.await.unwrap().unwrap();
        assert_eq!(counts.appointments_started, 1);
        let stored = store.appointment(&appointment.app_code).unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.status, AppointmentStatus::Ongoing);
    }
}
