//! `PostgreSQL` booking store for Slotbook.
//!
//! Implements the repository traits from `slotbook-core` on top of a `sqlx`
//! connection pool:
//!
//! - [`PgBookingStore`]: unlocked reads, notification bookkeeping, status refresh
//! - [`PgBookingTx`]: a transaction whose `lock_*` reads use `SELECT ... FOR UPDATE`
//!
//! Duplicate-booking prevention is backed by partial unique indexes over
//! holding statuses (see `migrations/`), so concurrent transactions that
//! slip past the non-locking pre-checks still fail with a unique violation.
//!
//! # Example
//!
//! ```ignore
//! use slotbook_postgres::{PgBookingStore, PoolConfig};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PgBookingStore::connect(&PoolConfig::new("postgres://localhost/slotbook")).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod rows;

use chrono::{DateTime, NaiveDateTime, Utc};
use error::store_error;
use rows::{
    APPOINTMENT_COLUMNS, BOOKING_COLUMNS, BookingParams, appointment_from_row, booking_from_row,
    signed, user_from_row,
};
use slotbook_core::store::{
    BookingLookup, BookingStore, BookingTx, StatusRefreshCounts, StatusRefresher, StoreError,
};
use slotbook_core::types::{
    AppCode, Appointment, AppointmentId, Booking, BookingCode, NotificationStatus, SlotKey,
    UserId, UserProfile, normalize_email,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Executor, PgPool, Postgres, QueryBuilder, Transaction};
use std::time::Duration;

const HOLDING_STATUSES: &str = "('active', 'pending', 'confirmed', 'ongoing')";

/// Rows per multi-row insert; keeps bind parameters well under the protocol limit.
const INSERT_CHUNK: usize = 500;

/// Connection pool settings.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Connection URL
    pub url: String,
    /// Maximum pooled connections
    pub max_connections: u32,
    /// Connections kept open when idle
    pub min_connections: u32,
    /// Wait for a free connection before failing with a timeout
    pub acquire_timeout: Duration,
    /// Server-side `statement_timeout` per connection (zero disables it)
    pub statement_timeout: Duration,
}

impl PoolConfig {
    /// Defaults for `url`: 20 connections, 5 s acquire timeout, 10 s statement timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 20,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            statement_timeout: Duration::from_secs(10),
        }
    }
}

/// `PostgreSQL`-backed [`BookingStore`].
#[derive(Clone, Debug)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool with the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be reached.
    pub async fn connect(config: &PoolConfig) -> Result<Self, StoreError> {
        let statement_timeout = config.statement_timeout.as_millis();
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if statement_timeout > 0 {
                        conn.execute(format!("SET statement_timeout = {statement_timeout}").as_str())
                            .await?;
                    }
                    Ok(())
                })
            })
            .connect(&config.url)
            .await
            .map_err(|e| store_error("connect", &e))?;

        tracing::info!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self { pool })
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or refresh a registered user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the statement fails.
    pub async fn upsert_user(&self, user: &UserProfile) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO users (id, name, email, phone)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, email = EXCLUDED.email, phone = EXCLUDED.phone
            ",
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.phone.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("upsert user", &e))?;
        Ok(())
    }

    async fn holding_exists(
        &self,
        appointment_id: AppointmentId,
        predicate: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM bookings WHERE appointment_id = $1 AND {predicate} \
             AND status IN {HOLDING_STATUSES})"
        );
        let (exists,): (bool,) = sqlx::query_as(&sql)
            .bind(appointment_id.as_uuid())
            .bind(value)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("duplicate check", &e))?;
        Ok(exists)
    }
}

impl BookingLookup for PgBookingStore {
    async fn has_holding_booking_for_email(
        &self,
        appointment_id: AppointmentId,
        email: &str,
    ) -> Result<bool, StoreError> {
        self.holding_exists(appointment_id, "lower(booker_email) = $2", &normalize_email(email))
            .await
    }

    async fn has_holding_booking_for_device(
        &self,
        appointment_id: AppointmentId,
        device_id: &str,
    ) -> Result<bool, StoreError> {
        if device_id.is_empty() {
            return Ok(false);
        }
        self.holding_exists(appointment_id, "device_id = $2", device_id)
            .await
    }
}

impl BookingStore for PgBookingStore {
    type Tx = PgBookingTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin transaction", &e))?;
        Ok(PgBookingTx { tx })
    }

    async fn find_appointment(&self, app_code: &AppCode) -> Result<Option<Appointment>, StoreError> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE app_code = $1");
        sqlx::query(&sql)
            .bind(app_code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("find appointment", &e))?
            .as_ref()
            .map(appointment_from_row)
            .transpose()
    }

    async fn find_booking(&self, code: &BookingCode) -> Result<Option<Booking>, StoreError> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_code = $1");
        sqlx::query(&sql)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("find booking", &e))?
            .as_ref()
            .map(booking_from_row)
            .transpose()
    }

    async fn list_bookings(&self, app_code: &AppCode) -> Result<Vec<Booking>, StoreError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE app_code = $1 \
             ORDER BY date, start_time, is_slot DESC, created_at"
        );
        let rows = sqlx::query(&sql)
            .bind(app_code.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("list bookings", &e))?;
        rows.iter().map(booking_from_row).collect()
    }

    async fn find_user(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        sqlx::query("SELECT id, name, email, phone FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("find user", &e))?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn set_notification_status(
        &self,
        code: &BookingCode,
        status: NotificationStatus,
        channel: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE bookings
            SET notification_status = $2,
                notification_channel = COALESCE($3, notification_channel)
            WHERE booking_code = $1
            ",
        )
        .bind(code.as_str())
        .bind(status.as_str())
        .bind(channel)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("set notification status", &e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(code.to_string()));
        }
        Ok(())
    }
}

impl StatusRefresher for PgBookingStore {
    async fn refresh_statuses(&self, now: NaiveDateTime) -> Result<StatusRefreshCounts, StoreError> {
        let stamp = now.and_utc();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin refresh", &e))?;

        let statements: [(&str, &str); 5] = [
            (
                "appointments_started",
                "UPDATE appointments SET status = 'ongoing', updated_at = $2 \
                 WHERE status = 'pending' AND start_date + start_time <= $1",
            ),
            (
                "appointments_completed",
                "UPDATE appointments SET status = 'completed', updated_at = $2 \
                 WHERE status = 'ongoing' AND end_date + end_time <= $1",
            ),
            (
                "bookings_expired",
                "UPDATE bookings SET status = 'expired', updated_at = $2 \
                 WHERE status = 'pending' AND date + start_time <= $1",
            ),
            (
                "bookings_started",
                "UPDATE bookings SET status = 'ongoing', updated_at = $2 \
                 WHERE status IN ('active', 'confirmed') AND date + start_time <= $1",
            ),
            (
                "bookings_expired",
                "UPDATE bookings SET status = 'expired', updated_at = $2 \
                 WHERE status = 'ongoing' AND date + end_time <= $1",
            ),
        ];

        let mut counts = StatusRefreshCounts::default();
        for (kind, sql) in statements {
            let rows = sqlx::query(sql)
                .bind(now)
                .bind(stamp)
                .execute(&mut *tx)
                .await
                .map_err(|e| store_error(kind, &e))?
                .rows_affected();
            match kind {
                "appointments_started" => counts.appointments_started += rows,
                "appointments_completed" => counts.appointments_completed += rows,
                "bookings_started" => counts.bookings_started += rows,
                _ => counts.bookings_expired += rows,
            }
        }

        tx.commit()
            .await
            .map_err(|e| store_error("commit refresh", &e))?;
        Ok(counts)
    }
}

/// Transaction over a [`PgBookingStore`].
///
/// Dropping it without committing rolls back (sqlx returns the connection
/// with a pending `ROLLBACK`).
pub struct PgBookingTx {
    tx: Transaction<'static, Postgres>,
}

impl PgBookingTx {
    async fn fetch_booking(
        &mut self,
        context: &str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Option<Booking>, StoreError> {
        let row: Option<PgRow> = query
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| store_error(context, &e))?;
        row.as_ref().map(booking_from_row).transpose()
    }
}

impl BookingTx for PgBookingTx {
    async fn lock_appointment(
        &mut self,
        app_code: &AppCode,
    ) -> Result<Option<Appointment>, StoreError> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE app_code = $1 FOR UPDATE"
        );
        sqlx::query(&sql)
            .bind(app_code.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| store_error("lock appointment", &e))?
            .as_ref()
            .map(appointment_from_row)
            .transpose()
    }

    async fn lock_slot(
        &mut self,
        app_code: &AppCode,
        key: SlotKey,
    ) -> Result<Option<Booking>, StoreError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE app_code = $1 AND is_slot AND date = $2 AND start_time = $3 FOR UPDATE"
        );
        let query = sqlx::query(&sql)
            .bind(app_code.as_str())
            .bind(key.date)
            .bind(key.start_time);
        self.fetch_booking("lock slot", query).await
    }

    async fn lock_booking(&mut self, code: &BookingCode) -> Result<Option<Booking>, StoreError> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_code = $1 FOR UPDATE");
        // A concurrent single-slot release moves the code to a new row; the
        // re-checked row then no longer matches and a fresh statement finds it.
        for _ in 0..3 {
            let query = sqlx::query(&sql).bind(code.as_str());
            if let Some(row) = self.fetch_booking("lock booking", query).await? {
                return Ok(Some(row));
            }
            let (exists,): (bool,) =
                sqlx::query_as("SELECT EXISTS (SELECT 1 FROM bookings WHERE booking_code = $1)")
                    .bind(code.as_str())
                    .fetch_one(&mut *self.tx)
                    .await
                    .map_err(|e| store_error("lock booking", &e))?;
            if !exists {
                return Ok(None);
            }
        }
        Err(StoreError::LockConflict(format!(
            "booking {code} kept moving while waiting for its lock"
        )))
    }

    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO appointments ({APPOINTMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"
        );
        sqlx::query(&sql)
            .bind(appointment.id.as_uuid())
            .bind(appointment.app_code.as_str())
            .bind(appointment.owner_id.as_uuid())
            .bind(&appointment.title)
            .bind(appointment.description.as_deref())
            .bind(appointment.appointment_type.as_str())
            .bind(appointment.start_time)
            .bind(appointment.end_time)
            .bind(appointment.start_date)
            .bind(appointment.end_date)
            .bind(signed(appointment.booking_duration, "booking_duration")?)
            .bind(signed(appointment.max_attendees, "max_attendees")?)
            .bind(signed(appointment.attendees_booked, "attendees_booked")?)
            .bind(appointment.anti_scalping_level.as_str())
            .bind(appointment.requires_confirmation)
            .bind(appointment.status.as_str())
            .bind(appointment.created_at)
            .bind(appointment.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| store_error("insert appointment", &e))?;
        Ok(())
    }

    async fn update_appointment(&mut self, appointment: &Appointment) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE appointments
            SET title = $2, description = $3, max_attendees = $4, attendees_booked = $5,
                anti_scalping_level = $6, requires_confirmation = $7, status = $8, updated_at = $9
            WHERE id = $1
            ",
        )
        .bind(appointment.id.as_uuid())
        .bind(&appointment.title)
        .bind(appointment.description.as_deref())
        .bind(signed(appointment.max_attendees, "max_attendees")?)
        .bind(signed(appointment.attendees_booked, "attendees_booked")?)
        .bind(appointment.anti_scalping_level.as_str())
        .bind(appointment.requires_confirmation)
        .bind(appointment.status.as_str())
        .bind(appointment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| store_error("update appointment", &e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(appointment.app_code.to_string()));
        }
        Ok(())
    }

    async fn insert_bookings(&mut self, bookings: &[Booking]) -> Result<(), StoreError> {
        for chunk in bookings.chunks(INSERT_CHUNK) {
            let params = chunk
                .iter()
                .map(BookingParams::new)
                .collect::<Result<Vec<_>, _>>()?;

            let mut builder: QueryBuilder<'_, Postgres> =
                QueryBuilder::new(format!("INSERT INTO bookings ({BOOKING_COLUMNS}) "));
            builder.push_values(params, |mut row, p| {
                row.push_bind(p.id)
                    .push_bind(p.appointment_id)
                    .push_bind(p.app_code)
                    .push_bind(p.is_slot)
                    .push_bind(p.date)
                    .push_bind(p.start_time)
                    .push_bind(p.end_time)
                    .push_bind(p.capacity)
                    .push_bind(p.seats_booked)
                    .push_bind(p.available)
                    .push_bind(p.booking_code)
                    .push_bind(p.user_id)
                    .push_bind(p.booker_name)
                    .push_bind(p.booker_email)
                    .push_bind(p.booker_phone)
                    .push_bind(p.device_id)
                    .push_bind(p.guard_email)
                    .push_bind(p.attendee_count)
                    .push_bind(p.description)
                    .push_bind(p.status)
                    .push_bind(p.notification_status)
                    .push_bind(p.notification_channel)
                    .push_bind(p.created_at)
                    .push_bind(p.updated_at);
            });
            builder
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| store_error("insert bookings", &e))?;
        }
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        let p = BookingParams::new(booking)?;
        let result = sqlx::query(
            r"
            UPDATE bookings
            SET date = $2, start_time = $3, end_time = $4, capacity = $5, seats_booked = $6,
                available = $7, booking_code = $8, user_id = $9, booker_name = $10,
                booker_email = $11, booker_phone = $12, device_id = $13, guard_email = $14,
                attendee_count = $15, description = $16, status = $17,
                notification_status = $18, notification_channel = $19, updated_at = $20
            WHERE id = $1
            ",
        )
        .bind(p.id)
        .bind(p.date)
        .bind(p.start_time)
        .bind(p.end_time)
        .bind(p.capacity)
        .bind(p.seats_booked)
        .bind(p.available)
        .bind(p.booking_code)
        .bind(p.user_id)
        .bind(p.booker_name)
        .bind(p.booker_email)
        .bind(p.booker_phone)
        .bind(p.device_id)
        .bind(p.guard_email)
        .bind(p.attendee_count)
        .bind(p.description)
        .bind(p.status)
        .bind(p.notification_status)
        .bind(p.notification_channel)
        .bind(p.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| store_error("update booking", &e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(booking.id.to_string()));
        }
        Ok(())
    }

    async fn cancel_holding_bookings(
        &mut self,
        appointment_id: AppointmentId,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "UPDATE bookings SET status = 'canceled', updated_at = $2 \
             WHERE appointment_id = $1 AND status IN {HOLDING_STATUSES}"
        );
        let result = sqlx::query(&sql)
            .bind(appointment_id.as_uuid())
            .bind(now)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| store_error("cancel holding bookings", &e))?;
        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| store_error("commit", &e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| store_error("rollback", &e))
    }
}
