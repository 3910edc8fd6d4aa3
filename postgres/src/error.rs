//! Translation of `sqlx` errors into [`StoreError`].

use slotbook_core::store::StoreError;

const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const QUERY_CANCELED: &str = "57014";

/// Map a driver error, keeping the constraint name of unique violations.
pub(crate) fn store_error(context: &str, error: &sqlx::Error) -> StoreError {
    let translated = match error {
        sqlx::Error::RowNotFound => StoreError::NotFound(context.to_string()),
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => {
                StoreError::UniqueViolation(db.constraint().unwrap_or("unknown").to_string())
            }
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | LOCK_NOT_AVAILABLE) => {
                StoreError::LockConflict(db.message().to_string())
            }
            Some(QUERY_CANCELED) => StoreError::Timeout,
            _ => StoreError::Database(format!("{context}: {error}")),
        },
        _ => StoreError::Database(format!("{context}: {error}")),
    };

    let kind = match &translated {
        StoreError::NotFound(_) => "not_found",
        StoreError::UniqueViolation(_) => "unique_violation",
        StoreError::LockConflict(_) => "lock_conflict",
        StoreError::Timeout => "timeout",
        StoreError::Database(_) => "database",
    };
    metrics::counter!("slotbook_store_errors_total", "kind" => kind).increment(1);
    if matches!(translated, StoreError::Database(_)) {
        tracing::error!(context, error = %error, "Database operation failed");
    } else {
        tracing::debug!(context, error = %error, kind, "Database operation rejected");
    }

    translated
}
