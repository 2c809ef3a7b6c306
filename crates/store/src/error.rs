use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row lock could not be acquired in time, or the database aborted the
    /// transaction to resolve a serialization failure or deadlock. Retryable.
    #[error("Store conflict: {0}")]
    Conflict(String),

    /// A uniqueness constraint rejected a write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A write would take a quantity beyond what its column holds.
    #[error("Value out of range for column {column}")]
    OutOfRange { column: &'static str },

    /// A persisted value could not be converted to its domain type.
    #[error("Invalid value in column {column}: {reason}")]
    Decode { column: &'static str, reason: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if re-running the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// SQLSTATE codes surfaced as [`StoreError::Conflict`].
const LOCK_NOT_AVAILABLE: &str = "55P03";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            match db_err.code().as_deref() {
                Some(code @ (LOCK_NOT_AVAILABLE | SERIALIZATION_FAILURE | DEADLOCK_DETECTED)) => {
                    tracing::debug!(sqlstate = code, "transaction aborted by lock contention");
                    return StoreError::Conflict(db_err.message().to_string());
                }
                Some(UNIQUE_VIOLATION) => {
                    return StoreError::UniqueViolation {
                        constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                    };
                }
                _ => {}
            }
        }
        if matches!(e, sqlx::Error::PoolTimedOut) {
            return StoreError::Conflict("timed out waiting for a connection".to_string());
        }
        StoreError::Database(e)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(StoreError::Conflict("lock timeout".into()).is_retryable());
        assert!(
            !StoreError::UniqueViolation {
                constraint: "payments_order_id_key".into()
            }
            .is_retryable()
        );
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_retryable());
        assert!(!StoreError::OutOfRange { column: "quantity" }.is_retryable());
    }

    #[test]
    fn pool_timeout_maps_to_conflict() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_retryable());
    }
}
