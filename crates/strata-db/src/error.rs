//! # Database Error Types
//!
//! `DbError` covers everything that can go wrong below the service line:
//! connection failures, migration failures, constraint violations, and the
//! business rule violations (`CoreError`) that surface while a repository
//! holds the authoritative row inside a transaction.

use strata_core::CoreError;
use thiserror::Error;

/// Database layer errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to open or configure the database.
    #[error("Database connection error: {0}")]
    Connection(String),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Row not found. `entity` may carry an expected-state qualifier, e.g.
    /// "Sale (draft)" when a status-guarded UPDATE matched nothing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE constraint rejected the write.
    #[error("Unique constraint violation: {detail}")]
    UniqueViolation { detail: String },

    /// A FOREIGN KEY constraint rejected the write.
    #[error("Foreign key violation: {detail}")]
    ForeignKeyViolation { detail: String },

    /// Business rule violation raised inside a transaction.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// JSON (de)serialization of a payload or detail blob failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other sqlx failure.
    #[error("Query error: {0}")]
    Query(sqlx::Error),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

impl From<strata_core::ValidationError> for DbError {
    fn from(err: strata_core::ValidationError) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

/// Classify sqlx errors so callers can match on constraint violations
/// instead of string-parsing at every call site.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message().to_string();
                if db_err.is_unique_violation() {
                    DbError::UniqueViolation { detail: msg }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation { detail: msg }
                } else {
                    DbError::Query(err)
                }
            }
            _ => DbError::Query(err),
        }
    }
}

/// Convenience alias for Results with DbError.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message() {
        let err = DbError::not_found("Sale (draft)", "sale-123");
        assert_eq!(err.to_string(), "Sale (draft) not found: sale-123");
    }

    #[test]
    fn core_error_passes_through() {
        let err: DbError = CoreError::NonPositiveQuantity(0).into();
        assert!(matches!(err, DbError::Domain(_)));
        assert!(err.to_string().contains("must be positive"));
    }
}
