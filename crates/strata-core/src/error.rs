//! # Error Types
//!
//! Domain error types for strata-core.
//!
//! Business rule violations live here as `CoreError`; input validation
//! failures are the smaller `ValidationError` and convert into `CoreError`
//! via `#[from]`. Database failures are a separate `DbError` in strata-db.
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impls)
//! 2. Include context in error messages (SKU, ID, quantities)
//! 3. Errors are enum variants, never bare strings

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations and domain logic failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Not enough unreserved stock to complete an issue.
    ///
    /// `available` is on-hand minus reserved; a reservation held for the
    /// requesting document does not count against it.
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// An entity is not in a state that allows the requested operation.
    ///
    /// Raised when a status-guarded UPDATE matches zero rows, e.g. posting
    /// an already-completed sale or receiving a cancelled purchase.
    #[error("{entity} {id} is not {expected}, cannot perform operation")]
    InvalidStatus {
        entity: &'static str,
        id: String,
        expected: &'static str,
    },

    /// Reservation cannot be consumed: it is not active or has expired.
    ///
    /// This is the at-most-once guarantee surfacing as an error; a second
    /// consumption attempt of the same reservation lands here.
    #[error("Reservation {0} is not consumable (inactive or expired)")]
    ReservationNotConsumable(String),

    /// A credit sale would push the customer past their credit limit.
    #[error(
        "Credit limit exceeded for customer {customer_id}: \
         limit {limit_cents}, would owe {would_owe_cents}"
    )]
    CreditLimitExceeded {
        customer_id: String,
        limit_cents: i64,
        would_owe_cents: i64,
    },

    /// Payments recorded against the sale do not cover its total.
    #[error("Sale {sale_id} underpaid: total {total_cents}, paid {paid_cents}")]
    SaleUnderpaid {
        sale_id: String,
        total_cents: i64,
        paid_cents: i64,
    },

    /// Loyalty redemption exceeds the account's point balance.
    #[error("Loyalty account {account_id} has {balance} points, cannot redeem {requested}")]
    InsufficientPoints {
        account_id: String,
        balance: i64,
        requested: i64,
    },

    /// A register is already open for this store/register pair.
    #[error("Register {register_id} at store {store_id} already has an open session")]
    SessionAlreadyOpen {
        store_id: String,
        register_id: String,
    },

    /// A costing operation received a non-positive quantity.
    #[error("Costing quantity must be positive, got {0}")]
    NonPositiveQuantity(i64),

    /// A transfer references the same store on both ends.
    #[error("Transfer source and destination store are both {0}")]
    SameStoreTransfer(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation failures, raised before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (bad IMEI, bad SKU characters, etc.).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Alias
// =============================================================================

/// Convenience alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
