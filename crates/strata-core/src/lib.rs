//! # strata-core: Pure Business Logic for Strata POS
//!
//! The heart of the system: every business rule lives here as a pure
//! function with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//!   callers (services in strata-db, sync engine, future API surface)
//!        │
//!        ▼
//!   strata-core (THIS CRATE)
//!     types • money • costing • loyalty • validation • error
//!     NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS
//!        │
//!        ▼
//!   strata-db (SQLite persistence, transactional services)
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Device, StockItem, Sale, Transfer, ...)
//! - [`money`] - Integer-cents money arithmetic (no floating point!)
//! - [`costing`] - Weighted-average inventory costing math
//! - [`loyalty`] - Loyalty point accrual and redemption math
//! - [`validation`] - Input validation (SKU, IMEI Luhn check, quantities)
//! - [`error`] - Typed domain errors
//!
//! ## Design Principles
//!
//! 1. **Pure functions**: same input, same output, always
//! 2. **No I/O**: database, network and file system access are forbidden here
//! 3. **Integer money**: all monetary values are cents (i64)
//! 4. **Explicit errors**: typed enums, never strings or panics

pub mod costing;
pub mod error;
pub mod loyalty;
pub mod money;
pub mod types;
pub mod validation;

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

/// How long a stock reservation holds before the expiry sweep releases it.
pub const RESERVATION_TTL_MINUTES: i64 = 60;

/// Cash variance at session close above which the audit entry escalates
/// to Critical severity.
pub const VARIANCE_ALERT_CENTS: i64 = 2000;
