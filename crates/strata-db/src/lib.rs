//! # strata-db: Database Layer for Strata POS
//!
//! SQLite persistence and the transactional services built on it.
//!
//! ## Architecture
//! ```text
//!   strata-core (pure business logic)
//!        │
//!        ▼
//!   strata-db (THIS CRATE)
//!     ├── pool        - connection pool, WAL mode, health checks
//!     ├── migrations  - embedded schema migrations
//!     ├── repository  - one repository per entity (SQL lives here)
//!     └── service     - multi-repository transactions (sale posting,
//!                       purchase receipt, transfers, register close)
//!        │
//!        ▼
//!   SQLite (single file, WAL mode)
//! ```
//!
//! ## Transaction discipline
//!
//! Repository read methods run on the pool. Write methods that belong to a
//! larger unit of work take `&mut SqliteConnection` so a service can compose
//! several of them, plus an audit row and an outbox row, inside ONE
//! transaction. Nothing becomes visible until the whole flow commits.

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

#[cfg(test)]
pub(crate) mod testing {
    use crate::pool::{Database, DbConfig};

    /// Fresh in-memory database with the full schema applied.
    pub async fn test_db() -> Database {
        let db = Database::new(DbConfig::in_memory())
            .await
            .expect("in-memory database");
        db.run_migrations().await.expect("migrations");
        db
    }
}
