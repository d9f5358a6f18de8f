//! # Connection Pool
//!
//! SQLite pool setup and the [`Database`] handle the rest of the system
//! hangs off. WAL journal mode for concurrent readers, foreign keys on,
//! busy timeout so a momentarily locked file retries instead of failing.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::{
    AuditRepository, CustomerRepository, DeviceRepository, LoyaltyRepository, OutboxRepository,
    PurchaseRepository, RegisterRepository, SaleRepository, StockRepository, StoreRepository,
    SupplierRepository, TransferRepository,
};
use crate::service::{
    InventoryService, LoyaltyService, PurchasingService, RegisterService, SalesService,
    TransferService,
};

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the database file. Ignored for in-memory databases.
    pub path: String,
    pub max_connections: u32,
    pub busy_timeout: Duration,
    in_memory: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<String>) -> Self {
        DbConfig {
            path: path.into(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            in_memory: false,
        }
    }

    /// In-memory database for tests. A single connection is mandatory:
    /// each SQLite `:memory:` connection is its own private database.
    pub fn in_memory() -> Self {
        DbConfig {
            path: ":memory:".to_string(),
            max_connections: 1,
            busy_timeout: Duration::from_secs(5),
            in_memory: true,
        }
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }
}

/// Handle to the database: owns the pool, hands out repositories and
/// services. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if missing) the database described by `config`.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let options = if config.in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::Connection(e.to_string()))?
                // WAL needs a file; memory journal is fine for tests.
                .journal_mode(SqliteJournalMode::Memory)
        } else {
            SqliteConnectOptions::new()
                .filename(&config.path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        }
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            // The sole in-memory connection must never be reaped.
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        info!(path = %config.path, max_connections = config.max_connections, "database opened");
        Ok(Database { pool })
    }

    /// Applies pending migrations.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run(&self.pool).await
    }

    /// Raw pool access, for the sync engine and ad-hoc queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begins a transaction. Services pass the transaction's connection
    /// down through repository write methods.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Cheap liveness probe.
    pub async fn health_check(&self) -> DbResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // === Repositories ===

    pub fn stores(&self) -> StoreRepository {
        StoreRepository::new(self.pool.clone())
    }

    pub fn suppliers(&self) -> SupplierRepository {
        SupplierRepository::new(self.pool.clone())
    }

    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.pool.clone())
    }

    pub fn devices(&self) -> DeviceRepository {
        DeviceRepository::new(self.pool.clone())
    }

    pub fn stock(&self) -> StockRepository {
        StockRepository::new(self.pool.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    pub fn purchases(&self) -> PurchaseRepository {
        PurchaseRepository::new(self.pool.clone())
    }

    pub fn transfers(&self) -> TransferRepository {
        TransferRepository::new(self.pool.clone())
    }

    pub fn loyalty(&self) -> LoyaltyRepository {
        LoyaltyRepository::new(self.pool.clone())
    }

    pub fn registers(&self) -> RegisterRepository {
        RegisterRepository::new(self.pool.clone())
    }

    pub fn audit(&self) -> AuditRepository {
        AuditRepository::new(self.pool.clone())
    }

    pub fn outbox(&self) -> OutboxRepository {
        OutboxRepository::new(self.pool.clone())
    }

    // === Services ===

    pub fn sales_service(&self) -> SalesService {
        SalesService::new(self.clone())
    }

    pub fn purchasing(&self) -> PurchasingService {
        PurchasingService::new(self.clone())
    }

    pub fn transfer_service(&self) -> TransferService {
        TransferService::new(self.clone())
    }

    pub fn register_service(&self) -> RegisterService {
        RegisterService::new(self.clone())
    }

    pub fn inventory(&self) -> InventoryService {
        InventoryService::new(self.clone())
    }

    pub fn loyalty_service(&self) -> LoyaltyService {
        LoyaltyService::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_and_migrates_in_memory() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.run_migrations().await.unwrap();
        db.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.run_migrations().await.unwrap();
        db.run_migrations().await.unwrap();
    }
}
