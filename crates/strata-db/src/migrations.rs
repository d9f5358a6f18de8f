//! # Embedded Migrations
//!
//! Schema migrations are compiled into the binary from
//! `migrations/sqlite/` at the workspace root, so a deployed store server
//! never depends on loose .sql files being present on disk.

use sqlx::migrate::Migrator;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// All migrations, embedded at compile time.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies any pending migrations. Idempotent.
pub async fn run(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!("database migrations up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_embedded() {
        assert!(!MIGRATOR.migrations.is_empty());
    }
}
