//! Store repository.

use sqlx::SqlitePool;
use strata_core::validation::validate_name;
use strata_core::Store;

use crate::error::{DbError, DbResult};
use crate::repository::{new_id, now};

pub struct StoreRepository {
    pool: SqlitePool,
}

impl StoreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StoreRepository { pool }
    }

    pub async fn create(
        &self,
        code: &str,
        name: &str,
        address: Option<&str>,
    ) -> DbResult<Store> {
        validate_name(name)?;
        let store = Store {
            id: new_id(),
            code: code.trim().to_string(),
            name: name.trim().to_string(),
            address: address.map(|a| a.to_string()),
            is_active: true,
            created_at: now(),
            updated_at: now(),
            sync_version: 0,
        };

        sqlx::query(
            "INSERT INTO stores (id, code, name, address, is_active, created_at, updated_at, sync_version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&store.id)
        .bind(&store.code)
        .bind(&store.name)
        .bind(&store.address)
        .bind(store.is_active)
        .bind(store.created_at)
        .bind(store.updated_at)
        .bind(store.sync_version)
        .execute(&self.pool)
        .await?;

        Ok(store)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Store>> {
        let store = sqlx::query_as::<_, Store>("SELECT * FROM stores WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(store)
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Store>> {
        let store = sqlx::query_as::<_, Store>("SELECT * FROM stores WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(store)
    }

    pub async fn require(&self, id: &str) -> DbResult<Store> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Store", id))
    }

    pub async fn list_active(&self) -> DbResult<Vec<Store>> {
        let stores =
            sqlx::query_as::<_, Store>("SELECT * FROM stores WHERE is_active = 1 ORDER BY code")
                .fetch_all(&self.pool)
                .await?;
        Ok(stores)
    }

    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE stores SET is_active = 0, updated_at = ?, sync_version = sync_version + 1
             WHERE id = ? AND is_active = 1",
        )
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Store (active)", id));
        }
        Ok(())
    }
}
