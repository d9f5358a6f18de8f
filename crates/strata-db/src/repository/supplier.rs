//! Supplier repository.

use sqlx::SqlitePool;
use strata_core::validation::validate_name;
use strata_core::Supplier;

use crate::error::{DbError, DbResult};
use crate::repository::{new_id, now};

pub struct SupplierRepository {
    pool: SqlitePool,
}

impl SupplierRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SupplierRepository { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        contact_name: Option<&str>,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> DbResult<Supplier> {
        validate_name(name)?;
        let supplier = Supplier {
            id: new_id(),
            name: name.trim().to_string(),
            contact_name: contact_name.map(String::from),
            phone: phone.map(String::from),
            email: email.map(String::from),
            tax_id: None,
            notes: None,
            is_active: true,
            created_at: now(),
            updated_at: now(),
            sync_version: 0,
        };

        sqlx::query(
            "INSERT INTO suppliers
                (id, name, contact_name, phone, email, tax_id, notes, is_active,
                 created_at, updated_at, sync_version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&supplier.id)
        .bind(&supplier.name)
        .bind(&supplier.contact_name)
        .bind(&supplier.phone)
        .bind(&supplier.email)
        .bind(&supplier.tax_id)
        .bind(&supplier.notes)
        .bind(supplier.is_active)
        .bind(supplier.created_at)
        .bind(supplier.updated_at)
        .bind(supplier.sync_version)
        .execute(&self.pool)
        .await?;

        Ok(supplier)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Supplier>> {
        let supplier = sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(supplier)
    }

    pub async fn require(&self, id: &str) -> DbResult<Supplier> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Supplier", id))
    }

    pub async fn list_active(&self) -> DbResult<Vec<Supplier>> {
        let suppliers = sqlx::query_as::<_, Supplier>(
            "SELECT * FROM suppliers WHERE is_active = 1 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(suppliers)
    }

    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE suppliers SET is_active = 0, updated_at = ?, sync_version = sync_version + 1
             WHERE id = ? AND is_active = 1",
        )
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Supplier (active)", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::test_db;

    #[tokio::test]
    async fn create_and_list() {
        let db = test_db().await;
        db.suppliers()
            .create("Acme Wholesale", Some("Jo"), None, None)
            .await
            .unwrap();
        let all = db.suppliers().list_active().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Acme Wholesale");
    }

    #[tokio::test]
    async fn blank_name_rejected() {
        let db = test_db().await;
        assert!(db.suppliers().create("  ", None, None, None).await.is_err());
    }
}
