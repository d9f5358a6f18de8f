//! Purchase repository.
//!
//! Purchase orders. Lines may carry IMEIs for serialized stock; nothing
//! touches inventory until the purchasing service receives the order.

use sqlx::{SqliteConnection, SqlitePool};
use strata_core::validation::{validate_imei, validate_quantity, validate_sku};
use strata_core::{CoreError, Purchase, PurchaseItem, PurchaseStatus, ValidationError};

use crate::error::{DbError, DbResult};
use crate::repository::{new_id, now, short_ref};

/// One line of a new purchase order.
pub struct NewPurchaseLine {
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    /// IMEIs for serialized lines. When present the count must match the
    /// quantity; each registers one device at receipt.
    pub imeis: Vec<String>,
}

pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Creates an order with its lines in one transaction.
    pub async fn create(
        &self,
        store_id: &str,
        supplier_id: &str,
        user_id: &str,
        lines: Vec<NewPurchaseLine>,
    ) -> DbResult<Purchase> {
        if lines.is_empty() {
            return Err(ValidationError::Required {
                field: "purchase lines".to_string(),
            }
            .into());
        }
        for line in &lines {
            validate_sku(&line.sku)?;
            validate_quantity(line.quantity)?;
            if !line.imeis.is_empty() {
                if line.imeis.len() as i64 != line.quantity {
                    return Err(ValidationError::InvalidFormat {
                        field: "imeis".to_string(),
                        reason: "count must match line quantity".to_string(),
                    }
                    .into());
                }
                for imei in &line.imeis {
                    validate_imei(imei)?;
                }
            }
        }

        let total_cents: i64 = lines.iter().map(|l| l.quantity * l.unit_cost_cents).sum();
        let purchase = Purchase {
            id: new_id(),
            store_id: store_id.to_string(),
            supplier_id: supplier_id.to_string(),
            order_number: format!("PO-{}", short_ref()),
            status: PurchaseStatus::Ordered,
            total_cents,
            user_id: user_id.to_string(),
            notes: None,
            created_at: now(),
            updated_at: now(),
            received_at: None,
            sync_version: 0,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO purchases
                (id, store_id, supplier_id, order_number, status, total_cents,
                 user_id, notes, created_at, updated_at, received_at, sync_version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&purchase.id)
        .bind(&purchase.store_id)
        .bind(&purchase.supplier_id)
        .bind(&purchase.order_number)
        .bind(purchase.status)
        .bind(purchase.total_cents)
        .bind(&purchase.user_id)
        .bind(&purchase.notes)
        .bind(purchase.created_at)
        .bind(purchase.updated_at)
        .bind(purchase.received_at)
        .bind(purchase.sync_version)
        .execute(&mut *tx)
        .await?;

        for line in &lines {
            let imeis_json = if line.imeis.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&line.imeis)?)
            };
            sqlx::query(
                "INSERT INTO purchase_items
                    (id, purchase_id, sku, name_snapshot, quantity, unit_cost_cents,
                     line_total_cents, imeis, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(new_id())
            .bind(&purchase.id)
            .bind(line.sku.trim())
            .bind(&line.name)
            .bind(line.quantity)
            .bind(line.unit_cost_cents)
            .bind(line.quantity * line.unit_cost_cents)
            .bind(imeis_json)
            .bind(now())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(purchase)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Purchase>> {
        let purchase = sqlx::query_as::<_, Purchase>("SELECT * FROM purchases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(purchase)
    }

    pub async fn require_tx(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Purchase> {
        sqlx::query_as::<_, Purchase>("SELECT * FROM purchases WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| DbError::not_found("Purchase", id))
    }

    pub async fn items(&self, purchase_id: &str) -> DbResult<Vec<PurchaseItem>> {
        let items = sqlx::query_as::<_, PurchaseItem>(
            "SELECT * FROM purchase_items WHERE purchase_id = ? ORDER BY created_at",
        )
        .bind(purchase_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn items_tx(
        &self,
        conn: &mut SqliteConnection,
        purchase_id: &str,
    ) -> DbResult<Vec<PurchaseItem>> {
        let items = sqlx::query_as::<_, PurchaseItem>(
            "SELECT * FROM purchase_items WHERE purchase_id = ? ORDER BY created_at",
        )
        .bind(purchase_id)
        .fetch_all(conn)
        .await?;
        Ok(items)
    }

    pub async fn list_for_store(&self, store_id: &str, limit: i64) -> DbResult<Vec<Purchase>> {
        let purchases = sqlx::query_as::<_, Purchase>(
            "SELECT * FROM purchases WHERE store_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(store_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(purchases)
    }

    /// ordered -> received, guarded.
    pub async fn mark_received(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let ts = now();
        let result = sqlx::query(
            "UPDATE purchases
             SET status = 'received', received_at = ?, updated_at = ?,
                 sync_version = sync_version + 1
             WHERE id = ? AND status = 'ordered'",
        )
        .bind(ts)
        .bind(ts)
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Purchase",
                id: id.to_string(),
                expected: "ordered",
            }));
        }
        Ok(())
    }

    /// ordered -> cancelled, guarded.
    pub async fn cancel(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE purchases
             SET status = 'cancelled', updated_at = ?, sync_version = sync_version + 1
             WHERE id = ? AND status = 'ordered'",
        )
        .bind(now())
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Purchase",
                id: id.to_string(),
                expected: "ordered",
            }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_db;

    #[tokio::test]
    async fn create_totals_the_lines() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let supplier = db
            .suppliers()
            .create("Acme Wholesale", None, None, None)
            .await
            .unwrap();

        let purchase = db
            .purchases()
            .create(
                &store.id,
                &supplier.id,
                "user-1",
                vec![
                    NewPurchaseLine {
                        sku: "IPH15-128-BLK".into(),
                        name: "iPhone 15".into(),
                        quantity: 2,
                        unit_cost_cents: 60_000,
                        imeis: vec!["490154203237518".into(), "352099001761481".into()],
                    },
                    NewPurchaseLine {
                        sku: "CASE-CLR".into(),
                        name: "Clear Case".into(),
                        quantity: 10,
                        unit_cost_cents: 500,
                        imeis: vec![],
                    },
                ],
            )
            .await
            .unwrap();

        assert_eq!(purchase.total_cents, 2 * 60_000 + 10 * 500);
        assert_eq!(purchase.status, PurchaseStatus::Ordered);

        let items = db.purchases().items(&purchase.id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].imei_list().len(), 2);
    }

    #[tokio::test]
    async fn imei_count_must_match_quantity() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let supplier = db.suppliers().create("Acme", None, None, None).await.unwrap();

        let err = db
            .purchases()
            .create(
                &store.id,
                &supplier.id,
                "user-1",
                vec![NewPurchaseLine {
                    sku: "IPH15-128-BLK".into(),
                    name: "iPhone 15".into(),
                    quantity: 3,
                    unit_cost_cents: 60_000,
                    imeis: vec!["490154203237518".into()],
                }],
            )
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn cancel_only_from_ordered() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let supplier = db.suppliers().create("Acme", None, None, None).await.unwrap();
        let purchase = db
            .purchases()
            .create(
                &store.id,
                &supplier.id,
                "user-1",
                vec![NewPurchaseLine {
                    sku: "CASE-CLR".into(),
                    name: "Clear Case".into(),
                    quantity: 1,
                    unit_cost_cents: 500,
                    imeis: vec![],
                }],
            )
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        db.purchases().cancel(&mut tx, &purchase.id).await.unwrap();
        assert!(db.purchases().cancel(&mut tx, &purchase.id).await.is_err());
        tx.commit().await.unwrap();
    }
}
