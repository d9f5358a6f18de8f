//! Transfer repository.
//!
//! Inter-store stock transfers: pending -> dispatched -> received, with
//! cancel allowed only while pending. Line costs are stamped at dispatch
//! by the transfer service so the destination receipt reuses the source
//! average and chain valuation is preserved.

use sqlx::{SqliteConnection, SqlitePool};
use strata_core::validation::{validate_quantity, validate_sku};
use strata_core::{CoreError, Transfer, TransferItem, TransferStatus, ValidationError};

use crate::error::{DbError, DbResult};
use crate::repository::{new_id, now, short_ref};

/// One line of a new transfer.
pub struct NewTransferLine {
    pub sku: String,
    pub quantity: i64,
    /// Serialized unit travelling with this line, if any.
    pub device_id: Option<String>,
}

pub struct TransferRepository {
    pool: SqlitePool,
}

impl TransferRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransferRepository { pool }
    }

    pub async fn create(
        &self,
        from_store_id: &str,
        to_store_id: &str,
        user_id: &str,
        lines: Vec<NewTransferLine>,
    ) -> DbResult<Transfer> {
        if from_store_id == to_store_id {
            return Err(DbError::Domain(CoreError::SameStoreTransfer(
                from_store_id.to_string(),
            )));
        }
        if lines.is_empty() {
            return Err(ValidationError::Required {
                field: "transfer lines".to_string(),
            }
            .into());
        }
        for line in &lines {
            validate_sku(&line.sku)?;
            validate_quantity(line.quantity)?;
        }

        let transfer = Transfer {
            id: new_id(),
            transfer_number: format!("TR-{}", short_ref()),
            from_store_id: from_store_id.to_string(),
            to_store_id: to_store_id.to_string(),
            status: TransferStatus::Pending,
            user_id: user_id.to_string(),
            notes: None,
            created_at: now(),
            updated_at: now(),
            dispatched_at: None,
            received_at: None,
            sync_version: 0,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO transfers
                (id, transfer_number, from_store_id, to_store_id, status, user_id,
                 notes, created_at, updated_at, dispatched_at, received_at, sync_version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&transfer.id)
        .bind(&transfer.transfer_number)
        .bind(&transfer.from_store_id)
        .bind(&transfer.to_store_id)
        .bind(transfer.status)
        .bind(&transfer.user_id)
        .bind(&transfer.notes)
        .bind(transfer.created_at)
        .bind(transfer.updated_at)
        .bind(transfer.dispatched_at)
        .bind(transfer.received_at)
        .bind(transfer.sync_version)
        .execute(&mut *tx)
        .await?;

        for line in &lines {
            sqlx::query(
                "INSERT INTO transfer_items
                    (id, transfer_id, sku, quantity, unit_cost_cents, device_id, created_at)
                 VALUES (?, ?, ?, ?, NULL, ?, ?)",
            )
            .bind(new_id())
            .bind(&transfer.id)
            .bind(line.sku.trim())
            .bind(line.quantity)
            .bind(&line.device_id)
            .bind(now())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(transfer)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Transfer>> {
        let transfer = sqlx::query_as::<_, Transfer>("SELECT * FROM transfers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(transfer)
    }

    pub async fn require_tx(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Transfer> {
        sqlx::query_as::<_, Transfer>("SELECT * FROM transfers WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| DbError::not_found("Transfer", id))
    }

    pub async fn items(&self, transfer_id: &str) -> DbResult<Vec<TransferItem>> {
        let items = sqlx::query_as::<_, TransferItem>(
            "SELECT * FROM transfer_items WHERE transfer_id = ? ORDER BY created_at",
        )
        .bind(transfer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn items_tx(
        &self,
        conn: &mut SqliteConnection,
        transfer_id: &str,
    ) -> DbResult<Vec<TransferItem>> {
        let items = sqlx::query_as::<_, TransferItem>(
            "SELECT * FROM transfer_items WHERE transfer_id = ? ORDER BY created_at",
        )
        .bind(transfer_id)
        .fetch_all(conn)
        .await?;
        Ok(items)
    }

    /// Stamps the dispatch cost on a line.
    pub async fn set_item_cost(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
        unit_cost_cents: i64,
    ) -> DbResult<()> {
        sqlx::query("UPDATE transfer_items SET unit_cost_cents = ? WHERE id = ?")
            .bind(unit_cost_cents)
            .bind(item_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// pending -> dispatched, guarded.
    pub async fn mark_dispatched(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let ts = now();
        let result = sqlx::query(
            "UPDATE transfers
             SET status = 'dispatched', dispatched_at = ?, updated_at = ?,
                 sync_version = sync_version + 1
             WHERE id = ? AND status = 'pending'",
        )
        .bind(ts)
        .bind(ts)
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Transfer",
                id: id.to_string(),
                expected: "pending",
            }));
        }
        Ok(())
    }

    /// dispatched -> received, guarded.
    pub async fn mark_received(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let ts = now();
        let result = sqlx::query(
            "UPDATE transfers
             SET status = 'received', received_at = ?, updated_at = ?,
                 sync_version = sync_version + 1
             WHERE id = ? AND status = 'dispatched'",
        )
        .bind(ts)
        .bind(ts)
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Transfer",
                id: id.to_string(),
                expected: "dispatched",
            }));
        }
        Ok(())
    }

    /// pending -> cancelled, guarded. Dispatched goods must be received,
    /// not cancelled; the stock has already left the source store.
    pub async fn cancel(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE transfers
             SET status = 'cancelled', updated_at = ?, sync_version = sync_version + 1
             WHERE id = ? AND status = 'pending'",
        )
        .bind(now())
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Transfer",
                id: id.to_string(),
                expected: "pending",
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
    async fn same_store_transfer_rejected() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let err = db
            .transfers()
            .create(
                &store.id,
                &store.id,
                "user-1",
                vec![NewTransferLine {
                    sku: "CASE-CLR".into(),
                    quantity: 1,
                    device_id: None,
                }],
            )
            .await;
        assert!(matches!(
            err,
            Err(DbError::Domain(CoreError::SameStoreTransfer(_)))
        ));
    }

    #[tokio::test]
    async fn lifecycle_guards_hold() {
        let db = test_db().await;
        let a = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let b = db.stores().create("MA-02", "Mall", None).await.unwrap();
        let transfer = db
            .transfers()
            .create(
                &a.id,
                &b.id,
                "user-1",
                vec![NewTransferLine {
                    sku: "CASE-CLR".into(),
                    quantity: 2,
                    device_id: None,
                }],
            )
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        // Cannot receive before dispatch.
        assert!(db.transfers().mark_received(&mut tx, &transfer.id).await.is_err());
        db.transfers().mark_dispatched(&mut tx, &transfer.id).await.unwrap();
        // Cannot cancel once dispatched.
        assert!(db.transfers().cancel(&mut tx, &transfer.id).await.is_err());
        db.transfers().mark_received(&mut tx, &transfer.id).await.unwrap();
        tx.commit().await.unwrap();
    }
}
