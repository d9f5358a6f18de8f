//! Stock adjustments, device write-offs, and the reservation expiry sweep.

use chrono::Utc;
use serde_json::json;
use strata_core::costing::CostChange;
use strata_core::AuditAction;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::pool::Database;

pub struct InventoryService {
    db: Database,
}

impl InventoryService {
    pub fn new(db: Database) -> Self {
        InventoryService { db }
    }

    /// Manual count correction with a mandatory reason, audited as a
    /// flagged action.
    pub async fn adjust_stock(
        &self,
        store_id: &str,
        sku: &str,
        qty_delta: i64,
        reason: &str,
        actor: &str,
    ) -> DbResult<CostChange> {
        if reason.trim().is_empty() {
            return Err(DbError::from(strata_core::ValidationError::Required {
                field: "reason".to_string(),
            }));
        }

        let mut tx = self.db.begin().await?;
        let change = self
            .db
            .stock()
            .adjust(&mut tx, store_id, sku, qty_delta, reason)
            .await?;

        let item = self
            .db
            .stock()
            .get_tx(&mut tx, store_id, sku)
            .await?
            .ok_or_else(|| DbError::not_found("Stock item", format!("{store_id}/{sku}")))?;

        self.db
            .audit()
            .append(
                &mut tx,
                actor,
                AuditAction::StockAdjusted,
                "stock_item",
                &item.id,
                json!({
                    "sku": sku,
                    "qty_delta": qty_delta,
                    "qty_after": change.qty_after,
                    "value_delta_cents": change.value_delta_cents,
                    "reason": reason,
                }),
            )
            .await?;

        self.db
            .outbox()
            .queue(&mut tx, "STOCK_ITEM", &item.id, &serde_json::to_value(&item)?)
            .await?;

        tx.commit().await?;
        info!(store_id, sku, qty_delta, "stock adjusted");
        Ok(change)
    }

    /// Writes off an in-stock device: the device row retires and one unit
    /// leaves the quantity position at average cost.
    pub async fn retire_device(&self, device_id: &str, reason: &str, actor: &str) -> DbResult<()> {
        let mut tx = self.db.begin().await?;

        let device = self
            .db
            .devices()
            .get_tx(&mut tx, device_id)
            .await?
            .ok_or_else(|| DbError::not_found("Device", device_id))?;

        self.db.devices().retire(&mut tx, device_id).await?;
        self.db
            .stock()
            .adjust(&mut tx, &device.store_id, &device.sku, -1, reason)
            .await?;

        self.db
            .audit()
            .append(
                &mut tx,
                actor,
                AuditAction::DeviceRetired,
                "device",
                device_id,
                json!({
                    "imei": device.imei,
                    "sku": device.sku,
                    "reason": reason,
                }),
            )
            .await?;

        let retired = self
            .db
            .devices()
            .get_tx(&mut tx, device_id)
            .await?
            .ok_or_else(|| DbError::not_found("Device", device_id))?;
        self.db
            .outbox()
            .queue(&mut tx, "DEVICE", device_id, &serde_json::to_value(&retired)?)
            .await?;

        let item = self
            .db
            .stock()
            .get_tx(&mut tx, &device.store_id, &device.sku)
            .await?
            .ok_or_else(|| {
                DbError::not_found("Stock item", format!("{}/{}", device.store_id, device.sku))
            })?;
        self.db
            .outbox()
            .queue(&mut tx, "STOCK_ITEM", &item.id, &serde_json::to_value(&item)?)
            .await?;

        tx.commit().await?;
        info!(device_id, reason, "device retired");
        Ok(())
    }

    /// Expires every reservation past its deadline, freeing held quantity.
    /// Returns how many were expired. Meant to run periodically.
    pub async fn expire_reservations(&self, actor: &str) -> DbResult<u64> {
        let mut tx = self.db.begin().await?;
        let expired = self.db.stock().expire_due(&mut tx, Utc::now()).await?;

        for reservation in &expired {
            self.db
                .audit()
                .append(
                    &mut tx,
                    actor,
                    AuditAction::ReservationExpired,
                    "reservation",
                    &reservation.id,
                    json!({
                        "sku": reservation.sku,
                        "qty": reservation.qty,
                        "reference_type": reservation.reference_type,
                        "reference_id": reservation.reference_id,
                    }),
                )
                .await?;
        }

        // Each freed position syncs once, however many holds it carried.
        let mut positions: Vec<(String, String)> = expired
            .iter()
            .map(|r| (r.store_id.clone(), r.sku.clone()))
            .collect();
        positions.sort();
        positions.dedup();
        for (store_id, sku) in &positions {
            let item = self
                .db
                .stock()
                .get_tx(&mut tx, store_id, sku)
                .await?
                .ok_or_else(|| DbError::not_found("Stock item", format!("{store_id}/{sku}")))?;
            self.db
                .outbox()
                .queue(&mut tx, "STOCK_ITEM", &item.id, &serde_json::to_value(&item)?)
                .await?;
        }

        tx.commit().await?;
        if !expired.is_empty() {
            info!(count = expired.len(), "expired stale reservations");
        }
        Ok(expired.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_db;
    use strata_core::{AuditSeverity, DeviceStatus, MoveKind};

    #[tokio::test]
    async fn adjustment_requires_a_reason() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        db.stock()
            .create_item(&store.id, "CASE-CLR", "Clear Case", 1_999, 0)
            .await
            .unwrap();

        assert!(db
            .inventory()
            .adjust_stock(&store.id, "CASE-CLR", 5, "  ", "user-1")
            .await
            .is_err());

        let change = db
            .inventory()
            .adjust_stock(&store.id, "CASE-CLR", 5, "found in backroom", "user-1")
            .await
            .unwrap();
        assert_eq!(change.qty_after, 5);

        // Adjustments land in the audit trail as flagged actions.
        let warnings = db.audit().by_severity(AuditSeverity::Warning, 10).await.unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn retiring_a_device_shrinks_the_position() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        db.stock()
            .create_item(&store.id, "IPH15-128-BLK", "iPhone 15", 89_900, 0)
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        db.stock()
            .receive(&mut tx, &store.id, "IPH15-128-BLK", 1, 60_000, MoveKind::PurchaseReceipt, None, None)
            .await
            .unwrap();
        let device = db
            .devices()
            .register(
                &mut tx,
                crate::repository::NewDevice {
                    store_id: store.id.clone(),
                    sku: "IPH15-128-BLK".into(),
                    imei: Some("490154203237518".into()),
                    model_name: "iPhone 15".into(),
                    storage_gb: None,
                    color: None,
                    condition: strata_core::DeviceCondition::New,
                    cost_cents: 60_000,
                    price_cents: 89_900,
                    supplier_id: None,
                    purchase_id: None,
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        db.inventory()
            .retire_device(&device.id, "water damage", "user-1")
            .await
            .unwrap();

        let retired = db.devices().get_by_id(&device.id).await.unwrap().unwrap();
        assert_eq!(retired.status, DeviceStatus::Retired);
        let item = db.stock().get(&store.id, "IPH15-128-BLK").await.unwrap().unwrap();
        assert_eq!(item.qty_on_hand, 0);

        // Device and position snapshots both queue for sync.
        assert_eq!(db.outbox().pending_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn expiry_sweep_audits_and_queues_freed_positions() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        db.stock()
            .create_item(&store.id, "CASE-CLR", "Clear Case", 1_999, 0)
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        db.stock()
            .receive(&mut tx, &store.id, "CASE-CLR", 10, 800, MoveKind::PurchaseReceipt, None, None)
            .await
            .unwrap();
        let reservation = db
            .stock()
            .reserve(&mut tx, &store.id, "CASE-CLR", 3, None, "sale", "s-1")
            .await
            .unwrap();
        db.stock()
            .reserve(&mut tx, &store.id, "CASE-CLR", 2, None, "sale", "s-2")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        sqlx::query("UPDATE reservations SET expires_at = ?")
            .bind(Utc::now() - chrono::Duration::hours(1))
            .execute(db.pool())
            .await
            .unwrap();

        let count = db.inventory().expire_reservations("system").await.unwrap();
        assert_eq!(count, 2);

        let trail = db
            .audit()
            .for_entity("reservation", &reservation.id)
            .await
            .unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "reservation_expired");

        // Both holds sat on one position, so a single snapshot queues.
        assert_eq!(db.outbox().pending_count().await.unwrap(), 1);
        let item = db.stock().get(&store.id, "CASE-CLR").await.unwrap().unwrap();
        assert_eq!(item.qty_reserved, 0);
    }
}
