//! Inter-store transfer dispatch and receipt.
//!
//! Dispatch issues stock from the source at its average cost and stamps
//! that cost on each line. Receipt puts the same quantities into the
//! destination at the stamped cost, so the transfer is valuation-neutral
//! for the chain even when the two stores carried different averages.

use serde_json::json;
use strata_core::{AuditAction, CoreError, MoveKind, Transfer, TransferStatus};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::pool::Database;

pub struct TransferService {
    db: Database,
}

impl TransferService {
    pub fn new(db: Database) -> Self {
        TransferService { db }
    }

    /// pending -> dispatched: issues source stock, stamps line costs,
    /// marks travelling devices in transit.
    pub async fn dispatch(&self, transfer_id: &str, actor: &str) -> DbResult<Transfer> {
        let transfers = self.db.transfers();
        let stock = self.db.stock();

        let mut tx = self.db.begin().await?;

        let transfer = transfers.require_tx(&mut tx, transfer_id).await?;
        if transfer.status != TransferStatus::Pending {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Transfer",
                id: transfer_id.to_string(),
                expected: "pending",
            }));
        }

        let items = transfers.items_tx(&mut tx, transfer_id).await?;
        for item in &items {
            let change = stock
                .issue(
                    &mut tx,
                    &transfer.from_store_id,
                    &item.sku,
                    item.quantity,
                    MoveKind::TransferOut,
                    Some("transfer"),
                    Some(transfer_id),
                )
                .await?;
            transfers
                .set_item_cost(&mut tx, &item.id, change.avg_cost_after_cents)
                .await?;

            if let Some(device_id) = &item.device_id {
                self.db.devices().mark_in_transit(&mut tx, device_id).await?;
            }
        }

        transfers.mark_dispatched(&mut tx, transfer_id).await?;

        self.db
            .audit()
            .append(
                &mut tx,
                actor,
                AuditAction::TransferDispatched,
                "transfer",
                transfer_id,
                json!({
                    "transfer_number": transfer.transfer_number,
                    "from_store_id": transfer.from_store_id,
                    "to_store_id": transfer.to_store_id,
                    "lines": items.len(),
                }),
            )
            .await?;

        let dispatched = transfers.require_tx(&mut tx, transfer_id).await?;
        self.db
            .outbox()
            .queue(&mut tx, "TRANSFER", transfer_id, &serde_json::to_value(&dispatched)?)
            .await?;

        tx.commit().await?;
        info!(transfer_id, number = %dispatched.transfer_number, "transfer dispatched");
        Ok(dispatched)
    }

    /// dispatched -> received: stocks the destination at the stamped
    /// dispatch cost and lands travelling devices at the new store.
    pub async fn receive(&self, transfer_id: &str, actor: &str) -> DbResult<Transfer> {
        let transfers = self.db.transfers();
        let stock = self.db.stock();

        let mut tx = self.db.begin().await?;

        let transfer = transfers.require_tx(&mut tx, transfer_id).await?;
        if transfer.status != TransferStatus::Dispatched {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Transfer",
                id: transfer_id.to_string(),
                expected: "dispatched",
            }));
        }

        let items = transfers.items_tx(&mut tx, transfer_id).await?;
        for item in &items {
            let unit_cost = item.unit_cost_cents.ok_or_else(|| {
                DbError::Domain(CoreError::InvalidStatus {
                    entity: "Transfer item",
                    id: item.id.clone(),
                    expected: "costed at dispatch",
                })
            })?;

            // Carry the source catalog entry over if the destination has
            // never stocked this sku.
            let source = stock
                .get_tx(&mut tx, &transfer.from_store_id, &item.sku)
                .await?;
            let (name, price) = source
                .map(|s| (s.name, s.price_cents))
                .unwrap_or_else(|| (item.sku.clone(), 0));
            stock
                .ensure_item(&mut tx, &transfer.to_store_id, &item.sku, &name, price)
                .await?;

            stock
                .receive(
                    &mut tx,
                    &transfer.to_store_id,
                    &item.sku,
                    item.quantity,
                    unit_cost,
                    MoveKind::TransferIn,
                    Some("transfer"),
                    Some(transfer_id),
                )
                .await?;

            if let Some(device_id) = &item.device_id {
                self.db
                    .devices()
                    .receive_at_store(&mut tx, device_id, &transfer.to_store_id)
                    .await?;
            }
        }

        transfers.mark_received(&mut tx, transfer_id).await?;

        self.db
            .audit()
            .append(
                &mut tx,
                actor,
                AuditAction::TransferReceived,
                "transfer",
                transfer_id,
                json!({
                    "transfer_number": transfer.transfer_number,
                    "to_store_id": transfer.to_store_id,
                }),
            )
            .await?;

        let received = transfers.require_tx(&mut tx, transfer_id).await?;
        self.db
            .outbox()
            .queue(&mut tx, "TRANSFER", transfer_id, &serde_json::to_value(&received)?)
            .await?;

        tx.commit().await?;
        info!(transfer_id, number = %received.transfer_number, "transfer received");
        Ok(received)
    }

    /// Cancels a pending transfer. Nothing has moved yet, so only the
    /// status, the audit row and the outbox change.
    pub async fn cancel(&self, transfer_id: &str, actor: &str) -> DbResult<Transfer> {
        let transfers = self.db.transfers();
        let mut tx = self.db.begin().await?;

        let transfer = transfers.require_tx(&mut tx, transfer_id).await?;
        transfers.cancel(&mut tx, transfer_id).await?;

        self.db
            .audit()
            .append(
                &mut tx,
                actor,
                AuditAction::TransferCancelled,
                "transfer",
                transfer_id,
                json!({ "transfer_number": transfer.transfer_number }),
            )
            .await?;

        let cancelled = transfers.require_tx(&mut tx, transfer_id).await?;
        self.db
            .outbox()
            .queue(&mut tx, "TRANSFER", transfer_id, &serde_json::to_value(&cancelled)?)
            .await?;

        tx.commit().await?;
        info!(transfer_id, "transfer cancelled");
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::NewTransferLine;
    use crate::testing::test_db;
    use crate::Database;

    /// Two stores; the source holds 10 units at a 60_000 average.
    async fn two_stores(db: &Database) -> (String, String) {
        let a = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let b = db.stores().create("MA-02", "Mall", None).await.unwrap();
        db.stock()
            .create_item(&a.id, "IPH15-128-BLK", "iPhone 15 128GB", 89_900, 0)
            .await
            .unwrap();
        let mut tx = db.begin().await.unwrap();
        db.stock()
            .receive(&mut tx, &a.id, "IPH15-128-BLK", 10, 60_000, MoveKind::PurchaseReceipt, None, None)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (a.id, b.id)
    }

    #[tokio::test]
    async fn transfer_is_valuation_neutral() {
        let db = test_db().await;
        let (from, to) = two_stores(&db).await;

        let transfer = db
            .transfers()
            .create(
                &from,
                &to,
                "user-1",
                vec![NewTransferLine {
                    sku: "IPH15-128-BLK".into(),
                    quantity: 4,
                    device_id: None,
                }],
            )
            .await
            .unwrap();

        let before = db.stock().valuation_for_store(&from).await.unwrap();

        db.transfer_service().dispatch(&transfer.id, "user-1").await.unwrap();
        let source = db.stock().get(&from, "IPH15-128-BLK").await.unwrap().unwrap();
        assert_eq!(source.qty_on_hand, 6);

        // Line cost was stamped with the source average.
        let items = db.transfers().items(&transfer.id).await.unwrap();
        assert_eq!(items[0].unit_cost_cents, Some(60_000));

        db.transfer_service().receive(&transfer.id, "user-1").await.unwrap();
        let dest = db.stock().get(&to, "IPH15-128-BLK").await.unwrap().unwrap();
        assert_eq!(dest.qty_on_hand, 4);
        assert_eq!(dest.avg_cost_cents, 60_000);
        // The destination catalog row was carried over from the source.
        assert_eq!(dest.name, "iPhone 15 128GB");

        let after_from = db.stock().valuation_for_store(&from).await.unwrap();
        let after_to = db.stock().valuation_for_store(&to).await.unwrap();
        assert_eq!(before, after_from + after_to);
    }

    #[tokio::test]
    async fn dispatch_fails_without_stock_and_rolls_back() {
        let db = test_db().await;
        let (from, to) = two_stores(&db).await;

        let transfer = db
            .transfers()
            .create(
                &from,
                &to,
                "user-1",
                vec![NewTransferLine {
                    sku: "IPH15-128-BLK".into(),
                    quantity: 11,
                    device_id: None,
                }],
            )
            .await
            .unwrap();

        assert!(db.transfer_service().dispatch(&transfer.id, "user-1").await.is_err());
        let reloaded = db.transfers().get_by_id(&transfer.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TransferStatus::Pending);
        let source = db.stock().get(&from, "IPH15-128-BLK").await.unwrap().unwrap();
        assert_eq!(source.qty_on_hand, 10);
    }

    #[tokio::test]
    async fn device_travels_with_the_transfer() {
        let db = test_db().await;
        let (from, to) = two_stores(&db).await;

        let mut tx = db.begin().await.unwrap();
        let device = db
            .devices()
            .register(
                &mut tx,
                crate::repository::NewDevice {
                    store_id: from.clone(),
                    sku: "IPH15-128-BLK".into(),
                    imei: Some("490154203237518".into()),
                    model_name: "iPhone 15".into(),
                    storage_gb: Some(128),
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

        let transfer = db
            .transfers()
            .create(
                &from,
                &to,
                "user-1",
                vec![NewTransferLine {
                    sku: "IPH15-128-BLK".into(),
                    quantity: 1,
                    device_id: Some(device.id.clone()),
                }],
            )
            .await
            .unwrap();

        db.transfer_service().dispatch(&transfer.id, "user-1").await.unwrap();
        let in_transit = db.devices().get_by_id(&device.id).await.unwrap().unwrap();
        assert_eq!(in_transit.status, strata_core::DeviceStatus::InTransit);

        db.transfer_service().receive(&transfer.id, "user-1").await.unwrap();
        let landed = db.devices().get_by_id(&device.id).await.unwrap().unwrap();
        assert_eq!(landed.status, strata_core::DeviceStatus::InStock);
        assert_eq!(landed.store_id, to);
    }
}
