//! Purchase receipt and cancellation.

use serde_json::json;
use strata_core::{AuditAction, CoreError, DeviceCondition, MoveKind, Purchase, PurchaseStatus};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::NewDevice;

pub struct PurchasingService {
    db: Database,
}

impl PurchasingService {
    pub fn new(db: Database) -> Self {
        PurchasingService { db }
    }

    /// Receives an ordered purchase: every line lands in stock at its line
    /// cost (re-blending the average), serialized lines register one device
    /// per IMEI, and the order flips to received. One transaction.
    pub async fn receive_purchase(&self, purchase_id: &str, actor: &str) -> DbResult<Purchase> {
        let purchases = self.db.purchases();
        let stock = self.db.stock();

        let mut tx = self.db.begin().await?;

        let purchase = purchases.require_tx(&mut tx, purchase_id).await?;
        if purchase.status != PurchaseStatus::Ordered {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Purchase",
                id: purchase_id.to_string(),
                expected: "ordered",
            }));
        }

        let items = purchases.items_tx(&mut tx, purchase_id).await?;
        for item in &items {
            stock
                .ensure_item(&mut tx, &purchase.store_id, &item.sku, &item.name_snapshot, 0)
                .await?;
            stock
                .receive(
                    &mut tx,
                    &purchase.store_id,
                    &item.sku,
                    item.quantity,
                    item.unit_cost_cents,
                    MoveKind::PurchaseReceipt,
                    Some("purchase"),
                    Some(purchase_id),
                )
                .await?;

            for imei in item.imei_list() {
                self.db
                    .devices()
                    .register(
                        &mut tx,
                        NewDevice {
                            store_id: purchase.store_id.clone(),
                            sku: item.sku.clone(),
                            imei: Some(imei),
                            model_name: item.name_snapshot.clone(),
                            storage_gb: None,
                            color: None,
                            condition: DeviceCondition::New,
                            cost_cents: item.unit_cost_cents,
                            price_cents: 0,
                            supplier_id: Some(purchase.supplier_id.clone()),
                            purchase_id: Some(purchase_id.to_string()),
                        },
                    )
                    .await?;
            }
        }

        purchases.mark_received(&mut tx, purchase_id).await?;

        self.db
            .audit()
            .append(
                &mut tx,
                actor,
                AuditAction::PurchaseReceived,
                "purchase",
                purchase_id,
                json!({
                    "order_number": purchase.order_number,
                    "total_cents": purchase.total_cents,
                    "lines": items.len(),
                }),
            )
            .await?;

        let received = purchases.require_tx(&mut tx, purchase_id).await?;
        self.db
            .outbox()
            .queue(&mut tx, "PURCHASE", purchase_id, &serde_json::to_value(&received)?)
            .await?;

        tx.commit().await?;
        info!(purchase_id, order = %received.order_number, "purchase received");
        Ok(received)
    }

    /// Cancels an order that has not been received.
    pub async fn cancel_purchase(&self, purchase_id: &str, actor: &str) -> DbResult<Purchase> {
        let purchases = self.db.purchases();
        let mut tx = self.db.begin().await?;

        let purchase = purchases.require_tx(&mut tx, purchase_id).await?;
        purchases.cancel(&mut tx, purchase_id).await?;

        self.db
            .audit()
            .append(
                &mut tx,
                actor,
                AuditAction::PurchaseCancelled,
                "purchase",
                purchase_id,
                json!({ "order_number": purchase.order_number }),
            )
            .await?;

        let cancelled = purchases.require_tx(&mut tx, purchase_id).await?;
        self.db
            .outbox()
            .queue(&mut tx, "PURCHASE", purchase_id, &serde_json::to_value(&cancelled)?)
            .await?;

        tx.commit().await?;
        info!(purchase_id, "purchase cancelled");
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::NewPurchaseLine;
    use crate::testing::test_db;
    use strata_core::DeviceStatus;

    #[tokio::test]
    async fn receipt_stocks_lines_and_registers_devices() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let supplier = db.suppliers().create("Acme", None, None, None).await.unwrap();

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

        let received = db
            .purchasing()
            .receive_purchase(&purchase.id, "user-1")
            .await
            .unwrap();
        assert_eq!(received.status, PurchaseStatus::Received);
        assert!(received.received_at.is_some());

        // Stock items were auto-created and costed.
        let phones = db.stock().get(&store.id, "IPH15-128-BLK").await.unwrap().unwrap();
        assert_eq!(phones.qty_on_hand, 2);
        assert_eq!(phones.avg_cost_cents, 60_000);
        let cases = db.stock().get(&store.id, "CASE-CLR").await.unwrap().unwrap();
        assert_eq!(cases.qty_on_hand, 10);

        // One device per IMEI, linked back to the purchase.
        let device = db
            .devices()
            .get_by_imei("490154203237518")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(device.status, DeviceStatus::InStock);
        assert_eq!(device.purchase_id.as_deref(), Some(purchase.id.as_str()));
        assert_eq!(device.cost_cents, 60_000);

        assert_eq!(db.outbox().pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn receive_is_single_shot() {
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
                    quantity: 5,
                    unit_cost_cents: 500,
                    imeis: vec![],
                }],
            )
            .await
            .unwrap();

        db.purchasing().receive_purchase(&purchase.id, "user-1").await.unwrap();
        let err = db.purchasing().receive_purchase(&purchase.id, "user-1").await;
        assert!(matches!(
            err,
            Err(DbError::Domain(CoreError::InvalidStatus { .. }))
        ));

        // No double stocking.
        let item = db.stock().get(&store.id, "CASE-CLR").await.unwrap().unwrap();
        assert_eq!(item.qty_on_hand, 5);
    }

    #[tokio::test]
    async fn cancelled_order_cannot_be_received() {
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
                    quantity: 5,
                    unit_cost_cents: 500,
                    imeis: vec![],
                }],
            )
            .await
            .unwrap();

        db.purchasing().cancel_purchase(&purchase.id, "user-1").await.unwrap();
        assert!(db
            .purchasing()
            .receive_purchase(&purchase.id, "user-1")
            .await
            .is_err());
    }
}
