//! Device repository.
//!
//! Serialized units. Status transitions use guarded UPDATEs; a device can
//! never be sold twice or dispatched while reserved, even if two flows race.

use sqlx::{SqliteConnection, SqlitePool};
use strata_core::validation::{validate_imei, validate_name, validate_sku};
use strata_core::{CoreError, Device, DeviceCondition, DeviceStatus};

use crate::error::{DbError, DbResult};
use crate::repository::{new_id, now};

/// Fields for registering one device into stock.
pub struct NewDevice {
    pub store_id: String,
    pub sku: String,
    pub imei: Option<String>,
    pub model_name: String,
    pub storage_gb: Option<i64>,
    pub color: Option<String>,
    pub condition: DeviceCondition,
    pub cost_cents: i64,
    pub price_cents: i64,
    pub supplier_id: Option<String>,
    pub purchase_id: Option<String>,
}

pub struct DeviceRepository {
    pool: SqlitePool,
}

impl DeviceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DeviceRepository { pool }
    }

    /// Registers a device in `in_stock` status.
    pub async fn register(
        &self,
        conn: &mut SqliteConnection,
        new: NewDevice,
    ) -> DbResult<Device> {
        validate_sku(&new.sku)?;
        validate_name(&new.model_name)?;
        if let Some(imei) = &new.imei {
            validate_imei(imei)?;
        }

        let device = Device {
            id: new_id(),
            store_id: new.store_id,
            sku: new.sku,
            imei: new.imei.map(|i| i.trim().to_string()),
            model_name: new.model_name,
            storage_gb: new.storage_gb,
            color: new.color,
            condition: new.condition,
            status: DeviceStatus::InStock,
            cost_cents: new.cost_cents,
            price_cents: new.price_cents,
            supplier_id: new.supplier_id,
            purchase_id: new.purchase_id,
            sale_id: None,
            notes: None,
            created_at: now(),
            updated_at: now(),
            sync_version: 0,
        };

        sqlx::query(
            "INSERT INTO devices
                (id, store_id, sku, imei, model_name, storage_gb, color, condition, status,
                 cost_cents, price_cents, supplier_id, purchase_id, sale_id, notes,
                 created_at, updated_at, sync_version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&device.id)
        .bind(&device.store_id)
        .bind(&device.sku)
        .bind(&device.imei)
        .bind(&device.model_name)
        .bind(device.storage_gb)
        .bind(&device.color)
        .bind(device.condition)
        .bind(device.status)
        .bind(device.cost_cents)
        .bind(device.price_cents)
        .bind(&device.supplier_id)
        .bind(&device.purchase_id)
        .bind(&device.sale_id)
        .bind(&device.notes)
        .bind(device.created_at)
        .bind(device.updated_at)
        .bind(device.sync_version)
        .execute(conn)
        .await?;

        Ok(device)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Device>> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(device)
    }

    pub async fn get_tx(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Device>> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(device)
    }

    pub async fn get_by_imei(&self, imei: &str) -> DbResult<Option<Device>> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE imei = ?")
            .bind(imei.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(device)
    }

    pub async fn list_in_stock(&self, store_id: &str) -> DbResult<Vec<Device>> {
        let devices = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE store_id = ? AND status = 'in_stock' ORDER BY model_name",
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(devices)
    }

    /// in_stock -> reserved, while a stock hold names this unit. The sale
    /// consuming the hold moves it on to sold; release and expiry put it
    /// back with [`DeviceRepository::return_to_stock`].
    pub async fn mark_reserved(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE devices
             SET status = 'reserved', updated_at = ?, sync_version = sync_version + 1
             WHERE id = ? AND status = 'in_stock'",
        )
        .bind(now())
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Device",
                id: id.to_string(),
                expected: "in stock",
            }));
        }
        Ok(())
    }

    /// in_stock/reserved -> sold, linking the sale.
    pub async fn mark_sold(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        sale_id: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE devices
             SET status = 'sold', sale_id = ?, updated_at = ?, sync_version = sync_version + 1
             WHERE id = ? AND status IN ('in_stock', 'reserved')",
        )
        .bind(sale_id)
        .bind(now())
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Device",
                id: id.to_string(),
                expected: "in stock",
            }));
        }
        Ok(())
    }

    /// sold/in_transit/reserved -> in_stock, clearing any sale link. Used
    /// by void and by reservation release.
    pub async fn return_to_stock(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE devices
             SET status = 'in_stock', sale_id = NULL, updated_at = ?, sync_version = sync_version + 1
             WHERE id = ? AND status IN ('sold', 'in_transit', 'reserved')",
        )
        .bind(now())
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Device",
                id: id.to_string(),
                expected: "sold, reserved or in transit",
            }));
        }
        Ok(())
    }

    /// in_stock -> in_transit, at transfer dispatch.
    pub async fn mark_in_transit(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE devices
             SET status = 'in_transit', updated_at = ?, sync_version = sync_version + 1
             WHERE id = ? AND status = 'in_stock'",
        )
        .bind(now())
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Device",
                id: id.to_string(),
                expected: "in stock",
            }));
        }
        Ok(())
    }

    /// in_transit -> in_stock at the destination store.
    pub async fn receive_at_store(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        store_id: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE devices
             SET status = 'in_stock', store_id = ?, updated_at = ?, sync_version = sync_version + 1
             WHERE id = ? AND status = 'in_transit'",
        )
        .bind(store_id)
        .bind(now())
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Device",
                id: id.to_string(),
                expected: "in transit",
            }));
        }
        Ok(())
    }

    /// Terminal write-off. Only in-stock devices can be retired.
    pub async fn retire(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE devices
             SET status = 'retired', updated_at = ?, sync_version = sync_version + 1
             WHERE id = ? AND status = 'in_stock'",
        )
        .bind(now())
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Device",
                id: id.to_string(),
                expected: "in stock",
            }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_db;

    async fn seeded_device(db: &crate::Database) -> Device {
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        let device = db
            .devices()
            .register(
                &mut tx,
                NewDevice {
                    store_id: store.id.clone(),
                    sku: "IPH15-128-BLK".into(),
                    imei: Some("490154203237518".into()),
                    model_name: "iPhone 15".into(),
                    storage_gb: Some(128),
                    color: Some("Black".into()),
                    condition: DeviceCondition::New,
                    cost_cents: 60_000,
                    price_cents: 89_900,
                    supplier_id: None,
                    purchase_id: None,
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();
        device
    }

    #[tokio::test]
    async fn register_and_lookup_by_imei() {
        let db = test_db().await;
        let device = seeded_device(&db).await;
        let found = db
            .devices()
            .get_by_imei("490154203237518")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, device.id);
        assert_eq!(found.status, DeviceStatus::InStock);
    }

    #[tokio::test]
    async fn bad_imei_rejected() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        let err = db
            .devices()
            .register(
                &mut tx,
                NewDevice {
                    store_id: store.id,
                    sku: "IPH15-128-BLK".into(),
                    imei: Some("490154203237519".into()),
                    model_name: "iPhone 15".into(),
                    storage_gb: None,
                    color: None,
                    condition: DeviceCondition::New,
                    cost_cents: 0,
                    price_cents: 0,
                    supplier_id: None,
                    purchase_id: None,
                },
            )
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn sold_device_cannot_sell_again() {
        let db = test_db().await;
        let device = seeded_device(&db).await;

        let mut tx = db.begin().await.unwrap();
        db.devices()
            .mark_sold(&mut tx, &device.id, "sale-1")
            .await
            .unwrap();
        let second = db.devices().mark_sold(&mut tx, &device.id, "sale-2").await;
        assert!(matches!(
            second,
            Err(DbError::Domain(CoreError::InvalidStatus { .. }))
        ));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn void_returns_device_to_stock() {
        let db = test_db().await;
        let device = seeded_device(&db).await;

        let mut tx = db.begin().await.unwrap();
        db.devices()
            .mark_sold(&mut tx, &device.id, "sale-1")
            .await
            .unwrap();
        db.devices().return_to_stock(&mut tx, &device.id).await.unwrap();
        tx.commit().await.unwrap();

        let reloaded = db.devices().get_by_id(&device.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, DeviceStatus::InStock);
        assert!(reloaded.sale_id.is_none());
    }
}
