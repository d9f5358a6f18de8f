//! Stock repository.
//!
//! The costing heart of the system. Every quantity change goes through
//! [`StockRepository::receive`], [`StockRepository::issue`] or
//! [`StockRepository::adjust`], and each of those writes three things
//! atomically on the caller's transaction:
//!
//!   1. the `stock_items` position (quantity + weighted-average cost)
//!   2. one `stock_moves` ledger row (signed qty, cost, value)
//!   3. one `cost_ledger` row (the average-cost recomputation trail)
//!
//! Reservations hold quantity against the position; consumption is a
//! status-conditional UPDATE, so each reservation is consumed at most once.

use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use strata_core::costing::{self, CostChange};
use strata_core::validation::{validate_name, validate_quantity, validate_sku};
use strata_core::{
    CoreError, MoveKind, Reservation, ReservationStatus, StockItem, StockMove,
    RESERVATION_TTL_MINUTES,
};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{new_id, now, DeviceRepository};

pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    // === Catalog ===

    pub async fn create_item(
        &self,
        store_id: &str,
        sku: &str,
        name: &str,
        price_cents: i64,
        tax_rate_bps: i64,
    ) -> DbResult<StockItem> {
        let mut conn = self.pool.acquire().await?;
        self.insert_item(&mut conn, store_id, sku, name, price_cents, tax_rate_bps)
            .await
    }

    async fn insert_item(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        sku: &str,
        name: &str,
        price_cents: i64,
        tax_rate_bps: i64,
    ) -> DbResult<StockItem> {
        validate_sku(sku)?;
        validate_name(name)?;

        let item = StockItem {
            id: new_id(),
            store_id: store_id.to_string(),
            sku: sku.trim().to_string(),
            name: name.trim().to_string(),
            qty_on_hand: 0,
            qty_reserved: 0,
            avg_cost_cents: 0,
            price_cents,
            tax_rate_bps,
            allow_negative_stock: false,
            reorder_level: 0,
            is_active: true,
            created_at: now(),
            updated_at: now(),
            sync_version: 0,
        };

        sqlx::query(
            "INSERT INTO stock_items
                (id, store_id, sku, name, qty_on_hand, qty_reserved, avg_cost_cents,
                 price_cents, tax_rate_bps, allow_negative_stock, reorder_level,
                 is_active, created_at, updated_at, sync_version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.id)
        .bind(&item.store_id)
        .bind(&item.sku)
        .bind(&item.name)
        .bind(item.qty_on_hand)
        .bind(item.qty_reserved)
        .bind(item.avg_cost_cents)
        .bind(item.price_cents)
        .bind(item.tax_rate_bps)
        .bind(item.allow_negative_stock)
        .bind(item.reorder_level)
        .bind(item.is_active)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(item.sync_version)
        .execute(conn)
        .await?;

        Ok(item)
    }

    /// Loads the position, creating a zero-quantity row when the sku has
    /// never been stocked at this store. Used by purchase and transfer
    /// receipts so a new sku does not need manual catalog setup first.
    pub async fn ensure_item(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        sku: &str,
        name: &str,
        price_cents: i64,
    ) -> DbResult<StockItem> {
        if let Some(item) = self.get_tx(conn, store_id, sku).await? {
            return Ok(item);
        }
        self.insert_item(conn, store_id, sku, name, price_cents, 0)
            .await
    }

    pub async fn get(&self, store_id: &str, sku: &str) -> DbResult<Option<StockItem>> {
        let item = sqlx::query_as::<_, StockItem>(
            "SELECT * FROM stock_items WHERE store_id = ? AND sku = ?",
        )
        .bind(store_id)
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    pub async fn get_tx(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        sku: &str,
    ) -> DbResult<Option<StockItem>> {
        let item = sqlx::query_as::<_, StockItem>(
            "SELECT * FROM stock_items WHERE store_id = ? AND sku = ?",
        )
        .bind(store_id)
        .bind(sku)
        .fetch_optional(conn)
        .await?;
        Ok(item)
    }

    async fn require_tx(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        sku: &str,
    ) -> DbResult<StockItem> {
        self.get_tx(conn, store_id, sku)
            .await?
            .ok_or_else(|| DbError::not_found("Stock item", format!("{store_id}/{sku}")))
    }

    pub async fn list_for_store(&self, store_id: &str) -> DbResult<Vec<StockItem>> {
        let items = sqlx::query_as::<_, StockItem>(
            "SELECT * FROM stock_items WHERE store_id = ? AND is_active = 1 ORDER BY sku",
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Positions at or below their reorder level, for the replenishment
    /// report.
    pub async fn list_below_reorder(&self, store_id: &str) -> DbResult<Vec<StockItem>> {
        let items = sqlx::query_as::<_, StockItem>(
            "SELECT * FROM stock_items
             WHERE store_id = ? AND is_active = 1 AND reorder_level > 0
               AND qty_on_hand - qty_reserved <= reorder_level
             ORDER BY sku",
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn set_allow_negative(
        &self,
        store_id: &str,
        sku: &str,
        allow: bool,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE stock_items
             SET allow_negative_stock = ?, updated_at = ?, sync_version = sync_version + 1
             WHERE store_id = ? AND sku = ?",
        )
        .bind(allow)
        .bind(now())
        .bind(store_id)
        .bind(sku)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Stock item", format!("{store_id}/{sku}")));
        }
        Ok(())
    }

    pub async fn set_reorder_level(&self, store_id: &str, sku: &str, level: i64) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE stock_items
             SET reorder_level = ?, updated_at = ?, sync_version = sync_version + 1
             WHERE store_id = ? AND sku = ?",
        )
        .bind(level)
        .bind(now())
        .bind(store_id)
        .bind(sku)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Stock item", format!("{store_id}/{sku}")));
        }
        Ok(())
    }

    // === Costing movements ===

    /// Receives `qty` at `unit_cost_cents`, re-blending the average cost.
    #[allow(clippy::too_many_arguments)]
    pub async fn receive(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        sku: &str,
        qty: i64,
        unit_cost_cents: i64,
        kind: MoveKind,
        reference_type: Option<&str>,
        reference_id: Option<&str>,
    ) -> DbResult<CostChange> {
        validate_quantity(qty)?;
        let item = self.require_tx(conn, store_id, sku).await?;

        let change =
            costing::apply_receipt(item.qty_on_hand, item.avg_cost_cents, qty, unit_cost_cents)?;
        self.apply_change(
            conn,
            &item,
            &change,
            kind,
            qty,
            unit_cost_cents,
            reference_type,
            reference_id,
        )
        .await?;

        debug!(
            store_id, sku, qty, unit_cost_cents,
            avg_after = change.avg_cost_after_cents,
            "stock received"
        );
        Ok(change)
    }

    /// Issues `qty` at the current average cost. Fails with
    /// [`CoreError::InsufficientStock`] unless unreserved quantity covers
    /// the issue or the position allows negative stock.
    pub async fn issue(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        sku: &str,
        qty: i64,
        kind: MoveKind,
        reference_type: Option<&str>,
        reference_id: Option<&str>,
    ) -> DbResult<CostChange> {
        validate_quantity(qty)?;
        let item = self.require_tx(conn, store_id, sku).await?;

        if !item.can_issue(qty) {
            return Err(DbError::Domain(CoreError::InsufficientStock {
                sku: sku.to_string(),
                available: item.available(),
                requested: qty,
            }));
        }

        let change = costing::apply_issue(item.qty_on_hand, item.avg_cost_cents, qty)?;
        self.apply_change(
            conn,
            &item,
            &change,
            kind,
            -qty,
            item.avg_cost_cents,
            reference_type,
            reference_id,
        )
        .await?;

        debug!(store_id, sku, qty, unit_cost = item.avg_cost_cents, "stock issued");
        Ok(change)
    }

    /// Manual count correction. Positive deltas receive at the current
    /// average (pure quantity correction, cost unchanged); negative deltas
    /// issue at the current average.
    pub async fn adjust(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        sku: &str,
        qty_delta: i64,
        note: &str,
    ) -> DbResult<CostChange> {
        if qty_delta == 0 {
            return Err(DbError::Domain(CoreError::NonPositiveQuantity(0)));
        }
        let item = self.require_tx(conn, store_id, sku).await?;

        let (change, signed_qty) = if qty_delta > 0 {
            let change = costing::apply_receipt(
                item.qty_on_hand,
                item.avg_cost_cents,
                qty_delta,
                item.avg_cost_cents,
            )?;
            (change, qty_delta)
        } else {
            let qty = -qty_delta;
            if !item.can_issue(qty) {
                return Err(DbError::Domain(CoreError::InsufficientStock {
                    sku: sku.to_string(),
                    available: item.available(),
                    requested: qty,
                }));
            }
            let change = costing::apply_issue(item.qty_on_hand, item.avg_cost_cents, qty)?;
            (change, qty_delta)
        };

        self.apply_change_with_note(
            conn,
            &item,
            &change,
            MoveKind::Adjustment,
            signed_qty,
            item.avg_cost_cents,
            None,
            None,
            Some(note),
        )
        .await?;
        Ok(change)
    }

    /// Persists one movement: position update + ledger row + cost ledger row.
    #[allow(clippy::too_many_arguments)]
    async fn apply_change(
        &self,
        conn: &mut SqliteConnection,
        item: &StockItem,
        change: &CostChange,
        kind: MoveKind,
        signed_qty: i64,
        unit_cost_cents: i64,
        reference_type: Option<&str>,
        reference_id: Option<&str>,
    ) -> DbResult<()> {
        self.apply_change_with_note(
            conn,
            item,
            change,
            kind,
            signed_qty,
            unit_cost_cents,
            reference_type,
            reference_id,
            None,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_change_with_note(
        &self,
        conn: &mut SqliteConnection,
        item: &StockItem,
        change: &CostChange,
        kind: MoveKind,
        signed_qty: i64,
        unit_cost_cents: i64,
        reference_type: Option<&str>,
        reference_id: Option<&str>,
        note: Option<&str>,
    ) -> DbResult<()> {
        let ts = now();

        sqlx::query(
            "UPDATE stock_items
             SET qty_on_hand = ?, avg_cost_cents = ?, updated_at = ?, sync_version = sync_version + 1
             WHERE id = ?",
        )
        .bind(change.qty_after)
        .bind(change.avg_cost_after_cents)
        .bind(ts)
        .bind(&item.id)
        .execute(&mut *conn)
        .await?;

        let move_id = new_id();
        sqlx::query(
            "INSERT INTO stock_moves
                (id, store_id, sku, kind, qty, unit_cost_cents, value_cents,
                 reference_type, reference_id, note, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&move_id)
        .bind(&item.store_id)
        .bind(&item.sku)
        .bind(kind)
        .bind(signed_qty)
        .bind(unit_cost_cents)
        .bind(signed_qty * unit_cost_cents)
        .bind(reference_type)
        .bind(reference_id)
        .bind(note)
        .bind(ts)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "INSERT INTO cost_ledger
                (id, store_id, sku, move_id, qty_before, avg_cost_before_cents,
                 qty_after, avg_cost_after_cents, value_delta_cents, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(&item.store_id)
        .bind(&item.sku)
        .bind(&move_id)
        .bind(change.qty_before)
        .bind(change.avg_cost_before_cents)
        .bind(change.qty_after)
        .bind(change.avg_cost_after_cents)
        .bind(change.value_delta_cents)
        .bind(ts)
        .execute(conn)
        .await?;

        Ok(())
    }

    // === Reservations ===

    /// Places a hold on `qty` for the given document. Reservations always
    /// require real availability; allow_negative_stock does not apply.
    ///
    /// A hold for one specific serialized unit passes its `device_id`; the
    /// device row is marked reserved alongside the quantity hold and comes
    /// back to stock when the hold is released or expires.
    #[allow(clippy::too_many_arguments)]
    pub async fn reserve(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        sku: &str,
        qty: i64,
        device_id: Option<&str>,
        reference_type: &str,
        reference_id: &str,
    ) -> DbResult<Reservation> {
        validate_quantity(qty)?;
        let item = self.require_tx(conn, store_id, sku).await?;

        if item.available() < qty {
            return Err(DbError::Domain(CoreError::InsufficientStock {
                sku: sku.to_string(),
                available: item.available(),
                requested: qty,
            }));
        }

        let reservation = Reservation {
            id: new_id(),
            store_id: store_id.to_string(),
            sku: sku.to_string(),
            qty,
            device_id: device_id.map(String::from),
            status: ReservationStatus::Active,
            reference_type: reference_type.to_string(),
            reference_id: reference_id.to_string(),
            expires_at: now() + Duration::minutes(RESERVATION_TTL_MINUTES),
            created_at: now(),
            updated_at: now(),
            consumed_at: None,
        };

        sqlx::query(
            "INSERT INTO reservations
                (id, store_id, sku, qty, device_id, status, reference_type, reference_id,
                 expires_at, created_at, updated_at, consumed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&reservation.id)
        .bind(&reservation.store_id)
        .bind(&reservation.sku)
        .bind(reservation.qty)
        .bind(&reservation.device_id)
        .bind(reservation.status)
        .bind(&reservation.reference_type)
        .bind(&reservation.reference_id)
        .bind(reservation.expires_at)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .bind(reservation.consumed_at)
        .execute(&mut *conn)
        .await?;

        if let Some(device_id) = device_id {
            self.devices().mark_reserved(conn, device_id).await?;
        }

        self.shift_reserved(conn, &item.id, qty).await?;
        Ok(reservation)
    }

    /// Consumes every active reservation held by the given document,
    /// freeing the held quantity so the document's own issue can use it.
    /// Held devices stay reserved; the consuming document advances them
    /// (a sale marks its line devices sold).
    ///
    /// The UPDATE is conditional on `status = 'active'` and a live expiry,
    /// which makes consumption at-most-once: a racing expiry sweep or a
    /// double post lands in [`CoreError::ReservationNotConsumable`].
    pub async fn consume_for(
        &self,
        conn: &mut SqliteConnection,
        reference_type: &str,
        reference_id: &str,
    ) -> DbResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations
             WHERE reference_type = ? AND reference_id = ? AND status = 'active'",
        )
        .bind(reference_type)
        .bind(reference_id)
        .fetch_all(&mut *conn)
        .await?;

        let ts = now();
        for reservation in &reservations {
            let result = sqlx::query(
                "UPDATE reservations
                 SET status = 'consumed', consumed_at = ?, updated_at = ?
                 WHERE id = ? AND status = 'active' AND expires_at > ?",
            )
            .bind(ts)
            .bind(ts)
            .bind(&reservation.id)
            .bind(ts)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::Domain(CoreError::ReservationNotConsumable(
                    reservation.id.clone(),
                )));
            }

            self.shift_reserved_by_position(
                conn,
                &reservation.store_id,
                &reservation.sku,
                -reservation.qty,
            )
            .await?;
        }

        Ok(reservations)
    }

    /// Releases one active reservation, returning the held quantity to
    /// availability.
    pub async fn release(&self, conn: &mut SqliteConnection, reservation_id: &str) -> DbResult<()> {
        let reservation = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE id = ?",
        )
        .bind(reservation_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Reservation", reservation_id))?;

        let result = sqlx::query(
            "UPDATE reservations SET status = 'released', updated_at = ?
             WHERE id = ? AND status = 'active'",
        )
        .bind(now())
        .bind(reservation_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::ReservationNotConsumable(
                reservation_id.to_string(),
            )));
        }

        if let Some(device_id) = &reservation.device_id {
            self.devices().return_to_stock(conn, device_id).await?;
        }

        self.shift_reserved_by_position(conn, &reservation.store_id, &reservation.sku, -reservation.qty)
            .await
    }

    /// Releases every active reservation held by a document (cancel flows).
    pub async fn release_for(
        &self,
        conn: &mut SqliteConnection,
        reference_type: &str,
        reference_id: &str,
    ) -> DbResult<u64> {
        let reservations = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations
             WHERE reference_type = ? AND reference_id = ? AND status = 'active'",
        )
        .bind(reference_type)
        .bind(reference_id)
        .fetch_all(&mut *conn)
        .await?;

        for reservation in &reservations {
            self.release(conn, &reservation.id).await?;
        }
        Ok(reservations.len() as u64)
    }

    /// Expires every active reservation past its deadline, returning the
    /// expired rows so the caller can audit them.
    pub async fn expire_due(
        &self,
        conn: &mut SqliteConnection,
        as_of: DateTime<Utc>,
    ) -> DbResult<Vec<Reservation>> {
        let due = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE status = 'active' AND expires_at <= ?",
        )
        .bind(as_of)
        .fetch_all(&mut *conn)
        .await?;

        for reservation in &due {
            let result = sqlx::query(
                "UPDATE reservations SET status = 'expired', updated_at = ?
                 WHERE id = ? AND status = 'active'",
            )
            .bind(now())
            .bind(&reservation.id)
            .execute(&mut *conn)
            .await?;

            // Lost the race to a consume; its quantity was already freed.
            if result.rows_affected() == 0 {
                continue;
            }

            if let Some(device_id) = &reservation.device_id {
                self.devices().return_to_stock(conn, device_id).await?;
            }

            self.shift_reserved_by_position(
                conn,
                &reservation.store_id,
                &reservation.sku,
                -reservation.qty,
            )
            .await?;
        }

        Ok(due)
    }

    fn devices(&self) -> DeviceRepository {
        DeviceRepository::new(self.pool.clone())
    }

    async fn shift_reserved(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
        delta: i64,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE stock_items
             SET qty_reserved = qty_reserved + ?, updated_at = ?, sync_version = sync_version + 1
             WHERE id = ?",
        )
        .bind(delta)
        .bind(now())
        .bind(item_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn shift_reserved_by_position(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        sku: &str,
        delta: i64,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE stock_items
             SET qty_reserved = qty_reserved + ?, updated_at = ?, sync_version = sync_version + 1
             WHERE store_id = ? AND sku = ?",
        )
        .bind(delta)
        .bind(now())
        .bind(store_id)
        .bind(sku)
        .execute(conn)
        .await?;
        Ok(())
    }

    // === Ledger reads ===

    pub async fn moves_for(
        &self,
        store_id: &str,
        sku: &str,
        limit: i64,
    ) -> DbResult<Vec<StockMove>> {
        let moves = sqlx::query_as::<_, StockMove>(
            "SELECT * FROM stock_moves WHERE store_id = ? AND sku = ?
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(store_id)
        .bind(sku)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(moves)
    }

    pub async fn cost_history(
        &self,
        store_id: &str,
        sku: &str,
        limit: i64,
    ) -> DbResult<Vec<strata_core::CostLedgerEntry>> {
        let entries = sqlx::query_as::<_, strata_core::CostLedgerEntry>(
            "SELECT * FROM cost_ledger WHERE store_id = ? AND sku = ?
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(store_id)
        .bind(sku)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Book value of all on-hand stock at a store, in cents.
    pub async fn valuation_for_store(&self, store_id: &str) -> DbResult<i64> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(qty_on_hand * avg_cost_cents), 0)
             FROM stock_items WHERE store_id = ? AND is_active = 1",
        )
        .bind(store_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}
