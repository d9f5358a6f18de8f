//! Sale repository.
//!
//! Sales are built as drafts (items and payments accumulate, totals are
//! recomputed from the lines) and become immutable once posted. Posting
//! itself is the sales service's job; this repository owns the rows and
//! the draft -> completed -> voided guards.

use sqlx::{SqliteConnection, SqlitePool};
use strata_core::validation::{validate_positive_cents, validate_quantity, validate_sku};
use strata_core::{CoreError, Payment, PaymentMethod, Sale, SaleItem, SaleStatus};

use crate::error::{DbError, DbResult};
use crate::repository::{new_id, now, short_ref};

pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Opens a draft sale. The receipt number is assigned immediately so
    /// the cashier always has something to reference.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_draft(
        &self,
        store_id: &str,
        store_code: &str,
        customer_id: Option<&str>,
        session_id: Option<&str>,
        on_credit: bool,
        user_id: &str,
    ) -> DbResult<Sale> {
        let sale = Sale {
            id: new_id(),
            store_id: store_id.to_string(),
            receipt_number: format!("{}-{}", store_code, short_ref()),
            status: SaleStatus::Draft,
            customer_id: customer_id.map(String::from),
            session_id: session_id.map(String::from),
            subtotal_cents: 0,
            tax_cents: 0,
            discount_cents: 0,
            total_cents: 0,
            on_credit,
            user_id: user_id.to_string(),
            notes: None,
            created_at: now(),
            updated_at: now(),
            completed_at: None,
            sync_version: 0,
        };

        sqlx::query(
            "INSERT INTO sales
                (id, store_id, receipt_number, status, customer_id, session_id,
                 subtotal_cents, tax_cents, discount_cents, total_cents, on_credit,
                 user_id, notes, created_at, updated_at, completed_at, sync_version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&sale.id)
        .bind(&sale.store_id)
        .bind(&sale.receipt_number)
        .bind(sale.status)
        .bind(&sale.customer_id)
        .bind(&sale.session_id)
        .bind(sale.subtotal_cents)
        .bind(sale.tax_cents)
        .bind(sale.discount_cents)
        .bind(sale.total_cents)
        .bind(sale.on_credit)
        .bind(&sale.user_id)
        .bind(&sale.notes)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .bind(sale.completed_at)
        .bind(sale.sync_version)
        .execute(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Adds a line to a draft. Snapshots name and price; recomputes the
    /// sale totals from its lines.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_item(
        &self,
        sale_id: &str,
        sku: &str,
        device_id: Option<&str>,
        name_snapshot: &str,
        unit_price_cents: i64,
        quantity: i64,
        tax_cents: i64,
        discount_cents: i64,
    ) -> DbResult<SaleItem> {
        validate_sku(sku)?;
        validate_quantity(quantity)?;

        let mut tx = self.pool.begin().await?;
        self.require_status(&mut tx, sale_id, SaleStatus::Draft, "draft")
            .await?;

        let item = SaleItem {
            id: new_id(),
            sale_id: sale_id.to_string(),
            sku: sku.to_string(),
            device_id: device_id.map(String::from),
            name_snapshot: name_snapshot.to_string(),
            unit_price_cents,
            quantity,
            line_total_cents: unit_price_cents * quantity,
            tax_cents,
            discount_cents,
            unit_cost_cents: None,
            created_at: now(),
        };

        sqlx::query(
            "INSERT INTO sale_items
                (id, sale_id, sku, device_id, name_snapshot, unit_price_cents,
                 quantity, line_total_cents, tax_cents, discount_cents,
                 unit_cost_cents, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.sku)
        .bind(&item.device_id)
        .bind(&item.name_snapshot)
        .bind(item.unit_price_cents)
        .bind(item.quantity)
        .bind(item.line_total_cents)
        .bind(item.tax_cents)
        .bind(item.discount_cents)
        .bind(item.unit_cost_cents)
        .bind(item.created_at)
        .execute(&mut *tx)
        .await?;

        self.recompute_totals(&mut tx, sale_id).await?;
        tx.commit().await?;
        Ok(item)
    }

    /// Records a payment against a draft. Change is computed for cash
    /// tenders that exceed the amount applied.
    pub async fn add_payment(
        &self,
        sale_id: &str,
        method: PaymentMethod,
        amount_cents: i64,
        tendered_cents: Option<i64>,
        reference: Option<&str>,
    ) -> DbResult<Payment> {
        validate_positive_cents("payment amount", amount_cents)?;

        let mut tx = self.pool.begin().await?;
        self.require_status(&mut tx, sale_id, SaleStatus::Draft, "draft")
            .await?;

        let change_cents = match (method, tendered_cents) {
            (PaymentMethod::Cash, Some(tendered)) => Some((tendered - amount_cents).max(0)),
            _ => None,
        };

        let payment = Payment {
            id: new_id(),
            sale_id: sale_id.to_string(),
            method,
            amount_cents,
            tendered_cents,
            change_cents,
            reference: reference.map(String::from),
            created_at: now(),
        };

        sqlx::query(
            "INSERT INTO payments
                (id, sale_id, method, amount_cents, tendered_cents, change_cents,
                 reference, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&payment.id)
        .bind(&payment.sale_id)
        .bind(payment.method)
        .bind(payment.amount_cents)
        .bind(payment.tendered_cents)
        .bind(payment.change_cents)
        .bind(&payment.reference)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(payment)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sale)
    }

    pub async fn get_tx(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(sale)
    }

    pub async fn require_tx(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Sale> {
        self.get_tx(conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))
    }

    pub async fn items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(
            "SELECT * FROM sale_items WHERE sale_id = ? ORDER BY created_at",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn payments(&self, sale_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE sale_id = ? ORDER BY created_at",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    pub async fn items_tx(
        &self,
        conn: &mut SqliteConnection,
        sale_id: &str,
    ) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(
            "SELECT * FROM sale_items WHERE sale_id = ? ORDER BY created_at",
        )
        .bind(sale_id)
        .fetch_all(conn)
        .await?;
        Ok(items)
    }

    pub async fn payments_tx(
        &self,
        conn: &mut SqliteConnection,
        sale_id: &str,
    ) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE sale_id = ? ORDER BY created_at",
        )
        .bind(sale_id)
        .fetch_all(conn)
        .await?;
        Ok(payments)
    }

    pub async fn list_recent(&self, store_id: &str, limit: i64) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            "SELECT * FROM sales WHERE store_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(store_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(sales)
    }

    /// Stamps the issue cost on a line at posting time.
    pub async fn set_item_cost(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
        unit_cost_cents: i64,
    ) -> DbResult<()> {
        sqlx::query("UPDATE sale_items SET unit_cost_cents = ? WHERE id = ?")
            .bind(unit_cost_cents)
            .bind(item_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// draft -> completed, guarded.
    pub async fn finalize(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let ts = now();
        let result = sqlx::query(
            "UPDATE sales
             SET status = 'completed', completed_at = ?, updated_at = ?,
                 sync_version = sync_version + 1
             WHERE id = ? AND status = 'draft'",
        )
        .bind(ts)
        .bind(ts)
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Sale",
                id: id.to_string(),
                expected: "draft",
            }));
        }
        Ok(())
    }

    /// completed -> voided, guarded.
    pub async fn void(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE sales
             SET status = 'voided', updated_at = ?, sync_version = sync_version + 1
             WHERE id = ? AND status = 'completed'",
        )
        .bind(now())
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Sale",
                id: id.to_string(),
                expected: "completed",
            }));
        }
        Ok(())
    }

    async fn require_status(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        status: SaleStatus,
        expected: &'static str,
    ) -> DbResult<()> {
        let sale = self.require_tx(conn, id).await?;
        if sale.status != status {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Sale",
                id: id.to_string(),
                expected,
            }));
        }
        Ok(())
    }

    async fn recompute_totals(&self, conn: &mut SqliteConnection, sale_id: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE sales SET
                subtotal_cents = (SELECT COALESCE(SUM(line_total_cents), 0)
                                  FROM sale_items WHERE sale_id = ?),
                tax_cents      = (SELECT COALESCE(SUM(tax_cents), 0)
                                  FROM sale_items WHERE sale_id = ?),
                discount_cents = (SELECT COALESCE(SUM(discount_cents), 0)
                                  FROM sale_items WHERE sale_id = ?),
                total_cents    = (SELECT COALESCE(SUM(line_total_cents + tax_cents - discount_cents), 0)
                                  FROM sale_items WHERE sale_id = ?),
                updated_at = ?, sync_version = sync_version + 1
             WHERE id = ?",
        )
        .bind(sale_id)
        .bind(sale_id)
        .bind(sale_id)
        .bind(sale_id)
        .bind(now())
        .bind(sale_id)
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_db;

    #[tokio::test]
    async fn draft_accumulates_items_and_totals() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let sale = db
            .sales()
            .create_draft(&store.id, &store.code, None, None, false, "user-1")
            .await
            .unwrap();
        assert!(sale.receipt_number.starts_with("DT-01-"));

        db.sales()
            .add_item(&sale.id, "IPH15-128-BLK", None, "iPhone 15", 89_900, 1, 7_400, 0)
            .await
            .unwrap();
        db.sales()
            .add_item(&sale.id, "CASE-CLR", None, "Clear Case", 1_999, 2, 0, 500)
            .await
            .unwrap();

        let reloaded = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(reloaded.subtotal_cents, 89_900 + 2 * 1_999);
        assert_eq!(reloaded.tax_cents, 7_400);
        assert_eq!(reloaded.discount_cents, 500);
        assert_eq!(reloaded.total_cents, 89_900 + 2 * 1_999 + 7_400 - 500);
    }

    #[tokio::test]
    async fn cash_payment_computes_change() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let sale = db
            .sales()
            .create_draft(&store.id, &store.code, None, None, false, "user-1")
            .await
            .unwrap();

        let payment = db
            .sales()
            .add_payment(&sale.id, PaymentMethod::Cash, 4_500, Some(5_000), None)
            .await
            .unwrap();
        assert_eq!(payment.change_cents, Some(500));
    }

    #[tokio::test]
    async fn non_positive_payment_rejected() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let sale = db
            .sales()
            .create_draft(&store.id, &store.code, None, None, false, "user-1")
            .await
            .unwrap();

        for amount in [0, -4_500] {
            let err = db
                .sales()
                .add_payment(&sale.id, PaymentMethod::Cash, amount, None, None)
                .await;
            assert!(matches!(err, Err(DbError::Domain(CoreError::Validation(_)))));
        }
        assert!(db.sales().payments(&sale.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn completed_sale_rejects_new_items() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let sale = db
            .sales()
            .create_draft(&store.id, &store.code, None, None, false, "user-1")
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        db.sales().finalize(&mut tx, &sale.id).await.unwrap();
        tx.commit().await.unwrap();

        let err = db
            .sales()
            .add_item(&sale.id, "CASE-CLR", None, "Clear Case", 1_999, 1, 0, 0)
            .await;
        assert!(matches!(
            err,
            Err(DbError::Domain(CoreError::InvalidStatus { .. }))
        ));
    }

    #[tokio::test]
    async fn finalize_is_single_shot() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let sale = db
            .sales()
            .create_draft(&store.id, &store.code, None, None, false, "user-1")
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        db.sales().finalize(&mut tx, &sale.id).await.unwrap();
        assert!(db.sales().finalize(&mut tx, &sale.id).await.is_err());
        tx.commit().await.unwrap();
    }
}
