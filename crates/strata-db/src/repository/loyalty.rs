//! Loyalty repository.
//!
//! One account per customer, an append-only signed ledger, and a cached
//! balance. The ledger write and the balance move happen together, and the
//! balance update is guarded so the ledger can never drive it negative.

use sqlx::{SqliteConnection, SqlitePool};
use strata_core::{CoreError, LoyaltyAccount, LoyaltyEntry, LoyaltyEntryKind};

use crate::error::{DbError, DbResult};
use crate::repository::{new_id, now};

pub struct LoyaltyRepository {
    pool: SqlitePool,
}

impl LoyaltyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LoyaltyRepository { pool }
    }

    pub async fn create_account(
        &self,
        customer_id: &str,
        accrual_bps: i64,
    ) -> DbResult<LoyaltyAccount> {
        let account = LoyaltyAccount {
            id: new_id(),
            customer_id: customer_id.to_string(),
            points_balance: 0,
            accrual_bps,
            is_active: true,
            created_at: now(),
            updated_at: now(),
            sync_version: 0,
        };

        sqlx::query(
            "INSERT INTO loyalty_accounts
                (id, customer_id, points_balance, accrual_bps, is_active,
                 created_at, updated_at, sync_version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&account.id)
        .bind(&account.customer_id)
        .bind(account.points_balance)
        .bind(account.accrual_bps)
        .bind(account.is_active)
        .bind(account.created_at)
        .bind(account.updated_at)
        .bind(account.sync_version)
        .execute(&self.pool)
        .await?;

        Ok(account)
    }

    pub async fn get_by_customer(&self, customer_id: &str) -> DbResult<Option<LoyaltyAccount>> {
        let account = sqlx::query_as::<_, LoyaltyAccount>(
            "SELECT * FROM loyalty_accounts WHERE customer_id = ?",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    pub async fn get_by_customer_tx(
        &self,
        conn: &mut SqliteConnection,
        customer_id: &str,
    ) -> DbResult<Option<LoyaltyAccount>> {
        let account = sqlx::query_as::<_, LoyaltyAccount>(
            "SELECT * FROM loyalty_accounts WHERE customer_id = ?",
        )
        .bind(customer_id)
        .fetch_optional(conn)
        .await?;
        Ok(account)
    }

    /// Appends one signed ledger entry and moves the balance with it.
    /// Fails with [`CoreError::InsufficientPoints`] if the entry would
    /// drive the balance negative.
    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        conn: &mut SqliteConnection,
        account_id: &str,
        kind: LoyaltyEntryKind,
        points: i64,
        reference_type: Option<&str>,
        reference_id: Option<&str>,
        note: Option<&str>,
    ) -> DbResult<LoyaltyEntry> {
        let result = sqlx::query(
            "UPDATE loyalty_accounts
             SET points_balance = points_balance + ?, updated_at = ?,
                 sync_version = sync_version + 1
             WHERE id = ? AND points_balance + ? >= 0",
        )
        .bind(points)
        .bind(now())
        .bind(account_id)
        .bind(points)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            let balance = sqlx::query_scalar::<_, i64>(
                "SELECT points_balance FROM loyalty_accounts WHERE id = ?",
            )
            .bind(account_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("Loyalty account", account_id))?;

            return Err(DbError::Domain(CoreError::InsufficientPoints {
                account_id: account_id.to_string(),
                balance,
                requested: -points,
            }));
        }

        let entry = LoyaltyEntry {
            id: new_id(),
            account_id: account_id.to_string(),
            kind,
            points,
            reference_type: reference_type.map(String::from),
            reference_id: reference_id.map(String::from),
            note: note.map(String::from),
            created_at: now(),
        };

        sqlx::query(
            "INSERT INTO loyalty_entries
                (id, account_id, kind, points, reference_type, reference_id, note, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.account_id)
        .bind(entry.kind)
        .bind(entry.points)
        .bind(&entry.reference_type)
        .bind(&entry.reference_id)
        .bind(&entry.note)
        .bind(entry.created_at)
        .execute(conn)
        .await?;

        Ok(entry)
    }

    /// Net points a document has put on an account, for reversal at void.
    pub async fn points_for_reference_tx(
        &self,
        conn: &mut SqliteConnection,
        account_id: &str,
        reference_type: &str,
        reference_id: &str,
    ) -> DbResult<i64> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(points), 0) FROM loyalty_entries
             WHERE account_id = ? AND reference_type = ? AND reference_id = ?",
        )
        .bind(account_id)
        .bind(reference_type)
        .bind(reference_id)
        .fetch_one(conn)
        .await?;
        Ok(total)
    }

    pub async fn entries(&self, account_id: &str, limit: i64) -> DbResult<Vec<LoyaltyEntry>> {
        let entries = sqlx::query_as::<_, LoyaltyEntry>(
            "SELECT * FROM loyalty_entries WHERE account_id = ?
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_db;

    #[tokio::test]
    async fn ledger_moves_balance() {
        let db = test_db().await;
        let customer = db.customers().create("Ada", None, 0).await.unwrap();
        let account = db.loyalty().create_account(&customer.id, 100).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        db.loyalty()
            .append(&mut tx, &account.id, LoyaltyEntryKind::Accrual, 8, Some("sale"), Some("s-1"), None)
            .await
            .unwrap();
        db.loyalty()
            .append(&mut tx, &account.id, LoyaltyEntryKind::Redemption, -3, None, None, None)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let reloaded = db.loyalty().get_by_customer(&customer.id).await.unwrap().unwrap();
        assert_eq!(reloaded.points_balance, 5);
        assert_eq!(db.loyalty().entries(&account.id, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn balance_cannot_go_negative() {
        let db = test_db().await;
        let customer = db.customers().create("Ada", None, 0).await.unwrap();
        let account = db.loyalty().create_account(&customer.id, 100).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let err = db
            .loyalty()
            .append(&mut tx, &account.id, LoyaltyEntryKind::Redemption, -1, None, None, None)
            .await;
        assert!(matches!(
            err,
            Err(DbError::Domain(CoreError::InsufficientPoints { .. }))
        ));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn one_account_per_customer() {
        let db = test_db().await;
        let customer = db.customers().create("Ada", None, 0).await.unwrap();
        db.loyalty().create_account(&customer.id, 100).await.unwrap();
        assert!(db.loyalty().create_account(&customer.id, 100).await.is_err());
    }
}
