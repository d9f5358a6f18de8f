//! Register session repository.
//!
//! A partial unique index allows at most one open session per
//! (store, register); opening a second one fails at the INSERT. Expected
//! cash is derived from the opening float plus the signed cash movements.

use sqlx::{SqliteConnection, SqlitePool};
use strata_core::validation::validate_non_negative_cents;
use strata_core::{
    CashMovement, CashMovementKind, CoreError, RegisterSession, SessionStatus,
};

use crate::error::{DbError, DbResult};
use crate::repository::{new_id, now};

pub struct RegisterRepository {
    pool: SqlitePool,
}

impl RegisterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RegisterRepository { pool }
    }

    /// Opens a session with the counted opening float.
    pub async fn open(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        register_id: &str,
        opened_by: &str,
        opening_float_cents: i64,
    ) -> DbResult<RegisterSession> {
        validate_non_negative_cents("opening_float", opening_float_cents)?;

        let session = RegisterSession {
            id: new_id(),
            store_id: store_id.to_string(),
            register_id: register_id.to_string(),
            status: SessionStatus::Open,
            opened_by: opened_by.to_string(),
            closed_by: None,
            opening_float_cents,
            expected_cash_cents: None,
            counted_cash_cents: None,
            variance_cents: None,
            opened_at: now(),
            closed_at: None,
            notes: None,
            sync_version: 0,
        };

        let result = sqlx::query(
            "INSERT INTO register_sessions
                (id, store_id, register_id, status, opened_by, closed_by,
                 opening_float_cents, expected_cash_cents, counted_cash_cents,
                 variance_cents, opened_at, closed_at, notes, sync_version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.store_id)
        .bind(&session.register_id)
        .bind(session.status)
        .bind(&session.opened_by)
        .bind(&session.closed_by)
        .bind(session.opening_float_cents)
        .bind(session.expected_cash_cents)
        .bind(session.counted_cash_cents)
        .bind(session.variance_cents)
        .bind(session.opened_at)
        .bind(session.closed_at)
        .bind(&session.notes)
        .bind(session.sync_version)
        .execute(conn)
        .await;

        match result {
            Ok(_) => Ok(session),
            Err(err) => {
                let db_err = DbError::from(err);
                if matches!(db_err, DbError::UniqueViolation { .. }) {
                    Err(DbError::Domain(CoreError::SessionAlreadyOpen {
                        store_id: store_id.to_string(),
                        register_id: register_id.to_string(),
                    }))
                } else {
                    Err(db_err)
                }
            }
        }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<RegisterSession>> {
        let session =
            sqlx::query_as::<_, RegisterSession>("SELECT * FROM register_sessions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(session)
    }

    pub async fn require_tx(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<RegisterSession> {
        sqlx::query_as::<_, RegisterSession>("SELECT * FROM register_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| DbError::not_found("Register session", id))
    }

    pub async fn get_open(
        &self,
        store_id: &str,
        register_id: &str,
    ) -> DbResult<Option<RegisterSession>> {
        let session = sqlx::query_as::<_, RegisterSession>(
            "SELECT * FROM register_sessions
             WHERE store_id = ? AND register_id = ? AND status = 'open'",
        )
        .bind(store_id)
        .bind(register_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// Records a cash movement against an open session.
    pub async fn add_movement(
        &self,
        conn: &mut SqliteConnection,
        session_id: &str,
        kind: CashMovementKind,
        amount_cents: i64,
        reason: Option<&str>,
    ) -> DbResult<CashMovement> {
        validate_non_negative_cents("amount", amount_cents)?;

        let session = self.require_tx(conn, session_id).await?;
        if session.status != SessionStatus::Open {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Register session",
                id: session_id.to_string(),
                expected: "open",
            }));
        }

        let movement = CashMovement {
            id: new_id(),
            session_id: session_id.to_string(),
            kind,
            amount_cents,
            reason: reason.map(String::from),
            created_at: now(),
        };

        sqlx::query(
            "INSERT INTO cash_movements (id, session_id, kind, amount_cents, reason, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&movement.id)
        .bind(&movement.session_id)
        .bind(movement.kind)
        .bind(movement.amount_cents)
        .bind(&movement.reason)
        .bind(movement.created_at)
        .execute(conn)
        .await?;

        Ok(movement)
    }

    /// Opening float plus signed cash movements: what should be in the
    /// drawer right now.
    pub async fn expected_cash_tx(
        &self,
        conn: &mut SqliteConnection,
        session_id: &str,
    ) -> DbResult<i64> {
        let session = self.require_tx(conn, session_id).await?;
        let moved = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(CASE kind WHEN 'paid_out' THEN -amount_cents
                                           ELSE amount_cents END), 0)
             FROM cash_movements WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(conn)
        .await?;
        Ok(session.opening_float_cents + moved)
    }

    /// open -> closed, guarded, stamping the count and variance.
    #[allow(clippy::too_many_arguments)]
    pub async fn close(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        closed_by: &str,
        expected_cash_cents: i64,
        counted_cash_cents: i64,
        variance_cents: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE register_sessions
             SET status = 'closed', closed_by = ?, expected_cash_cents = ?,
                 counted_cash_cents = ?, variance_cents = ?, closed_at = ?,
                 sync_version = sync_version + 1
             WHERE id = ? AND status = 'open'",
        )
        .bind(closed_by)
        .bind(expected_cash_cents)
        .bind(counted_cash_cents)
        .bind(variance_cents)
        .bind(now())
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Register session",
                id: id.to_string(),
                expected: "open",
            }));
        }
        Ok(())
    }

    pub async fn movements(&self, session_id: &str) -> DbResult<Vec<CashMovement>> {
        let movements = sqlx::query_as::<_, CashMovement>(
            "SELECT * FROM cash_movements WHERE session_id = ? ORDER BY created_at",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(movements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_db;

    #[tokio::test]
    async fn only_one_open_session_per_register() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        db.registers()
            .open(&mut tx, &store.id, "reg-1", "user-1", 10_000)
            .await
            .unwrap();
        let err = db
            .registers()
            .open(&mut tx, &store.id, "reg-1", "user-2", 5_000)
            .await;
        assert!(matches!(
            err,
            Err(DbError::Domain(CoreError::SessionAlreadyOpen { .. }))
        ));
        // A different register at the same store is fine.
        db.registers()
            .open(&mut tx, &store.id, "reg-2", "user-2", 5_000)
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn expected_cash_tracks_movements() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let session = db
            .registers()
            .open(&mut tx, &store.id, "reg-1", "user-1", 10_000)
            .await
            .unwrap();
        db.registers()
            .add_movement(&mut tx, &session.id, CashMovementKind::SaleCash, 4_500, None)
            .await
            .unwrap();
        db.registers()
            .add_movement(&mut tx, &session.id, CashMovementKind::PaidOut, 2_000, Some("courier"))
            .await
            .unwrap();

        let expected = db.registers().expected_cash_tx(&mut tx, &session.id).await.unwrap();
        assert_eq!(expected, 10_000 + 4_500 - 2_000);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn closed_session_rejects_movements() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let session = db
            .registers()
            .open(&mut tx, &store.id, "reg-1", "user-1", 10_000)
            .await
            .unwrap();
        db.registers()
            .close(&mut tx, &session.id, "user-1", 10_000, 10_000, 0)
            .await
            .unwrap();
        let err = db
            .registers()
            .add_movement(&mut tx, &session.id, CashMovementKind::PaidIn, 100, None)
            .await;
        assert!(matches!(
            err,
            Err(DbError::Domain(CoreError::InvalidStatus { .. }))
        ));
        tx.commit().await.unwrap();
    }
}
