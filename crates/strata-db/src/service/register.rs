//! Register session open/close and drawer movements.

use serde_json::json;
use strata_core::{
    AuditAction, CashMovement, CashMovementKind, RegisterSession, VARIANCE_ALERT_CENTS,
};
use tracing::info;

use crate::error::DbResult;
use crate::pool::Database;

pub struct RegisterService {
    db: Database,
}

impl RegisterService {
    pub fn new(db: Database) -> Self {
        RegisterService { db }
    }

    /// Opens a session with a counted opening float. At most one session
    /// can be open per register.
    pub async fn open_session(
        &self,
        store_id: &str,
        register_id: &str,
        opened_by: &str,
        opening_float_cents: i64,
    ) -> DbResult<RegisterSession> {
        let mut tx = self.db.begin().await?;

        let session = self
            .db
            .registers()
            .open(&mut tx, store_id, register_id, opened_by, opening_float_cents)
            .await?;

        self.db
            .audit()
            .append(
                &mut tx,
                opened_by,
                AuditAction::SessionOpened,
                "register_session",
                &session.id,
                json!({
                    "register_id": register_id,
                    "opening_float_cents": opening_float_cents,
                }),
            )
            .await?;

        self.db
            .outbox()
            .queue(&mut tx, "SESSION", &session.id, &serde_json::to_value(&session)?)
            .await?;

        tx.commit().await?;
        info!(session_id = %session.id, register_id, "register session opened");
        Ok(session)
    }

    /// Drops cash into the drawer outside a sale (float top-up, change run).
    pub async fn paid_in(
        &self,
        session_id: &str,
        amount_cents: i64,
        reason: &str,
        actor: &str,
    ) -> DbResult<CashMovement> {
        self.record_movement(session_id, CashMovementKind::PaidIn, amount_cents, reason, actor)
            .await
    }

    /// Takes cash out of the drawer (supplier COD, courier, bank drop).
    pub async fn paid_out(
        &self,
        session_id: &str,
        amount_cents: i64,
        reason: &str,
        actor: &str,
    ) -> DbResult<CashMovement> {
        self.record_movement(session_id, CashMovementKind::PaidOut, amount_cents, reason, actor)
            .await
    }

    async fn record_movement(
        &self,
        session_id: &str,
        kind: CashMovementKind,
        amount_cents: i64,
        reason: &str,
        actor: &str,
    ) -> DbResult<CashMovement> {
        let action = match kind {
            CashMovementKind::PaidOut => AuditAction::CashPaidOut,
            _ => AuditAction::CashPaidIn,
        };

        let mut tx = self.db.begin().await?;
        let movement = self
            .db
            .registers()
            .add_movement(&mut tx, session_id, kind, amount_cents, Some(reason))
            .await?;
        self.db
            .audit()
            .append(
                &mut tx,
                actor,
                action,
                "register_session",
                session_id,
                json!({
                    "amount_cents": amount_cents,
                    "reason": reason,
                }),
            )
            .await?;
        tx.commit().await?;
        Ok(movement)
    }

    /// Closes the session against a physical count. Variance is counted
    /// minus expected; a variance at or past the alert threshold writes an
    /// additional Critical audit entry.
    pub async fn close_session(
        &self,
        session_id: &str,
        counted_cash_cents: i64,
        closed_by: &str,
    ) -> DbResult<RegisterSession> {
        let registers = self.db.registers();
        let mut tx = self.db.begin().await?;

        let expected = registers.expected_cash_tx(&mut tx, session_id).await?;
        let variance = counted_cash_cents - expected;

        registers
            .close(&mut tx, session_id, closed_by, expected, counted_cash_cents, variance)
            .await?;

        self.db
            .audit()
            .append(
                &mut tx,
                closed_by,
                AuditAction::SessionClosed,
                "register_session",
                session_id,
                json!({
                    "expected_cash_cents": expected,
                    "counted_cash_cents": counted_cash_cents,
                    "variance_cents": variance,
                }),
            )
            .await?;

        if variance.abs() >= VARIANCE_ALERT_CENTS {
            self.db
                .audit()
                .append(
                    &mut tx,
                    closed_by,
                    AuditAction::SessionVarianceExceeded,
                    "register_session",
                    session_id,
                    json!({
                        "variance_cents": variance,
                        "threshold_cents": VARIANCE_ALERT_CENTS,
                    }),
                )
                .await?;
        }

        let closed = registers.require_tx(&mut tx, session_id).await?;
        self.db
            .outbox()
            .queue(&mut tx, "SESSION", session_id, &serde_json::to_value(&closed)?)
            .await?;

        tx.commit().await?;
        info!(session_id, variance_cents = variance, "register session closed");
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::test_db;
    use strata_core::{AuditSeverity, SessionStatus};

    #[tokio::test]
    async fn balanced_close_has_zero_variance() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();

        let session = db
            .register_service()
            .open_session(&store.id, "reg-1", "user-1", 10_000)
            .await
            .unwrap();
        db.register_service()
            .paid_in(&session.id, 2_000, "change run", "user-1")
            .await
            .unwrap();

        let closed = db
            .register_service()
            .close_session(&session.id, 12_000, "user-1")
            .await
            .unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
        assert_eq!(closed.expected_cash_cents, Some(12_000));
        assert_eq!(closed.variance_cents, Some(0));

        // No critical entry on a balanced drawer.
        let critical = db.audit().by_severity(AuditSeverity::Critical, 10).await.unwrap();
        assert!(critical.is_empty());
    }

    #[tokio::test]
    async fn large_shortfall_escalates_to_critical() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();

        let session = db
            .register_service()
            .open_session(&store.id, "reg-1", "user-1", 10_000)
            .await
            .unwrap();

        // Drawer is short by 25.00, past the alert threshold.
        let closed = db
            .register_service()
            .close_session(&session.id, 7_500, "user-1")
            .await
            .unwrap();
        assert_eq!(closed.variance_cents, Some(-2_500));

        let critical = db.audit().by_severity(AuditSeverity::Critical, 10).await.unwrap();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].action, "session_variance_exceeded");
    }

    #[tokio::test]
    async fn close_is_single_shot() {
        let db = test_db().await;
        let store = db.stores().create("DT-01", "Downtown", None).await.unwrap();
        let session = db
            .register_service()
            .open_session(&store.id, "reg-1", "user-1", 10_000)
            .await
            .unwrap();

        db.register_service()
            .close_session(&session.id, 10_000, "user-1")
            .await
            .unwrap();
        assert!(db
            .register_service()
            .close_session(&session.id, 10_000, "user-1")
            .await
            .is_err());

        // Register is free for the next shift.
        db.register_service()
            .open_session(&store.id, "reg-1", "user-2", 5_000)
            .await
            .unwrap();
    }
}
