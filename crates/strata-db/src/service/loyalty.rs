//! Loyalty redemption.
//!
//! Accrual happens inside sale posting; redemption is its own small flow
//! so a customer can burn points with or without an open basket.

use serde_json::json;
use strata_core::loyalty::{check_redemption, redemption_value};
use strata_core::{AuditAction, LoyaltyEntry, LoyaltyEntryKind, Money};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::pool::Database;

pub struct LoyaltyService {
    db: Database,
}

impl LoyaltyService {
    pub fn new(db: Database) -> Self {
        LoyaltyService { db }
    }

    /// Redeems points against the customer's balance, optionally linked to
    /// the sale receiving the discount. Returns the ledger entry and the
    /// discount value the redemption is worth.
    pub async fn redeem_points(
        &self,
        customer_id: &str,
        points: i64,
        sale_id: Option<&str>,
        actor: &str,
    ) -> DbResult<(LoyaltyEntry, Money)> {
        let mut tx = self.db.begin().await?;

        let account = self
            .db
            .loyalty()
            .get_by_customer_tx(&mut tx, customer_id)
            .await?
            .ok_or_else(|| DbError::not_found("Loyalty account for customer", customer_id))?;

        check_redemption(&account.id, account.points_balance, points)?;

        let entry = self
            .db
            .loyalty()
            .append(
                &mut tx,
                &account.id,
                LoyaltyEntryKind::Redemption,
                -points,
                sale_id.map(|_| "sale"),
                sale_id,
                None,
            )
            .await?;

        let value = redemption_value(points);
        self.db
            .audit()
            .append(
                &mut tx,
                actor,
                AuditAction::LoyaltyRedeemed,
                "loyalty_account",
                &account.id,
                json!({
                    "customer_id": customer_id,
                    "points": points,
                    "value_cents": value.cents(),
                    "sale_id": sale_id,
                }),
            )
            .await?;

        let updated = self
            .db
            .loyalty()
            .get_by_customer_tx(&mut tx, customer_id)
            .await?
            .ok_or_else(|| DbError::not_found("Loyalty account for customer", customer_id))?;
        self.db
            .outbox()
            .queue(&mut tx, "LOYALTY_ACCOUNT", &account.id, &serde_json::to_value(&updated)?)
            .await?;

        tx.commit().await?;
        info!(customer_id, points, "loyalty points redeemed");
        Ok((entry, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_db;
    use strata_core::CoreError;

    #[tokio::test]
    async fn redemption_burns_points_and_prices_the_discount() {
        let db = test_db().await;
        let customer = db.customers().create("Ada", None, 0).await.unwrap();
        let account = db.loyalty().create_account(&customer.id, 100).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        db.loyalty()
            .append(&mut tx, &account.id, LoyaltyEntryKind::Accrual, 20, None, None, None)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let (entry, value) = db
            .loyalty_service()
            .redeem_points(&customer.id, 15, Some("s-1"), "user-1")
            .await
            .unwrap();
        assert_eq!(entry.points, -15);
        assert_eq!(value.cents(), 1_500);

        let reloaded = db.loyalty().get_by_customer(&customer.id).await.unwrap().unwrap();
        assert_eq!(reloaded.points_balance, 5);

        // The redemption is audited and the account change is queued for sync.
        let trail = db
            .audit()
            .for_entity("loyalty_account", &account.id)
            .await
            .unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "loyalty_redeemed");
        assert_eq!(db.outbox().pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn over_redemption_rejected() {
        let db = test_db().await;
        let customer = db.customers().create("Ada", None, 0).await.unwrap();
        db.loyalty().create_account(&customer.id, 100).await.unwrap();

        let err = db
            .loyalty_service()
            .redeem_points(&customer.id, 1, None, "user-1")
            .await;
        assert!(matches!(
            err,
            Err(DbError::Domain(CoreError::InsufficientPoints { .. }))
        ));
    }
}
