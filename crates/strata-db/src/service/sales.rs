//! Sale posting and voiding.

use serde_json::json;
use strata_core::{
    loyalty::accrue_points, AuditAction, CashMovementKind, CoreError, LoyaltyEntryKind, Money,
    MoveKind, PaymentMethod, Sale, SaleStatus, SessionStatus, ValidationError,
};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::pool::Database;

pub struct SalesService {
    db: Database,
}

impl SalesService {
    pub fn new(db: Database) -> Self {
        SalesService { db }
    }

    /// Posts a draft sale: consumes its reservations, issues stock at
    /// average cost, marks serialized devices sold, accrues loyalty,
    /// books credit, records drawer cash, and completes the sale. One
    /// transaction end to end.
    pub async fn post_sale(&self, sale_id: &str, actor: &str) -> DbResult<Sale> {
        let sales = self.db.sales();
        let stock = self.db.stock();
        let devices = self.db.devices();

        let mut tx = self.db.begin().await?;

        let sale = sales.require_tx(&mut tx, sale_id).await?;
        if sale.status != SaleStatus::Draft {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Sale",
                id: sale_id.to_string(),
                expected: "draft",
            }));
        }

        let items = sales.items_tx(&mut tx, sale_id).await?;
        if items.is_empty() {
            return Err(ValidationError::Required {
                field: "sale items".to_string(),
            }
            .into());
        }

        let payments = sales.payments_tx(&mut tx, sale_id).await?;
        let paid_cents: i64 = payments.iter().map(|p| p.amount_cents).sum();

        // Settlement check: credit sales go on the customer's balance,
        // everything else must be paid in full.
        if sale.on_credit {
            let customer_id = sale.customer_id.as_deref().ok_or_else(|| {
                DbError::from(ValidationError::Required {
                    field: "customer_id".to_string(),
                })
            })?;
            let customer = self.db.customers().require_tx(&mut tx, customer_id).await?;
            let would_owe = customer.balance_cents + sale.total_cents;
            if would_owe > customer.credit_limit_cents {
                return Err(DbError::Domain(CoreError::CreditLimitExceeded {
                    customer_id: customer_id.to_string(),
                    limit_cents: customer.credit_limit_cents,
                    would_owe_cents: would_owe,
                }));
            }
        } else if paid_cents < sale.total_cents {
            return Err(DbError::Domain(CoreError::SaleUnderpaid {
                sale_id: sale_id.to_string(),
                total_cents: sale.total_cents,
                paid_cents,
            }));
        }

        // Free this sale's holds so its own issue can use the quantity.
        stock.consume_for(&mut tx, "sale", sale_id).await?;

        for item in &items {
            let change = stock
                .issue(
                    &mut tx,
                    &sale.store_id,
                    &item.sku,
                    item.quantity,
                    MoveKind::SaleIssue,
                    Some("sale"),
                    Some(sale_id),
                )
                .await?;
            sales
                .set_item_cost(&mut tx, &item.id, change.avg_cost_after_cents)
                .await?;

            if let Some(device_id) = &item.device_id {
                devices.mark_sold(&mut tx, device_id, sale_id).await?;
            }
        }

        // Loyalty accrual, when the customer has an active account.
        if let Some(customer_id) = &sale.customer_id {
            if let Some(account) = self
                .db
                .loyalty()
                .get_by_customer_tx(&mut tx, customer_id)
                .await?
            {
                if account.is_active {
                    let points =
                        accrue_points(Money::from_cents(sale.total_cents), account.accrual_bps);
                    if points > 0 {
                        self.db
                            .loyalty()
                            .append(
                                &mut tx,
                                &account.id,
                                LoyaltyEntryKind::Accrual,
                                points,
                                Some("sale"),
                                Some(sale_id),
                                None,
                            )
                            .await?;
                    }
                }
            }

            if sale.on_credit {
                self.db
                    .customers()
                    .apply_balance_delta(&mut tx, customer_id, sale.total_cents)
                    .await?;
            }
        }

        // Cash lands in the open drawer.
        if let Some(session_id) = &sale.session_id {
            let cash_cents: i64 = payments
                .iter()
                .filter(|p| p.method == PaymentMethod::Cash)
                .map(|p| p.amount_cents)
                .sum();
            if cash_cents > 0 {
                self.db
                    .registers()
                    .add_movement(
                        &mut tx,
                        session_id,
                        CashMovementKind::SaleCash,
                        cash_cents,
                        Some(&sale.receipt_number),
                    )
                    .await?;
            }
        }

        sales.finalize(&mut tx, sale_id).await?;

        self.db
            .audit()
            .append(
                &mut tx,
                actor,
                AuditAction::SalePosted,
                "sale",
                sale_id,
                json!({
                    "receipt_number": sale.receipt_number,
                    "total_cents": sale.total_cents,
                    "paid_cents": paid_cents,
                    "on_credit": sale.on_credit,
                    "lines": items.len(),
                }),
            )
            .await?;

        let posted = sales.require_tx(&mut tx, sale_id).await?;
        self.db
            .outbox()
            .queue(&mut tx, "SALE", sale_id, &serde_json::to_value(&posted)?)
            .await?;

        tx.commit().await?;
        info!(
            sale_id,
            receipt = %posted.receipt_number,
            total_cents = posted.total_cents,
            "sale posted"
        );
        Ok(posted)
    }

    /// Voids a completed sale: returns stock at the exact cost each line
    /// consumed, puts devices back, reverses loyalty and credit, refunds
    /// drawer cash if the session is still open.
    pub async fn void_sale(&self, sale_id: &str, actor: &str) -> DbResult<Sale> {
        let sales = self.db.sales();
        let stock = self.db.stock();

        let mut tx = self.db.begin().await?;

        let sale = sales.require_tx(&mut tx, sale_id).await?;
        // The guarded UPDATE below re-checks; this gives the clean error.
        if sale.status != SaleStatus::Completed {
            return Err(DbError::Domain(CoreError::InvalidStatus {
                entity: "Sale",
                id: sale_id.to_string(),
                expected: "completed",
            }));
        }

        let items = sales.items_tx(&mut tx, sale_id).await?;
        for item in &items {
            // Reverse at the stamped issue cost, not today's average.
            let unit_cost = item.unit_cost_cents.unwrap_or(0);
            stock
                .receive(
                    &mut tx,
                    &sale.store_id,
                    &item.sku,
                    item.quantity,
                    unit_cost,
                    MoveKind::SaleReversal,
                    Some("sale"),
                    Some(sale_id),
                )
                .await?;

            if let Some(device_id) = &item.device_id {
                self.db.devices().return_to_stock(&mut tx, device_id).await?;
            }
        }

        if let Some(customer_id) = &sale.customer_id {
            if let Some(account) = self
                .db
                .loyalty()
                .get_by_customer_tx(&mut tx, customer_id)
                .await?
            {
                let net_points = self
                    .db
                    .loyalty()
                    .points_for_reference_tx(&mut tx, &account.id, "sale", sale_id)
                    .await?;
                if net_points != 0 {
                    self.db
                        .loyalty()
                        .append(
                            &mut tx,
                            &account.id,
                            LoyaltyEntryKind::Reversal,
                            -net_points,
                            Some("sale"),
                            Some(sale_id),
                            Some("sale voided"),
                        )
                        .await?;
                }
            }

            if sale.on_credit {
                self.db
                    .customers()
                    .apply_balance_delta(&mut tx, customer_id, -sale.total_cents)
                    .await?;
            }
        }

        // Cash refund leaves the drawer only while the session is open;
        // a closed session's count already happened.
        if let Some(session_id) = &sale.session_id {
            let session = self.db.registers().require_tx(&mut tx, session_id).await?;
            if session.status == SessionStatus::Open {
                let cash_cents: i64 = sales
                    .payments_tx(&mut tx, sale_id)
                    .await?
                    .iter()
                    .filter(|p| p.method == PaymentMethod::Cash)
                    .map(|p| p.amount_cents)
                    .sum();
                if cash_cents > 0 {
                    self.db
                        .registers()
                        .add_movement(
                            &mut tx,
                            session_id,
                            CashMovementKind::PaidOut,
                            cash_cents,
                            Some(&format!("void {}", sale.receipt_number)),
                        )
                        .await?;
                }
            }
        }

        sales.void(&mut tx, sale_id).await?;

        self.db
            .audit()
            .append(
                &mut tx,
                actor,
                AuditAction::SaleVoided,
                "sale",
                sale_id,
                json!({
                    "receipt_number": sale.receipt_number,
                    "total_cents": sale.total_cents,
                }),
            )
            .await?;

        let voided = sales.require_tx(&mut tx, sale_id).await?;
        self.db
            .outbox()
            .queue(&mut tx, "SALE", sale_id, &serde_json::to_value(&voided)?)
            .await?;

        tx.commit().await?;
        info!(sale_id, receipt = %voided.receipt_number, "sale voided");
        Ok(voided)
    }
}
