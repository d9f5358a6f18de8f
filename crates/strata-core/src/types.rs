//! # Domain Types
//!
//! Core domain types for Strata POS.
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - a business ID where one exists (sku, imei, receipt_number, order_number)
//!
//! ## Status Enums
//! Status enums are explicit state machines. Transitions are enforced by
//! status-guarded UPDATEs in strata-db, so a row can never skip a state
//! even under concurrent writers.
//!
//! Row-shaped structs carry raw `_cents` integers so they map 1:1 onto the
//! schema; accessor methods lift them into [`Money`](crate::money::Money).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (825 bps = 8.25%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Rate as a percentage, display only.
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Stores
// =============================================================================

/// A physical store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Store {
    pub id: String,
    /// Short business code ("DT-01"), unique across the chain.
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync_version: i64,
}

// =============================================================================
// Suppliers & Customers
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tax_id: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync_version: i64,
}

/// A customer. `balance_cents` is what the customer currently owes on
/// credit; credit sales may not push it beyond `credit_limit_cents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tax_id: Option<String>,
    pub credit_limit_cents: i64,
    pub balance_cents: i64,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync_version: i64,
}

impl Customer {
    /// Remaining credit headroom, never negative.
    pub fn available_credit(&self) -> Money {
        Money::from_cents((self.credit_limit_cents - self.balance_cents).max(0))
    }
}

// =============================================================================
// Devices (serialized units)
// =============================================================================

/// Physical condition of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DeviceCondition {
    New,
    Used,
    Refurbished,
}

/// Lifecycle of a serialized device.
///
/// ```text
/// InStock ──► Reserved ──► Sold
///    │            │
///    │            └──► InStock   (reservation released/expired)
///    ├──► InTransit ──► InStock  (transfer received at destination)
///    └──► Retired                (write-off; terminal)
/// Sold ──► InStock               (sale voided)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    InStock,
    Reserved,
    InTransit,
    Sold,
    Retired,
}

/// One physical phone, identified by IMEI.
///
/// Devices exist alongside the quantity stock: the sku-level
/// [`StockItem`] carries quantities and average cost, the device row
/// carries the serial identity and its own acquisition cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Device {
    pub id: String,
    pub store_id: String,
    pub sku: String,
    pub imei: Option<String>,
    pub model_name: String,
    pub storage_gb: Option<i64>,
    pub color: Option<String>,
    pub condition: DeviceCondition,
    pub status: DeviceStatus,
    pub cost_cents: i64,
    pub price_cents: i64,
    pub supplier_id: Option<String>,
    pub purchase_id: Option<String>,
    pub sale_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync_version: i64,
}

impl Device {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }
}

// =============================================================================
// Stock (quantity inventory with weighted-average cost)
// =============================================================================

/// Quantity stock for one sku at one store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockItem {
    pub id: String,
    pub store_id: String,
    pub sku: String,
    pub name: String,
    pub qty_on_hand: i64,
    /// Quantity held by active reservations. Unavailable to issue.
    pub qty_reserved: i64,
    /// Weighted-average unit cost, recomputed on every receipt.
    pub avg_cost_cents: i64,
    pub price_cents: i64,
    pub tax_rate_bps: i64,
    pub allow_negative_stock: bool,
    pub reorder_level: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync_version: i64,
}

impl StockItem {
    /// Quantity a new document may issue: on-hand minus reservations.
    #[inline]
    pub fn available(&self) -> i64 {
        self.qty_on_hand - self.qty_reserved
    }

    /// Whether `qty` can be issued without a reservation held for the caller.
    pub fn can_issue(&self, qty: i64) -> bool {
        self.available() >= qty || self.allow_negative_stock
    }

    /// Book value of the on-hand quantity at average cost.
    pub fn valuation(&self) -> Money {
        Money::from_cents(self.qty_on_hand * self.avg_cost_cents)
    }

    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps as u32)
    }
}

/// Kind of stock movement, one per ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    PurchaseReceipt,
    SaleIssue,
    SaleReversal,
    TransferOut,
    TransferIn,
    Adjustment,
}

/// One row of the append-only stock movement ledger.
///
/// `qty` is signed: receipts positive, issues negative. `value_cents` is
/// `qty * unit_cost_cents` and is what the cost ledger reconciles against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMove {
    pub id: String,
    pub store_id: String,
    pub sku: String,
    pub kind: MoveKind,
    pub qty: i64,
    pub unit_cost_cents: i64,
    pub value_cents: i64,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Average-cost recomputation record written alongside each costing move.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CostLedgerEntry {
    pub id: String,
    pub store_id: String,
    pub sku: String,
    pub move_id: String,
    pub qty_before: i64,
    pub avg_cost_before_cents: i64,
    pub qty_after: i64,
    pub avg_cost_after_cents: i64,
    pub value_delta_cents: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Reservations
// =============================================================================

/// Reservation lifecycle.
///
/// Active is the only state a reservation can be consumed from, and the
/// consumption UPDATE is conditional on it, which makes consumption
/// at-most-once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Consumed,
    Released,
    Expired,
}

/// A temporary hold on stock pending sale or transfer completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Reservation {
    pub id: String,
    pub store_id: String,
    pub sku: String,
    pub qty: i64,
    /// Set when the hold is for one specific serialized unit; the device
    /// row is marked reserved for as long as the hold is active.
    pub device_id: Option<String>,
    pub status: ReservationStatus,
    /// Document type holding the reservation ("sale", "transfer").
    pub reference_type: String,
    pub reference_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Sales
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Items being added, nothing posted to inventory yet.
    Draft,
    /// Posted: stock issued, loyalty accrued, outbox queued.
    Completed,
    /// Reversed after completion (or abandoned as draft).
    Voided,
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Draft
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    ExternalCard,
    BankTransfer,
    /// Sale amount booked against the customer's credit balance.
    StoreCredit,
}

/// A sale transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    pub store_id: String,
    pub receipt_number: String,
    pub status: SaleStatus,
    pub customer_id: Option<String>,
    /// Open register session the sale's cash lands in, if any.
    pub session_id: Option<String>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub on_credit: bool,
    pub user_id: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sync_version: i64,
}

/// A line item. Snapshot pattern: sku, name and price are frozen at sale
/// time so history survives later catalog edits. `unit_cost_cents` is
/// stamped at posting with the weighted-average issue cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub sku: String,
    /// Set for serialized lines; the device is marked sold at posting.
    pub device_id: Option<String>,
    pub name_snapshot: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub unit_cost_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: String,
    pub sale_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub tendered_cents: Option<i64>,
    pub change_cents: Option<i64>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Purchases
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Ordered,
    Received,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Purchase {
    pub id: String,
    pub store_id: String,
    pub supplier_id: String,
    pub order_number: String,
    pub status: PurchaseStatus,
    pub total_cents: i64,
    pub user_id: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub sync_version: i64,
}

/// Purchase line. `imeis` is an optional JSON array; each IMEI registers
/// one device row when the purchase is received.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseItem {
    pub id: String,
    pub purchase_id: String,
    pub sku: String,
    pub name_snapshot: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    pub line_total_cents: i64,
    pub imeis: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PurchaseItem {
    /// Parses the IMEI list, empty when the line is not serialized.
    pub fn imei_list(&self) -> Vec<String> {
        self.imeis
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

// =============================================================================
// Transfers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Dispatched,
    Received,
    Cancelled,
}

/// Stock transfer between two stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Transfer {
    pub id: String,
    pub transfer_number: String,
    pub from_store_id: String,
    pub to_store_id: String,
    pub status: TransferStatus,
    pub user_id: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub sync_version: i64,
}

/// Transfer line. `unit_cost_cents` is stamped at dispatch with the source
/// store's average cost; the destination receipt reuses it so the transfer
/// is valuation-neutral for the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TransferItem {
    pub id: String,
    pub transfer_id: String,
    pub sku: String,
    pub quantity: i64,
    pub unit_cost_cents: Option<i64>,
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Loyalty
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyEntryKind {
    Accrual,
    Redemption,
    Reversal,
    Adjustment,
}

/// Loyalty account, one per customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LoyaltyAccount {
    pub id: String,
    pub customer_id: String,
    pub points_balance: i64,
    /// Accrual rate in basis points of the sale total (100 = 1 point per $1).
    pub accrual_bps: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync_version: i64,
}

/// Append-only loyalty ledger entry; `points` is signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LoyaltyEntry {
    pub id: String,
    pub account_id: String,
    pub kind: LoyaltyEntryKind,
    pub points: i64,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Register sessions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Closed,
}

/// A cash register session from opening float to close-out count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RegisterSession {
    pub id: String,
    pub store_id: String,
    pub register_id: String,
    pub status: SessionStatus,
    pub opened_by: String,
    pub closed_by: Option<String>,
    pub opening_float_cents: i64,
    pub expected_cash_cents: Option<i64>,
    pub counted_cash_cents: Option<i64>,
    /// counted minus expected; negative means missing cash.
    pub variance_cents: Option<i64>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub sync_version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CashMovementKind {
    SaleCash,
    PaidIn,
    PaidOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashMovement {
    pub id: String,
    pub session_id: String,
    pub kind: CashMovementKind,
    pub amount_cents: i64,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Audit
// =============================================================================

/// How loudly an audited action should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

/// Every state-changing flow writes exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SalePosted,
    SaleVoided,
    PurchaseReceived,
    PurchaseCancelled,
    TransferDispatched,
    TransferReceived,
    TransferCancelled,
    StockAdjusted,
    ReservationExpired,
    SessionOpened,
    SessionClosed,
    SessionVarianceExceeded,
    CashPaidIn,
    CashPaidOut,
    LoyaltyRedeemed,
    DeviceRetired,
    CustomerCreditChanged,
}

impl AuditAction {
    /// Stable string written to audit_log.action.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::SalePosted => "sale_posted",
            AuditAction::SaleVoided => "sale_voided",
            AuditAction::PurchaseReceived => "purchase_received",
            AuditAction::PurchaseCancelled => "purchase_cancelled",
            AuditAction::TransferDispatched => "transfer_dispatched",
            AuditAction::TransferReceived => "transfer_received",
            AuditAction::TransferCancelled => "transfer_cancelled",
            AuditAction::StockAdjusted => "stock_adjusted",
            AuditAction::ReservationExpired => "reservation_expired",
            AuditAction::SessionOpened => "session_opened",
            AuditAction::SessionClosed => "session_closed",
            AuditAction::SessionVarianceExceeded => "session_variance_exceeded",
            AuditAction::CashPaidIn => "cash_paid_in",
            AuditAction::CashPaidOut => "cash_paid_out",
            AuditAction::LoyaltyRedeemed => "loyalty_redeemed",
            AuditAction::DeviceRetired => "device_retired",
            AuditAction::CustomerCreditChanged => "customer_credit_changed",
        }
    }

    /// Severity classification. Reversals and write-offs are suspicious by
    /// nature; cash variance over threshold is an incident.
    pub fn severity(&self) -> AuditSeverity {
        match self {
            AuditAction::SaleVoided
            | AuditAction::PurchaseCancelled
            | AuditAction::TransferCancelled
            | AuditAction::StockAdjusted
            | AuditAction::DeviceRetired
            | AuditAction::CashPaidOut => AuditSeverity::Warning,
            AuditAction::SessionVarianceExceeded => AuditSeverity::Critical,
            _ => AuditSeverity::Info,
        }
    }
}

/// One audit trail row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AuditRecord {
    pub id: String,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub severity: AuditSeverity,
    /// JSON detail blob (quantities, costs, variances).
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sync Outbox
// =============================================================================

/// An entry in the sync outbox queue.
///
/// Outbox pattern: the row is written in the same transaction as the state
/// change it describes, so delivery is guaranteed once the change commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SyncOutboxEntry {
    pub id: String,
    /// "SALE", "PURCHASE", "TRANSFER", "SESSION", "STOCK_ITEM", ...
    pub entity_type: String,
    pub entity_id: String,
    /// Full entity snapshot as JSON.
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    /// Set when the upstream rejected the entry as a version conflict;
    /// conflicted entries are excluded from retry until resolved.
    pub conflict: bool,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub synced_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_rate_percentage() {
        let rate = TaxRate::from_bps(825);
        assert_eq!(rate.bps(), 825);
        assert!((rate.percentage() - 8.25).abs() < 0.001);
    }

    #[test]
    fn stock_item_availability() {
        let item = StockItem {
            id: "si-1".into(),
            store_id: "st-1".into(),
            sku: "IPH15-128-BLK".into(),
            name: "iPhone 15 128GB Black".into(),
            qty_on_hand: 10,
            qty_reserved: 4,
            avg_cost_cents: 60000,
            price_cents: 89900,
            tax_rate_bps: 0,
            allow_negative_stock: false,
            reorder_level: 2,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            sync_version: 0,
        };
        assert_eq!(item.available(), 6);
        assert!(item.can_issue(6));
        assert!(!item.can_issue(7));
        assert_eq!(item.valuation().cents(), 600000);
    }

    #[test]
    fn audit_severity_classification() {
        assert_eq!(AuditAction::SalePosted.severity(), AuditSeverity::Info);
        assert_eq!(AuditAction::SaleVoided.severity(), AuditSeverity::Warning);
        assert_eq!(
            AuditAction::SessionVarianceExceeded.severity(),
            AuditSeverity::Critical
        );
        assert!(AuditSeverity::Critical > AuditSeverity::Info);
    }

    #[test]
    fn purchase_item_imei_list() {
        let item = PurchaseItem {
            id: "pi-1".into(),
            purchase_id: "po-1".into(),
            sku: "IPH15-128-BLK".into(),
            name_snapshot: "iPhone 15".into(),
            quantity: 2,
            unit_cost_cents: 60000,
            line_total_cents: 120000,
            imeis: Some(r#"["490154203237518","352099001761481"]"#.into()),
            created_at: Utc::now(),
        };
        assert_eq!(item.imei_list().len(), 2);

        let bare = PurchaseItem { imeis: None, ..item };
        assert!(bare.imei_list().is_empty());
    }

    #[test]
    fn customer_available_credit_floors_at_zero() {
        let customer = Customer {
            id: "c-1".into(),
            name: "Ada".into(),
            phone: None,
            email: None,
            tax_id: None,
            credit_limit_cents: 50000,
            balance_cents: 65000,
            notes: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            sync_version: 0,
        };
        assert_eq!(customer.available_credit().cents(), 0);
    }
}
