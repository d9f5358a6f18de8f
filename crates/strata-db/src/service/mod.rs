//! # Service Layer
//!
//! Multi-repository flows, each executed inside one transaction: the
//! inventory movement, the document status change, the audit row and the
//! outbox row all commit together or not at all.
//!
//! ```text
//!   post_sale ──┐
//!               │  BEGIN
//!               │    consume reservations
//!               │    issue stock (+ ledgers)
//!               │    mark devices sold
//!               │    accrue loyalty
//!               │    move customer credit
//!               │    record drawer cash
//!               │    sale: draft -> completed
//!               │    audit_log row
//!               │    sync_outbox row
//!               │  COMMIT
//!               └─ nothing partial is ever visible
//! ```

mod inventory;
mod loyalty;
mod purchasing;
mod register;
mod sales;
mod transfers;

pub use inventory::InventoryService;
pub use loyalty::LoyaltyService;
pub use purchasing::PurchasingService;
pub use register::RegisterService;
pub use sales::SalesService;
pub use transfers::TransferService;
