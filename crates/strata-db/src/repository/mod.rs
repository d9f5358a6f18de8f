//! # Repository Layer
//!
//! One repository per entity. Reads run on the pool; writes that belong to
//! a larger unit of work take `&mut SqliteConnection` so services can
//! compose them in a single transaction.
//!
//! Status transitions are enforced with status-guarded UPDATEs: the WHERE
//! clause names the required current status and zero affected rows means
//! the entity was not in it. That check is what makes posting, voiding and
//! reservation consumption safe to retry.

mod audit;
mod customer;
mod device;
mod loyalty;
mod outbox;
mod purchase;
mod register;
mod sale;
mod stock;
mod store;
mod supplier;
mod transfer;

pub use audit::AuditRepository;
pub use customer::CustomerRepository;
pub use device::{DeviceRepository, NewDevice};
pub use loyalty::LoyaltyRepository;
pub use outbox::OutboxRepository;
pub use purchase::{NewPurchaseLine, PurchaseRepository};
pub use register::RegisterRepository;
pub use sale::SaleRepository;
pub use stock::StockRepository;
pub use store::StoreRepository;
pub use supplier::SupplierRepository;
pub use transfer::{NewTransferLine, TransferRepository};

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Short uppercase suffix for human-facing document numbers.
pub(crate) fn short_ref() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}
