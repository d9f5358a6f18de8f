//! # strata-sync: Outbox Delivery for Strata POS
//!
//! Drains the transactional outbox that strata-db services write and
//! pushes entity snapshots upstream.
//!
//! ```text
//!   strata-db services ──► sync_outbox (same transaction as the change)
//!                              │
//!                              ▼
//!                      OutboxProcessor (THIS CRATE)
//!                        poll ── batch ── deliver ── ack
//!                              │
//!                              ▼
//!                      SyncTransport (trait; HTTP upstream in
//!                      production, in-memory in tests)
//! ```
//!
//! Delivery is at-least-once: an entry leaves the queue only on an
//! explicit ack. Upstream version conflicts are flagged and parked rather
//! than retried, so one stuck entity never blocks the queue.

pub mod config;
pub mod error;
pub mod processor;
pub mod transport;

pub use config::{SyncConfig, SyncMode};
pub use error::{SyncError, SyncResult};
pub use processor::{OutboxProcessor, SyncOutcome, SyncStatus};
pub use transport::{BatchAck, BatchEntry, OutboxBatch, SyncTransport};
