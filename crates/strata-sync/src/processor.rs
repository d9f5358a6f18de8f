//! The outbox processor.
//!
//! ## Delivery loop
//! ```text
//!   tick ──► load pending (oldest first, conflicts excluded)
//!        ──► park entries past the attempt budget
//!        ──► deliver the rest as one batch
//!        ──► ack: mark synced / failed / conflict per entry
//!        ──► cleanup old synced entries
//! ```
//!
//! Acks are applied per entry, so one bad entity cannot hold back the
//! rest of the batch. A transport-level failure leaves every entry
//! pending; nothing is lost because the queue only drains on explicit
//! acks.

use chrono::{DateTime, Utc};
use strata_core::SyncOutboxEntry;
use strata_db::Database;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{SyncConfig, SyncMode};
use crate::error::{SyncError, SyncResult};
use crate::transport::{BatchEntry, OutboxBatch, SyncTransport};

/// Result of one delivery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub synced: u64,
    pub failed: u64,
    pub conflicts: u64,
    /// Entries parked for exceeding the attempt budget.
    pub parked: u64,
}

/// Point-in-time queue health, for status displays.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub mode: SyncMode,
    pub pending: i64,
    pub conflicts: i64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_outcome: Option<SyncOutcome>,
}

pub struct OutboxProcessor<T: SyncTransport> {
    db: Database,
    transport: T,
    config: SyncConfig,
    last_run: Option<DateTime<Utc>>,
    last_outcome: Option<SyncOutcome>,
}

impl<T: SyncTransport> OutboxProcessor<T> {
    pub fn new(db: Database, transport: T, config: SyncConfig) -> Self {
        OutboxProcessor {
            db,
            transport,
            config,
            last_run: None,
            last_outcome: None,
        }
    }

    /// Runs the auto-mode loop until `shutdown` flips to true. Returns
    /// immediately in manual and offline modes; those drain via
    /// [`OutboxProcessor::run_once`] (or not at all).
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> SyncResult<()> {
        if self.config.mode != SyncMode::Auto {
            info!(mode = ?self.config.mode, "sync loop not started");
            return Ok(());
        }

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.config.interval_secs, "sync loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        warn!(error = %err, "sync pass failed; will retry next tick");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("sync loop stopping");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One delivery pass. Safe to call at any time in any mode.
    pub async fn run_once(&mut self) -> SyncResult<SyncOutcome> {
        let pending = self.db.outbox().pending(self.config.batch_size).await?;
        self.last_run = Some(Utc::now());

        if pending.is_empty() {
            let outcome = SyncOutcome::default();
            self.last_outcome = Some(outcome);
            return Ok(outcome);
        }

        let mut outcome = SyncOutcome::default();
        let mut entries = Vec::with_capacity(pending.len());
        for entry in pending {
            if self.saturated(&entry) {
                warn!(
                    entry_id = %entry.id,
                    entity_type = %entry.entity_type,
                    attempts = entry.attempts,
                    "outbox entry exceeded attempt budget; parking as conflict"
                );
                self.db
                    .outbox()
                    .flag_conflict(&entry.id, "attempt budget exhausted")
                    .await?;
                outcome.parked += 1;
                continue;
            }
            entries.push(BatchEntry {
                id: entry.id,
                entity_type: entry.entity_type,
                entity_id: entry.entity_id,
                payload: serde_json::from_str(&entry.payload)
                    .map_err(SyncError::Serialization)?,
            });
        }

        if entries.is_empty() {
            self.last_outcome = Some(outcome);
            return Ok(outcome);
        }

        debug!(count = entries.len(), "delivering outbox batch");
        let ack = self.transport.deliver(OutboxBatch { entries }).await?;

        for id in &ack.synced {
            self.db.outbox().mark_synced(id).await?;
            outcome.synced += 1;
        }
        for (id, error) in &ack.failed {
            self.db.outbox().mark_failed(id, error).await?;
            outcome.failed += 1;
        }
        for (id, error) in &ack.conflicts {
            self.db.outbox().flag_conflict(id, error).await?;
            outcome.conflicts += 1;
        }

        self.db.outbox().cleanup(self.config.cleanup_after_days).await?;

        info!(
            synced = outcome.synced,
            failed = outcome.failed,
            conflicts = outcome.conflicts,
            parked = outcome.parked,
            "sync pass complete"
        );
        self.last_outcome = Some(outcome);
        Ok(outcome)
    }

    pub async fn status(&self) -> SyncResult<SyncStatus> {
        Ok(SyncStatus {
            mode: self.config.mode,
            pending: self.db.outbox().pending_count().await?,
            conflicts: self.db.outbox().conflict_count().await?,
            last_run: self.last_run,
            last_outcome: self.last_outcome,
        })
    }

    fn saturated(&self, entry: &SyncOutboxEntry) -> bool {
        entry.attempts >= self.config.max_attempts
    }
}
