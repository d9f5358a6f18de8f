//! Delivery transport.
//!
//! The processor is generic over [`SyncTransport`] so the delivery side is
//! swappable: an HTTP client against the hub in production, the in-memory
//! transport in tests and demos.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::SyncResult;

/// One outbox entry on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntry {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    /// Entity snapshot as JSON.
    pub payload: serde_json::Value,
}

/// A batch of entries, delivered oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxBatch {
    pub entries: Vec<BatchEntry>,
}

/// Per-entry delivery outcome reported by the upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchAck {
    /// Entry ids accepted and stored upstream.
    pub synced: Vec<String>,
    /// Transient failures, eligible for retry: (entry id, error).
    pub failed: Vec<(String, String)>,
    /// Version conflicts, parked until resolved: (entry id, error).
    pub conflicts: Vec<(String, String)>,
}

/// Delivers outbox batches upstream.
pub trait SyncTransport: Send + Sync {
    fn deliver(
        &self,
        batch: OutboxBatch,
    ) -> impl std::future::Future<Output = SyncResult<BatchAck>> + Send;
}

/// Transport that accepts everything into memory, with optional scripted
/// failures and conflicts. Backs the processor tests and offline demos.
#[derive(Default)]
pub struct InMemoryTransport {
    delivered: Mutex<Vec<BatchEntry>>,
    fail_entities: Mutex<HashSet<String>>,
    conflict_entities: Mutex<HashSet<String>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries for this entity id report a transient failure.
    pub fn fail_entity(&self, entity_id: &str) {
        self.fail_entities.lock().unwrap().insert(entity_id.to_string());
    }

    /// Entries for this entity id report a version conflict.
    pub fn conflict_entity(&self, entity_id: &str) {
        self.conflict_entities.lock().unwrap().insert(entity_id.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_entities.lock().unwrap().clear();
        self.conflict_entities.lock().unwrap().clear();
    }

    /// Everything accepted so far, in delivery order.
    pub fn delivered(&self) -> Vec<BatchEntry> {
        self.delivered.lock().unwrap().clone()
    }
}

impl SyncTransport for InMemoryTransport {
    async fn deliver(&self, batch: OutboxBatch) -> SyncResult<BatchAck> {
        let fail = self.fail_entities.lock().unwrap().clone();
        let conflict = self.conflict_entities.lock().unwrap().clone();

        let mut ack = BatchAck::default();
        for entry in batch.entries {
            if conflict.contains(&entry.entity_id) {
                ack.conflicts
                    .push((entry.id.clone(), "version conflict".to_string()));
            } else if fail.contains(&entry.entity_id) {
                ack.failed
                    .push((entry.id.clone(), "simulated failure".to_string()));
            } else {
                ack.synced.push(entry.id.clone());
                self.delivered.lock().unwrap().push(entry);
            }
        }
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str, entity_id: &str) -> BatchEntry {
        BatchEntry {
            id: id.to_string(),
            entity_type: "SALE".to_string(),
            entity_id: entity_id.to_string(),
            payload: json!({}),
        }
    }

    #[tokio::test]
    async fn scripted_outcomes() {
        let transport = InMemoryTransport::new();
        transport.fail_entity("e-2");
        transport.conflict_entity("e-3");

        let ack = transport
            .deliver(OutboxBatch {
                entries: vec![entry("a", "e-1"), entry("b", "e-2"), entry("c", "e-3")],
            })
            .await
            .unwrap();

        assert_eq!(ack.synced, vec!["a"]);
        assert_eq!(ack.failed[0].0, "b");
        assert_eq!(ack.conflicts[0].0, "c");
        assert_eq!(transport.delivered().len(), 1);
    }
}
