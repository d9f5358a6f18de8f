//! Sync outbox repository.
//!
//! Write side runs on the business transaction: [`OutboxRepository::queue`]
//! is called by every service in the same transaction as the state change,
//! so an entry exists if and only if the change committed.
//!
//! A partial unique index keeps at most one unsynced entry per entity.
//! Re-queueing an entity that is still pending replaces the payload in
//! place (last write wins; the upstream only ever needs the newest
//! snapshot), implemented as UPDATE-then-INSERT rather than an upsert
//! against the partial index.

use chrono::{Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use strata_core::SyncOutboxEntry;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{new_id, now};

pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Queues (or refreshes) the outbox entry for an entity.
    pub async fn queue(
        &self,
        conn: &mut SqliteConnection,
        entity_type: &str,
        entity_id: &str,
        payload: &serde_json::Value,
    ) -> DbResult<()> {
        let body = payload.to_string();
        let ts = now();

        let updated = sqlx::query(
            "UPDATE sync_outbox
             SET payload = ?, attempts = 0, last_error = NULL, conflict = 0, created_at = ?
             WHERE entity_type = ? AND entity_id = ? AND synced_at IS NULL",
        )
        .bind(&body)
        .bind(ts)
        .bind(entity_type)
        .bind(entity_id)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                "INSERT INTO sync_outbox
                    (id, entity_type, entity_id, payload, attempts, last_error, conflict,
                     created_at, attempted_at, synced_at)
                 VALUES (?, ?, ?, ?, 0, NULL, 0, ?, NULL, NULL)",
            )
            .bind(new_id())
            .bind(entity_type)
            .bind(entity_id)
            .bind(&body)
            .bind(ts)
            .execute(conn)
            .await?;
        }

        debug!(entity_type, entity_id, "outbox entry queued");
        Ok(())
    }

    /// Oldest-first unsynced entries, excluding flagged conflicts.
    pub async fn pending(&self, limit: i64) -> DbResult<Vec<SyncOutboxEntry>> {
        let entries = sqlx::query_as::<_, SyncOutboxEntry>(
            "SELECT * FROM sync_outbox
             WHERE synced_at IS NULL AND conflict = 0
             ORDER BY created_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    pub async fn pending_count(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sync_outbox WHERE synced_at IS NULL AND conflict = 0",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Flagged conflicts awaiting operator resolution.
    pub async fn conflicts(&self) -> DbResult<Vec<SyncOutboxEntry>> {
        let entries = sqlx::query_as::<_, SyncOutboxEntry>(
            "SELECT * FROM sync_outbox
             WHERE synced_at IS NULL AND conflict = 1
             ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    pub async fn conflict_count(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sync_outbox WHERE synced_at IS NULL AND conflict = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Idempotent: acking an already-synced entry is a no-op, so a
    /// re-delivered ack after a crash never fails the pass.
    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE sync_outbox SET synced_at = ?, last_error = NULL
             WHERE id = ? AND synced_at IS NULL",
        )
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(id, "outbox entry already synced");
        }
        Ok(())
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE sync_outbox
             SET attempts = attempts + 1, last_error = ?, attempted_at = ?
             WHERE id = ? AND synced_at IS NULL",
        )
        .bind(error)
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flags a version conflict reported by the upstream. Conflicted
    /// entries stay out of the retry queue until resolved.
    pub async fn flag_conflict(&self, id: &str, error: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE sync_outbox
             SET conflict = 1, attempts = attempts + 1, last_error = ?, attempted_at = ?
             WHERE id = ? AND synced_at IS NULL",
        )
        .bind(error)
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Puts a resolved conflict back in the queue with a fresh attempt
    /// budget.
    pub async fn resolve_conflict(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE sync_outbox
             SET conflict = 0, attempts = 0, last_error = NULL
             WHERE id = ? AND synced_at IS NULL AND conflict = 1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Outbox entry (conflicted)", id));
        }
        Ok(())
    }

    /// Deletes synced entries older than `days`. Returns rows removed.
    pub async fn cleanup(&self, days: i64) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(days);
        let result = sqlx::query(
            "DELETE FROM sync_outbox WHERE synced_at IS NOT NULL AND synced_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_db;
    use serde_json::json;

    #[tokio::test]
    async fn queue_dedupes_pending_entries() {
        let db = test_db().await;

        let mut tx = db.begin().await.unwrap();
        db.outbox()
            .queue(&mut tx, "SALE", "s-1", &json!({"v": 1}))
            .await
            .unwrap();
        db.outbox()
            .queue(&mut tx, "SALE", "s-1", &json!({"v": 2}))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let pending = db.outbox().pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].payload.contains("\"v\":2"));
    }

    #[tokio::test]
    async fn synced_entry_allows_requeue() {
        let db = test_db().await;

        let mut tx = db.begin().await.unwrap();
        db.outbox().queue(&mut tx, "SALE", "s-1", &json!({"v": 1})).await.unwrap();
        tx.commit().await.unwrap();

        let entry = db.outbox().pending(1).await.unwrap().remove(0);
        db.outbox().mark_synced(&entry.id).await.unwrap();
        // Re-acking is a no-op.
        db.outbox().mark_synced(&entry.id).await.unwrap();
        assert_eq!(db.outbox().pending_count().await.unwrap(), 0);

        let mut tx = db.begin().await.unwrap();
        db.outbox().queue(&mut tx, "SALE", "s-1", &json!({"v": 2})).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(db.outbox().pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn conflicts_leave_the_retry_queue() {
        let db = test_db().await;

        let mut tx = db.begin().await.unwrap();
        db.outbox().queue(&mut tx, "SALE", "s-1", &json!({})).await.unwrap();
        tx.commit().await.unwrap();

        let entry = db.outbox().pending(1).await.unwrap().remove(0);
        db.outbox().flag_conflict(&entry.id, "version mismatch").await.unwrap();

        assert_eq!(db.outbox().pending_count().await.unwrap(), 0);
        assert_eq!(db.outbox().conflict_count().await.unwrap(), 1);

        db.outbox().resolve_conflict(&entry.id).await.unwrap();
        assert_eq!(db.outbox().pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failures_accumulate_attempts() {
        let db = test_db().await;

        let mut tx = db.begin().await.unwrap();
        db.outbox().queue(&mut tx, "SALE", "s-1", &json!({})).await.unwrap();
        tx.commit().await.unwrap();

        let entry = db.outbox().pending(1).await.unwrap().remove(0);
        db.outbox().mark_failed(&entry.id, "connection refused").await.unwrap();
        db.outbox().mark_failed(&entry.id, "connection refused").await.unwrap();

        let reloaded = db.outbox().pending(1).await.unwrap().remove(0);
        assert_eq!(reloaded.attempts, 2);
        assert_eq!(reloaded.last_error.as_deref(), Some("connection refused"));
        assert!(reloaded.attempted_at.is_some());
    }
}
