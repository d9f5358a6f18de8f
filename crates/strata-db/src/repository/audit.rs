//! Audit repository.
//!
//! Append-only trail. Severity is classified from the action; Warning and
//! Critical entries are also emitted on the log so suspicious activity is
//! visible without querying the table.

use sqlx::{SqliteConnection, SqlitePool};
use strata_core::{AuditAction, AuditRecord, AuditSeverity};
use tracing::{error, info, warn};

use crate::error::DbResult;
use crate::repository::{new_id, now};

pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Appends one audit row on the caller's transaction.
    pub async fn append(
        &self,
        conn: &mut SqliteConnection,
        actor: &str,
        action: AuditAction,
        entity_type: &str,
        entity_id: &str,
        detail: serde_json::Value,
    ) -> DbResult<AuditRecord> {
        let record = AuditRecord {
            id: new_id(),
            actor: actor.to_string(),
            action: action.as_str().to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            severity: action.severity(),
            detail: detail.to_string(),
            created_at: now(),
        };

        sqlx::query(
            "INSERT INTO audit_log
                (id, actor, action, entity_type, entity_id, severity, detail, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.actor)
        .bind(&record.action)
        .bind(&record.entity_type)
        .bind(&record.entity_id)
        .bind(record.severity)
        .bind(&record.detail)
        .bind(record.created_at)
        .execute(conn)
        .await?;

        match record.severity {
            AuditSeverity::Critical => {
                error!(actor, action = record.action.as_str(), entity_id, "audit: critical action")
            }
            AuditSeverity::Warning => {
                warn!(actor, action = record.action.as_str(), entity_id, "audit: flagged action")
            }
            AuditSeverity::Info => {
                info!(actor, action = record.action.as_str(), entity_id, "audit")
            }
        }

        Ok(record)
    }

    pub async fn recent(&self, limit: i64) -> DbResult<Vec<AuditRecord>> {
        let records = sqlx::query_as::<_, AuditRecord>(
            "SELECT * FROM audit_log ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn for_entity(&self, entity_type: &str, entity_id: &str) -> DbResult<Vec<AuditRecord>> {
        let records = sqlx::query_as::<_, AuditRecord>(
            "SELECT * FROM audit_log WHERE entity_type = ? AND entity_id = ?
             ORDER BY created_at DESC",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn by_severity(
        &self,
        severity: AuditSeverity,
        limit: i64,
    ) -> DbResult<Vec<AuditRecord>> {
        let records = sqlx::query_as::<_, AuditRecord>(
            "SELECT * FROM audit_log WHERE severity = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(severity)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_db;
    use serde_json::json;

    #[tokio::test]
    async fn append_classifies_severity() {
        let db = test_db().await;

        let mut tx = db.begin().await.unwrap();
        db.audit()
            .append(&mut tx, "user-1", AuditAction::SalePosted, "sale", "s-1", json!({}))
            .await
            .unwrap();
        db.audit()
            .append(
                &mut tx,
                "user-1",
                AuditAction::StockAdjusted,
                "stock_item",
                "si-1",
                json!({"qty_delta": -3}),
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let warnings = db.audit().by_severity(AuditSeverity::Warning, 10).await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].action, "stock_adjusted");

        let trail = db.audit().for_entity("sale", "s-1").await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].severity, AuditSeverity::Info);
    }
}
