// Audit trail for order mutations
//
// Writes are best effort: a failing sink is logged and never blocks the
// operation that produced the entry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::orders::OrderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

/// One append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor_id: Uuid,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub before: Option<JsonValue>,
    pub after: Option<JsonValue>,
}

impl AuditEntry {
    pub fn order(
        actor_id: Uuid,
        action: AuditAction,
        order_id: Uuid,
        before: Option<JsonValue>,
        after: Option<JsonValue>,
    ) -> Self {
        Self {
            actor_id,
            action,
            resource_type: "order".to_string(),
            resource_id: order_id,
            before,
            after,
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), OrderError>;
}

/// Record an entry, logging instead of propagating failures
pub async fn record_best_effort(sink: &dyn AuditSink, entry: AuditEntry) {
    let action = entry.action;
    let resource_id = entry.resource_id;

    if let Err(e) = sink.record(entry).await {
        tracing::warn!(
            "Failed to write audit entry ({} {}): {}",
            action.as_str(),
            resource_id,
            e
        );
    }
}

/// Audit sink backed by the `audit_log` table
#[derive(Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), OrderError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (actor_id, action, resource_type, resource_id, before_state, after_state)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.actor_id)
        .bind(entry.action.as_str())
        .bind(&entry.resource_type)
        .bind(entry.resource_id)
        .bind(entry.before)
        .bind(entry.after)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Keeps entries in memory; used by the memory backend and tests
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), OrderError> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _entry: AuditEntry) -> Result<(), OrderError> {
            Err(OrderError::DatabaseError("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let entry = AuditEntry::order(Uuid::new_v4(), AuditAction::Delete, Uuid::new_v4(), None, None);
        record_best_effort(&FailingSink, entry).await;
    }

    #[tokio::test]
    async fn test_in_memory_log_keeps_entries() {
        let log = InMemoryAuditLog::new();
        let order_id = Uuid::new_v4();
        let entry = AuditEntry::order(
            Uuid::new_v4(),
            AuditAction::Create,
            order_id,
            None,
            Some(serde_json::json!({"status": "pending"})),
        );

        record_best_effort(&log, entry).await;

        let entries = log.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].resource_id, order_id);
        assert_eq!(entries[0].resource_type, "order");
    }
}
