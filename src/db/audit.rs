//! Audit trail: one record per changed field, attributed to an actor.
//!
//! `record_change` takes any Postgres executor so it can run inside the
//! same transaction as the mutation it documents — a reader never sees
//! a mutation without its audit entry, or vice versa.

use crate::error::Result;
use crate::model::UserId;
use chrono::{DateTime, Utc};

/// Write one audit record. Pass `&mut *tx` to join the caller's
/// transaction, or the pool for standalone writes.
pub async fn record_change<'e, E>(
    executor: E,
    entity_type: &str,
    entity_id: i64,
    field_name: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    actor: UserId,
    origin: Option<&str>,
) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO audit_log (entity_type, entity_id, field_name, old_value, new_value, actor_id, origin)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(entity_type)
    .bind(entity_id)
    .bind(field_name)
    .bind(old_value)
    .bind(new_value)
    .bind(actor.0)
    .bind(origin)
    .execute(executor)
    .await?;
    Ok(())
}

/// A recorded change, as read back for display.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRecord {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: i64,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub actor_id: i64,
    pub origin: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl super::Db {
    /// Audit history for one entity, oldest first.
    pub async fn audit_history(&self, entity_type: &str, entity_id: i64) -> Result<Vec<AuditRecord>> {
        let records = sqlx::query_as::<_, AuditRecord>(
            "SELECT id, entity_type, entity_id, field_name, old_value, new_value, actor_id, origin, created_at
             FROM audit_log
             WHERE entity_type = $1 AND entity_id = $2
             ORDER BY id ASC",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
