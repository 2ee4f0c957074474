//! Durable notification outbox on pgmq.
//!
//! Alert delivery requests are rows in a pgmq queue, not in-process
//! tasks — an enqueue that survives commit survives a crash, and the
//! `process_pending` sweep can re-enqueue anything that was dropped.
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.read,
//! pgmq.archive, pgmq.delete.

use crate::error::{Error, Result};
use crate::model::alert::AlertId;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use sqlx::PgConnection;

/// Queue name for notification delivery requests.
pub const NOTIFY_QUEUE: &str = "notify";

/// Channel used to wake the dispatcher worker.
pub const NOTIFY_CHANNEL: &str = "notify_ready";

/// A delivery request read from the outbox.
#[derive(Debug, Clone)]
pub struct OutboxMessage {
    pub msg_id: i64,
    pub read_ct: i32,
    pub alert_id: AlertId,
}

/// Enqueue a delivery request on an explicit connection — used inside
/// the alert-creation transaction so the request becomes visible only
/// if the alert commits. `pg_notify` is transactional too: the wake-up
/// fires on commit.
pub(crate) async fn enqueue_on(
    conn: &mut PgConnection,
    alert_id: AlertId,
    delay_seconds: i32,
) -> Result<i64> {
    let payload = serde_json::json!({ "alert_id": alert_id.0 });
    let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, $3)")
        .bind(NOTIFY_QUEUE)
        .bind(&payload)
        .bind(delay_seconds)
        .fetch_one(&mut *conn)
        .await?;

    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(NOTIFY_CHANNEL)
        .bind(alert_id.0.to_string())
        .execute(&mut *conn)
        .await?;

    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", NOTIFY_QUEUE),
            KeyValue::new("operation", "send"),
        ],
    );
    Ok(row.0)
}

impl super::Db {
    /// Create the notify queue (idempotent).
    pub async fn create_notify_queue(&self) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(NOTIFY_QUEUE)
            .execute(&self.pool)
            .await?;
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", NOTIFY_QUEUE),
                KeyValue::new("operation", "create"),
            ],
        );
        Ok(())
    }

    /// Enqueue a delivery request. delay_seconds: 0 for immediate,
    /// >0 for a scheduled retry.
    pub async fn enqueue_notification(&self, alert_id: AlertId, delay_seconds: i32) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        enqueue_on(&mut conn, alert_id, delay_seconds).await
    }

    /// Read the next delivery request (visibility timeout in seconds).
    /// Returns None if the queue is empty.
    pub async fn read_notification(&self, vt_seconds: i32) -> Result<Option<OutboxMessage>> {
        let row = sqlx::query_as::<_, (i64, i32, serde_json::Value)>(
            "SELECT msg_id, read_ct, message FROM pgmq.read($1, $2, 1)",
        )
        .bind(NOTIFY_QUEUE)
        .bind(vt_seconds)
        .fetch_optional(&self.pool)
        .await?;

        let msg = match row {
            Some((msg_id, read_ct, message)) => {
                let alert_id = message
                    .get("alert_id")
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| {
                        Error::Other("bad outbox payload: missing alert_id".to_string())
                    })?;
                Some(OutboxMessage {
                    msg_id,
                    read_ct,
                    alert_id: AlertId(alert_id),
                })
            }
            None => None,
        };

        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", NOTIFY_QUEUE),
                KeyValue::new(
                    "operation",
                    if msg.is_some() { "read" } else { "read_empty" },
                ),
            ],
        );

        Ok(msg)
    }

    /// Archive a delivery request (moves to archive table, preserves for audit).
    pub async fn archive_notification(&self, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(NOTIFY_QUEUE)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", NOTIFY_QUEUE),
                KeyValue::new("operation", "archive"),
            ],
        );
        Ok(())
    }

    /// Delete a delivery request permanently.
    pub async fn delete_notification(&self, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.delete($1, $2)")
            .bind(NOTIFY_QUEUE)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", NOTIFY_QUEUE),
                KeyValue::new("operation", "delete"),
            ],
        );
        Ok(())
    }
}
