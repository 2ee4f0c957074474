//! Alert persistence: day-idempotent creation, acknowledgment, and the
//! delivery bookkeeping the dispatcher leans on.

use sqlx::PgConnection;

use crate::error::{Error, Result};
use crate::model::alert::{Alert, AlertId, AlertSeverity, MAX_DELIVERY_RETRIES};
use crate::model::shipment::ShipmentId;
use crate::model::workflow::StepId;
use crate::model::UserId;

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct AlertRow {
    id: i64,
    shipment_id: i64,
    workflow_step_id: i64,
    recipient_user_id: i64,
    severity: String,
    message: String,
    days_post_eta: i32,
    is_acknowledged: bool,
    acknowledged_at: Option<chrono::DateTime<chrono::Utc>>,
    sent: bool,
    sent_at: Option<chrono::DateTime<chrono::Utc>>,
    retry_count: i32,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl AlertRow {
    fn try_into_alert(self) -> Result<Alert> {
        Ok(Alert {
            id: AlertId(self.id),
            shipment_id: ShipmentId(self.shipment_id),
            workflow_step_id: StepId(self.workflow_step_id),
            recipient_user_id: UserId(self.recipient_user_id),
            severity: self.severity.parse()?,
            message: self.message,
            days_post_eta: self.days_post_eta,
            is_acknowledged: self.is_acknowledged,
            acknowledged_at: self.acknowledged_at,
            sent: self.sent,
            sent_at: self.sent_at,
            retry_count: self.retry_count,
            created_at: self.created_at,
        })
    }
}

const ALERT_COLUMNS: &str = "id, shipment_id, workflow_step_id, recipient_user_id, severity, \
     message, days_post_eta, is_acknowledged, acknowledged_at, \
     sent, sent_at, retry_count, created_at";

/// Insert an alert unless a non-acknowledged one already exists for the
/// same (step, recipient, day) — the partial unique index makes repeated
/// evaluation for the same day a no-op under concurrency too.
///
/// Returns None when the duplicate guard suppressed the insert.
pub(crate) async fn insert_alert_on(
    conn: &mut PgConnection,
    shipment_id: ShipmentId,
    step_id: StepId,
    recipient: UserId,
    severity: AlertSeverity,
    message: &str,
    days_post_eta: i32,
) -> Result<Option<Alert>> {
    let row: Option<AlertRow> = sqlx::query_as(&format!(
        "INSERT INTO alerts
             (shipment_id, workflow_step_id, recipient_user_id, severity, message, days_post_eta)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (workflow_step_id, recipient_user_id, days_post_eta)
             WHERE NOT is_acknowledged
             DO NOTHING
         RETURNING {ALERT_COLUMNS}"
    ))
    .bind(shipment_id.0)
    .bind(step_id.0)
    .bind(recipient.0)
    .bind(severity.to_string())
    .bind(message)
    .bind(days_post_eta)
    .fetch_optional(conn)
    .await?;

    row.map(AlertRow::try_into_alert).transpose()
}

impl super::Db {
    /// Get an alert by id.
    pub async fn get_alert(&self, id: AlertId) -> Result<Alert> {
        let row: Option<AlertRow> = sqlx::query_as(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("alert {id}")))?
            .try_into_alert()
    }

    /// All alerts for a shipment, newest first.
    pub async fn alerts_for_shipment(&self, shipment_id: ShipmentId) -> Result<Vec<Alert>> {
        let rows: Vec<AlertRow> = sqlx::query_as(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts
             WHERE shipment_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(shipment_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AlertRow::try_into_alert).collect()
    }

    /// Alerts addressed to a user, optionally filtered.
    pub async fn alerts_for_user(
        &self,
        user: UserId,
        severity: Option<AlertSeverity>,
        acknowledged: Option<bool>,
    ) -> Result<Vec<Alert>> {
        let rows: Vec<AlertRow> = sqlx::query_as(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts
             WHERE recipient_user_id = $1
               AND ($2::text IS NULL OR severity = $2)
               AND ($3::bool IS NULL OR is_acknowledged = $3)
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user.0)
        .bind(severity.map(|s| s.to_string()))
        .bind(acknowledged)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AlertRow::try_into_alert).collect()
    }

    /// Acknowledge an alert. Only the recipient may acknowledge;
    /// re-acknowledging is a no-op.
    pub async fn acknowledge_alert(&self, id: AlertId, actor: UserId) -> Result<Alert> {
        let alert = self.get_alert(id).await?;

        if alert.recipient_user_id != actor {
            return Err(Error::Forbidden(format!(
                "user {actor} is not the recipient of alert {id}"
            )));
        }
        if alert.is_acknowledged {
            return Ok(alert);
        }

        sqlx::query(
            "UPDATE alerts SET is_acknowledged = TRUE, acknowledged_at = now()
             WHERE id = $1 AND NOT is_acknowledged",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        self.get_alert(id).await
    }

    /// All alerts still awaiting delivery — the `process_pending`
    /// sweep input. Includes retry-exhausted alerts: the sweep is the
    /// one path that may take another crack at those.
    pub async fn pending_notifications(&self) -> Result<Vec<Alert>> {
        let rows: Vec<AlertRow> = sqlx::query_as(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts
             WHERE NOT sent
             ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AlertRow::try_into_alert).collect()
    }

    /// Record successful delivery. Idempotent: an already-sent alert is
    /// left untouched.
    pub async fn mark_alert_sent(&self, id: AlertId) -> Result<()> {
        sqlx::query("UPDATE alerts SET sent = TRUE, sent_at = now() WHERE id = $1 AND NOT sent")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed delivery attempt. The count is capped at the
    /// retry maximum. Returns the new retry count.
    pub async fn increment_alert_retry(&self, id: AlertId) -> Result<i32> {
        let row: Option<(i32,)> = sqlx::query_as(
            "UPDATE alerts SET retry_count = LEAST(retry_count + 1, $2)
             WHERE id = $1
             RETURNING retry_count",
        )
        .bind(id.0)
        .bind(MAX_DELIVERY_RETRIES)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(count,)| count)
            .ok_or_else(|| Error::NotFound(format!("alert {id}")))
    }
}
