//! Alert escalation: evaluates a shipment's overdue critical steps and
//! raises deduplicated, per-recipient alerts.
//!
//! Nothing is persisted about escalation state — severity and recipient
//! set are derived from `days_post_eta` on every evaluation, and the
//! per-day dedup guard makes evaluation idempotent. Evaluation takes
//! `today` as an argument so the clock stays in the caller's hands.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{alerts, Db};
use crate::error::Result;
use crate::model::alert::{Alert, AlertSeverity};
use crate::model::shipment::Shipment;
use crate::model::workflow::WorkflowStep;
use crate::model::UserId;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// First day (post-ETA) that produces alerts at all.
pub const WARNING_THRESHOLD: i64 = 4;
/// Day the severity escalates to Critical.
pub const CRITICAL_THRESHOLD: i64 = 5;
/// Day the APR joins the recipient set.
pub const APR_THRESHOLD: i64 = 6;
/// Day the severity escalates to Urgent — the demurrage deadline.
pub const URGENT_THRESHOLD: i64 = 7;

/// Severity for a day-count, None below the alert window.
///
/// Boundaries are inclusive of the lower bound: day 4 is the first
/// Warning, day 5 the first Critical, day 7 the first Urgent.
pub fn severity_for(days_post_eta: i64) -> Option<AlertSeverity> {
    if days_post_eta >= URGENT_THRESHOLD {
        Some(AlertSeverity::Urgent)
    } else if days_post_eta >= CRITICAL_THRESHOLD {
        Some(AlertSeverity::Critical)
    } else if days_post_eta >= WARNING_THRESHOLD {
        Some(AlertSeverity::Warning)
    } else {
        None
    }
}

/// Strategy hook for who gets told about an overdue step.
///
/// The day-6 departmental-manager and day-7 senior-management /
/// internal-audit tiers are product rules that have not been settled;
/// supplying them means implementing this trait, not touching the
/// engine.
#[async_trait]
pub trait RecipientResolver: Send + Sync {
    async fn recipients(
        &self,
        step: &WorkflowStep,
        severity: AlertSeverity,
        days_post_eta: i64,
    ) -> Vec<UserId>;
}

/// Default ladder: the PPR always, the APR from day 6 when assigned.
pub struct EscalationLadder;

#[async_trait]
impl RecipientResolver for EscalationLadder {
    async fn recipients(
        &self,
        step: &WorkflowStep,
        _severity: AlertSeverity,
        days_post_eta: i64,
    ) -> Vec<UserId> {
        let mut recipients = vec![step.ppr_user_id];
        if days_post_eta >= APR_THRESHOLD {
            if let Some(apr) = step.apr_user_id {
                if apr != step.ppr_user_id {
                    recipients.push(apr);
                }
            }
        }
        recipients
    }
}

/// The escalation engine. Evaluates one shipment at a time; the batch
/// scheduler drives it across the fleet.
pub struct EscalationEngine {
    db: Arc<Db>,
    resolver: Arc<dyn RecipientResolver>,
}

impl EscalationEngine {
    pub fn new(db: Arc<Db>, resolver: Arc<dyn RecipientResolver>) -> Self {
        Self { db, resolver }
    }

    /// Engine with the default PPR/APR ladder.
    pub fn with_default_ladder(db: Arc<Db>) -> Self {
        Self::new(db, Arc::new(EscalationLadder))
    }

    /// Evaluate one shipment for the given day.
    ///
    /// Created alerts are committed atomically per shipment, then each
    /// is handed to the notification outbox. An enqueue failure is
    /// logged and absorbed — the alert stays queryable as undelivered
    /// and the `process_pending` sweep picks it up.
    pub async fn evaluate_shipment(
        &self,
        shipment: &Shipment,
        today: NaiveDate,
    ) -> Result<Vec<Alert>> {
        let days_post_eta = shipment.days_post_eta(today);

        let Some(severity) = severity_for(days_post_eta) else {
            return Ok(Vec::new());
        };

        let steps = self.db.critical_incomplete_steps(shipment.id).await?;
        if steps.is_empty() {
            return Ok(Vec::new());
        }

        let mut created = Vec::new();
        let mut tx = self.db.pool().begin().await?;

        for step in &steps {
            let recipients = self
                .resolver
                .recipients(step, severity, days_post_eta)
                .await;

            for recipient in recipients {
                let message = format!(
                    "{} step '{}' is incomplete on Day {} post-ETA for shipment {}",
                    severity_label(severity),
                    step.step_name,
                    days_post_eta,
                    shipment.shipment_number,
                );

                let alert = alerts::insert_alert_on(
                    &mut tx,
                    shipment.id,
                    step.id,
                    recipient,
                    severity,
                    &message,
                    days_post_eta as i32,
                )
                .await?;

                if let Some(alert) = alert {
                    created.push(alert);
                }
            }
        }

        tx.commit().await?;

        // Best-effort enqueue, post-commit: a dropped delivery request
        // must not take the alerts down with it.
        for alert in &created {
            if let Err(e) = self.db.enqueue_notification(alert.id, 0).await {
                warn!(alert = %alert.id, "notification enqueue failed: {e}");
            }
        }

        if !created.is_empty() {
            metrics::alerts_created().add(
                created.len() as u64,
                &[KeyValue::new("severity", severity.to_string())],
            );
            info!(
                shipment = %shipment.shipment_number,
                days_post_eta,
                severity = %severity,
                count = created.len(),
                "alerts created"
            );
        }

        Ok(created)
    }
}

fn severity_label(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Warning => "Warning",
        AlertSeverity::Critical => "Critical",
        AlertSeverity::Urgent => "Urgent",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::shipment::ShipmentId;
    use crate::model::workflow::{StepId, StepStatus};
    use chrono::Utc;
    use rust_decimal::Decimal;

    #[test]
    fn no_alerts_below_day_four() {
        assert_eq!(severity_for(-3), None);
        assert_eq!(severity_for(0), None);
        assert_eq!(severity_for(3), None);
    }

    #[test]
    fn severity_boundaries_are_inclusive() {
        assert_eq!(severity_for(4), Some(AlertSeverity::Warning));
        assert_eq!(severity_for(5), Some(AlertSeverity::Critical));
        assert_eq!(severity_for(6), Some(AlertSeverity::Critical));
        assert_eq!(severity_for(7), Some(AlertSeverity::Urgent));
        assert_eq!(severity_for(10), Some(AlertSeverity::Urgent));
    }

    fn step(ppr: i64, apr: Option<i64>) -> WorkflowStep {
        WorkflowStep {
            id: StepId(1),
            shipment_id: ShipmentId(1),
            step_number: Decimal::new(90, 1),
            step_name: "Bayan submission".to_string(),
            description: None,
            department: "C&C".to_string(),
            target_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            offset_days: 0,
            actual_date: None,
            status: StepStatus::Pending,
            is_critical: true,
            ppr_user_id: UserId(ppr),
            apr_user_id: apr.map(UserId),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn ladder_sends_to_ppr_only_before_day_six() {
        let step = step(10, Some(11));
        let recipients = EscalationLadder
            .recipients(&step, AlertSeverity::Critical, 5)
            .await;
        assert_eq!(recipients, vec![UserId(10)]);
    }

    #[tokio::test]
    async fn ladder_adds_apr_from_day_six() {
        let step = step(10, Some(11));
        let recipients = EscalationLadder
            .recipients(&step, AlertSeverity::Critical, 6)
            .await;
        assert_eq!(recipients, vec![UserId(10), UserId(11)]);
    }

    #[tokio::test]
    async fn ladder_skips_missing_or_duplicate_apr() {
        let no_apr = step(10, None);
        let recipients = EscalationLadder
            .recipients(&no_apr, AlertSeverity::Urgent, 8)
            .await;
        assert_eq!(recipients, vec![UserId(10)]);

        let same = step(10, Some(10));
        let recipients = EscalationLadder
            .recipients(&same, AlertSeverity::Urgent, 8)
            .await;
        assert_eq!(recipients, vec![UserId(10)]);
    }
}
