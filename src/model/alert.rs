//! Alerts raised against overdue critical steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;
use crate::model::shipment::ShipmentId;
use crate::model::workflow::StepId;

/// Maximum automatic delivery attempts per alert.
pub const MAX_DELIVERY_RETRIES: i32 = 3;

/// Newtype for alert ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub i64);

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Severity derived from days-post-ETA at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
    Urgent,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
            AlertSeverity::Urgent => "urgent",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "warning" => Ok(AlertSeverity::Warning),
            "critical" => Ok(AlertSeverity::Critical),
            "urgent" => Ok(AlertSeverity::Urgent),
            _ => Err(crate::error::Error::Other(format!(
                "unknown severity: {s}"
            ))),
        }
    }
}

/// An alert addressed to one recipient for one overdue critical step.
///
/// The (workflow_step, recipient, days_post_eta) tuple is unique among
/// non-acknowledged alerts — re-evaluating the same day is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub shipment_id: ShipmentId,
    pub workflow_step_id: StepId,
    pub recipient_user_id: UserId,

    pub severity: AlertSeverity,
    pub message: String,
    /// Day-count at evaluation time.
    pub days_post_eta: i32,

    pub is_acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,

    /// Delivery bookkeeping, owned by the notification dispatcher.
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub retry_count: i32,

    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Whether the dispatcher may still attempt delivery automatically.
    pub fn has_retry_budget(&self) -> bool {
        !self.sent && self.retry_count < MAX_DELIVERY_RETRIES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_follows_escalation() {
        assert!(AlertSeverity::Warning < AlertSeverity::Critical);
        assert!(AlertSeverity::Critical < AlertSeverity::Urgent);
    }
}
