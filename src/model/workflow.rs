//! Workflow step instances.
//!
//! One step exists per (shipment, active template) pair, materialized in
//! full at shipment creation. The set is fixed afterward — only
//! completion and target-date recalculation mutate it.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::UserId;
use crate::model::shipment::ShipmentId;

/// Newtype for workflow step ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub i64);

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workflow step status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Completed,
    Overdue,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Completed => "completed",
            StepStatus::Overdue => "overdue",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for StepStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "completed" => Ok(StepStatus::Completed),
            "overdue" => Ok(StepStatus::Overdue),
            _ => Err(crate::error::Error::Other(format!(
                "unknown step status: {s}"
            ))),
        }
    }
}

/// A workflow step instance.
///
/// Template fields (number, name, department, offset) are denormalized at
/// generation time so the step survives template edits. `offset_days` is
/// kept so target dates can be recomputed when the ETA moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    pub shipment_id: ShipmentId,

    /// Ordinal copied from the template, e.g. 9.0, 10.0.
    pub step_number: Decimal,
    pub step_name: String,
    pub description: Option<String>,
    pub department: String,

    /// shipment.eta + offset_days. Recomputed on every ETA change.
    pub target_date: NaiveDate,
    pub offset_days: i32,

    /// Set exactly once on completion; never cleared by recalculation.
    pub actual_date: Option<NaiveDate>,

    pub status: StepStatus,
    pub is_critical: bool,

    /// Primary person responsible. Required.
    pub ppr_user_id: UserId,
    /// Alternate person responsible. Optional.
    pub apr_user_id: Option<UserId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowStep {
    /// Whether `user` may complete or act on this step.
    pub fn is_responsible(&self, user: UserId) -> bool {
        self.ppr_user_id == user || self.apr_user_id == Some(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn ppr_and_apr_are_responsible() {
        let s = step(10, Some(11));
        assert!(s.is_responsible(UserId(10)));
        assert!(s.is_responsible(UserId(11)));
        assert!(!s.is_responsible(UserId(12)));
    }

    #[test]
    fn missing_apr_means_only_ppr_is_responsible() {
        let s = step(10, None);
        assert!(s.is_responsible(UserId(10)));
        assert!(!s.is_responsible(UserId(11)));
    }
}
