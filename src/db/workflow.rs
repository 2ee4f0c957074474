//! Workflow step operations: generation from the catalog, target-date
//! recalculation, completion.
//!
//! Generation and recalculation run on an explicit connection so they
//! join the owning shipment's transaction — steps never commit without
//! their shipment, and a recalculated target date never commits without
//! the version bump that caused it.

use chrono::NaiveDate;
use sqlx::PgConnection;
use std::collections::HashMap;

use crate::catalog::StepTemplate;
use crate::db::audit;
use crate::error::{Error, Result};
use crate::model::workflow::{StepId, StepStatus, WorkflowStep};
use crate::model::{Assignment, UserId};
use crate::model::shipment::ShipmentId;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// Materialize one step per active template, in one insert.
///
/// Target date is eta + offset_days. Template fields are denormalized
/// onto the step; offset_days is kept for later recalculation.
pub(crate) async fn generate_steps_on(
    conn: &mut PgConnection,
    shipment_id: ShipmentId,
    eta: NaiveDate,
    templates: &[StepTemplate],
    assignments: &HashMap<String, Assignment>,
    fallback: UserId,
) -> Result<u64> {
    let mut step_numbers = Vec::with_capacity(templates.len());
    let mut names = Vec::with_capacity(templates.len());
    let mut descriptions = Vec::with_capacity(templates.len());
    let mut departments = Vec::with_capacity(templates.len());
    let mut target_dates = Vec::with_capacity(templates.len());
    let mut offsets = Vec::with_capacity(templates.len());
    let mut criticals = Vec::with_capacity(templates.len());
    let mut pprs = Vec::with_capacity(templates.len());
    let mut aprs: Vec<Option<i64>> = Vec::with_capacity(templates.len());

    for template in templates {
        let assignment = assignments
            .get(&template.department)
            .copied()
            .unwrap_or(Assignment {
                ppr: fallback,
                apr: None,
            });

        step_numbers.push(template.step_number);
        names.push(template.step_name.clone());
        descriptions.push(template.description.clone());
        departments.push(template.department.clone());
        target_dates.push(eta + chrono::Duration::days(template.offset_days as i64));
        offsets.push(template.offset_days);
        criticals.push(template.is_critical);
        pprs.push(assignment.ppr.0);
        aprs.push(assignment.apr.map(|id| id.0));
    }

    let inserted = sqlx::query(
        "INSERT INTO workflow_steps
             (shipment_id, step_number, step_name, description, department,
              target_date, offset_days, status, is_critical, ppr_user_id, apr_user_id)
         SELECT $1, t.step_number, t.step_name, t.description, t.department,
                t.target_date, t.offset_days, 'pending', t.is_critical, t.ppr_user_id, t.apr_user_id
         FROM UNNEST($2::numeric[], $3::text[], $4::text[], $5::text[],
                     $6::date[], $7::int[], $8::bool[], $9::bigint[], $10::bigint[])
              AS t(step_number, step_name, description, department,
                   target_date, offset_days, is_critical, ppr_user_id, apr_user_id)",
    )
    .bind(shipment_id.0)
    .bind(&step_numbers)
    .bind(&names)
    .bind(&descriptions)
    .bind(&departments)
    .bind(&target_dates)
    .bind(&offsets)
    .bind(&criticals)
    .bind(&pprs)
    .bind(&aprs)
    .execute(conn)
    .await?
    .rows_affected();

    Ok(inserted)
}

/// Shift every step of a shipment to new_eta + offset_days.
///
/// Touches only target_date (and updated_at) — actual_date and status
/// survive any number of ETA changes.
pub(crate) async fn recalculate_target_dates_on(
    conn: &mut PgConnection,
    shipment_id: ShipmentId,
    new_eta: NaiveDate,
) -> Result<u64> {
    let updated = sqlx::query(
        "UPDATE workflow_steps
         SET target_date = $1 + offset_days, updated_at = now()
         WHERE shipment_id = $2",
    )
    .bind(new_eta)
    .bind(shipment_id.0)
    .execute(conn)
    .await?
    .rows_affected();
    Ok(updated)
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct StepRow {
    id: i64,
    shipment_id: i64,
    step_number: rust_decimal::Decimal,
    step_name: String,
    description: Option<String>,
    department: String,
    target_date: NaiveDate,
    offset_days: i32,
    actual_date: Option<NaiveDate>,
    status: String,
    is_critical: bool,
    ppr_user_id: i64,
    apr_user_id: Option<i64>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl StepRow {
    fn try_into_step(self) -> Result<WorkflowStep> {
        Ok(WorkflowStep {
            id: StepId(self.id),
            shipment_id: ShipmentId(self.shipment_id),
            step_number: self.step_number,
            step_name: self.step_name,
            description: self.description,
            department: self.department,
            target_date: self.target_date,
            offset_days: self.offset_days,
            actual_date: self.actual_date,
            status: self.status.parse()?,
            is_critical: self.is_critical,
            ppr_user_id: UserId(self.ppr_user_id),
            apr_user_id: self.apr_user_id.map(UserId),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const STEP_COLUMNS: &str = "id, shipment_id, step_number, step_name, description, department, \
     target_date, offset_days, actual_date, status, is_critical, \
     ppr_user_id, apr_user_id, created_at, updated_at";

impl super::Db {
    /// Get a workflow step by id.
    pub async fn get_step(&self, id: StepId) -> Result<WorkflowStep> {
        let row: Option<StepRow> = sqlx::query_as(&format!(
            "SELECT {STEP_COLUMNS} FROM workflow_steps WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("workflow step {id}")))?
            .try_into_step()
    }

    /// All steps of a shipment, in catalog order.
    pub async fn steps_for_shipment(&self, shipment_id: ShipmentId) -> Result<Vec<WorkflowStep>> {
        let rows: Vec<StepRow> = sqlx::query_as(&format!(
            "SELECT {STEP_COLUMNS} FROM workflow_steps
             WHERE shipment_id = $1 ORDER BY step_number ASC"
        ))
        .bind(shipment_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StepRow::try_into_step).collect()
    }

    /// Critical steps that have not been completed — the alert input.
    pub async fn critical_incomplete_steps(
        &self,
        shipment_id: ShipmentId,
    ) -> Result<Vec<WorkflowStep>> {
        let rows: Vec<StepRow> = sqlx::query_as(&format!(
            "SELECT {STEP_COLUMNS} FROM workflow_steps
             WHERE shipment_id = $1 AND is_critical AND status != 'completed'
             ORDER BY step_number ASC"
        ))
        .bind(shipment_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StepRow::try_into_step).collect()
    }

    /// Steps assigned to a user as PPR or APR.
    pub async fn steps_assigned_to(&self, user: UserId) -> Result<Vec<WorkflowStep>> {
        let rows: Vec<StepRow> = sqlx::query_as(&format!(
            "SELECT {STEP_COLUMNS} FROM workflow_steps
             WHERE ppr_user_id = $1 OR apr_user_id = $1
             ORDER BY target_date ASC, step_number ASC"
        ))
        .bind(user.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StepRow::try_into_step).collect()
    }

    /// Mark a step complete.
    ///
    /// Only the step's PPR or APR may complete it; the actual date may
    /// not lie in the future. Completing an already-completed step is a
    /// no-op — actual_date is set exactly once.
    pub async fn complete_step(
        &self,
        id: StepId,
        actual_date: NaiveDate,
        today: NaiveDate,
        actor: UserId,
        origin: Option<&str>,
    ) -> Result<WorkflowStep> {
        let step = self.get_step(id).await?;

        if !step.is_responsible(actor) {
            return Err(Error::Forbidden(format!(
                "user {actor} is not PPR or APR for step {id}"
            )));
        }
        if actual_date > today {
            return Err(Error::Validation(format!(
                "actual date {actual_date} is in the future"
            )));
        }
        if step.status == StepStatus::Completed {
            return Ok(step);
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE workflow_steps
             SET actual_date = $1, status = 'completed', updated_at = now()
             WHERE id = $2 AND status != 'completed'",
        )
        .bind(actual_date)
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        audit::record_change(
            &mut *tx,
            "workflow_step",
            id.0,
            "actual_date",
            None,
            Some(&actual_date.to_string()),
            actor,
            origin,
        )
        .await?;
        audit::record_change(
            &mut *tx,
            "workflow_step",
            id.0,
            "status",
            Some(&step.status.to_string()),
            Some("completed"),
            actor,
            origin,
        )
        .await?;

        tx.commit().await?;

        metrics::steps_completed().add(
            1,
            &[KeyValue::new("department", step.department.clone())],
        );

        self.get_step(id).await
    }
}
