//! Workflow template catalog: seed and read.
//!
//! The built-in 34-step catalog is seeded once; after that the table is
//! the source of truth. Templates are read-only at runtime.

use crate::catalog::{self, StepTemplate};
use crate::error::Result;

#[derive(sqlx::FromRow)]
struct TemplateRow {
    step_number: rust_decimal::Decimal,
    step_name: String,
    description: Option<String>,
    department: String,
    offset_days: i32,
    is_critical: bool,
    display_order: i32,
    is_active: bool,
}

impl From<TemplateRow> for StepTemplate {
    fn from(row: TemplateRow) -> Self {
        StepTemplate {
            step_number: row.step_number,
            step_name: row.step_name,
            description: row.description.unwrap_or_default(),
            department: row.department,
            offset_days: row.offset_days,
            is_critical: row.is_critical,
            display_order: row.display_order,
            is_active: row.is_active,
        }
    }
}

impl super::Db {
    /// Seed the built-in catalog (idempotent — existing step numbers are
    /// left untouched so administrative edits survive restarts).
    pub async fn seed_step_templates(&self) -> Result<u64> {
        let mut inserted = 0;
        for template in catalog::builtin_templates() {
            let rows = sqlx::query(
                "INSERT INTO workflow_step_templates
                     (step_number, step_name, description, department, offset_days, is_critical, display_order, is_active)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (step_number) DO NOTHING",
            )
            .bind(template.step_number)
            .bind(&template.step_name)
            .bind(&template.description)
            .bind(&template.department)
            .bind(template.offset_days)
            .bind(template.is_critical)
            .bind(template.display_order)
            .bind(template.is_active)
            .execute(&self.pool)
            .await?
            .rows_affected();
            inserted += rows;
        }
        Ok(inserted)
    }

    /// All active templates in display order — the generation input.
    pub async fn active_step_templates(&self) -> Result<Vec<StepTemplate>> {
        let rows: Vec<TemplateRow> = sqlx::query_as(
            "SELECT step_number, step_name, description, department, offset_days, is_critical, display_order, is_active
             FROM workflow_step_templates
             WHERE is_active
             ORDER BY display_order ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StepTemplate::from).collect())
    }
}
