//! Shipment operations: optimistic-locked mutation, ETA updates with
//! step recalculation, soft delete.
//!
//! Every write is a conditional `UPDATE … WHERE id = $n AND version = $m`
//! checked via rows_affected — a stale writer gets a typed
//! ConcurrentModification instead of silently overwriting. There is no
//! automatic retry: the caller re-reads and re-validates against fresh
//! state.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::db::{audit, workflow};
use crate::error::{Error, Result};
use crate::model::shipment::{
    NewShipment, Shipment, ShipmentId, ShipmentPatch, ShipmentStatus, MAX_ETA_EDITS,
};
use crate::model::UserId;
use crate::telemetry::metrics;

/// Filters for shipment listing.
#[derive(Debug, Clone, Default)]
pub struct ShipmentFilters {
    pub status: Option<ShipmentStatus>,
    pub principal: Option<String>,
    pub eta_start: Option<NaiveDate>,
    pub eta_end: Option<NaiveDate>,
}

/// One page of shipments plus the unpaged total.
#[derive(Debug)]
pub struct ShipmentPage {
    pub items: Vec<Shipment>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct ShipmentRow {
    id: i64,
    shipment_number: String,
    principal: String,
    brand: String,
    lc_number: String,
    invoice_amount_omr: rust_decimal::Decimal,
    eta: NaiveDate,
    eta_edit_count: i32,
    status: String,
    version: i64,
    created_by: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ShipmentRow {
    fn try_into_shipment(self) -> Result<Shipment> {
        Ok(Shipment {
            id: ShipmentId(self.id),
            shipment_number: self.shipment_number,
            principal: self.principal,
            brand: self.brand,
            lc_number: self.lc_number,
            invoice_amount_omr: self.invoice_amount_omr,
            eta: self.eta,
            eta_edit_count: self.eta_edit_count,
            status: self.status.parse()?,
            version: self.version,
            created_by: UserId(self.created_by),
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

const SHIPMENT_COLUMNS: &str = "id, shipment_number, principal, brand, lc_number, \
     invoice_amount_omr, eta, eta_edit_count, status, version, \
     created_by, created_at, updated_at, deleted_at";

impl super::Db {
    /// Create a shipment and materialize its full workflow in one
    /// transaction. A partial step insert rolls back the shipment too.
    pub async fn create_shipment(
        &self,
        new: NewShipment,
        actor: UserId,
        origin: Option<&str>,
        default_assignee: UserId,
    ) -> Result<Shipment> {
        new.validate()?;

        // Catalog and assignment reads don't need the write transaction.
        let templates = self.active_step_templates().await?;
        let mut assignments = HashMap::new();
        for template in &templates {
            if !assignments.contains_key(&template.department) {
                let assignment = self
                    .resolve_assignment(&template.department, default_assignee)
                    .await?;
                assignments.insert(template.department.clone(), assignment);
            }
        }

        let mut tx = self.pool.begin().await?;

        let row: ShipmentRow = sqlx::query_as(&format!(
            "INSERT INTO shipments
                 (shipment_number, principal, brand, lc_number, invoice_amount_omr,
                  eta, eta_edit_count, status, version, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, 0, 'active', 1, $7)
             RETURNING {SHIPMENT_COLUMNS}"
        ))
        .bind(&new.shipment_number)
        .bind(&new.principal)
        .bind(&new.brand)
        .bind(&new.lc_number)
        .bind(new.invoice_amount_omr)
        .bind(new.eta)
        .bind(actor.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(dbe) if dbe.is_unique_violation() => {
                Error::DuplicateKey(format!("shipment number '{}'", new.shipment_number))
            }
            _ => Error::Database(e),
        })?;

        let shipment = row.try_into_shipment()?;

        let generated = workflow::generate_steps_on(
            &mut tx,
            shipment.id,
            shipment.eta,
            &templates,
            &assignments,
            default_assignee,
        )
        .await?;
        if generated != templates.len() as u64 {
            return Err(Error::Other(format!(
                "step generation produced {generated} of {} steps",
                templates.len()
            )));
        }

        audit::record_change(
            &mut *tx,
            "shipment",
            shipment.id.0,
            "created",
            None,
            Some(&shipment.shipment_number),
            actor,
            origin,
        )
        .await?;

        tx.commit().await?;

        metrics::shipments_created().add(1, &[]);
        tracing::info!(
            shipment = %shipment.shipment_number,
            steps = generated,
            "shipment created"
        );

        Ok(shipment)
    }

    /// Get a shipment by id. Soft-deleted rows are invisible.
    pub async fn get_shipment(&self, id: ShipmentId) -> Result<Shipment> {
        let row: Option<ShipmentRow> = sqlx::query_as(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments
             WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("shipment {id}")))?
            .try_into_shipment()
    }

    /// Update shipment fields with an optimistic version check.
    ///
    /// One audit record is written per field that actually changed, in
    /// the same transaction as the version bump.
    pub async fn update_shipment(
        &self,
        id: ShipmentId,
        expected_version: i64,
        patch: ShipmentPatch,
        actor: UserId,
        origin: Option<&str>,
    ) -> Result<Shipment> {
        patch.validate()?;

        let current = self.get_shipment(id).await?;

        // Collect (field, old, new) for fields that actually change.
        let mut changes: Vec<(&str, String, String)> = Vec::new();
        if let Some(ref v) = patch.principal {
            if *v != current.principal {
                changes.push(("principal", current.principal.clone(), v.clone()));
            }
        }
        if let Some(ref v) = patch.brand {
            if *v != current.brand {
                changes.push(("brand", current.brand.clone(), v.clone()));
            }
        }
        if let Some(ref v) = patch.lc_number {
            if *v != current.lc_number {
                changes.push(("lc_number", current.lc_number.clone(), v.clone()));
            }
        }
        if let Some(v) = patch.invoice_amount_omr {
            if v != current.invoice_amount_omr {
                changes.push((
                    "invoice_amount_omr",
                    current.invoice_amount_omr.to_string(),
                    v.to_string(),
                ));
            }
        }
        if let Some(v) = patch.status {
            if v != current.status {
                changes.push(("status", current.status.to_string(), v.to_string()));
            }
        }

        if changes.is_empty() {
            return Ok(current);
        }

        let mut tx = self.pool.begin().await?;

        let rows_affected = sqlx::query(
            "UPDATE shipments
             SET principal = COALESCE($1, principal),
                 brand = COALESCE($2, brand),
                 lc_number = COALESCE($3, lc_number),
                 invoice_amount_omr = COALESCE($4, invoice_amount_omr),
                 status = COALESCE($5, status),
                 version = version + 1,
                 updated_at = now()
             WHERE id = $6 AND version = $7 AND deleted_at IS NULL",
        )
        .bind(&patch.principal)
        .bind(&patch.brand)
        .bind(&patch.lc_number)
        .bind(patch.invoice_amount_omr)
        .bind(patch.status.map(|s| s.to_string()))
        .bind(id.0)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(Error::ConcurrentModification {
                entity: "shipment",
                id: id.0,
            });
        }

        for (field, old, new) in &changes {
            audit::record_change(
                &mut *tx,
                "shipment",
                id.0,
                field,
                Some(old),
                Some(new),
                actor,
                origin,
            )
            .await?;
        }

        tx.commit().await?;

        self.get_shipment(id).await
    }

    /// Move the ETA anchor.
    ///
    /// Rejected before any mutation when the edit budget (3) is spent.
    /// The version bump, edit-count increment, target-date
    /// recalculation of every step, and audit entries commit as one
    /// transaction — readers never see a bumped version with stale
    /// step dates.
    pub async fn update_eta(
        &self,
        id: ShipmentId,
        new_eta: NaiveDate,
        expected_version: i64,
        actor: UserId,
        origin: Option<&str>,
    ) -> Result<Shipment> {
        let current = self.get_shipment(id).await?;

        if current.eta_edit_count >= MAX_ETA_EDITS {
            return Err(Error::EditLimitExceeded {
                count: current.eta_edit_count,
                max: MAX_ETA_EDITS,
            });
        }

        let mut tx = self.pool.begin().await?;

        let rows_affected = sqlx::query(
            "UPDATE shipments
             SET eta = $1,
                 eta_edit_count = eta_edit_count + 1,
                 version = version + 1,
                 updated_at = now()
             WHERE id = $2 AND version = $3 AND eta_edit_count < $4 AND deleted_at IS NULL",
        )
        .bind(new_eta)
        .bind(id.0)
        .bind(expected_version)
        .bind(MAX_ETA_EDITS)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            // The guard has two clauses; re-read to report the right one.
            drop(tx);
            let fresh = self.get_shipment(id).await?;
            if fresh.eta_edit_count >= MAX_ETA_EDITS {
                return Err(Error::EditLimitExceeded {
                    count: fresh.eta_edit_count,
                    max: MAX_ETA_EDITS,
                });
            }
            return Err(Error::ConcurrentModification {
                entity: "shipment",
                id: id.0,
            });
        }

        workflow::recalculate_target_dates_on(&mut tx, id, new_eta).await?;

        audit::record_change(
            &mut *tx,
            "shipment",
            id.0,
            "eta",
            Some(&current.eta.to_string()),
            Some(&new_eta.to_string()),
            actor,
            origin,
        )
        .await?;
        audit::record_change(
            &mut *tx,
            "shipment",
            id.0,
            "eta_edit_count",
            Some(&current.eta_edit_count.to_string()),
            Some(&(current.eta_edit_count + 1).to_string()),
            actor,
            origin,
        )
        .await?;

        tx.commit().await?;

        metrics::eta_updates().add(1, &[]);
        tracing::info!(
            shipment = %current.shipment_number,
            old_eta = %current.eta,
            new_eta = %new_eta,
            edit = current.eta_edit_count + 1,
            "ETA updated, step dates recalculated"
        );

        self.get_shipment(id).await
    }

    /// Soft-delete: set the deletion timestamp and cancel the shipment.
    /// Returns false when the shipment is absent or already deleted.
    pub async fn soft_delete_shipment(
        &self,
        id: ShipmentId,
        actor: UserId,
        origin: Option<&str>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(chrono::DateTime<chrono::Utc>,)> = sqlx::query_as(
            "UPDATE shipments
             SET deleted_at = now(), status = 'cancelled',
                 version = version + 1, updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING deleted_at",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?;

        let deleted_at = match row {
            Some((ts,)) => ts,
            None => return Ok(false),
        };

        audit::record_change(
            &mut *tx,
            "shipment",
            id.0,
            "deleted_at",
            None,
            Some(&deleted_at.to_rfc3339()),
            actor,
            origin,
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// List shipments with filters and pagination, newest ETA first.
    pub async fn list_shipments(
        &self,
        filters: &ShipmentFilters,
        page: i64,
        size: i64,
    ) -> Result<ShipmentPage> {
        let status = filters.status.map(|s| s.to_string());
        let principal = filters.principal.as_ref().map(|p| format!("%{p}%"));

        let (total,): (i64,) = sqlx::query_as(
            "SELECT count(*) FROM shipments
             WHERE deleted_at IS NULL
               AND ($1::text IS NULL OR status = $1)
               AND ($2::text IS NULL OR principal ILIKE $2)
               AND ($3::date IS NULL OR eta >= $3)
               AND ($4::date IS NULL OR eta <= $4)",
        )
        .bind(&status)
        .bind(&principal)
        .bind(filters.eta_start)
        .bind(filters.eta_end)
        .fetch_one(&self.pool)
        .await?;

        let rows: Vec<ShipmentRow> = sqlx::query_as(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments
             WHERE deleted_at IS NULL
               AND ($1::text IS NULL OR status = $1)
               AND ($2::text IS NULL OR principal ILIKE $2)
               AND ($3::date IS NULL OR eta >= $3)
               AND ($4::date IS NULL OR eta <= $4)
             ORDER BY eta DESC, created_at DESC
             OFFSET $5 LIMIT $6"
        ))
        .bind(&status)
        .bind(&principal)
        .bind(filters.eta_start)
        .bind(filters.eta_end)
        .bind((page - 1).max(0) * size)
        .bind(size)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(ShipmentRow::try_into_shipment)
            .collect::<Result<Vec<_>>>()?;

        Ok(ShipmentPage {
            items,
            total,
            page,
            size,
        })
    }

    /// Active, non-deleted shipments whose ETA falls in [start, end] —
    /// the batch sweep's candidate set.
    pub async fn active_shipments_in_eta_window(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Shipment>> {
        let rows: Vec<ShipmentRow> = sqlx::query_as(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments
             WHERE status = 'active' AND deleted_at IS NULL
               AND eta >= $1 AND eta <= $2
             ORDER BY eta ASC, id ASC"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ShipmentRow::try_into_shipment).collect()
    }
}
