//! Shipment aggregate: business key, ETA anchor, optimistic lock version.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::UserId;

/// Maximum number of ETA edits per shipment. The fourth attempt is
/// rejected before any mutation.
pub const MAX_ETA_EDITS: i32 = 3;

/// Newtype for shipment ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShipmentId(pub i64);

impl std::fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shipment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Active,
    Completed,
    Cancelled,
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ShipmentStatus::Active => "active",
            ShipmentStatus::Completed => "completed",
            ShipmentStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ShipmentStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "active" => Ok(ShipmentStatus::Active),
            "completed" => Ok(ShipmentStatus::Completed),
            "cancelled" => Ok(ShipmentStatus::Cancelled),
            _ => Err(crate::error::Error::Other(format!(
                "unknown shipment status: {s}"
            ))),
        }
    }
}

/// A tracked customs-clearance shipment.
///
/// `version` is the optimistic-lock counter: every successful mutation
/// bumps it by exactly one, and writers must present the version they
/// last read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,

    /// Unique business key.
    pub shipment_number: String,

    pub principal: String,
    pub brand: String,
    pub lc_number: String,

    /// Invoice amount in OMR, three decimal places.
    pub invoice_amount_omr: Decimal,

    /// Estimated time of arrival — the anchor every workflow target
    /// date is computed from.
    pub eta: NaiveDate,

    /// Number of ETA edits so far (0..=3).
    pub eta_edit_count: i32,

    pub status: ShipmentStatus,

    /// Optimistic-lock version, starts at 1.
    pub version: i64,

    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Shipment {
    /// Customs duty: 5% of the invoice amount. Derived, never stored.
    pub fn customs_duty_omr(&self) -> Decimal {
        self.invoice_amount_omr * Decimal::new(5, 2)
    }

    /// VAT: 5% of the invoice amount. Derived, never stored.
    pub fn vat_omr(&self) -> Decimal {
        self.invoice_amount_omr * Decimal::new(5, 2)
    }

    /// Insurance: 1% of the invoice amount. Derived, never stored.
    pub fn insurance_omr(&self) -> Decimal {
        self.invoice_amount_omr * Decimal::new(1, 2)
    }

    /// Whole days elapsed since ETA. Negative before arrival.
    pub fn days_post_eta(&self, today: NaiveDate) -> i64 {
        (today - self.eta).num_days()
    }
}

/// Input for creating a shipment.
#[derive(Debug, Clone)]
pub struct NewShipment {
    pub shipment_number: String,
    pub principal: String,
    pub brand: String,
    pub lc_number: String,
    pub invoice_amount_omr: Decimal,
    pub eta: NaiveDate,
}

impl NewShipment {
    /// Reject malformed input before any row is touched.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.shipment_number.trim().is_empty() {
            return Err(crate::error::Error::Validation(
                "shipment_number must not be empty".to_string(),
            ));
        }
        if self.invoice_amount_omr <= Decimal::ZERO {
            return Err(crate::error::Error::Validation(format!(
                "invoice amount must be positive, got {}",
                self.invoice_amount_omr
            )));
        }
        Ok(())
    }
}

/// Field-level patch for `update`. Unset fields are left alone; the
/// store records one audit entry per field that actually changed.
#[derive(Debug, Clone, Default)]
pub struct ShipmentPatch {
    pub principal: Option<String>,
    pub brand: Option<String>,
    pub lc_number: Option<String>,
    pub invoice_amount_omr: Option<Decimal>,
    pub status: Option<ShipmentStatus>,
}

impl ShipmentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn principal(mut self, v: impl Into<String>) -> Self {
        self.principal = Some(v.into());
        self
    }

    pub fn brand(mut self, v: impl Into<String>) -> Self {
        self.brand = Some(v.into());
        self
    }

    pub fn lc_number(mut self, v: impl Into<String>) -> Self {
        self.lc_number = Some(v.into());
        self
    }

    pub fn invoice_amount(mut self, v: Decimal) -> Self {
        self.invoice_amount_omr = Some(v);
        self
    }

    pub fn status(mut self, v: ShipmentStatus) -> Self {
        self.status = Some(v);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.principal.is_none()
            && self.brand.is_none()
            && self.lc_number.is_none()
            && self.invoice_amount_omr.is_none()
            && self.status.is_none()
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if let Some(amount) = self.invoice_amount_omr {
            if amount <= Decimal::ZERO {
                return Err(crate::error::Error::Validation(format!(
                    "invoice amount must be positive, got {amount}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn shipment(invoice: &str, eta: NaiveDate) -> Shipment {
        Shipment {
            id: ShipmentId(1),
            shipment_number: "SHP-001".to_string(),
            principal: "Al Hashar".to_string(),
            brand: "Acme".to_string(),
            lc_number: "LC-100".to_string(),
            invoice_amount_omr: Decimal::from_str(invoice).unwrap(),
            eta,
            eta_edit_count: 0,
            status: ShipmentStatus::Active,
            version: 1,
            created_by: UserId(1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn financial_charges_are_derived_from_invoice() {
        let eta = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let s = shipment("10000.000", eta);

        assert_eq!(s.customs_duty_omr(), Decimal::from_str("500.000").unwrap());
        assert_eq!(s.vat_omr(), Decimal::from_str("500.000").unwrap());
        assert_eq!(s.insurance_omr(), Decimal::from_str("100.000").unwrap());
    }

    #[test]
    fn days_post_eta_counts_whole_days() {
        let eta = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let s = shipment("1.000", eta);

        assert_eq!(s.days_post_eta(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()), 0);
        assert_eq!(s.days_post_eta(NaiveDate::from_ymd_opt(2024, 1, 25).unwrap()), 10);
        assert_eq!(s.days_post_eta(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()), -5);
    }

    #[test]
    fn new_shipment_rejects_non_positive_invoice() {
        let new = NewShipment {
            shipment_number: "SHP-001".to_string(),
            principal: "p".to_string(),
            brand: "b".to_string(),
            lc_number: "lc".to_string(),
            invoice_amount_omr: Decimal::ZERO,
            eta: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        };
        assert!(matches!(
            new.validate(),
            Err(crate::error::Error::Validation(_))
        ));
    }
}
