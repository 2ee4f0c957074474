//! Built-in workflow step catalog.
//!
//! The 34-step customs-clearance process, anchored to the shipment ETA by
//! signed day offsets. Steps 9–14 cover the clearance window itself; the
//! critical ones among them are the steps whose lateness risks demurrage.
//! The catalog is seeded into `workflow_step_templates` at startup and
//! read back from there, so step definitions can be adjusted
//! administratively without a code change.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub mod department {
    pub const BUSINESS_UNIT: &str = "BusinessUnit";
    pub const FINANCE: &str = "Finance";
    pub const CUSTOMS: &str = "C&C";
    pub const STORES: &str = "Stores";
}

/// An immutable catalog entry a workflow step is generated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTemplate {
    /// Ordinal with one decimal place, unique across the catalog.
    pub step_number: Decimal,
    pub step_name: String,
    pub description: String,
    pub department: String,
    /// Signed offset from ETA; negative for pre-arrival steps.
    pub offset_days: i32,
    pub is_critical: bool,
    pub display_order: i32,
    pub is_active: bool,
}

fn tpl(
    number: u32,
    name: &str,
    description: &str,
    department: &str,
    offset_days: i32,
    is_critical: bool,
    display_order: i32,
) -> StepTemplate {
    StepTemplate {
        step_number: Decimal::new(number as i64 * 10, 1),
        step_name: name.to_string(),
        description: description.to_string(),
        department: department.to_string(),
        offset_days,
        is_critical,
        display_order,
        is_active: true,
    }
}

/// The full 34-step catalog in display order.
pub fn builtin_templates() -> Vec<StepTemplate> {
    use department::*;

    let defs: [(&str, &str, &str, i32, bool); 34] = [
        // Pre-clearance
        ("Receive shipping documents", "Receive and verify shipping documents from supplier", BUSINESS_UNIT, -5, false),
        ("Verify invoice and packing list", "Verify invoice details and packing list accuracy", BUSINESS_UNIT, -4, false),
        ("Prepare LC documentation", "Prepare Letter of Credit documentation", FINANCE, -3, false),
        ("LC opening", "Open Letter of Credit with bank", FINANCE, -2, false),
        ("DAN preparation", "Prepare Document Against Negotiation", FINANCE, -1, false),
        ("DAN signing", "Sign Document Against Negotiation", FINANCE, 0, false),
        ("Fund transfer initiation", "Initiate fund transfer for customs duties", FINANCE, 1, false),
        ("Bank document collection", "Collect documents from bank", FINANCE, 2, false),
        // Clearance window — the critical path
        ("Bayan submission", "Submit customs declaration (Bayan) to customs authority", CUSTOMS, 0, true),
        ("Customs duty payment", "Pay customs duty to customs authority", CUSTOMS, 3, true),
        ("Bayan approval", "Receive Bayan approval from customs authority", CUSTOMS, 4, true),
        ("VAT payment", "Pay Value Added Tax", FINANCE, 4, false),
        ("DO payment", "Pay for Delivery Order", CUSTOMS, 6, true),
        ("Goods collection from port", "Collect goods from port", CUSTOMS, 7, true),
        // Post-clearance
        ("Transport to warehouse", "Transport goods to warehouse", STORES, 8, false),
        ("Warehouse receipt", "Receive goods at warehouse", STORES, 8, false),
        ("Physical inspection", "Conduct physical inspection of goods", STORES, 9, false),
        ("Quality check", "Perform quality check on goods", STORES, 9, false),
        ("Defect reporting", "Report any defects found during inspection", STORES, 10, false),
        ("Inventory update", "Update inventory system with received goods", STORES, 10, false),
        // Administrative close-out
        ("Insurance claim preparation", "Prepare insurance claim if needed", FINANCE, 11, false),
        ("Insurance documentation", "Complete insurance documentation", FINANCE, 12, false),
        ("Supplier invoice reconciliation", "Reconcile supplier invoice with received goods", FINANCE, 13, false),
        ("Payment processing", "Process payment to supplier", FINANCE, 14, false),
        ("Document archival", "Archive all shipment documents", BUSINESS_UNIT, 15, false),
        ("Compliance reporting", "Submit compliance reports to authorities", CUSTOMS, 16, false),
        ("Cost allocation", "Allocate costs to appropriate cost centers", FINANCE, 17, false),
        ("Vendor performance review", "Review vendor performance for this shipment", BUSINESS_UNIT, 18, false),
        ("Customs audit preparation", "Prepare documents for potential customs audit", CUSTOMS, 19, false),
        ("Final reconciliation", "Final reconciliation of all costs and documents", FINANCE, 20, false),
        ("Management reporting", "Prepare management report on shipment", BUSINESS_UNIT, 21, false),
        ("Lessons learned documentation", "Document lessons learned from shipment process", BUSINESS_UNIT, 22, false),
        ("Process improvement suggestions", "Submit process improvement suggestions", BUSINESS_UNIT, 23, false),
        ("Shipment closure", "Close shipment in system", BUSINESS_UNIT, 24, false),
    ];

    defs.into_iter()
        .enumerate()
        .map(|(i, (name, desc, dept, offset, critical))| {
            tpl(i as u32 + 1, name, desc, dept, offset, critical, i as i32 + 1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_has_34_steps_with_unique_numbers() {
        let templates = builtin_templates();
        assert_eq!(templates.len(), 34);

        let numbers: HashSet<_> = templates.iter().map(|t| t.step_number).collect();
        assert_eq!(numbers.len(), 34);
    }

    #[test]
    fn display_order_is_strictly_increasing() {
        let templates = builtin_templates();
        for window in templates.windows(2) {
            assert!(window[1].display_order > window[0].display_order);
        }
    }

    #[test]
    fn critical_steps_are_the_clearance_window() {
        let templates = builtin_templates();
        let critical: Vec<Decimal> = templates
            .iter()
            .filter(|t| t.is_critical)
            .map(|t| t.step_number)
            .collect();
        let expected: Vec<Decimal> = [9, 10, 11, 13, 14]
            .iter()
            .map(|n| Decimal::new(n * 10, 1))
            .collect();
        assert_eq!(critical, expected);
    }

    #[test]
    fn offsets_span_pre_arrival_to_closure() {
        let templates = builtin_templates();
        let min = templates.iter().map(|t| t.offset_days).min().unwrap();
        let max = templates.iter().map(|t| t.offset_days).max().unwrap();
        assert_eq!(min, -5);
        assert_eq!(max, 24);
    }

    #[test]
    fn known_anchor_steps() {
        let templates = builtin_templates();
        let bayan = templates
            .iter()
            .find(|t| t.step_name == "Bayan submission")
            .unwrap();
        assert_eq!(bayan.offset_days, 0);
        assert!(bayan.is_critical);

        let duty = templates
            .iter()
            .find(|t| t.step_name == "Customs duty payment")
            .unwrap();
        assert_eq!(duty.offset_days, 3);
        assert!(duty.is_critical);
    }
}
