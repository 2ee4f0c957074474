//! Alert message rendering: subject, HTML body, plain-text body.

use crate::model::alert::{Alert, AlertSeverity};
use crate::model::shipment::Shipment;
use crate::model::workflow::WorkflowStep;

/// A rendered notification, ready for the transport.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub subject: String,
    pub html: String,
    pub text: String,
}

fn severity_color(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Warning => "#FFA500",
        AlertSeverity::Critical => "#FF4500",
        AlertSeverity::Urgent => "#DC143C",
    }
}

fn severity_upper(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Warning => "WARNING",
        AlertSeverity::Critical => "CRITICAL",
        AlertSeverity::Urgent => "URGENT",
    }
}

/// Render one alert against its shipment and step.
pub fn render(alert: &Alert, shipment: &Shipment, step: &WorkflowStep) -> Rendered {
    let subject = format!(
        "{}: Customs Clearance Alert - {}",
        severity_upper(alert.severity),
        shipment.shipment_number,
    );

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
<style>
  body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
  .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
  .header {{ background-color: {color}; color: white; padding: 20px; text-align: center; }}
  .content {{ background-color: #f9f9f9; padding: 20px; border: 1px solid #ddd; }}
  .detail {{ margin: 10px 0; }}
  .label {{ font-weight: bold; }}
  .footer {{ margin-top: 20px; padding: 10px; text-align: center; font-size: 12px; color: #666; }}
</style>
</head>
<body>
<div class="container">
  <div class="header"><h1>{severity} ALERT</h1></div>
  <div class="content">
    <p>{message}</p>
    <div class="detail"><span class="label">Shipment Number:</span> {number}</div>
    <div class="detail"><span class="label">Step Name:</span> {step_name}</div>
    <div class="detail"><span class="label">Target Date:</span> {target_date}</div>
    <div class="detail"><span class="label">Days Post-ETA:</span> {days}</div>
    <div class="detail"><span class="label">Principal:</span> {principal}</div>
    <div class="detail"><span class="label">Brand:</span> {brand}</div>
  </div>
  <div class="footer">
    <p>This is an automated notification from the customs clearance tracking system.</p>
    <p>Please log in to acknowledge this alert and take necessary action.</p>
  </div>
</div>
</body>
</html>"#,
        color = severity_color(alert.severity),
        severity = severity_upper(alert.severity),
        message = alert.message,
        number = shipment.shipment_number,
        step_name = step.step_name,
        target_date = step.target_date,
        days = alert.days_post_eta,
        principal = shipment.principal,
        brand = shipment.brand,
    );

    let text = format!(
        "{severity} ALERT\n\n{message}\n\n\
         Shipment Details:\n\
         - Shipment Number: {number}\n\
         - Step Name: {step_name}\n\
         - Target Date: {target_date}\n\
         - Days Post-ETA: {days}\n\
         - Principal: {principal}\n\
         - Brand: {brand}\n\n\
         ---\n\
         This is an automated notification from the customs clearance tracking system.\n\
         Please log in to acknowledge this alert and take necessary action.",
        severity = severity_upper(alert.severity),
        message = alert.message,
        number = shipment.shipment_number,
        step_name = step.step_name,
        target_date = step.target_date,
        days = alert.days_post_eta,
        principal = shipment.principal,
        brand = shipment.brand,
    );

    Rendered {
        subject,
        html,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::alert::AlertId;
    use crate::model::shipment::{ShipmentId, ShipmentStatus};
    use crate::model::workflow::{StepId, StepStatus};
    use crate::model::UserId;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    fn fixtures() -> (Alert, Shipment, WorkflowStep) {
        let shipment = Shipment {
            id: ShipmentId(1),
            shipment_number: "SHP-042".to_string(),
            principal: "Al Hashar".to_string(),
            brand: "Acme".to_string(),
            lc_number: "LC-9".to_string(),
            invoice_amount_omr: Decimal::new(10_000_000, 3),
            eta: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            eta_edit_count: 0,
            status: ShipmentStatus::Active,
            version: 1,
            created_by: UserId(1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        let step = WorkflowStep {
            id: StepId(9),
            shipment_id: shipment.id,
            step_number: Decimal::new(90, 1),
            step_name: "Bayan submission".to_string(),
            description: None,
            department: "C&C".to_string(),
            target_date: shipment.eta,
            offset_days: 0,
            actual_date: None,
            status: StepStatus::Pending,
            is_critical: true,
            ppr_user_id: UserId(5),
            apr_user_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let alert = Alert {
            id: AlertId(1),
            shipment_id: shipment.id,
            workflow_step_id: step.id,
            recipient_user_id: UserId(5),
            severity: crate::model::alert::AlertSeverity::Urgent,
            message: "Urgent step 'Bayan submission' is incomplete on Day 8 post-ETA for shipment SHP-042"
                .to_string(),
            days_post_eta: 8,
            is_acknowledged: false,
            acknowledged_at: None,
            sent: false,
            sent_at: None,
            retry_count: 0,
            created_at: Utc::now(),
        };
        (alert, shipment, step)
    }

    #[test]
    fn subject_carries_severity_and_shipment_number() {
        let (alert, shipment, step) = fixtures();
        let rendered = render(&alert, &shipment, &step);
        assert_eq!(rendered.subject, "URGENT: Customs Clearance Alert - SHP-042");
    }

    #[test]
    fn bodies_carry_the_step_and_day_count() {
        let (alert, shipment, step) = fixtures();
        let rendered = render(&alert, &shipment, &step);

        assert!(rendered.html.contains("Bayan submission"));
        assert!(rendered.html.contains("#DC143C"));
        assert!(rendered.text.contains("Days Post-ETA: 8"));
        assert!(rendered.text.contains("URGENT ALERT"));
    }
}
