//! Metric instrument factories for clearway-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"clearway-rs"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for clearway-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("clearway-rs")
}

/// Counter: shipments created (with their workflow).
pub fn shipments_created() -> Counter<u64> {
    meter()
        .u64_counter("clearway.shipments.created")
        .with_description("Number of shipments created")
        .build()
}

/// Counter: ETA updates (each bumps the edit count and recalculates
/// every step's target date).
pub fn eta_updates() -> Counter<u64> {
    meter()
        .u64_counter("clearway.shipments.eta_updates")
        .with_description("Number of shipment ETA updates")
        .build()
}

/// Counter: workflow steps completed.
/// Labels: `department`.
pub fn steps_completed() -> Counter<u64> {
    meter()
        .u64_counter("clearway.workflow.steps_completed")
        .with_description("Number of workflow steps completed")
        .build()
}

/// Counter: alerts created by escalation evaluation.
/// Labels: `severity`.
pub fn alerts_created() -> Counter<u64> {
    meter()
        .u64_counter("clearway.alerts.created")
        .with_description("Number of alerts created")
        .build()
}

/// Counter: notification dispatch outcomes.
/// Labels: `result` ("sent" | "already_sent" | "retry" | "gave_up").
pub fn notifications() -> Counter<u64> {
    meter()
        .u64_counter("clearway.notifications.dispatched")
        .with_description("Notification dispatch outcomes")
        .build()
}

/// Counter: outbox queue operations (send, read, archive, delete).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("clearway.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Histogram: evaluation sweep duration in milliseconds.
pub fn sweep_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("clearway.sweep.duration_ms")
        .with_description("Evaluation sweep duration in milliseconds")
        .with_unit("ms")
        .build()
}
