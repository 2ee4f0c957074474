//! Batch evaluation: sweep active shipments and drive the escalation
//! engine over each.
//!
//! One sweep bounds its own work: only shipments whose ETA falls in a
//! trailing window are candidates — anything older is assumed closed.
//! Inside a sweep, a single bad record never aborts the run; its error
//! is logged with the shipment identity and the batch moves on.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::alert::EscalationEngine;
use crate::db::Db;
use crate::error::Result;
use crate::telemetry::metrics;

/// Target SLA: this many shipments should evaluate within the window.
const SLA_SHIPMENTS: usize = 1000;
const SLA_WINDOW: Duration = Duration::from_secs(300);

/// Configuration for the evaluation sweep.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Trailing ETA window (days) that bounds the candidate set.
    pub window_days: i64,
    /// Shipments per batch.
    pub batch_size: usize,
    /// Sweep cadence for the daemon loop.
    pub cadence: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            batch_size: 100,
            cadence: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Result of one sweep.
#[derive(Debug, Clone)]
pub struct SweepSummary {
    pub candidates: usize,
    pub processed: usize,
    pub errors: usize,
    pub alerts_created: usize,
    pub elapsed: Duration,
}

/// Periodic driver for the escalation engine.
pub struct EvaluationScheduler {
    db: Arc<Db>,
    engine: Arc<EscalationEngine>,
    config: SweepConfig,
    shutdown: Arc<Notify>,
}

impl EvaluationScheduler {
    pub fn new(db: Arc<Db>, engine: Arc<EscalationEngine>, config: SweepConfig) -> Self {
        Self {
            db,
            engine,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle for signalling shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Run one sweep for the given day.
    pub async fn run_once(&self, today: NaiveDate) -> Result<SweepSummary> {
        let start = Instant::now();
        let window_start = today - chrono::Duration::days(self.config.window_days);

        let candidates = self
            .db
            .active_shipments_in_eta_window(window_start, today)
            .await?;

        info!(
            candidates = candidates.len(),
            window_start = %window_start,
            window_end = %today,
            "evaluation sweep started"
        );

        let mut processed = 0;
        let mut errors = 0;
        let mut alerts_created = 0;

        for (batch_index, batch) in candidates.chunks(self.config.batch_size).enumerate() {
            for shipment in batch {
                match self.engine.evaluate_shipment(shipment, today).await {
                    Ok(alerts) => {
                        processed += 1;
                        alerts_created += alerts.len();
                    }
                    Err(e) => {
                        errors += 1;
                        error!(
                            shipment = %shipment.shipment_number,
                            id = %shipment.id,
                            "evaluation failed: {e}"
                        );
                    }
                }
            }
            info!(
                batch = batch_index + 1,
                size = batch.len(),
                "batch evaluated"
            );
        }

        let elapsed = start.elapsed();
        metrics::sweep_duration_ms().record(elapsed.as_millis() as f64, &[]);

        let summary = SweepSummary {
            candidates: candidates.len(),
            processed,
            errors,
            alerts_created,
            elapsed,
        };

        info!(
            candidates = summary.candidates,
            processed = summary.processed,
            errors = summary.errors,
            alerts_created = summary.alerts_created,
            elapsed_ms = elapsed.as_millis() as u64,
            "evaluation sweep finished"
        );

        if summary.candidates >= SLA_SHIPMENTS && elapsed > SLA_WINDOW {
            warn!(
                candidates = summary.candidates,
                elapsed_s = elapsed.as_secs(),
                "sweep exceeded the {SLA_SHIPMENTS}-in-{}s target",
                SLA_WINDOW.as_secs()
            );
        }

        Ok(summary)
    }

    /// Run sweeps on the configured cadence until shutdown. The first
    /// sweep starts immediately.
    pub async fn run(&self) -> Result<()> {
        info!(
            cadence_s = self.config.cadence.as_secs(),
            "evaluation scheduler started"
        );

        loop {
            if let Err(e) = self.run_once(Utc::now().date_naive()).await {
                // Sweep-level failures (e.g. the candidate query) are
                // logged and retried next cadence.
                error!("evaluation sweep failed: {e}");
            }

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("evaluation scheduler shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.cadence) => {}
            }
        }
    }
}
