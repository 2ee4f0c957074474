//! Notification dispatch: idempotent delivery with bounded retry.
//!
//! Delivery requests arrive on the durable `notify` outbox queue. One
//! worker loop drains it — listens for `notify_ready`, falls back to
//! polling — and hands each alert to the dispatcher. The transport is a
//! collaborator behind a trait: delivery failure is a boolean, not an
//! exception, so retry bookkeeping stays uniform.

pub mod render;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::db::outbox::NOTIFY_CHANNEL;
use crate::db::Db;
use crate::error::Result;
use crate::model::alert::{AlertId, MAX_DELIVERY_RETRIES};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// External delivery collaborator (SMTP in production).
///
/// `send` returns plain success/failure; the dispatcher owns timeouts
/// and retries.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str, text_body: &str) -> bool;
}

/// Transport that logs instead of delivering. Local-dev default.
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(&self, to: &str, subject: &str, _html_body: &str, _text_body: &str) -> bool {
        info!(to, subject, "notification (log transport)");
        true
    }
}

/// Outcome of one dispatch attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Delivered; alert marked sent.
    Sent,
    /// Idempotency guard hit — a previous attempt already delivered.
    AlreadySent,
    /// Failed; a retry was scheduled on the outbox.
    RetryScheduled { attempt: i32 },
    /// Failed with the retry budget spent. No further automatic
    /// attempts; the alert stays queryable as undelivered.
    GaveUp,
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound on one transport call. A timeout counts as a
    /// delivery failure.
    pub delivery_timeout: Duration,
    /// Fixed delay before a scheduled retry.
    pub retry_delay: Duration,
    /// Visibility timeout (seconds) for outbox reads.
    pub visibility_timeout: i32,
    /// Poll interval fallback when no NOTIFY arrives.
    pub poll_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(300),
            visibility_timeout: 60,
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Delivers notifications for alerts, one at a time.
pub struct Dispatcher {
    db: Arc<Db>,
    transport: Arc<dyn NotificationTransport>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        db: Arc<Db>,
        transport: Arc<dyn NotificationTransport>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            db,
            transport,
            config,
        }
    }

    /// Attempt delivery for one alert.
    pub async fn send(&self, alert_id: AlertId) -> Result<DeliveryOutcome> {
        let alert = self.db.get_alert(alert_id).await?;

        if alert.sent {
            metrics::notifications().add(1, &[KeyValue::new("result", "already_sent")]);
            return Ok(DeliveryOutcome::AlreadySent);
        }

        let shipment = self.db.get_shipment(alert.shipment_id).await?;
        let step = self.db.get_step(alert.workflow_step_id).await?;
        let recipient = self.db.get_user(alert.recipient_user_id).await?;

        let rendered = render::render(&alert, &shipment, &step);

        // A hung transport counts as a failed attempt.
        let delivered = tokio::time::timeout(
            self.config.delivery_timeout,
            self.transport.send(
                &recipient.email,
                &rendered.subject,
                &rendered.html,
                &rendered.text,
            ),
        )
        .await
        .unwrap_or(false);

        if delivered {
            self.db.mark_alert_sent(alert_id).await?;
            metrics::notifications().add(1, &[KeyValue::new("result", "sent")]);
            info!(alert = %alert_id, to = %recipient.email, "notification delivered");
            return Ok(DeliveryOutcome::Sent);
        }

        if !alert.has_retry_budget() {
            // A manual re-send for an exhausted alert failed again;
            // the count stays at the cap.
            metrics::notifications().add(1, &[KeyValue::new("result", "gave_up")]);
            return Ok(DeliveryOutcome::GaveUp);
        }

        let retry_count = self.db.increment_alert_retry(alert_id).await?;
        if retry_count < MAX_DELIVERY_RETRIES {
            self.db
                .enqueue_notification(alert_id, self.config.retry_delay.as_secs() as i32)
                .await?;
            metrics::notifications().add(1, &[KeyValue::new("result", "retry")]);
            warn!(
                alert = %alert_id,
                retry = retry_count,
                max = MAX_DELIVERY_RETRIES,
                "delivery failed, retry scheduled"
            );
            Ok(DeliveryOutcome::RetryScheduled {
                attempt: retry_count,
            })
        } else {
            metrics::notifications().add(1, &[KeyValue::new("result", "gave_up")]);
            error!(
                alert = %alert_id,
                retries = retry_count,
                "delivery failed permanently"
            );
            Ok(DeliveryOutcome::GaveUp)
        }
    }

    /// Re-enqueue every undelivered alert.
    ///
    /// Recovery path for alerts whose original enqueue was dropped or
    /// whose worker died mid-retry. Returns the number re-enqueued.
    pub async fn process_pending(&self) -> Result<usize> {
        let pending = self.db.pending_notifications().await?;
        let mut enqueued = 0;

        for alert in &pending {
            match self.db.enqueue_notification(alert.id, 0).await {
                Ok(_) => enqueued += 1,
                Err(e) => warn!(alert = %alert.id, "re-enqueue failed: {e}"),
            }
        }

        if !pending.is_empty() {
            info!(
                pending = pending.len(),
                enqueued, "pending notifications re-enqueued"
            );
        }
        Ok(enqueued)
    }
}

/// The dispatch worker loop: drain the outbox until shutdown.
pub struct DispatchWorker {
    db: Arc<Db>,
    dispatcher: Arc<Dispatcher>,
    config: DispatchConfig,
    shutdown: Arc<Notify>,
}

impl DispatchWorker {
    pub fn new(db: Arc<Db>, dispatcher: Arc<Dispatcher>, config: DispatchConfig) -> Self {
        Self {
            db,
            dispatcher,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle for signalling shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Run until shutdown.
    pub async fn run(&self) -> Result<()> {
        let mut listener = sqlx::postgres::PgListener::connect_with(self.db.pool()).await?;
        listener.listen(NOTIFY_CHANNEL).await?;

        info!("dispatch worker started, draining outbox");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("dispatch worker shutting down");
                    return Ok(());
                }
                notif = listener.recv() => {
                    if let Err(e) = notif {
                        warn!("PgListener error: {e}, falling back to poll");
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            // Drain everything currently visible before sleeping again.
            loop {
                match self.process_one().await {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(e) => {
                        error!("dispatch worker error: {e}");
                        break;
                    }
                }
            }
        }
    }

    /// Read and dispatch one outbox message. Returns false when the
    /// queue is empty.
    async fn process_one(&self) -> Result<bool> {
        let msg = match self
            .db
            .read_notification(self.config.visibility_timeout)
            .await?
        {
            Some(m) => m,
            None => return Ok(false),
        };

        match self.dispatcher.send(msg.alert_id).await {
            // Terminal for this message — a retry rides its own
            // delayed message, so this one is always archived.
            Ok(_) => self.db.archive_notification(msg.msg_id).await?,
            Err(e) => {
                // Leave the message; visibility timeout re-delivers it.
                warn!(alert = %msg.alert_id, "dispatch failed: {e}");
            }
        }

        Ok(true)
    }
}
