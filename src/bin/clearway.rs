//! clearway CLI — operator interface to the clearance tracker.

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use clearway_rs::alert::EscalationEngine;
use clearway_rs::config::Config;
use clearway_rs::db::shipments::ShipmentFilters;
use clearway_rs::db::Db;
use clearway_rs::model::alert::AlertId;
use clearway_rs::model::shipment::{NewShipment, ShipmentId, ShipmentStatus};
use clearway_rs::model::workflow::StepId;
use clearway_rs::model::UserId;
use clearway_rs::notify::{DispatchConfig, DispatchWorker, Dispatcher, LogTransport};
use clearway_rs::scheduler::{EvaluationScheduler, SweepConfig};
use clearway_rs::telemetry::{init_telemetry, TelemetryConfig};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "clearway", about = "Customs-clearance shipment tracking")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the evaluation scheduler and notification worker
    Serve {
        /// Sweep cadence in hours
        #[arg(long, default_value_t = 24)]
        cadence_hours: u64,
    },
    /// Shipment operations
    Shipment {
        #[command(subcommand)]
        action: ShipmentAction,
    },
    /// Workflow step operations
    Step {
        #[command(subcommand)]
        action: StepAction,
    },
    /// Alert operations
    Alert {
        #[command(subcommand)]
        action: AlertAction,
    },
    /// Notification operations
    Notify {
        #[command(subcommand)]
        action: NotifyAction,
    },
    /// User directory operations
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum ShipmentAction {
    /// Create a shipment (generates its full workflow)
    Create {
        shipment_number: String,
        #[arg(long)]
        principal: String,
        #[arg(long)]
        brand: String,
        #[arg(long)]
        lc_number: String,
        /// Invoice amount in OMR
        #[arg(long)]
        invoice: Decimal,
        /// Estimated time of arrival (YYYY-MM-DD)
        #[arg(long)]
        eta: NaiveDate,
        /// Acting user id
        #[arg(long)]
        actor: i64,
    },
    /// Show a shipment with derived charges
    Show { id: i64 },
    /// List shipments
    List {
        /// Filter by status (active | completed | cancelled)
        #[arg(long)]
        status: Option<String>,
        /// Filter by principal (substring)
        #[arg(long)]
        principal: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 20)]
        size: i64,
    },
    /// Move the ETA (recalculates every step's target date)
    UpdateEta {
        id: i64,
        /// New ETA (YYYY-MM-DD)
        eta: NaiveDate,
        /// Version read before the edit
        #[arg(long)]
        version: i64,
        #[arg(long)]
        actor: i64,
    },
    /// Soft-delete a shipment
    Delete {
        id: i64,
        #[arg(long)]
        actor: i64,
    },
}

#[derive(Subcommand)]
enum StepAction {
    /// List the workflow of a shipment
    List { shipment_id: i64 },
    /// Complete a step
    Complete {
        id: i64,
        /// Actual completion date (YYYY-MM-DD)
        date: NaiveDate,
        #[arg(long)]
        actor: i64,
    },
}

#[derive(Subcommand)]
enum AlertAction {
    /// List alerts addressed to a user
    List {
        user: i64,
        /// Only unacknowledged alerts
        #[arg(long)]
        open: bool,
    },
    /// Acknowledge an alert
    Ack {
        id: i64,
        #[arg(long)]
        actor: i64,
    },
    /// Evaluate one shipment now (same path as the daily sweep)
    Evaluate { shipment_id: i64 },
    /// Run one full evaluation sweep now
    Sweep,
}

#[derive(Subcommand)]
enum NotifyAction {
    /// Re-enqueue every undelivered alert
    ProcessPending,
}

#[derive(Subcommand)]
enum UserAction {
    /// Add a user to the directory
    Add {
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        department: String,
        /// PPR or APR
        #[arg(long, default_value = "PPR")]
        role: String,
    },
}

const CLI_ORIGIN: Option<&str> = Some("cli");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { cadence_hours } => cmd_serve(cadence_hours).await,
        command => {
            let config = Config::from_env()?;
            let db = Arc::new(connect(&config).await?);

            match command {
                Command::Serve { .. } => unreachable!(),
                Command::Shipment { action } => cmd_shipment(&db, &config, action).await,
                Command::Step { action } => cmd_step(&db, action).await,
                Command::Alert { action } => cmd_alert(&db, &config, action).await,
                Command::Notify { action } => cmd_notify(&db, &config, action).await,
                Command::User { action } => cmd_user(&db, action).await,
            }
        }
    }
}

async fn connect(config: &Config) -> anyhow::Result<Db> {
    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;
    db.seed_step_templates().await?;
    db.create_notify_queue().await?;
    Ok(db)
}

fn dispatch_config(config: &Config) -> DispatchConfig {
    DispatchConfig {
        delivery_timeout: Duration::from_secs(config.delivery_timeout_secs),
        retry_delay: Duration::from_secs(config.notify_retry_delay_secs as u64),
        ..DispatchConfig::default()
    }
}

async fn cmd_serve(cadence_hours: u64) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "clearway".to_string(),
    })?;

    let db = Arc::new(connect(&config).await?);

    let engine = Arc::new(EscalationEngine::with_default_ladder(Arc::clone(&db)));
    let scheduler = Arc::new(EvaluationScheduler::new(
        Arc::clone(&db),
        engine,
        SweepConfig {
            window_days: config.eval_window_days,
            batch_size: config.eval_batch_size,
            cadence: Duration::from_secs(cadence_hours * 60 * 60),
        },
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&db),
        Arc::new(LogTransport),
        dispatch_config(&config),
    ));
    let worker = Arc::new(DispatchWorker::new(
        Arc::clone(&db),
        dispatcher,
        dispatch_config(&config),
    ));

    let scheduler_shutdown = scheduler.shutdown_handle();
    let worker_shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        scheduler_shutdown.notify_one();
        worker_shutdown.notify_one();
    });

    let scheduler_task = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run().await })
    };
    let worker_task = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.run().await })
    };

    scheduler_task.await??;
    worker_task.await??;
    Ok(())
}

async fn cmd_shipment(
    db: &Arc<Db>,
    config: &Config,
    action: ShipmentAction,
) -> anyhow::Result<()> {
    match action {
        ShipmentAction::Create {
            shipment_number,
            principal,
            brand,
            lc_number,
            invoice,
            eta,
            actor,
        } => {
            let shipment = db
                .create_shipment(
                    NewShipment {
                        shipment_number,
                        principal,
                        brand,
                        lc_number,
                        invoice_amount_omr: invoice,
                        eta,
                    },
                    UserId(actor),
                    CLI_ORIGIN,
                    UserId(config.default_assignee_id),
                )
                .await?;
            println!(
                "Created: {} (id {}, version {}, ETA {})",
                shipment.shipment_number, shipment.id, shipment.version, shipment.eta
            );
        }
        ShipmentAction::Show { id } => {
            let shipment = db.get_shipment(ShipmentId(id)).await?;
            println!("ID:              {}", shipment.id);
            println!("Number:          {}", shipment.shipment_number);
            println!("Principal:       {}", shipment.principal);
            println!("Brand:           {}", shipment.brand);
            println!("LC Number:       {}", shipment.lc_number);
            println!("Invoice (OMR):   {}", shipment.invoice_amount_omr);
            println!("Customs duty:    {}", shipment.customs_duty_omr());
            println!("VAT:             {}", shipment.vat_omr());
            println!("Insurance:       {}", shipment.insurance_omr());
            println!("ETA:             {}", shipment.eta);
            println!("ETA edits:       {}/3", shipment.eta_edit_count);
            println!("Status:          {}", shipment.status);
            println!("Version:         {}", shipment.version);
        }
        ShipmentAction::List {
            status,
            principal,
            page,
            size,
        } => {
            let status = match status {
                Some(s) => Some(s.parse::<ShipmentStatus>().map_err(anyhow::Error::from)?),
                None => None,
            };
            let page = db
                .list_shipments(
                    &ShipmentFilters {
                        status,
                        principal,
                        ..ShipmentFilters::default()
                    },
                    page,
                    size,
                )
                .await?;

            if page.items.is_empty() {
                println!("No shipments found.");
                return Ok(());
            }

            println!(
                "{:<6}  {:<16}  {:<20}  {:<10}  {:<10}  VER",
                "ID", "NUMBER", "PRINCIPAL", "ETA", "STATUS"
            );
            println!("{}", "-".repeat(80));
            for s in &page.items {
                println!(
                    "{:<6}  {:<16}  {:<20}  {:<10}  {:<10}  {}",
                    s.id.0, s.shipment_number, s.principal, s.eta, s.status, s.version
                );
            }
            println!("\n{} of {} shipment(s)", page.items.len(), page.total);
        }
        ShipmentAction::UpdateEta {
            id,
            eta,
            version,
            actor,
        } => {
            let shipment = db
                .update_eta(ShipmentId(id), eta, version, UserId(actor), CLI_ORIGIN)
                .await?;
            println!(
                "ETA updated: {} → {} (edit {}/3, version {})",
                id, shipment.eta, shipment.eta_edit_count, shipment.version
            );

            // Post-commit: a moved anchor can change today's alert
            // picture, so the shipment is re-evaluated right away.
            let engine = EscalationEngine::with_default_ladder(Arc::clone(db));
            match engine
                .evaluate_shipment(&shipment, Utc::now().date_naive())
                .await
            {
                Ok(alerts) if !alerts.is_empty() => {
                    println!("{} alert(s) created by re-evaluation.", alerts.len());
                }
                Ok(_) => {}
                Err(e) => eprintln!("warning: alert re-evaluation failed: {e}"),
            }
        }
        ShipmentAction::Delete { id, actor } => {
            let deleted = db
                .soft_delete_shipment(ShipmentId(id), UserId(actor), CLI_ORIGIN)
                .await?;
            if deleted {
                println!("Shipment {id} cancelled and soft-deleted.");
            } else {
                println!("Shipment {id} not found (or already deleted).");
            }
        }
    }
    Ok(())
}

async fn cmd_step(db: &Db, action: StepAction) -> anyhow::Result<()> {
    match action {
        StepAction::List { shipment_id } => {
            let steps = db.steps_for_shipment(ShipmentId(shipment_id)).await?;
            if steps.is_empty() {
                println!("No steps found.");
                return Ok(());
            }
            println!(
                "{:<6}  {:<5}  {:<34}  {:<12}  {:<10}  {:<9}  CRIT",
                "ID", "NO.", "NAME", "DEPT", "TARGET", "STATUS"
            );
            println!("{}", "-".repeat(96));
            for step in &steps {
                println!(
                    "{:<6}  {:<5}  {:<34}  {:<12}  {:<10}  {:<9}  {}",
                    step.id.0,
                    step.step_number,
                    step.step_name,
                    step.department,
                    step.target_date,
                    step.status,
                    if step.is_critical { "yes" } else { "-" }
                );
            }
        }
        StepAction::Complete { id, date, actor } => {
            let step = db
                .complete_step(
                    StepId(id),
                    date,
                    Utc::now().date_naive(),
                    UserId(actor),
                    CLI_ORIGIN,
                )
                .await?;
            println!(
                "Step {} '{}' completed on {}",
                step.step_number,
                step.step_name,
                step.actual_date.map(|d| d.to_string()).unwrap_or_default()
            );
        }
    }
    Ok(())
}

async fn cmd_alert(db: &Arc<Db>, config: &Config, action: AlertAction) -> anyhow::Result<()> {
    match action {
        AlertAction::List { user, open } => {
            let acknowledged = if open { Some(false) } else { None };
            let alerts = db.alerts_for_user(UserId(user), None, acknowledged).await?;
            if alerts.is_empty() {
                println!("No alerts.");
                return Ok(());
            }
            println!(
                "{:<6}  {:<9}  {:<4}  {:<5}  {:<5}  MESSAGE",
                "ID", "SEVERITY", "DAY", "ACK", "SENT"
            );
            println!("{}", "-".repeat(100));
            for alert in &alerts {
                println!(
                    "{:<6}  {:<9}  {:<4}  {:<5}  {:<5}  {}",
                    alert.id.0,
                    alert.severity,
                    alert.days_post_eta,
                    if alert.is_acknowledged { "yes" } else { "-" },
                    if alert.sent { "yes" } else { "-" },
                    alert.message
                );
            }
        }
        AlertAction::Ack { id, actor } => {
            let alert = db.acknowledge_alert(AlertId(id), UserId(actor)).await?;
            println!(
                "Alert {} acknowledged at {}",
                alert.id,
                alert
                    .acknowledged_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default()
            );
        }
        AlertAction::Evaluate { shipment_id } => {
            let shipment = db.get_shipment(ShipmentId(shipment_id)).await?;
            let engine = EscalationEngine::with_default_ladder(Arc::clone(db));
            let alerts = engine
                .evaluate_shipment(&shipment, Utc::now().date_naive())
                .await?;
            println!(
                "{} alert(s) created for shipment {}",
                alerts.len(),
                shipment.shipment_number
            );
        }
        AlertAction::Sweep => {
            let engine = Arc::new(EscalationEngine::with_default_ladder(Arc::clone(db)));
            let scheduler = EvaluationScheduler::new(
                Arc::clone(db),
                engine,
                SweepConfig {
                    window_days: config.eval_window_days,
                    batch_size: config.eval_batch_size,
                    ..SweepConfig::default()
                },
            );
            let summary = scheduler.run_once(Utc::now().date_naive()).await?;
            println!(
                "Sweep: {} candidates, {} processed, {} errors, {} alerts, {:.2}s",
                summary.candidates,
                summary.processed,
                summary.errors,
                summary.alerts_created,
                summary.elapsed.as_secs_f64()
            );
        }
    }
    Ok(())
}

async fn cmd_notify(db: &Arc<Db>, config: &Config, action: NotifyAction) -> anyhow::Result<()> {
    match action {
        NotifyAction::ProcessPending => {
            let dispatcher = Dispatcher::new(
                Arc::clone(db),
                Arc::new(LogTransport),
                dispatch_config(config),
            );
            let enqueued = dispatcher.process_pending().await?;
            println!("{enqueued} pending notification(s) re-enqueued.");
        }
    }
    Ok(())
}

async fn cmd_user(db: &Db, action: UserAction) -> anyhow::Result<()> {
    match action {
        UserAction::Add {
            email,
            name,
            department,
            role,
        } => {
            let user = db.add_user(&email, &name, &department, &role).await?;
            println!("Added user {} ({}) to {}", user.id, user.email, user.department);
        }
    }
    Ok(())
}
