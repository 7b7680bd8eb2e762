//! Event ticket check-in CLI.
//!
//! Usage:
//!   checkin import tickets.csv
//!   checkin add --code TICKET001 --name "John Doe" [--event "My Event"]
//!   checkin scan [--single-shot]          # one code per line on stdin
//!   checkin dashboard [--watch]
//!
//! Configuration comes from the environment (and `.env`), see
//! `checkin::config`.

use anyhow::Context;
use checkin::audit::TracingAuditSink;
use checkin::config::{Backend, Config};
use checkin::decoder::LineDecoder;
use checkin::import::{create_ticket, import_rows, parse_csv, ImportOutcome, ImportReport, TicketRow};
use checkin::session::{SessionAction, SessionController, SessionEnvironment};
use checkin::verifier::Verifier;
use checkin_core::environment::{Clock, SystemClock};
use checkin_core::{AuditSink, ScanAttempt, TicketStore, Verdict};
use checkin_postgres::{PostgresAuditLog, PostgresTicketStore};
use checkin_projections::{DashboardSnapshot, LiveDashboard};
use checkin_runtime::metrics::MetricsServer;
use checkin_testing::InMemoryTicketStore;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const START_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "checkin")]
#[command(about = "Event ticket check-in")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import tickets from a CSV file with a `ticket_code,attendee_name,event_name` header
    Import {
        /// CSV file
        csv: PathBuf,
    },
    /// Add one ticket
    Add {
        /// Ticket code
        #[arg(long)]
        code: String,
        /// Attendee name
        #[arg(long)]
        name: String,
        /// Event name (defaults to `CHECKIN_DEFAULT_EVENT_NAME`)
        #[arg(long)]
        event: Option<String>,
    },
    /// Check in codes read from standard input, one per line
    Scan {
        /// Release the decoder after every code and restart it for the next
        #[arg(long)]
        single_shot: bool,
    },
    /// Show check-in progress
    Dashboard {
        /// Keep printing as tickets change, until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
}

// ============================================================================
// Backend wiring
// ============================================================================

struct Services {
    store: Arc<dyn TicketStore>,
    audit: Arc<dyn AuditSink>,
}

async fn open_services(config: &Config) -> anyhow::Result<Services> {
    match config.backend {
        Backend::Postgres => {
            info!(event = %config.event_slug, "Connecting to ticket database...");
            let pool = checkin_postgres::connect(&config.database.url, &config.database.pool_settings())
                .await
                .context("connecting to ticket database")?;
            checkin_postgres::migrate(&pool).await.context("running migrations")?;
            info!("Ticket database ready");

            Ok(Services {
                store: Arc::new(PostgresTicketStore::new(pool.clone(), &config.event_slug)),
                audit: Arc::new(PostgresAuditLog::new(pool, &config.event_slug)),
            })
        },
        Backend::Memory => {
            let store = Arc::new(InMemoryTicketStore::new());
            if let Some(path) = &config.seed_csv {
                let report = import_rows(store.as_ref(), read_rows(path).await?).await;
                info!(path = %path.display(), tickets = report.inserted.len(), "Seeded in-memory store");
            }
            Ok(Services {
                store,
                audit: Arc::new(TracingAuditSink),
            })
        },
    }
}

async fn read_rows(path: &Path) -> anyhow::Result<Vec<TicketRow>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(parse_csv(&text))
}

// ============================================================================
// Commands
// ============================================================================

async fn import(services: &Services, path: &Path) -> anyhow::Result<()> {
    let report = import_rows(services.store.as_ref(), read_rows(path).await?).await;
    print_report(&report);
    if report.outcome() == ImportOutcome::Failed {
        anyhow::bail!("no tickets imported");
    }
    Ok(())
}

async fn add(services: &Services, config: &Config, row: TicketRow) -> anyhow::Result<()> {
    let row = TicketRow {
        event_name: if row.event_name.is_empty() {
            config.default_event_name.clone()
        } else {
            row.event_name
        },
        ..row
    };
    let ticket = create_ticket(services.store.as_ref(), &row).await?;
    println!(
        "Added {} for {} ({})",
        ticket.ticket_code, ticket.attendee_name, ticket.event_name
    );
    Ok(())
}

async fn scan(services: &Services, config: &Config, single_shot: bool) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let verifier = Verifier::new(Arc::clone(&services.store), Arc::clone(&clock))
        .with_audit(Arc::clone(&services.audit));
    let decoder = LineDecoder::stdin();
    let single_shot = single_shot || config.scanner.single_shot;

    let environment = SessionEnvironment::new(Arc::new(verifier), Arc::new(decoder.clone()), clock)
        .with_settings(config.scanner.decoder_settings())
        .with_single_shot(single_shot);
    let session = SessionController::new(environment);
    let mut actions = session.subscribe_actions();

    let state = session.start_and_wait(START_TIMEOUT).await?;
    if let Some(error) = state.camera_error {
        anyhow::bail!(error);
    }
    println!("Scanning. Enter one ticket code per line, Ctrl-C to stop.");

    loop {
        let action = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            action = actions.recv() => action,
        };
        match action {
            Ok(SessionAction::VerdictReady { attempt, verdict, .. }) => {
                print_verdict(&attempt, &verdict);
                if single_shot {
                    session.start().await?;
                }
            },
            Ok(SessionAction::DecoderStopped { .. }) if decoder.is_exhausted() => break,
            Ok(SessionAction::CameraFailed { error, .. }) => {
                if !decoder.is_exhausted() {
                    eprintln!("{error}");
                }
                break;
            },
            Ok(_) => {},
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Scan output lagged");
            },
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    session.shutdown(SHUTDOWN_TIMEOUT).await?;

    // Verdicts settled during shutdown are still queued
    while let Ok(action) = actions.try_recv() {
        if let SessionAction::VerdictReady { attempt, verdict, .. } = action {
            print_verdict(&attempt, &verdict);
        }
    }

    let state = session.state().await;
    info!(scans = state.scans, ignored_frames = state.ignored_frames, "Scan session ended");
    Ok(())
}

async fn dashboard(services: &Services, watch: bool) -> anyhow::Result<()> {
    if !watch {
        print_dashboard(&DashboardSnapshot::from_tickets(services.store.list().await?));
        return Ok(());
    }

    let handle = LiveDashboard::spawn(Arc::clone(&services.store), |snapshot| {
        print_dashboard(&snapshot);
    })
    .await?;
    tokio::signal::ctrl_c().await?;
    handle.cancel_and_wait().await;
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_verdict(attempt: &ScanAttempt, verdict: &Verdict) {
    let mark = match verdict {
        Verdict::Valid { .. } => "OK ",
        Verdict::Duplicate { .. } => "DUP",
        Verdict::Invalid { .. } => "ERR",
    };
    println!("[{mark}] {}: {verdict}", attempt.raw_code);
}

fn print_report(report: &ImportReport) {
    println!("Imported {} tickets ({:?})", report.inserted.len(), report.outcome());
    for rejection in &report.rejected {
        println!("  row {}: {}", rejection.row, rejection.reason);
    }
    for failure in &report.failed {
        println!("  row {} ({}): {}", failure.row, failure.ticket_code, failure.error);
    }
}

fn print_dashboard(snapshot: &DashboardSnapshot) {
    let stats = &snapshot.stats;
    println!(
        "\nTotal: {}  Checked in: {}  Not checked in: {}  ({:.0}%)",
        stats.total,
        stats.checked_in,
        stats.not_checked_in,
        snapshot.check_in_rate() * 100.0
    );
    for ticket in snapshot.checked_in() {
        let at = ticket
            .checked_in_at
            .map(|at| at.format("%H:%M:%S").to_string())
            .unwrap_or_default();
        println!("  [x] {at}  {:<24} {}", ticket.attendee_name, ticket.ticket_code);
    }
    for ticket in snapshot.not_checked_in() {
        println!("  [ ]           {:<24} {}", ticket.attendee_name, ticket.ticket_code);
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,checkin=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;
    info!(backend = %config.backend, event = %config.event_slug, "Configuration loaded");

    if let Some(addr) = config.metrics_addr {
        MetricsServer::new(addr).start()?;
    }

    let services = open_services(&config).await?;

    match cli.command {
        Command::Import { csv } => import(&services, &csv).await,
        Command::Add { code, name, event } => {
            add(&services, &config, TicketRow::new(code, name, event.unwrap_or_default())).await
        },
        Command::Scan { single_shot } => scan(&services, &config, single_shot).await,
        Command::Dashboard { watch } => dashboard(&services, watch).await,
    }
}
