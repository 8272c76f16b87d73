//! Telemetry CLI - batch ingestion and stats queries against the SQLite store
//!
//! Usage:
//!   telemetry_cli ingest <batch.json>
//!   telemetry_cli machine-stats <machineId> <start> <end>
//!   telemetry_cli top-defect-lines <factoryId> <from> <to> <limit>
//!
//! Instants are RFC 3339 (e.g. 2026-01-15T10:00:00Z). Results are printed to
//! stdout as JSON; logs go to stderr.
//!
//! Environment variables:
//!   TELEMETRY_DB_PATH - SQLite database path (default: machine_telemetry.db)
//!   TELEMETRY_MAX_BATCH_SIZE - events per batch (default: 10000)
//!   TELEMETRY_SQLITE_BUSY_TIMEOUT_MS - lock wait (default: 5000)
//!   RUST_LOG - log filter (default: info)

use chrono::{DateTime, Utc};
use dotenv::dotenv;
use log::{error, info};
use machine_telemetry::{
    BatchReconciler, EventStore, MachineEvent, SqliteEventStore, StatsAggregator, TelemetryConfig,
};
use std::env;
use std::fs;
use std::sync::Arc;

const USAGE: &str = "usage:
  telemetry_cli ingest <batch.json>
  telemetry_cli machine-stats <machineId> <start> <end>
  telemetry_cli top-defect-lines <factoryId> <from> <to> <limit>";

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn parse_instant(value: &str) -> CliResult<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .map_err(|e| format!("invalid instant '{}': {}", value, e))?;
    Ok(parsed.with_timezone(&Utc))
}

fn arg<'a>(args: &'a [String], idx: usize) -> CliResult<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| USAGE.into())
}

fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

enum Command {
    Ingest {
        events: Vec<MachineEvent>,
    },
    MachineStats {
        machine_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    TopDefectLines {
        factory_id: String,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    },
}

/// Parse and check arguments; nothing touches the database here
fn parse_command(args: &[String]) -> CliResult<Command> {
    match arg(args, 1)? {
        "ingest" => {
            let path = arg(args, 2)?;
            let json = fs::read_to_string(path)?;
            let events: Vec<MachineEvent> = serde_json::from_str(&json)?;
            info!("📥 Submitting {} events from {}", events.len(), path);
            Ok(Command::Ingest { events })
        }
        "machine-stats" => Ok(Command::MachineStats {
            machine_id: arg(args, 2)?.to_string(),
            start: parse_instant(arg(args, 3)?)?,
            end: parse_instant(arg(args, 4)?)?,
        }),
        "top-defect-lines" => Ok(Command::TopDefectLines {
            factory_id: arg(args, 2)?.to_string(),
            from: parse_instant(arg(args, 3)?)?,
            to: parse_instant(arg(args, 4)?)?,
            limit: arg(args, 5)?
                .parse()
                .map_err(|e| format!("invalid limit: {}", e))?,
        }),
        other => Err(format!("unknown command '{}'\n{}", other, USAGE).into()),
    }
}

async fn run(command: Command, config: &TelemetryConfig) -> CliResult<()> {
    let store: Arc<dyn EventStore> = Arc::new(SqliteEventStore::from_config(config)?);

    match command {
        Command::Ingest { events } => {
            let reconciler = BatchReconciler::from_config(store, config);
            let outcome = reconciler.submit_batch(events, Utc::now()).await?;

            info!(
                "✅ accepted={} updated={} deduped={} rejected={}",
                outcome.accepted, outcome.updated, outcome.deduped, outcome.rejected
            );
            print_json(&outcome)
        }
        Command::MachineStats {
            machine_id,
            start,
            end,
        } => {
            let stats = StatsAggregator::new(store)
                .machine_stats(&machine_id, start, end)
                .await?;
            print_json(&stats)
        }
        Command::TopDefectLines {
            factory_id,
            from,
            to,
            limit,
        } => {
            let ranking = StatsAggregator::new(store)
                .top_defect_lines(&factory_id, from, to, limit)
                .await?;
            print_json(&ranking)
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = TelemetryConfig::from_env();
    info!("🔧 Database: {}", config.db_path);

    let args: Vec<String> = env::args().collect();
    let result = match parse_command(&args) {
        Ok(command) => run(command, &config).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        error!("❌ {}", e);
        std::process::exit(1);
    }
}
