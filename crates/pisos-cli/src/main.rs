//! pisos operator binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and runs one of:
//!
//! - `reconcile <snapshot.ndjson>` — one reconciliation pass over a snapshot
//!   file (one JSON record per line, as produced by the scraper), followed by
//!   the staleness sweep unless `--no-sweep` is given;
//! - `sweep` — the staleness sweep on its own;
//! - `stats` — headline store statistics;
//! - `serve` — the read-only JSON API for the dashboard.

use std::{
  fs::File,
  io::{BufRead as _, BufReader},
  path::PathBuf,
  sync::Arc,
};

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pisos_core::{
  listing::ListingStatus,
  reconcile::run_pass,
  snapshot::SnapshotRecord,
  store::{ListingStore as _, StatsFilter},
  sweep::{DEFAULT_DAYS_THRESHOLD, sweep_stale},
};
use pisos_store_sqlite::SqliteStore;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "pisos real-estate listing tracker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run one reconciliation pass over a snapshot file, then sweep.
  Reconcile {
    /// NDJSON snapshot: one observed listing record per line.
    snapshot: PathBuf,

    /// Pass date; defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Skip the staleness sweep after the pass.
    #[arg(long)]
    no_sweep: bool,
  },

  /// Run the staleness sweep on its own.
  Sweep {
    /// Sweep date; defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
  },

  /// Print headline store statistics.
  Stats,

  /// Serve the read-only JSON API.
  Serve,
}

#[derive(Debug, Clone, Deserialize)]
struct Settings {
  #[serde(default = "default_store_path")]
  store_path:     String,
  #[serde(default = "default_days_threshold")]
  days_threshold: u32,
  #[serde(default = "default_host")]
  host:           String,
  #[serde(default = "default_port")]
  port:           u16,
}

fn default_store_path() -> String { "pisos.db".to_owned() }
fn default_days_threshold() -> u32 { DEFAULT_DAYS_THRESHOLD }
fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8080 }

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("PISOS"))
    .build()
    .context("failed to read config file")?;

  let settings: Settings = settings
    .try_deserialize()
    .context("failed to deserialise Settings")?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| {
      format!("failed to open store at {:?}", settings.store_path)
    })?;

  match cli.command {
    Command::Reconcile { snapshot, date, no_sweep } => {
      let today = date.unwrap_or_else(|| chrono::Utc::now().date_naive());
      let records = read_snapshot(&snapshot)?;

      let summary = match run_pass(&store, today, records).await {
        Ok(summary) => summary,
        Err(aborted) => {
          tracing::error!(
            applied = aborted.partial.mutated(),
            "pass aborted; mutations already applied remain committed"
          );
          return Err(aborted.into());
        }
      };

      if !no_sweep {
        sweep_stale(&store, today, settings.days_threshold).await?;
      }

      tracing::info!(
        inserted = summary.inserted,
        updated = summary.updated_no_price_change,
        price_changed = summary.price_changed,
        reactivated = summary.reactivated,
        rejected = summary.rejected,
        failed = summary.failed.len(),
        "reconcile finished"
      );
    }

    Command::Sweep { date } => {
      let today = date.unwrap_or_else(|| chrono::Utc::now().date_naive());
      sweep_stale(&store, today, settings.days_threshold).await?;
    }

    Command::Stats => {
      // Counts cover everything; the means are over active listings.
      let filter = StatsFilter {
        status:    Some(ListingStatus::Active),
        districts: Vec::new(),
      };
      let stats = store.stats(&filter).await?;
      println!("Active listings:  {}", stats.active_count);
      println!("Sold/removed:     {}", stats.sold_count);
      match stats.mean_price {
        Some(p) => println!("Average price:    {p:.2} EUR"),
        None => println!("Average price:    no data"),
      }
      match stats.mean_price_per_sqm {
        Some(p) => println!("Average EUR/m2:   {p:.2}"),
        None => println!("Average EUR/m2:   no data"),
      }
    }

    Command::Serve => {
      let app = axum::Router::new()
        .nest("/api", pisos_api::api_router(Arc::new(store)))
        .layer(TraceLayer::new_for_http());

      let address = format!("{}:{}", settings.host, settings.port);
      tracing::info!("listening on http://{address}");
      let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
      axum::serve(listener, app).await.context("server error")?;
    }
  }

  Ok(())
}

/// Read an NDJSON snapshot file. Unparseable lines are logged and skipped,
/// mirroring how the engine treats malformed records: the pass goes on.
fn read_snapshot(path: &PathBuf) -> anyhow::Result<Vec<SnapshotRecord>> {
  let file = File::open(path)
    .with_context(|| format!("failed to open snapshot {path:?}"))?;

  let mut records = Vec::new();
  let mut skipped = 0usize;
  for (lineno, line) in BufReader::new(file).lines().enumerate() {
    let line = line.context("failed to read snapshot line")?;
    if line.trim().is_empty() {
      continue;
    }
    match serde_json::from_str::<SnapshotRecord>(&line) {
      Ok(record) => records.push(record),
      Err(e) => {
        tracing::warn!(line = lineno + 1, error = %e, "skipping unparseable snapshot line");
        skipped += 1;
      }
    }
  }

  tracing::info!(records = records.len(), skipped, "snapshot loaded");
  Ok(records)
}
