//! Application entry point for the `udara-pipeline` binary.
//!
//! This binary orchestrates the full startup sequence for the air-quality
//! ETL pipeline, including:
//! - Loading configuration from environment variables, `.env`, and the TOML
//!   settings file
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool
//! - Creating the database schema if it does not exist
//! - Dispatching the requested work: the full five-stage pipeline (default),
//!   a single stage, or the ISPA reference seed
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `WEATHER_API_KEY` (optional) – provider key, required by the ingest stage
//! - `DB_POOL_MAX` (optional) – maximum number of DB connections (default: 5)
//! - `PIPELINE_CONFIG` (optional) – settings file path (default: `config/pipeline.toml`)
//! - `PIPELINE_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `PIPELINE_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! Exit code is 0 only when every requested stage completes.
use std::{env, io::IsTerminal, path::PathBuf};

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

use udara_pipeline::{config, schema, seed, stages};

// ---

/// Command-line surface: bare invocation runs the full pipeline; subcommands
/// run a single stage for manual or partial runs.
#[derive(Parser, Debug)]
#[command(name = "udara-pipeline")]
#[command(about = "Air-quality ETL pipeline with ISPA correlation")]
#[command(version)]
struct Args {
    /// Path to the pipeline settings file
    #[arg(short, long, default_value = "config/pipeline.toml", env = "PIPELINE_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch provider data for every configured city into the staging area
    Ingest,
    /// Load staged artifacts into the raw archive table
    Load,
    /// Validate raw rows into the clean table
    Clean,
    /// Recompute daily per-city averages
    Aggregate,
    /// Rebuild the city-ISPA correlation table
    Analyze,
    /// Seed the ISPA province prevalence reference table
    SeedIspa,
}

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let args = Args::parse();

    let cfg = config::load(&args.config)?;
    cfg.log_config();

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    match args.command {
        None => {
            let outcomes = stages::run_pipeline(&cfg, &pool).await;
            if !stages::succeeded(&outcomes) {
                std::process::exit(1);
            }
        }
        Some(Command::Ingest) => {
            stages::ingest::run(&cfg).await?;
        }
        Some(Command::Load) => {
            stages::load::run(&cfg, &pool).await?;
        }
        Some(Command::Clean) => {
            stages::clean::run(&pool).await?;
        }
        Some(Command::Aggregate) => {
            stages::aggregate::run(&pool).await?;
        }
        Some(Command::Analyze) => {
            stages::analyze::run(&cfg, &pool).await?;
        }
        Some(Command::SeedIspa) => {
            seed::seed_ispa(&pool).await?;
        }
    }

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `PIPELINE_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `PIPELINE_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked. It installs the subscriber globally
/// for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("PIPELINE_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to PIPELINE_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("PIPELINE_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
