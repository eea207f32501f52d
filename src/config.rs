//! Configuration loader for the `udara-pipeline` binary.
//!
//! This module centralizes all runtime configuration values and their defaults.
//! Secrets (database URL, provider API key) come from environment variables
//! (with optional `.env` file support provided by the caller); declarative
//! settings (monitored cities, provider endpoint, staging path, city→province
//! map) come from a TOML file loaded once at startup. By consolidating
//! configuration logic here, we avoid scattering `env::var` calls throughout
//! the codebase.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the run. Stages receive a reference to this
/// value explicitly; nothing reads ambient global state after startup.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// WeatherAPI key. Optional at startup: only the ingest stage needs it,
    /// and the other stages must be runnable without one.
    pub api_key: Option<String>,

    /// Declarative settings from the TOML file.
    pub settings: Settings,
}

/// Contents of the pipeline settings file (`config/pipeline.toml`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // ---
    /// Cities monitored every run.
    pub cities: Vec<String>,

    /// Weather/air-quality provider settings.
    pub api: ApiSettings,

    /// Directory where fetched raw payloads are staged before loading.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Correlation analysis settings.
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// City name → province name, used by the correlation joiner to attach
    /// ISPA prevalence. Cities missing here are skipped with a warning.
    #[serde(default)]
    pub provinces: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    // ---
    /// Provider endpoint for current conditions (WeatherAPI `current.json`).
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Whether to request the air-quality block alongside weather.
    #[serde(default = "default_true")]
    pub aqi: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisSettings {
    // ---
    /// Recency window (days of daily averages) fed into the yearly per-city
    /// means. Absent means full history.
    pub window_days: Option<u32>,
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// Load configuration from environment variables and the settings file.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `WEATHER_API_KEY` – provider API key (required by the ingest stage only)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
///
/// Returns an error if a required variable is missing, the settings file does
/// not exist or fails to parse, or the monitored-cities list is empty.
pub fn load(settings_path: &Path) -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let api_key = env::var("WEATHER_API_KEY").ok().filter(|k| !k.is_empty());

    let settings = load_settings(settings_path)?;

    Ok(Config {
        db_url,
        db_pool_max,
        api_key,
        settings,
    })
}

/// Parse and validate the TOML settings file.
fn load_settings(path: &Path) -> Result<Settings> {
    // ---
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Settings file not found: {}", path.display()))?;

    let settings: Settings = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse settings file {}", path.display()))?;

    if settings.cities.is_empty() {
        return Err(anyhow!(
            "Settings file {} lists no cities to monitor",
            path.display()
        ));
    }

    Ok(settings)
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information (database password, API key) while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        // Mask the password in the database URL for security
        let masked_db_url = if let Some(at_pos) = self.db_url.rfind('@') {
            if let Some(colon_pos) = self.db_url[..at_pos].rfind(':') {
                format!(
                    "{}:****{}",
                    &self.db_url[..colon_pos],
                    &self.db_url[at_pos..]
                )
            } else {
                self.db_url.clone()
            }
        } else {
            self.db_url.clone()
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL    : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX     : {}", self.db_pool_max);
        tracing::info!(
            "  WEATHER_API_KEY : {}",
            if self.api_key.is_some() { "****" } else { "(unset)" }
        );
        tracing::info!("  API base URL    : {}", self.settings.api.base_url);
        tracing::info!("  API timeout     : {}s", self.settings.api.timeout_secs);
        tracing::info!("  Staging dir     : {}", self.settings.staging_dir.display());
        tracing::info!("  Cities          : {}", self.settings.cities.len());
        tracing::info!("  Province map    : {} entries", self.settings.provinces.len());
        match self.settings.analysis.window_days {
            Some(days) => tracing::info!("  Analysis window : last {} days", days),
            None => tracing::info!("  Analysis window : full history"),
        }
    }
}
