//! Ingest stage: fetch current conditions per city and stage the raw payload.
//!
//! One GET per configured city against the WeatherAPI `current.json` endpoint,
//! with a bounded timeout. Successful payloads are written verbatim to the
//! staging directory, named by city and capture time, for the load stage to
//! pick up. A failing city never aborts the batch; there is no in-run retry —
//! the next scheduled run is the retry mechanism.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::Config;

// ---

/// Fetch and stage every configured city. Returns the number staged.
///
/// Fails only on infrastructure-level problems (no API key, staging directory
/// not writable); per-city HTTP errors, timeouts, and malformed payloads are
/// logged and skipped.
pub async fn run(config: &Config) -> Result<u64> {
    // ---
    let api_key = config
        .api_key
        .as_deref()
        .ok_or_else(|| anyhow!("WEATHER_API_KEY must be set to run the ingest stage"))?;

    let staging_dir = &config.settings.staging_dir;
    tokio::fs::create_dir_all(staging_dir)
        .await
        .with_context(|| format!("Cannot create staging dir {}", staging_dir.display()))?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.settings.api.timeout_secs))
        .build()?;

    info!(
        "Ingesting {} cities from {}",
        config.settings.cities.len(),
        config.settings.api.base_url
    );

    let mut staged: u64 = 0;
    let mut failed_cities: Vec<&str> = Vec::new();

    for city in &config.settings.cities {
        // ---
        let payload = match fetch_city(&client, &config.settings.api.base_url, api_key, city, config.settings.api.aqi).await {
            Ok(payload) => payload,
            Err(e) => {
                error!("Fetch failed for {}: {:#}", city, e);
                failed_cities.push(city);
                continue;
            }
        };

        let file_name = staging_filename(city, chrono::Local::now().naive_local());
        let path = staging_dir.join(&file_name);
        let bytes = serde_json::to_vec_pretty(&payload)?;

        match tokio::fs::write(&path, bytes).await {
            Ok(()) => {
                info!("Staged {}", path.display());
                staged += 1;
            }
            Err(e) => {
                error!("Failed to stage {}: {}", path.display(), e);
                failed_cities.push(city);
            }
        }
    }

    info!(
        "Ingestion completed: {}/{} cities staged",
        staged,
        config.settings.cities.len()
    );
    if !failed_cities.is_empty() {
        warn!("Failed cities: {}", failed_cities.join(", "));
    }

    Ok(staged)
}

/// One request, one attempt. The payload is kept opaque beyond a sanity check
/// that the `location` and `current` sections exist.
async fn fetch_city(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    city: &str,
    aqi: bool,
) -> Result<Value> {
    // ---
    debug!("Fetching data for {}...", city);

    let response = client
        .get(base_url)
        .query(&[
            ("key", api_key),
            ("q", city),
            ("aqi", if aqi { "yes" } else { "no" }),
        ])
        .send()
        .await?
        .error_for_status()?;

    let payload: Value = response.json().await?;

    if !looks_like_weather_payload(&payload) {
        return Err(anyhow!("response missing location/current sections"));
    }

    Ok(payload)
}

/// Cheap structural guard before anything touches disk. Full schema
/// validation happens in the load stage.
fn looks_like_weather_payload(payload: &Value) -> bool {
    payload.get("location").is_some() && payload.get("current").is_some()
}

/// Staged artifact name: `{city}_{YYYYmmdd_HHMMSS}.json`.
fn staging_filename(city: &str, at: NaiveDateTime) -> String {
    format!("{}_{}.json", city, at.format("%Y%m%d_%H%M%S"))
}
