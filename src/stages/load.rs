//! Load stage: move staged artifacts into the raw archive table.
//!
//! Scans the staging directory, parses each artifact against the provider
//! schema, and inserts one `raw_air_quality` row per snapshot. Duplicate
//! (city, captured_at) pairs are skipped via `ON CONFLICT DO NOTHING`, which
//! makes re-running over the same staging directory a no-op. Unparseable
//! artifacts are logged and left in place for operator inspection; they are
//! never fatal to the batch.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{RawReading, WeatherPayload};

// ---

/// Load all staged artifacts not yet present in `raw_air_quality`.
/// Returns the number of rows inserted (skips excluded).
pub async fn run(config: &Config, pool: &PgPool) -> Result<u64> {
    // ---
    let staging_dir = &config.settings.staging_dir;

    if !staging_dir.exists() {
        warn!("Staging dir {} does not exist, nothing to load", staging_dir.display());
        return Ok(0);
    }

    let mut files: Vec<_> = std::fs::read_dir(staging_dir)
        .with_context(|| format!("Cannot read staging dir {}", staging_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    info!("Found {} staged artifacts", files.len());

    let mut inserted: u64 = 0;
    let mut skipped: u64 = 0;
    let mut malformed: u64 = 0;

    for path in &files {
        // ---
        let source_file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (reading, raw_json) = match parse_artifact(path).await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Skipping malformed artifact {}: {:#}", source_file, e);
                malformed += 1;
                continue;
            }
        };

        let result = sqlx::query(
            r#"
            INSERT INTO raw_air_quality (
                city, captured_at, temperature, humidity, wind_speed,
                pm25, pm10, o3, no2, so2, co, aqi, raw_json, source_file
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (city, captured_at) DO NOTHING
            "#,
        )
        .bind(&reading.city)
        .bind(reading.captured_at)
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.wind_speed)
        .bind(reading.pm25)
        .bind(reading.pm10)
        .bind(reading.o3)
        .bind(reading.no2)
        .bind(reading.so2)
        .bind(reading.co)
        .bind(reading.aqi)
        .bind(&raw_json)
        .bind(&source_file)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(
                "[SKIP] {} at {} already loaded ({})",
                reading.city, reading.captured_at, source_file
            );
            skipped += 1;
        } else {
            info!("Loaded {} ({} at {})", source_file, reading.city, reading.captured_at);
            inserted += 1;
        }
    }

    info!(
        "Load completed: {} inserted, {} duplicates skipped, {} malformed of {} artifacts",
        inserted,
        skipped,
        malformed,
        files.len()
    );

    Ok(inserted)
}

/// Parse one staged artifact into a raw-table candidate plus the original
/// payload for the `raw_json` archive column.
async fn parse_artifact(path: &std::path::Path) -> Result<(RawReading, serde_json::Value)> {
    // ---
    let bytes = tokio::fs::read(path).await.context("read failed")?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).context("not valid JSON")?;
    let payload: WeatherPayload =
        serde_json::from_value(value.clone()).context("unexpected payload shape")?;
    let reading = payload.extract()?;
    Ok((reading, value))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn parses_a_staged_artifact() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Jakarta_20250601_143000.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "location": { "name": "Jakarta", "localtime": "2025-06-01 14:30" },
                "current": {
                    "temp_c": 31.2,
                    "humidity": 70,
                    "wind_kph": 11.5,
                    "air_quality": { "pm2_5": 42.1, "us-epa-index": 3 }
                }
            })
            .to_string(),
        )
        .unwrap();

        let (reading, raw_json) = parse_artifact(&path).await.unwrap();
        assert_eq!(reading.city, "Jakarta");
        assert_eq!(reading.pm25, Some(42.1));
        assert_eq!(reading.pm10, None);
        assert_eq!(reading.aqi, Some(3));
        assert_eq!(raw_json["location"]["name"], "Jakarta");
    }

    #[tokio::test]
    async fn rejects_non_json_artifact() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.json");
        std::fs::write(&path, "not json at all").unwrap();
        assert!(parse_artifact(&path).await.is_err());
    }

    #[tokio::test]
    async fn rejects_payload_without_current_section() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "location": { "name": "Jakarta", "localtime": "2025-06-01 14:30" }
            })
            .to_string(),
        )
        .unwrap();
        assert!(parse_artifact(&path).await.is_err());
    }
}
