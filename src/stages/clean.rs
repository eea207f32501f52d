//! Clean stage: validate raw snapshots into the clean table.
//!
//! Selects raw rows that have no clean counterpart yet, applies the
//! validation rules in [`crate::models::RawReading::validate`], and inserts
//! the survivors. Rejected rows are logged as warnings and simply never get a
//! clean counterpart; they stay visible in the raw archive. Idempotent: the
//! NOT EXISTS selection plus the (city, captured_at) conflict guard mean a
//! rerun touches nothing already cleaned.

use anyhow::Result;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::models::RawReading;

// ---

/// Upper bound on raw rows processed per run, mirroring the batch-oriented
/// design: anything beyond it is picked up by the next run.
const BATCH_LIMIT: i64 = 10_000;

/// Clean every raw row not yet represented in `clean_air_quality`.
/// Returns the number of rows cleaned (rejections excluded).
pub async fn run(pool: &PgPool) -> Result<u64> {
    // ---
    let raw_rows: Vec<RawReading> = sqlx::query_as(
        r#"
        SELECT r.city, r.captured_at, r.temperature, r.humidity, r.wind_speed,
               r.pm25, r.pm10, r.o3, r.no2, r.so2, r.co, r.aqi
        FROM raw_air_quality r
        WHERE NOT EXISTS (
            SELECT 1 FROM clean_air_quality c
            WHERE c.city = r.city AND c.captured_at = r.captured_at
        )
        ORDER BY r.captured_at
        LIMIT $1
        "#,
    )
    .bind(BATCH_LIMIT)
    .fetch_all(pool)
    .await?;

    info!("Found {} new raw rows to clean", raw_rows.len());

    let mut cleaned: u64 = 0;
    let mut rejected: u64 = 0;

    for raw in &raw_rows {
        // ---
        let clean = match raw.validate() {
            Ok(clean) => clean,
            Err(reason) => {
                warn!(
                    "Rejected raw reading ({} at {}): {}",
                    raw.city, raw.captured_at, reason
                );
                rejected += 1;
                continue;
            }
        };

        sqlx::query(
            r#"
            INSERT INTO clean_air_quality (
                city, captured_at, pm25, pm10, o3, no2, so2, co,
                aqi, temperature, humidity
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (city, captured_at) DO NOTHING
            "#,
        )
        .bind(&clean.city)
        .bind(clean.captured_at)
        .bind(clean.pm25)
        .bind(clean.pm10)
        .bind(clean.o3)
        .bind(clean.no2)
        .bind(clean.so2)
        .bind(clean.co)
        .bind(clean.aqi)
        .bind(clean.temperature)
        .bind(clean.humidity)
        .execute(pool)
        .await?;

        debug!("Cleaned {} at {}", clean.city, clean.captured_at);
        cleaned += 1;
    }

    info!(
        "Cleaning completed: {} cleaned, {} rejected of {} rows",
        cleaned,
        rejected,
        raw_rows.len()
    );

    Ok(cleaned)
}
