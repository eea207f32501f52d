//! Aggregate stage: collapse clean readings into daily per-city averages.
//!
//! Groups every clean reading by (city, calendar date) and upserts one
//! `daily_air_quality` row per pair. Averages ignore NULL source values; a
//! column whose readings are all NULL averages to NULL, never to zero. The
//! upsert overwrites, so recomputing a date after late-arriving readings
//! refreshes the row instead of duplicating or accumulating it.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::models::{mean, CleanReading, DailyAverage};

// ---

/// Recompute daily averages for every (city, date) pair in the clean table.
/// Returns the number of pairs upserted.
pub async fn run(pool: &PgPool) -> Result<u64> {
    // ---
    let readings: Vec<CleanReading> = sqlx::query_as(
        r#"
        SELECT city, captured_at, pm25, pm10, o3, no2, so2, co,
               aqi, temperature, humidity
        FROM clean_air_quality
        ORDER BY city, captured_at
        "#,
    )
    .fetch_all(pool)
    .await?;

    let daily = daily_averages(&readings);
    info!(
        "Aggregating {} clean readings into {} (city, date) pairs",
        readings.len(),
        daily.len()
    );

    let mut upserted: u64 = 0;
    for row in &daily {
        // ---
        sqlx::query(
            r#"
            INSERT INTO daily_air_quality (
                date, city, pm25_avg, pm10_avg, aqi_avg, temp_avg, humidity_avg
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (city, date) DO UPDATE SET
                pm25_avg     = EXCLUDED.pm25_avg,
                pm10_avg     = EXCLUDED.pm10_avg,
                aqi_avg      = EXCLUDED.aqi_avg,
                temp_avg     = EXCLUDED.temp_avg,
                humidity_avg = EXCLUDED.humidity_avg
            "#,
        )
        .bind(row.date)
        .bind(&row.city)
        .bind(row.pm25_avg)
        .bind(row.pm10_avg)
        .bind(row.aqi_avg)
        .bind(row.temp_avg)
        .bind(row.humidity_avg)
        .execute(pool)
        .await?;

        debug!("Upserted daily summary for {} on {}", row.city, row.date);
        upserted += 1;
    }

    info!("Daily aggregation completed: {} pairs", upserted);
    Ok(upserted)
}

/// Group readings by (city, date) and average each metric, NULL-aware.
///
/// Output order is deterministic (city, then date).
fn daily_averages(readings: &[CleanReading]) -> Vec<DailyAverage> {
    // ---
    let mut groups: BTreeMap<(String, NaiveDate), Vec<&CleanReading>> = BTreeMap::new();
    for reading in readings {
        groups
            .entry((reading.city.clone(), reading.captured_at.date()))
            .or_default()
            .push(reading);
    }

    groups
        .into_iter()
        .map(|((city, date), rows)| DailyAverage {
            date,
            city,
            pm25_avg: mean(rows.iter().map(|r| r.pm25)),
            pm10_avg: mean(rows.iter().map(|r| r.pm10)),
            aqi_avg: mean(rows.iter().map(|r| r.aqi)),
            temp_avg: mean(rows.iter().map(|r| r.temperature)),
            humidity_avg: mean(rows.iter().map(|r| r.humidity)),
        })
        .collect()
}
