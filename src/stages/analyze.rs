//! Analyze stage: join yearly per-city averages with ISPA prevalence.
//!
//! Takes every city with at least one daily average, means its daily columns
//! over the configured window (full history when no window is set), resolves
//! the city's province through the configured map, attaches that province's
//! ISPA prevalence, and upserts one `city_ispa_joined` row per city. A city
//! without a province mapping is skipped with a warning; a province without a
//! prevalence row yields NULL prevalence — neither aborts the run.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{mean, CityAnalysis, DailyAverage};

// ---

/// Build the final analysis table. Returns the number of cities upserted.
pub async fn run(config: &Config, pool: &PgPool) -> Result<u64> {
    // ---
    let daily = fetch_daily(pool, config.settings.analysis.window_days).await?;
    info!("Found {} daily rows to analyze", daily.len());

    let prevalence: HashMap<String, Option<f64>> =
        sqlx::query_as::<_, (String, Option<f64>)>(
            "SELECT province, prevalence_2023 FROM ispa_province",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();

    let analyses = analyze_cities(&daily, &config.settings.provinces, &prevalence);

    let mut upserted: u64 = 0;
    for analysis in &analyses {
        // ---
        sqlx::query(
            r#"
            INSERT INTO city_ispa_joined (
                city, province, pm25_yearly, pm10_yearly, aqi_yearly,
                temp_yearly, humidity_yearly, prevalence_2023
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (city) DO UPDATE SET
                province        = EXCLUDED.province,
                pm25_yearly     = EXCLUDED.pm25_yearly,
                pm10_yearly     = EXCLUDED.pm10_yearly,
                aqi_yearly      = EXCLUDED.aqi_yearly,
                temp_yearly     = EXCLUDED.temp_yearly,
                humidity_yearly = EXCLUDED.humidity_yearly,
                prevalence_2023 = EXCLUDED.prevalence_2023,
                updated_at      = now()
            "#,
        )
        .bind(&analysis.city)
        .bind(&analysis.province)
        .bind(analysis.pm25_yearly)
        .bind(analysis.pm10_yearly)
        .bind(analysis.aqi_yearly)
        .bind(analysis.temp_yearly)
        .bind(analysis.humidity_yearly)
        .bind(analysis.prevalence_2023)
        .execute(pool)
        .await?;

        debug!("Upserted analysis for {}", analysis.city);
        upserted += 1;
    }

    info!("City-ISPA join completed: {} cities", upserted);
    Ok(upserted)
}

/// Fetch daily averages, limited to the recency window when one is set.
async fn fetch_daily(pool: &PgPool, window_days: Option<u32>) -> Result<Vec<DailyAverage>> {
    // ---
    let rows = match window_days {
        Some(days) => {
            sqlx::query_as(
                r#"
                SELECT date, city, pm25_avg, pm10_avg, aqi_avg, temp_avg, humidity_avg
                FROM daily_air_quality
                WHERE date >= CURRENT_DATE - $1::int
                ORDER BY city, date
                "#,
            )
            .bind(days as i32)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                r#"
                SELECT date, city, pm25_avg, pm10_avg, aqi_avg, temp_avg, humidity_avg
                FROM daily_air_quality
                ORDER BY city, date
                "#,
            )
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

/// Pure join: per-city means over daily rows, province resolution, prevalence
/// lookup. Cities absent from the province map are dropped (with a warning);
/// provinces absent from the prevalence table yield NULL prevalence.
fn analyze_cities(
    daily: &[DailyAverage],
    provinces: &BTreeMap<String, String>,
    prevalence: &HashMap<String, Option<f64>>,
) -> Vec<CityAnalysis> {
    // ---
    let mut by_city: BTreeMap<&str, Vec<&DailyAverage>> = BTreeMap::new();
    for row in daily {
        by_city.entry(row.city.as_str()).or_default().push(row);
    }

    let mut analyses = Vec::with_capacity(by_city.len());
    for (city, rows) in by_city {
        // ---
        let Some(province) = provinces.get(city) else {
            warn!("City '{}' not found in province mapping, skipping", city);
            continue;
        };

        let prevalence_2023 = match prevalence.get(province) {
            Some(value) => *value,
            None => {
                warn!(
                    "No ISPA prevalence for province '{}' (city '{}'), storing NULL",
                    province, city
                );
                None
            }
        };

        analyses.push(CityAnalysis {
            city: city.to_string(),
            province: province.clone(),
            pm25_yearly: mean(rows.iter().map(|r| r.pm25_avg)),
            pm10_yearly: mean(rows.iter().map(|r| r.pm10_avg)),
            aqi_yearly: mean(rows.iter().map(|r| r.aqi_avg)),
            temp_yearly: mean(rows.iter().map(|r| r.temp_avg)),
            humidity_yearly: mean(rows.iter().map(|r| r.humidity_avg)),
            prevalence_2023,
        });
    }

    analyses
}
