//! Database schema management for `udara-pipeline`.
//!
//! Ensures the five pipeline tables and their indexes exist before any stage
//! runs. Applied once at startup from `main.rs`.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the database schema if it does not exist (idempotent).
///
/// Tables, in pipeline order:
/// - `raw_air_quality`   – append-only archive of provider snapshots
/// - `clean_air_quality` – validated readings, one per raw row at most
/// - `daily_air_quality` – per (city, date) averages
/// - `ispa_province`     – static prevalence reference, seeded separately
/// - `city_ispa_joined`  – final per-city analysis consumed by the dashboard
///
/// Safe to call on every startup; no-op if objects already exist. Errors are
/// propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS raw_air_quality (
            id          SERIAL PRIMARY KEY,
            city        TEXT      NOT NULL,
            captured_at TIMESTAMP NOT NULL,
            temperature DOUBLE PRECISION,
            humidity    DOUBLE PRECISION,
            wind_speed  DOUBLE PRECISION,
            pm25        DOUBLE PRECISION,
            pm10        DOUBLE PRECISION,
            o3          DOUBLE PRECISION,
            no2         DOUBLE PRECISION,
            so2         DOUBLE PRECISION,
            co          DOUBLE PRECISION,
            aqi         INTEGER,
            raw_json    JSONB,
            source_file TEXT,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (city, captured_at)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clean_air_quality (
            id          SERIAL PRIMARY KEY,
            city        TEXT      NOT NULL,
            captured_at TIMESTAMP NOT NULL,
            pm25        DOUBLE PRECISION,
            pm10        DOUBLE PRECISION,
            o3          DOUBLE PRECISION,
            no2         DOUBLE PRECISION,
            so2         DOUBLE PRECISION,
            co          DOUBLE PRECISION,
            aqi         DOUBLE PRECISION,
            temperature DOUBLE PRECISION,
            humidity    DOUBLE PRECISION,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (city, captured_at)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS daily_air_quality (
            id           SERIAL PRIMARY KEY,
            date         DATE NOT NULL,
            city         TEXT NOT NULL,
            pm25_avg     DOUBLE PRECISION,
            pm10_avg     DOUBLE PRECISION,
            aqi_avg      DOUBLE PRECISION,
            temp_avg     DOUBLE PRECISION,
            humidity_avg DOUBLE PRECISION,
            created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (city, date)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ispa_province (
            id              SERIAL PRIMARY KEY,
            province        TEXT NOT NULL UNIQUE,
            prevalence_2023 DOUBLE PRECISION,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS city_ispa_joined (
            id              SERIAL PRIMARY KEY,
            city            TEXT NOT NULL UNIQUE,
            province        TEXT NOT NULL,
            pm25_yearly     DOUBLE PRECISION,
            pm10_yearly     DOUBLE PRECISION,
            aqi_yearly      DOUBLE PRECISION,
            temp_yearly     DOUBLE PRECISION,
            humidity_yearly DOUBLE PRECISION,
            prevalence_2023 DOUBLE PRECISION,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Basic indexes for the per-stage scans
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_raw_city_captured_at
            ON raw_air_quality (city, captured_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_clean_city_captured_at
            ON clean_air_quality (city, captured_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_daily_city_date
            ON daily_air_quality (city, date);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
