//! One-shot seeding of the `ispa_province` reference table.
//!
//! ISPA (acute respiratory infection) prevalence per Indonesian province,
//! 2023 national health survey. The pipeline only ever reads this table; the
//! `seed-ispa` subcommand writes it, idempotently, so re-seeding after a
//! dataset correction is safe.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

// ---

/// (province, prevalence_2023) reference dataset.
const PROVINCE_PREVALENCE: &[(&str, f64)] = &[
    ("Aceh", 1.4),
    ("Sumatera Utara", 0.5),
    ("Sumatera Barat", 1.8),
    ("Riau", 0.8),
    ("Jambi", 0.9),
    ("Sumatera Selatan", 1.7),
    ("Bengkulu", 1.9),
    ("Lampung", 1.9),
    ("Bangka Belitung", 0.6),
    ("Kepulauan Riau", 1.0),
    ("DKI Jakarta", 2.6),
    ("Jawa Barat", 2.2),
    ("Jawa Tengah", 2.5),
    ("DI Yogyakarta", 0.9),
    ("Jawa Timur", 3.2),
    ("Banten", 3.6),
    ("Bali", 2.1),
    ("Nusa Tenggara Barat", 1.9),
    ("Nusa Tenggara Timur", 3.1),
    ("Kalimantan Barat", 1.0),
    ("Kalimantan Tengah", 1.3),
    ("Kalimantan Selatan", 0.7),
    ("Kalimantan Timur", 1.3),
    ("Kalimantan Utara", 1.0),
    ("Sulawesi Utara", 1.3),
    ("Sulawesi Tengah", 0.9),
    ("Sulawesi Selatan", 0.4),
    ("Sulawesi Tenggara", 0.6),
    ("Gorontalo", 0.5),
    ("Sulawesi Barat", 0.4),
    ("Maluku", 1.0),
    ("Maluku Utara", 1.2),
    ("Papua Barat", 2.3),
    ("Papua Barat Daya", 2.7),
    ("Papua", 4.9),
    ("Papua Selatan", 3.6),
    ("Papua Tengah", 18.8),
    ("Papua Pegunungan", 10.7),
];

/// Upsert the full province prevalence dataset.
///
/// Returns the number of provinces written.
pub async fn seed_ispa(pool: &PgPool) -> Result<usize> {
    // ---
    let mut tx = pool.begin().await?;

    for (province, prevalence) in PROVINCE_PREVALENCE {
        sqlx::query(
            r#"
            INSERT INTO ispa_province (province, prevalence_2023)
            VALUES ($1, $2)
            ON CONFLICT (province) DO UPDATE SET
                prevalence_2023 = EXCLUDED.prevalence_2023
            "#,
        )
        .bind(province)
        .bind(prevalence)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        "Seeded ISPA prevalence for {} provinces",
        PROVINCE_PREVALENCE.len()
    );
    Ok(PROVINCE_PREVALENCE.len())
}
