//! Data models for the air-quality pipeline.
//!
//! Three families of types live here:
//! - the expected shape of the provider payload (`WeatherPayload` and friends),
//!   deserialized strictly so that a missing section is a data-quality
//!   rejection rather than a runtime surprise;
//! - row types for the pipeline tables (`RawReading`, `CleanReading`,
//!   `DailyAverage`, `CityAnalysis`);
//! - the validation and averaging rules shared by the transform stages.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

// ---

/// Format of `location.localtime` in WeatherAPI responses.
pub const LOCALTIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Provider response for one city: current conditions plus the optional
/// air-quality block.
#[derive(Debug, Deserialize)]
pub struct WeatherPayload {
    // ---
    pub location: Location,
    pub current: Current,
}

#[derive(Debug, Deserialize)]
pub struct Location {
    // ---
    pub name: String,
    pub localtime: String,
}

#[derive(Debug, Deserialize)]
pub struct Current {
    // ---
    pub temp_c: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_kph: Option<f64>,
    #[serde(default)]
    pub air_quality: Option<AirQuality>,
}

/// Pollutant block, using the provider's key spellings.
#[derive(Debug, Default, Deserialize)]
pub struct AirQuality {
    // ---
    #[serde(rename = "pm2_5")]
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    #[serde(rename = "us-epa-index")]
    pub us_epa_index: Option<i32>,
}

impl WeatherPayload {
    /// Extract a raw-table candidate from the payload.
    ///
    /// Fails if the city name is blank or the local timestamp does not match
    /// the provider's `%Y-%m-%d %H:%M` format; either makes the snapshot
    /// unusable downstream. Pollutants absent from the payload stay `None`.
    pub fn extract(&self) -> anyhow::Result<RawReading> {
        // ---
        let city = self.location.name.trim();
        if city.is_empty() {
            anyhow::bail!("payload has no city name");
        }

        let captured_at = NaiveDateTime::parse_from_str(&self.location.localtime, LOCALTIME_FORMAT)
            .map_err(|e| {
                anyhow::anyhow!("bad localtime '{}': {}", self.location.localtime, e)
            })?;

        let aq = self.current.air_quality.as_ref();

        Ok(RawReading {
            city: city.to_string(),
            captured_at,
            temperature: self.current.temp_c,
            humidity: self.current.humidity,
            wind_speed: self.current.wind_kph,
            pm25: aq.and_then(|a| a.pm25),
            pm10: aq.and_then(|a| a.pm10),
            o3: aq.and_then(|a| a.o3),
            no2: aq.and_then(|a| a.no2),
            so2: aq.and_then(|a| a.so2),
            co: aq.and_then(|a| a.co),
            aqi: aq.and_then(|a| a.us_epa_index),
        })
    }
}

// ---

/// One snapshot in `raw_air_quality`, unique per (city, captured_at).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawReading {
    // ---
    pub city: String,
    pub captured_at: NaiveDateTime,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    pub aqi: Option<i32>,
}

/// Why a raw reading was refused by the cleaner.
#[derive(Debug, PartialEq)]
pub enum RejectReason {
    MissingCity,
    /// A present numeric field was negative, NaN, or infinite.
    InvalidField { field: &'static str, value: f64 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::MissingCity => write!(f, "city missing"),
            RejectReason::InvalidField { field, value } => {
                write!(f, "field {} has invalid value {}", field, value)
            }
        }
    }
}

impl RawReading {
    /// Validate and normalize into a `CleanReading`.
    ///
    /// A present numeric field must be finite and non-negative; any violation
    /// rejects the whole row. Absent fields pass through as `None` — zero is a
    /// real measurement and must stay distinguishable from missing data, so
    /// nothing is ever coerced to 0. Wind speed is not carried into the clean
    /// table.
    pub fn validate(&self) -> Result<CleanReading, RejectReason> {
        // ---
        if self.city.trim().is_empty() {
            return Err(RejectReason::MissingCity);
        }

        let checked = [
            ("pm25", self.pm25),
            ("pm10", self.pm10),
            ("o3", self.o3),
            ("no2", self.no2),
            ("so2", self.so2),
            ("co", self.co),
            ("temperature", self.temperature),
            ("humidity", self.humidity),
        ];
        for (field, value) in checked {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(RejectReason::InvalidField { field, value: v });
                }
            }
        }
        if let Some(aqi) = self.aqi {
            if aqi < 0 {
                return Err(RejectReason::InvalidField {
                    field: "aqi",
                    value: aqi as f64,
                });
            }
        }

        Ok(CleanReading {
            city: self.city.clone(),
            captured_at: self.captured_at,
            pm25: self.pm25,
            pm10: self.pm10,
            o3: self.o3,
            no2: self.no2,
            so2: self.so2,
            co: self.co,
            aqi: self.aqi.map(f64::from),
            temperature: self.temperature,
            humidity: self.humidity,
        })
    }
}

// ---

/// One validated reading in `clean_air_quality`; at most one per raw row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CleanReading {
    // ---
    pub city: String,
    pub captured_at: NaiveDateTime,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    pub aqi: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

/// One row in `daily_air_quality`, unique per (city, date).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyAverage {
    // ---
    pub date: NaiveDate,
    pub city: String,
    pub pm25_avg: Option<f64>,
    pub pm10_avg: Option<f64>,
    pub aqi_avg: Option<f64>,
    pub temp_avg: Option<f64>,
    pub humidity_avg: Option<f64>,
}

/// One row in `city_ispa_joined`, unique per city.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CityAnalysis {
    // ---
    pub city: String,
    pub province: String,
    pub pm25_yearly: Option<f64>,
    pub pm10_yearly: Option<f64>,
    pub aqi_yearly: Option<f64>,
    pub temp_yearly: Option<f64>,
    pub humidity_yearly: Option<f64>,
    pub prevalence_2023: Option<f64>,
}

// ---

/// Arithmetic mean over present values.
///
/// `None` entries are excluded from both sum and count; if every entry is
/// `None` the mean itself is `None`. This keeps "no data" distinct from "0.0"
/// throughout the aggregate tables.
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    // ---
    let mut sum = 0.0;
    let mut count = 0u32;
    for v in values.into_iter().flatten() {
        sum += v;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / f64::from(count))
    }
}
