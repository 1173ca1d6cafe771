//! Public weather reading schema.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::telemetry::TelemetryRecord;

/// A weather reading as served to API clients.
///
/// Channels missing from the telemetry are omitted from the JSON rather than
/// reported as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    #[serde(serialize_with = "serialize_date")]
    pub date: DateTime<Utc>,
    pub geohash: String,
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "serialize_rounded")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "serialize_rounded")]
    pub wind_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "serialize_rounded")]
    pub wind_gust: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "serialize_rounded")]
    pub wind_dir: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "serialize_rounded")]
    pub precipitation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "serialize_rounded")]
    pub precipitation_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "serialize_rounded")]
    pub solar: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "serialize_rounded")]
    pub light: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "serialize_rounded")]
    pub uv_index: Option<f64>,
}

/// Project a telemetry record onto the weather schema. Never fails.
pub fn project(record: &TelemetryRecord) -> WeatherReading {
    let channel = |name: &str, precision: i32| record.channel(name).map(|v| round(v, precision));

    WeatherReading {
        date: record.timestamp,
        geohash: record.geohash.clone(),
        temperature: channel("fo_temp", 1),
        wind_speed: channel("fo_w_speed", 1),
        wind_gust: channel("fo_w_gust", 1),
        wind_dir: channel("fo_w_dir", 0),
        precipitation: channel("fo_rain", 2),
        precipitation_rate: channel("fo_rain_hr", 2),
        solar: channel("fo_sol_rad", 2),
        light: channel("fo_light", 2),
        uv_index: channel("fo_uv", 0),
    }
}

/// Round half up to `precision` decimals.
///
/// The value is shifted through its decimal representation so that inputs
/// like `1.005` round as written rather than as their binary approximation.
pub fn round(value: f64, precision: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let shifted: f64 = format!("{}e{}", value, precision)
        .parse()
        .unwrap_or_else(|_| value * 10f64.powi(precision));
    let rounded = (shifted + 0.5).floor();

    format!("{}e{}", rounded, -precision)
        .parse()
        .unwrap_or_else(|_| rounded / 10f64.powi(precision))
}

fn serialize_date<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Millis, true))
}

// Whole numbers go out as integers: `180`, not `180.0`.
fn serialize_rounded<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => serializer.serialize_i64(*v as i64),
        Some(v) => serializer.serialize_f64(*v),
        None => serializer.serialize_none(),
    }
}
