//! Defensive decoding of telemetry payloads.
//!
//! Upstream producers publish telemetry in several shapes: a proper JSON
//! object, an array wrapping the object, or the same thing JSON-encoded a
//! second time as a string. [`RawPayload`] classifies what the store returned
//! and [`normalize`] reduces it to a [`TelemetryRecord`] or fails.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::NormalizationError;

/// Naive timestamp layouts accepted for `ts`, interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Longest payload excerpt carried in an error message.
const PREVIEW_LEN: usize = 120;

/// A payload as fetched from the store, tagged by JSON shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// A string, either raw non-JSON bytes or a JSON string literal.
    Text(String),
    Array(Vec<Value>),
    Object(Map<String, Value>),
    /// Numbers, booleans and null.
    Scalar(Value),
}

impl RawPayload {
    /// Classify bytes returned by the store.
    ///
    /// Bytes that are not JSON at all are kept as text so that normalization
    /// reports them as invalid JSON.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Self::from_value(value),
            Err(_) => RawPayload::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => RawPayload::Text(text),
            Value::Array(items) => RawPayload::Array(items),
            Value::Object(map) => RawPayload::Object(map),
            scalar => RawPayload::Scalar(scalar),
        }
    }
}

/// Canonical telemetry: a timestamp, a geohash and named sensor channels.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// `ts` exactly as published.
    pub ts: Value,
    /// `ts` resolved to an instant.
    pub timestamp: DateTime<Utc>,
    /// `values.geohash`.
    pub geohash: String,
    /// The `values` mapping, geohash included.
    pub values: Map<String, Value>,
}

impl TelemetryRecord {
    fn from_object(mut object: Map<String, Value>) -> Result<Self, NormalizationError> {
        let ts = match object.remove("ts") {
            Some(ts) if !ts.is_null() => ts,
            _ => return Err(NormalizationError::MissingField("ts")),
        };

        let values = match object.remove("values") {
            Some(Value::Object(values)) => values,
            _ => return Err(NormalizationError::MissingField("values")),
        };

        let geohash = match values.get("geohash") {
            Some(Value::String(geohash)) => geohash.clone(),
            _ => return Err(NormalizationError::MissingField("geohash")),
        };
        validate_geohash(&geohash)?;

        let timestamp = parse_timestamp(&ts)?;

        Ok(Self {
            ts,
            timestamp,
            geohash,
            values,
        })
    }

    /// Numeric value of a sensor channel.
    ///
    /// Numeric strings count as numbers; anything else, including non-finite
    /// values, is treated as an absent channel.
    pub fn channel(&self, name: &str) -> Option<f64> {
        let value = match self.values.get(name)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        value.is_finite().then_some(value)
    }

    /// The record in its published `{ts, values}` shape.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("ts".to_string(), self.ts.clone());
        object.insert("values".to_string(), Value::Object(self.values.clone()));
        Value::Object(object)
    }
}

/// Reduce a raw payload to a telemetry record.
///
/// Guards run in order: decode text once, reject non-object values, unwrap
/// the first element of an array, then require `ts`, `values` and
/// `values.geohash`.
pub fn normalize(raw: RawPayload) -> Result<TelemetryRecord, NormalizationError> {
    let payload = match raw {
        RawPayload::Text(text) => {
            debug!("Trying to parse payload text as JSON");
            let value: Value = serde_json::from_str(&text)
                .map_err(|e| NormalizationError::InvalidJson(format!("{}: {}", e, preview(&text))))?;
            RawPayload::from_value(value)
        }
        other => other,
    };

    let object = match payload {
        RawPayload::Object(object) => object,
        RawPayload::Array(items) => {
            debug!(len = items.len(), "Payload is an array, using its first element");
            match items.into_iter().next() {
                Some(Value::Object(object)) => object,
                Some(other) => {
                    return Err(NormalizationError::NotObjectLike(preview(&other.to_string())))
                }
                None => return Err(NormalizationError::EmptyArray),
            }
        }
        // Only one decode pass: a string that decodes to a string stays rejected.
        RawPayload::Text(text) => return Err(NormalizationError::NotObjectLike(preview(&text))),
        RawPayload::Scalar(value) => {
            return Err(NormalizationError::NotObjectLike(preview(&value.to_string())))
        }
    };

    TelemetryRecord::from_object(object)
}

/// Classify and normalize bytes fetched from the store.
pub fn normalize_bytes(bytes: &[u8]) -> Result<TelemetryRecord, NormalizationError> {
    normalize(RawPayload::from_bytes(bytes))
}

/// Geohashes become namespace path segments, so only ASCII alphanumerics pass.
pub fn validate_geohash(geohash: &str) -> Result<(), NormalizationError> {
    if !geohash.is_empty() && geohash.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(NormalizationError::InvalidGeohash(preview(geohash)))
    }
}

fn parse_timestamp(ts: &Value) -> Result<DateTime<Utc>, NormalizationError> {
    match ts {
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64));
            millis
                .and_then(from_millis)
                .ok_or_else(|| NormalizationError::InvalidTimestamp(n.to_string()))
        }
        Value::String(s) => parse_timestamp_str(s.trim())
            .ok_or_else(|| NormalizationError::InvalidTimestamp(preview(s))),
        other => Err(NormalizationError::InvalidTimestamp(preview(&other.to_string()))),
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
    }

    s.parse::<i64>().ok().and_then(from_millis)
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_LEN {
        text.to_string()
    } else {
        let cut: String = text.chars().take(PREVIEW_LEN).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "ts": "2024-01-01T00:00:00Z",
            "values": { "geohash": "u4pr", "fo_temp": 21.36 }
        })
    }

    #[test]
    fn test_object_payload() {
        let record = normalize(RawPayload::from_value(sample())).unwrap();

        assert_eq!(record.ts, json!("2024-01-01T00:00:00Z"));
        assert_eq!(record.geohash, "u4pr");
        assert_eq!(record.timestamp.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(record.values.get("fo_temp"), Some(&json!(21.36)));
        assert_eq!(record.to_json(), sample());
    }

    #[test]
    fn test_string_encoded_object() {
        let text = sample().to_string();
        let record = normalize(RawPayload::Text(text)).unwrap();
        assert_eq!(record.to_json(), sample());
    }

    #[test]
    fn test_array_unwraps_first_element() {
        let direct = normalize(RawPayload::from_value(sample())).unwrap();
        let wrapped = normalize(RawPayload::from_value(json!([sample(), {"ignored": true}]))).unwrap();
        assert_eq!(direct, wrapped);
    }

    #[test]
    fn test_string_encoded_array_from_bytes() {
        // The store returns a JSON string literal whose content is an array.
        let inner = json!([sample()]).to_string();
        let bytes = serde_json::to_vec(&Value::String(inner)).unwrap();

        let record = normalize_bytes(&bytes).unwrap();
        assert_eq!(record.geohash, "u4pr");
    }

    #[test]
    fn test_invalid_json_text() {
        let err = normalize_bytes(b"not json at all").unwrap_err();
        assert!(matches!(err, NormalizationError::InvalidJson(_)));
    }

    #[test]
    fn test_scalars_are_not_object_like() {
        for value in [json!(42), json!(true), json!(null)] {
            let err = normalize(RawPayload::from_value(value)).unwrap_err();
            assert!(matches!(err, NormalizationError::NotObjectLike(_)));
        }
    }

    #[test]
    fn test_only_one_decode_pass() {
        // Text whose single decode yields another string, not an object.
        let encoded = Value::String(sample().to_string()).to_string();
        let err = normalize(RawPayload::Text(encoded)).unwrap_err();
        assert!(matches!(err, NormalizationError::NotObjectLike(_)));
    }

    #[test]
    fn test_nested_arrays_are_not_recursed() {
        let err = normalize(RawPayload::from_value(json!([[sample()]]))).unwrap_err();
        assert!(matches!(err, NormalizationError::NotObjectLike(_)));

        let err = normalize(RawPayload::from_value(json!([]))).unwrap_err();
        assert_eq!(err, NormalizationError::EmptyArray);
    }

    #[test]
    fn test_missing_mandatory_fields() {
        let mut no_ts = sample();
        no_ts.as_object_mut().unwrap().remove("ts");
        assert_eq!(
            normalize(RawPayload::from_value(no_ts)).unwrap_err(),
            NormalizationError::MissingField("ts")
        );

        let mut no_values = sample();
        no_values.as_object_mut().unwrap().remove("values");
        assert_eq!(
            normalize(RawPayload::from_value(no_values)).unwrap_err(),
            NormalizationError::MissingField("values")
        );

        let no_geohash = json!({ "ts": 1704067200000u64, "values": { "fo_temp": 1.0 } });
        assert_eq!(
            normalize(RawPayload::from_value(no_geohash)).unwrap_err(),
            NormalizationError::MissingField("geohash")
        );

        let null_ts = json!({ "ts": null, "values": { "geohash": "u4pr" } });
        assert_eq!(
            normalize(RawPayload::from_value(null_ts)).unwrap_err(),
            NormalizationError::MissingField("ts")
        );
    }

    #[test]
    fn test_values_must_be_a_mapping() {
        let payload = json!({ "ts": "2024-01-01T00:00:00Z", "values": [1, 2, 3] });
        assert_eq!(
            normalize(RawPayload::from_value(payload)).unwrap_err(),
            NormalizationError::MissingField("values")
        );
    }

    #[test]
    fn test_geohash_must_be_a_path_segment() {
        for bad in ["", "../etc", "u4/pr", "u4 pr"] {
            let payload = json!({ "ts": "2024-01-01T00:00:00Z", "values": { "geohash": bad } });
            let err = normalize(RawPayload::from_value(payload)).unwrap_err();
            assert!(matches!(err, NormalizationError::InvalidGeohash(_)), "{:?}", bad);
        }
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        for ts in [
            json!("2024-01-01T00:00:00Z"),
            json!("2024-01-01T01:00:00+01:00"),
            json!("2024-01-01T00:00:00.000"),
            json!("2024-01-01 00:00:00"),
            json!("2024-01-01"),
            json!(1704067200000u64),
            json!("1704067200000"),
        ] {
            let payload = json!({ "ts": ts.clone(), "values": { "geohash": "u4pr" } });
            let record = normalize(RawPayload::from_value(payload)).unwrap();
            assert_eq!(record.timestamp, expected, "ts = {}", ts);
            assert_eq!(record.ts, ts);
        }
    }

    #[test]
    fn test_unparseable_timestamp() {
        let payload = json!({ "ts": "yesterday", "values": { "geohash": "u4pr" } });
        let err = normalize(RawPayload::from_value(payload)).unwrap_err();
        assert!(matches!(err, NormalizationError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_channel_coercion() {
        let payload = json!({
            "ts": 0,
            "values": {
                "geohash": "u4pr",
                "fo_temp": 21.36,
                "fo_uv": "3",
                "fo_light": "bright",
                "fo_rain": null
            }
        });
        let record = normalize(RawPayload::from_value(payload)).unwrap();

        assert_eq!(record.channel("fo_temp"), Some(21.36));
        assert_eq!(record.channel("fo_uv"), Some(3.0));
        assert_eq!(record.channel("fo_light"), None);
        assert_eq!(record.channel("fo_rain"), None);
        assert_eq!(record.channel("fo_w_dir"), None);
    }

    #[test]
    fn test_long_payloads_are_truncated_in_errors() {
        let long = "x".repeat(500);
        let err = normalize(RawPayload::Text(long)).unwrap_err();
        assert!(err.to_string().len() < 300);
    }
}
