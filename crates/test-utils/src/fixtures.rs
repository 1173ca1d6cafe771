//! Common telemetry fixtures.
//!
//! Payload shapes mirror what upstream producers actually publish: proper
//! objects, arrays wrapping the object, and JSON encoded twice.

use bytes::Bytes;
use serde_json::{json, Value};

/// MFS root used by the fixtures.
pub const ROOT: &str = "/weather";

/// Deterministic 46-character content hash.
pub fn hash(seed: u32) -> String {
    format!("Qm{:0>44}", seed)
}

/// A hash one character short of valid.
pub fn short_hash() -> String {
    hash(1)[..45].to_string()
}

/// Telemetry object with the given timestamp, geohash and extra channels.
pub fn telemetry(ts: &str, geohash: &str, channels: Value) -> Value {
    let mut values = json!({ "geohash": geohash });
    if let (Some(values), Some(channels)) = (values.as_object_mut(), channels.as_object()) {
        for (name, value) in channels {
            values.insert(name.clone(), value.clone());
        }
    }
    json!({ "ts": ts, "values": values })
}

/// `{"ts":"2024-01-01T00:00:00Z","values":{"geohash":"u4pr","fo_temp":21.36}}`
pub fn sample_telemetry() -> Value {
    telemetry("2024-01-01T00:00:00Z", "u4pr", json!({ "fo_temp": 21.36 }))
}

/// Serialize a payload the way a well-behaved producer would.
pub fn object_bytes(payload: &Value) -> Bytes {
    Bytes::from(payload.to_string())
}

/// The payload JSON-encoded a second time, as a string literal.
pub fn string_encoded_bytes(payload: &Value) -> Bytes {
    Bytes::from(Value::String(payload.to_string()).to_string())
}

/// The payload wrapped in a one-element array, then string-encoded.
pub fn string_encoded_array_bytes(payload: &Value) -> Bytes {
    string_encoded_bytes(&json!([payload]))
}
