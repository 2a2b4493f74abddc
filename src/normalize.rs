//! Reading Normalization
//!
//! Converts loosely-structured broker messages into fixed-shape events.
//! Devices publish whatever their firmware produces; fields may be absent
//! or of the wrong type. All defaulting happens here, in one place, so
//! the contract stays auditable:
//!
//! | field | default |
//! |---|---|
//! | temperature, humidity, heat_index, co2, odor_score | 0 |
//! | odor_status | "UNKNOWN" |
//! | odor_level | "No Data" |
//!
//! Normalization is total: given any decoded reading it produces a
//! well-formed event, so malformed sensor data can never crash the
//! broadcast path.

use serde::Deserialize;
use serde_json::Value;

use crate::websocket::SensorPayload;

/// Sentinel device identifier for messages missing one
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Default odor status when the device reports none
pub const DEFAULT_ODOR_STATUS: &str = "UNKNOWN";

/// Default odor level when the device reports none
pub const DEFAULT_ODOR_LEVEL: &str = "No Data";

/// Raw broker message body as published by field devices
#[derive(Debug, Deserialize)]
struct RawReading {
    #[serde(default)]
    device_id: Option<Value>,
    #[serde(default)]
    payload: Option<Value>,
}

/// A fixed-shape telemetry event, produced once per decoded message
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub device_id: String,
    pub payload: SensorPayload,
    /// Ingest time in epoch milliseconds, stamped at normalization
    pub timestamp: i64,
}

/// Decode a raw broker message body
///
/// Returns the device identifier and nested payload object, or `None` if
/// the body is not valid JSON. The caller logs and discards failures;
/// they are never fatal to the subscription.
pub fn decode_reading(body: &[u8]) -> Option<(String, Value)> {
    let raw: RawReading = serde_json::from_slice(body).ok()?;

    // Absent or wrong-typed identifiers fall back to the sentinel rather
    // than failing the whole message
    let device_id = raw
        .device_id
        .as_ref()
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_DEVICE)
        .to_string();
    let payload = match raw.payload {
        Some(v @ Value::Object(_)) => v,
        _ => Value::Object(serde_json::Map::new()),
    };

    Some((device_id, payload))
}

/// Normalize a decoded reading into a fixed-shape event
///
/// Each field is extracted independently; absent or wrong-typed values
/// fall back to the documented default. The timestamp is always the
/// current ingest time, never taken from the device.
pub fn normalize(device_id: String, payload: &Value) -> NormalizedEvent {
    NormalizedEvent {
        device_id,
        payload: SensorPayload {
            temperature: number_field(payload, "temperature"),
            humidity: number_field(payload, "humidity"),
            heat_index: number_field(payload, "heat_index"),
            co2: number_field(payload, "co2"),
            odor_score: number_field(payload, "odor_score"),
            odor_status: string_field(payload, "odor_status", DEFAULT_ODOR_STATUS),
            odor_level: string_field(payload, "odor_level", DEFAULT_ODOR_LEVEL),
        },
        timestamp: chrono::Utc::now().timestamp_millis(),
    }
}

fn number_field(payload: &Value, key: &str) -> f64 {
    payload.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn string_field(payload: &Value, key: &str, default: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_full_reading() {
        let body = br#"{"device_id":"sensor_001","payload":{"temperature":25.3}}"#;
        let (device_id, payload) = decode_reading(body).unwrap();
        assert_eq!(device_id, "sensor_001");
        assert_eq!(payload["temperature"], json!(25.3));
    }

    #[test]
    fn test_decode_missing_device_id() {
        let body = br#"{"payload":{"co2":400}}"#;
        let (device_id, _) = decode_reading(body).unwrap();
        assert_eq!(device_id, "unknown");
    }

    #[test]
    fn test_decode_missing_payload() {
        let body = br#"{"device_id":"sensor_002"}"#;
        let (device_id, payload) = decode_reading(body).unwrap();
        assert_eq!(device_id, "sensor_002");
        assert_eq!(payload, Value::Object(serde_json::Map::new()));
    }

    #[test]
    fn test_decode_non_object_payload() {
        let body = br#"{"device_id":"sensor_003","payload":"garbage"}"#;
        let (_, payload) = decode_reading(body).unwrap();
        assert_eq!(payload, Value::Object(serde_json::Map::new()));
    }

    #[test]
    fn test_decode_wrong_typed_device_id() {
        let body = br#"{"device_id":42,"payload":{"co2":400}}"#;
        let (device_id, payload) = decode_reading(body).unwrap();
        assert_eq!(device_id, "unknown");
        assert_eq!(payload["co2"], json!(400));
    }

    #[test]
    fn test_decode_invalid_json() {
        assert!(decode_reading(b"not json at all").is_none());
        assert!(decode_reading(b"").is_none());
    }

    #[test]
    fn test_normalize_partial_payload() {
        // Worked example: only temperature present, everything else defaults
        let payload = json!({"temperature": 25.3});
        let event = normalize("sensor_001".to_string(), &payload);

        assert_eq!(event.device_id, "sensor_001");
        assert_eq!(event.payload.temperature, 25.3);
        assert_eq!(event.payload.humidity, 0.0);
        assert_eq!(event.payload.heat_index, 0.0);
        assert_eq!(event.payload.co2, 0.0);
        assert_eq!(event.payload.odor_score, 0.0);
        assert_eq!(event.payload.odor_status, "UNKNOWN");
        assert_eq!(event.payload.odor_level, "No Data");
    }

    #[test]
    fn test_normalize_full_payload() {
        let payload = json!({
            "temperature": 28.1,
            "humidity": 63.0,
            "heat_index": 30.4,
            "co2": 612,
            "odor_score": 42.5,
            "odor_status": "MODERATE",
            "odor_level": "Noticeable"
        });
        let event = normalize("greenhouse-7".to_string(), &payload);

        assert_eq!(event.payload.temperature, 28.1);
        assert_eq!(event.payload.humidity, 63.0);
        assert_eq!(event.payload.heat_index, 30.4);
        assert_eq!(event.payload.co2, 612.0);
        assert_eq!(event.payload.odor_score, 42.5);
        assert_eq!(event.payload.odor_status, "MODERATE");
        assert_eq!(event.payload.odor_level, "Noticeable");
    }

    #[test]
    fn test_normalize_wrong_typed_fields() {
        // Wrong-typed values fall back to defaults, field by field
        let payload = json!({
            "temperature": "hot",
            "humidity": null,
            "co2": [1, 2, 3],
            "odor_status": 5,
            "odor_level": false
        });
        let event = normalize("sensor_004".to_string(), &payload);

        assert_eq!(event.payload.temperature, 0.0);
        assert_eq!(event.payload.humidity, 0.0);
        assert_eq!(event.payload.co2, 0.0);
        assert_eq!(event.payload.odor_status, "UNKNOWN");
        assert_eq!(event.payload.odor_level, "No Data");
    }

    #[test]
    fn test_normalize_stamps_ingest_time() {
        let before = chrono::Utc::now().timestamp_millis();
        let event = normalize("t".to_string(), &json!({}));
        let after = chrono::Utc::now().timestamp_millis();

        assert!(event.timestamp >= before);
        assert!(event.timestamp <= after);
    }

    #[test]
    fn test_device_timestamp_ignored() {
        // A timestamp field inside the payload is not ours to trust
        let payload = json!({"timestamp": 12345});
        let event = normalize("t".to_string(), &payload);
        assert!(event.timestamp > 12345);
    }
}
