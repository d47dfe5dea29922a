// src/gps/data.rs
//! Fix data structures

use crate::error::Result;
use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Wall-clock format used in published records
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Position fields decoded from one `+CGPSINFO:` line
#[derive(Debug, Clone, PartialEq)]
pub struct FixFields {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>, // meters
    pub speed_kmh: f64,
    pub date: String, // ddmmyy, UTC, as reported by the modem
    pub time: String, // hhmmss.s, UTC
}

/// One published telemetry record.
///
/// Field order and names are the wire format: `lat`, `lon`, `altitude`,
/// `speed_kmh`, `timestamp`, `device_id`. A missing altitude is sent as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixRecord {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed_kmh: f64,
    pub timestamp: String,
    pub device_id: String,
}

impl FixRecord {
    /// Enrich parsed fields with the acquisition time and the device id
    pub fn new(fields: FixFields, device_id: &str, acquired_at: DateTime<Tz>) -> Self {
        Self {
            latitude: fields.latitude,
            longitude: fields.longitude,
            altitude: fields.altitude,
            speed_kmh: fields.speed_kmh,
            timestamp: acquired_at.format(TIMESTAMP_FORMAT).to_string(),
            device_id: device_id.to_string(),
        }
    }

    /// Serialize to the JSON payload sent to the broker
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_fields() -> FixFields {
        FixFields {
            latitude: 37.402058,
            longitude: -121.977572,
            altitude: Some(10.5),
            speed_kmh: 3.7,
            date: "151026".to_string(),
            time: "061023.0".to_string(),
        }
    }

    #[test]
    fn test_record_uses_local_wall_clock() {
        let tz: Tz = "Australia/Perth".parse().unwrap();
        let at = chrono::Utc
            .with_ymd_and_hms(2026, 10, 15, 6, 10, 23)
            .unwrap()
            .with_timezone(&tz);

        let record = FixRecord::new(sample_fields(), "gps-tracker-01", at);

        // Perth is UTC+8 with no DST
        assert_eq!(record.timestamp, "2026-10-15 14:10:23");
        assert_eq!(record.device_id, "gps-tracker-01");
    }

    #[test]
    fn test_payload_has_exactly_six_fields() {
        let tz: Tz = "UTC".parse().unwrap();
        let at = tz.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let mut fields = sample_fields();
        fields.altitude = None;

        let payload = FixRecord::new(fields, "unit-7", at).to_payload().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let object = value.as_object().unwrap();

        let mut keys: Vec<&str> = object.keys().map(|k| k.as_str()).collect();
        keys.sort();
        assert_eq!(keys, ["altitude", "device_id", "lat", "lon", "speed_kmh", "timestamp"]);
        assert!(object["altitude"].is_null());
        assert_eq!(object["lat"], serde_json::json!(37.402058));
        assert_eq!(object["timestamp"], "2026-01-02 03:04:05");
    }
}
