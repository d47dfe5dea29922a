// src/ingest/mod.rs
//! Broker-side ingestion: validate a published record and store it
//!
//! This is the counterpart of the tracker's payload. It reads the same field
//! names the tracker emits (`speed_kmh`, not `speed`) and stores numbers as
//! exact decimals. Speed is stored in the `speed` column.

pub mod store;

pub use store::{JsonFileStore, MemoryStore, RecordStore};

use crate::error::{Result, TrackerError};
use log::{error, info};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::str::FromStr;

/// A record as persisted by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedFix {
    pub device_id: String,
    pub timestamp: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub lat: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub lon: Decimal,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub altitude: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub speed: Decimal,
}

impl IngestedFix {
    /// Validate an incoming event.
    ///
    /// `altitude` must be present but may be `null`; every other numeric
    /// field must be a number.
    pub fn from_event(event: &Value) -> Result<Self> {
        let fields = event
            .as_object()
            .ok_or_else(|| TrackerError::Parse("event is not a JSON object".to_string()))?;

        Ok(Self {
            device_id: string_field(fields, "device_id")?,
            timestamp: string_field(fields, "timestamp")?,
            lat: decimal_field(fields, "lat")?,
            lon: decimal_field(fields, "lon")?,
            altitude: match fields.get("altitude") {
                Some(Value::Null) => None,
                Some(_) => Some(decimal_field(fields, "altitude")?),
                None => return Err(missing("altitude")),
            },
            speed: decimal_field(fields, "speed_kmh")?,
        })
    }

    /// JSON view with numbers as floats
    pub fn to_json(&self) -> Value {
        json!({
            "device_id": self.device_id,
            "timestamp": self.timestamp,
            "lat": self.lat.to_f64(),
            "lon": self.lon.to_f64(),
            "altitude": self.altitude.and_then(|a| a.to_f64()),
            "speed": self.speed.to_f64(),
        })
    }
}

fn missing(name: &str) -> TrackerError {
    TrackerError::Parse(format!("missing field '{}'", name))
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Result<String> {
    match fields.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(other) => Err(TrackerError::Parse(format!("field '{}' must be a non-empty string, got {}", name, other))),
        None => Err(missing(name)),
    }
}

fn decimal_field(fields: &Map<String, Value>, name: &str) -> Result<Decimal> {
    let number = match fields.get(name) {
        Some(Value::Number(n)) => n,
        Some(other) => return Err(TrackerError::Parse(format!("field '{}' is not a number: {}", name, other))),
        None => return Err(missing(name)),
    };

    // serde_json prints the shortest text that round-trips the float
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| TrackerError::Parse(format!("field '{}' ({}) is not a decimal: {}", name, text, e)))
}

/// Result handed back to the caller of the ingestion handler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: Value,
}

impl IngestResponse {
    fn stored(item: &IngestedFix) -> Self {
        Self {
            status_code: 200,
            body: json!({
                "message": "GPS data stored successfully!",
                "data": item.to_json(),
            }),
        }
    }

    fn failed(reason: &TrackerError) -> Self {
        Self {
            status_code: 500,
            body: json!({
                "message": "Error storing data",
                "error": reason.to_string(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Validate `event` and upsert it into `store`. Never panics or returns an
/// error: failures come back as a 500 response and nothing is written.
pub fn handle_event<S: RecordStore + ?Sized>(event: &Value, store: &mut S) -> IngestResponse {
    info!("Received data: {}", event);

    match store_event(event, store) {
        Ok(item) => IngestResponse::stored(&item),
        Err(e) => {
            error!("Error storing data: {}", e);
            IngestResponse::failed(&e)
        }
    }
}

fn store_event<S: RecordStore + ?Sized>(event: &Value, store: &mut S) -> Result<IngestedFix> {
    let item = IngestedFix::from_event(event)?;
    info!("Storing item: {:?}", item);
    store.upsert(item.clone())?;
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Value {
        json!({
            "lat": 37.402058,
            "lon": -121.977572,
            "altitude": 10.5,
            "speed_kmh": 3.7,
            "timestamp": "2026-10-15 14:10:23",
            "device_id": "gps-tracker-01"
        })
    }

    #[test]
    fn test_store_complete_event() {
        let mut store = MemoryStore::new();

        let response = handle_event(&event(), &mut store);

        assert!(response.is_success());
        assert_eq!(response.body["data"]["speed"], json!(3.7));
        let item = store.get("gps-tracker-01", "2026-10-15 14:10:23").unwrap();
        assert_eq!(item.lat, Decimal::from_str("37.402058").unwrap());
        assert_eq!(item.lon, Decimal::from_str("-121.977572").unwrap());
        assert_eq!(item.altitude, Some(Decimal::from_str("10.5").unwrap()));
        assert_eq!(item.speed.to_string(), "3.7");
    }

    #[test]
    fn test_null_altitude_is_stored() {
        let mut store = MemoryStore::new();
        let mut event = event();
        event["altitude"] = Value::Null;

        assert!(handle_event(&event, &mut store).is_success());
        assert_eq!(store.items().next().unwrap().altitude, None);
    }

    #[test]
    fn test_missing_numeric_field_writes_nothing() {
        for field in ["lat", "lon", "altitude", "speed_kmh"] {
            let mut store = MemoryStore::new();
            let mut event = event();
            event.as_object_mut().unwrap().remove(field);

            let response = handle_event(&event, &mut store);

            assert_eq!(response.status_code, 500, "accepted event without {}", field);
            assert_eq!(response.body["message"], "Error storing data");
            assert!(response.body["error"].as_str().unwrap().contains(field));
            assert!(store.is_empty());
        }
    }

    #[test]
    fn test_mistyped_fields_rejected() {
        let mut store = MemoryStore::new();

        let mut speed_text = event();
        speed_text["speed_kmh"] = json!("N/A");
        assert!(!handle_event(&speed_text, &mut store).is_success());

        let mut numeric_id = event();
        numeric_id["device_id"] = json!(7);
        assert!(!handle_event(&numeric_id, &mut store).is_success());

        assert!(!handle_event(&json!([1, 2, 3]), &mut store).is_success());
        assert!(store.is_empty());
    }

    #[test]
    fn test_response_serialization() {
        let mut store = MemoryStore::new();
        let response = handle_event(&event(), &mut store);

        let text = serde_json::to_string(&response).unwrap();
        assert!(text.starts_with(r#"{"statusCode":200,"#));
    }
}
