// src/lib.rs
//! GPS MQTT Tracker Library
//!
//! Polls a SIM7600-class GNSS modem with `AT+CGPSINFO`, converts the fix to
//! decimal degrees and publishes it over MQTT with mutual TLS. The `ingest`
//! module is the broker-side adapter that stores the published records.

pub mod config;
pub mod error;
pub mod gps;
pub mod ingest;
pub mod modem;
pub mod session;
pub mod tracker;

// Re-export main types for convenience
pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use gps::{FixFields, FixRecord};
pub use modem::ModemDriver;
pub use session::{MqttSession, Publisher, SessionEvent, SessionState};
pub use tracker::{TickOutcome, Tracker, TrackerSettings};
