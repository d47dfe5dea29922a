// src/config.rs
//! Configuration loaded from a JSON file with built-in defaults

use crate::error::{Result, TrackerError};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baudrate: u32,
    pub settle_ms: u64,       // delay between command and read
    pub read_timeout_ms: u64, // quiet period that ends a reply
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB2".to_string(),
            baudrate: 115200,
            settle_ms: 1000,
            read_timeout_ms: 1000,
        }
    }
}

impl SerialConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub endpoint: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub keep_alive_secs: u64,
    pub reconnect_delay_secs: u64,
    pub ca_cert: PathBuf,
    pub client_cert: PathBuf,
    pub private_key: PathBuf,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            port: 8883,
            client_id: "gps-tracker-client".to_string(),
            topic: "gps/tracker".to_string(),
            keep_alive_secs: 60,
            reconnect_delay_secs: 5,
            ca_cert: PathBuf::from("./certs/AmazonRootCA1.pem"),
            client_cert: PathBuf::from("./certs/certificate.pem.crt"),
            private_key: PathBuf::from("./certs/private.pem.key"),
        }
    }
}

impl BrokerConfig {
    /// Credential files in the order they are checked
    pub fn credential_paths(&self) -> [&Path; 3] {
        [self.ca_cert.as_path(), self.client_cert.as_path(), self.private_key.as_path()]
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub device_id: String,
    pub timezone: String, // IANA name, e.g. "Australia/Perth"
    pub publish_interval_secs: u64,
    pub max_consecutive_faults: Option<u32>,
    pub serial: SerialConfig,
    pub broker: BrokerConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            device_id: "gps-tracker-01".to_string(),
            timezone: "Australia/Perth".to_string(),
            publish_interval_secs: 5,
            max_consecutive_faults: None,
            serial: SerialConfig::default(),
            broker: BrokerConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Load from `path`, or from the default location if it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_path = Self::get_config_path()?;
                if default_path.exists() {
                    Self::load_from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TrackerError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            TrackerError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TrackerError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| TrackerError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Default config file path
    pub fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| TrackerError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("gps-mqtt-tracker")
            .join("config.json"))
    }

    /// Reject settings the tracker cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.broker.endpoint.trim().is_empty() {
            return Err(TrackerError::Config("broker endpoint is not set".to_string()));
        }
        if self.broker.client_id.is_empty() || self.broker.client_id.starts_with(' ') {
            return Err(TrackerError::Config(format!("invalid client id '{}'", self.broker.client_id)));
        }
        if self.broker.topic.is_empty() {
            return Err(TrackerError::Config("publish topic is empty".to_string()));
        }
        if self.device_id.trim().is_empty() {
            return Err(TrackerError::Config("device id is empty".to_string()));
        }
        if self.broker.keep_alive_secs < 5 {
            return Err(TrackerError::Config("keep-alive must be at least 5 seconds".to_string()));
        }
        if self.publish_interval_secs == 0 {
            return Err(TrackerError::Config("publish interval must be at least one second".to_string()));
        }
        self.tz()?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| TrackerError::Config(format!("unknown timezone '{}'", self.timezone)))
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }

    /// Override the serial port
    pub fn update_serial(&mut self, port: String) {
        self.serial.port = port;
    }

    /// Override the broker endpoint
    pub fn update_endpoint(&mut self, endpoint: String) {
        self.broker.endpoint = endpoint;
    }
}
