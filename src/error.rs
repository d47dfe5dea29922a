// src/error.rs
//! Error types for the tracker

use std::fmt;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug)]
pub enum TrackerError {
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    Json(serde_json::Error),
    /// The modem channel failed mid-exchange (port closed, device unplugged)
    Modem(std::io::Error),
    MissingCredential(PathBuf),
    Connection(String),
    Mqtt(String),
    Parse(String),
    Config(String),
    Store(String),
}

impl TrackerError {
    /// Failures of the modem channel itself, as opposed to faults in
    /// handling a fix it delivered
    pub fn is_modem_fault(&self) -> bool {
        matches!(self, TrackerError::Modem(_) | TrackerError::Serial(_))
    }
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::Io(e) => write!(f, "IO error: {}", e),
            TrackerError::Serial(e) => write!(f, "Serial error: {}", e),
            TrackerError::Json(e) => write!(f, "JSON error: {}", e),
            TrackerError::Modem(e) => write!(f, "Modem channel error: {}", e),
            TrackerError::MissingCredential(path) => {
                write!(f, "Credential file not found: {}", path.display())
            }
            TrackerError::Connection(msg) => write!(f, "Connection error: {}", msg),
            TrackerError::Mqtt(msg) => write!(f, "MQTT error: {}", msg),
            TrackerError::Parse(msg) => write!(f, "Parse error: {}", msg),
            TrackerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            TrackerError::Store(msg) => write!(f, "Store error: {}", msg),
        }
    }
}

impl std::error::Error for TrackerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrackerError::Io(e) | TrackerError::Modem(e) => Some(e),
            TrackerError::Serial(e) => Some(e),
            TrackerError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(error: std::io::Error) -> Self {
        TrackerError::Io(error)
    }
}

impl From<tokio_serial::Error> for TrackerError {
    fn from(error: tokio_serial::Error) -> Self {
        TrackerError::Serial(error)
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(error: serde_json::Error) -> Self {
        TrackerError::Json(error)
    }
}

impl From<rumqttc::ClientError> for TrackerError {
    fn from(error: rumqttc::ClientError) -> Self {
        TrackerError::Mqtt(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_missing_file() {
        let err = TrackerError::MissingCredential(PathBuf::from("./certs/private.pem.key"));
        assert_eq!(err.to_string(), "Credential file not found: ./certs/private.pem.key");
    }

    #[test]
    fn test_modem_faults() {
        let modem = TrackerError::Modem(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"));
        assert!(modem.is_modem_fault());

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!TrackerError::from(json).is_modem_fault());
        assert!(!TrackerError::Connection("not connected".to_string()).is_modem_fault());
    }
}
