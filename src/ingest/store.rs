// src/ingest/store.rs
//! Durable record stores keyed by `(device_id, timestamp)`

use super::IngestedFix;
use crate::error::{Result, TrackerError};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

type Key = (String, String);

pub trait RecordStore {
    /// Insert or replace the record with the same device id and timestamp
    fn upsert(&mut self, item: IngestedFix) -> Result<()>;

    fn get(&self, device_id: &str, timestamp: &str) -> Option<&IngestedFix>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key_of(item: &IngestedFix) -> Key {
    (item.device_id.clone(), item.timestamp.clone())
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    items: BTreeMap<Key, IngestedFix>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> impl Iterator<Item = &IngestedFix> {
        self.items.values()
    }
}

impl RecordStore for MemoryStore {
    fn upsert(&mut self, item: IngestedFix) -> Result<()> {
        self.items.insert(key_of(&item), item);
        Ok(())
    }

    fn get(&self, device_id: &str, timestamp: &str) -> Option<&IngestedFix> {
        self.items.get(&(device_id.to_string(), timestamp.to_string()))
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// JSON array on disk, rewritten through a temp file on every upsert
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    items: MemoryStore,
}

impl JsonFileStore {
    /// Open `path`, starting empty if it does not exist yet
    pub fn open(path: &Path) -> Result<Self> {
        let mut items = MemoryStore::new();

        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| TrackerError::Store(format!("Failed to read {}: {}", path.display(), e)))?;
            let stored: Vec<IngestedFix> = serde_json::from_str(&contents)
                .map_err(|e| TrackerError::Store(format!("Failed to parse {}: {}", path.display(), e)))?;
            for item in stored {
                items.upsert(item)?;
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            items,
        })
    }

    fn write(&self, items: &BTreeMap<Key, IngestedFix>) -> Result<()> {
        let all: Vec<&IngestedFix> = items.values().collect();
        let contents = serde_json::to_string_pretty(&all)?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents)
            .map_err(|e| TrackerError::Store(format!("Failed to write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| TrackerError::Store(format!("Failed to replace {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

impl RecordStore for JsonFileStore {
    fn upsert(&mut self, item: IngestedFix) -> Result<()> {
        let mut next = self.items.items.clone();
        next.insert(key_of(&item), item);

        // in-memory state only changes once the file is replaced
        self.write(&next)?;
        self.items.items = next;
        Ok(())
    }

    fn get(&self, device_id: &str, timestamp: &str) -> Option<&IngestedFix> {
        self.items.get(device_id, timestamp)
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn item(timestamp: &str, lat: &str) -> IngestedFix {
        IngestedFix {
            device_id: "gps-tracker-01".to_string(),
            timestamp: timestamp.to_string(),
            lat: Decimal::from_str(lat).unwrap(),
            lon: Decimal::from_str("-121.977572").unwrap(),
            altitude: None,
            speed: Decimal::ZERO,
        }
    }

    #[test]
    fn test_upsert_replaces_same_key() {
        let mut store = MemoryStore::new();
        store.upsert(item("2026-10-15 14:10:23", "37.402058")).unwrap();
        store.upsert(item("2026-10-15 14:10:23", "37.5")).unwrap();
        store.upsert(item("2026-10-15 14:10:28", "37.6")).unwrap();

        assert_eq!(store.len(), 2);
        let replaced = store.get("gps-tracker-01", "2026-10-15 14:10:23").unwrap();
        assert_eq!(replaced.lat, Decimal::from_str("37.5").unwrap());
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixes.json");

        let mut store = JsonFileStore::open(&path).unwrap();
        assert!(store.is_empty());
        store.upsert(item("2026-10-15 14:10:23", "37.402058")).unwrap();
        store.upsert(item("2026-10-15 14:10:28", "37.402060")).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        let stored = reopened.get("gps-tracker-01", "2026-10-15 14:10:28").unwrap();
        // exact decimal survives the round trip, trailing zero included
        assert_eq!(stored.lat.to_string(), "37.402060");
        assert!(!dir.path().join("fixes.tmp").exists());
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("fixes.json");

        let mut store = JsonFileStore::open(&path).unwrap();
        assert!(store.upsert(item("2026-10-15 14:10:23", "37.402058")).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixes.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(JsonFileStore::open(&path), Err(TrackerError::Store(_))));
    }
}
