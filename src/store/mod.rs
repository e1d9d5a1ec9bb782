//! Persistent value-store interface for metric results and digests.
//!
//! The engine only needs a narrow view of the store: whether a connection
//! exists, the previously stored digest/value for an identifier, and a way
//! for consumers to submit results. The real database lives outside this
//! crate; `MemoryStore` stands in for it in tests and detached operation.

use crate::channel::{Channel, Station};
use crate::digest::Digest;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Key for persistent value/digest lookup: one metric result for one
/// channel on one station-day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricValueIdentifier {
    pub date: NaiveDate,
    pub metric: String,
    pub station: Station,
    pub channel: Channel,
}

impl MetricValueIdentifier {
    pub fn new(date: NaiveDate, metric: impl Into<String>, station: Station, channel: Channel) -> Self {
        Self {
            date,
            metric: metric.into(),
            station,
            channel,
        }
    }

    /// Generates the storage key string for flat key-value backends.
    pub fn to_storage_key(&self) -> String {
        format!("{}|{}|{}|{}", self.date, self.metric, self.station, self.channel)
    }
}

impl fmt::Display for MetricValueIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.date, self.metric, self.station, self.channel
        )
    }
}

/// Store interface used by the engine and metric consumers.
///
/// Lookups are assumed fast and local; an unreachable backend is modeled
/// as `connected() == false`, which the digest cache treats as "always
/// recompute" rather than blocking.
pub trait MetricStore: Send + Sync {
    /// Whether a backend connection is available.
    fn connected(&self) -> bool;

    /// Previously stored digest for the identifier, if any.
    fn get_digest(&self, id: &MetricValueIdentifier) -> Option<Digest>;

    /// Previously stored metric value for the identifier, if any.
    fn get_value(&self, id: &MetricValueIdentifier) -> Option<f64>;

    /// Stores a computed value together with the digest it was computed
    /// under. Overwrites any prior entry for the identifier.
    fn put_value(&self, id: &MetricValueIdentifier, value: f64, digest: Digest);
}

/// One stored metric result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: f64,
    pub digest: Digest,
}

/// In-memory store used by tests and detached (offline) scans.
#[derive(Default)]
pub struct MemoryStore {
    connected: bool,
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl MemoryStore {
    /// A store that reports itself connected.
    pub fn online() -> Self {
        Self {
            connected: true,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A store that reports itself disconnected; the digest cache will
    /// always recompute against it.
    pub fn offline() -> Self {
        Self {
            connected: false,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes all stored entries to JSON, keyed by storage key.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let entries = match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        serde_json::to_string(&entries)
    }

    /// Rebuilds a connected store from a JSON snapshot.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entries: HashMap<String, StoredValue> = serde_json::from_str(json)?;
        Ok(Self {
            connected: true,
            entries: Mutex::new(entries),
        })
    }
}

impl MetricStore for MemoryStore {
    fn connected(&self) -> bool {
        self.connected
    }

    fn get_digest(&self, id: &MetricValueIdentifier) -> Option<Digest> {
        let entries = self.entries.lock().ok()?;
        entries.get(&id.to_storage_key()).map(|e| e.digest)
    }

    fn get_value(&self, id: &MetricValueIdentifier) -> Option<f64> {
        let entries = self.entries.lock().ok()?;
        entries.get(&id.to_storage_key()).map(|e| e.value)
    }

    fn put_value(&self, id: &MetricValueIdentifier, value: f64, digest: Digest) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(id.to_storage_key(), StoredValue { value, digest });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_identifier() -> MetricValueIdentifier {
        MetricValueIdentifier::new(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            "AvailabilityMetric",
            Station::new("IU", "ANMO"),
            Channel::new("00", "LHZ"),
        )
    }

    #[test]
    fn test_identifier_storage_key() {
        let id = create_test_identifier();
        assert_eq!(
            id.to_storage_key(),
            "2024-05-01|AvailabilityMetric|IU_ANMO|00-LHZ"
        );
    }

    #[test]
    fn test_identifier_serde_round_trip() {
        let id = create_test_identifier();
        let json = serde_json::to_string(&id).unwrap();
        let back: MetricValueIdentifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert_eq!(back.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[test]
    fn test_put_then_get() {
        let store = MemoryStore::online();
        let id = create_test_identifier();
        let digest = Digest::of_bytes(b"digest");

        assert_eq!(store.get_value(&id), None);
        store.put_value(&id, 99.5, digest);
        assert_eq!(store.get_value(&id), Some(99.5));
        assert_eq!(store.get_digest(&id), Some(digest));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let store = MemoryStore::online();
        let id = create_test_identifier();
        store.put_value(&id, 42.0, Digest::of_bytes(b"d"));

        let json = store.to_json().unwrap();
        let restored = MemoryStore::from_json(&json).unwrap();
        assert!(restored.connected());
        assert_eq!(restored.get_value(&id), Some(42.0));
    }
}
