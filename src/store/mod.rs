//! Event store: the append-only, time-ordered view over login history.
//!
//! The engine never queries by append order. All reads filter by time
//! range, so window computations are re-derivable regardless of the
//! order records arrived in.

pub mod sqlite_store;

pub use sqlite_store::SqliteEventStore;

use chrono::{DateTime, Utc};
use std::sync::RwLock;
use thiserror::Error;

use crate::models::{Dimension, EventRecord};

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data in store: {0}")]
    InvalidData(String),
}

/// Append log of login attempts with range queries per grouping key.
///
/// Implementations must give readers a consistent snapshot for any
/// already-elapsed time range; windows are only closed once their end
/// boundary has passed, so a range query at close time is point-in-time
/// consistent without extra locking.
pub trait EventStore: Send + Sync {
    /// Append one event. Out-of-order timestamps are accepted.
    fn append(&self, event: &EventRecord) -> Result<(), StoreError>;

    /// All events for `key` in the right-open range `[from, to)`,
    /// sorted by `(timestamp, attempt_id)`.
    fn events_in_range(
        &self,
        dimension: Dimension,
        key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>, StoreError>;

    /// Distinct keys with at least one event in `[from, to)`
    fn active_keys(
        &self,
        dimension: Dimension,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError>;

    /// Total number of stored events
    fn count(&self) -> Result<usize, StoreError>;

    /// Remove events older than the cutoff; retention is driven by the
    /// embedder, never by the engine itself
    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Clear all data (useful for testing)
    fn clear_all(&self) -> Result<(), StoreError>;
}

/// In-memory store for embedding and tests
pub struct MemoryEventStore {
    events: RwLock<Vec<EventRecord>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        MemoryEventStore {
            events: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for MemoryEventStore {
    fn append(&self, event: &EventRecord) -> Result<(), StoreError> {
        self.events.write().unwrap().push(event.clone());
        Ok(())
    }

    fn events_in_range(
        &self,
        dimension: Dimension,
        key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let events = self.events.read().unwrap();
        let mut matched: Vec<EventRecord> = events
            .iter()
            .filter(|e| e.timestamp >= from && e.timestamp < to && e.key(dimension) == key)
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.attempt_id.cmp(&b.attempt_id))
        });
        Ok(matched)
    }

    fn active_keys(
        &self,
        dimension: Dimension,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let events = self.events.read().unwrap();
        let mut keys: Vec<String> = events
            .iter()
            .filter(|e| e.timestamp >= from && e.timestamp < to)
            .map(|e| e.key(dimension))
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.events.read().unwrap().len())
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut events = self.events.write().unwrap();
        let before = events.len();
        events.retain(|e| e.timestamp >= cutoff);
        Ok(before - events.len())
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        self.events.write().unwrap().clear();
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::models::Outcome;
    use chrono::Duration;

    #[test]
    fn test_range_is_right_open() {
        let store = MemoryEventStore::new();
        store
            .append(&event("alice", 0, "1.1.1.1", Some("DE"), Outcome::Success))
            .unwrap();
        store
            .append(&event("alice", 300, "1.1.1.1", Some("DE"), Outcome::Success))
            .unwrap();

        let hits = store
            .events_in_range(
                Dimension::Account,
                "alice",
                base_time(),
                base_time() + Duration::seconds(300),
            )
            .unwrap();
        assert_eq!(hits.len(), 1, "event at the end boundary is excluded");
    }

    #[test]
    fn test_out_of_order_append_still_queryable() {
        let store = MemoryEventStore::new();
        store
            .append(&event("alice", 200, "1.1.1.1", Some("DE"), Outcome::Failure))
            .unwrap();
        store
            .append(&event("alice", 100, "1.1.1.1", Some("DE"), Outcome::Success))
            .unwrap();

        let hits = store
            .events_in_range(
                Dimension::Account,
                "alice",
                base_time(),
                base_time() + Duration::seconds(300),
            )
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].timestamp < hits[1].timestamp, "sorted by time");
    }

    #[test]
    fn test_active_keys_per_dimension() {
        let store = MemoryEventStore::new();
        store
            .append(&event("alice", 0, "1.1.1.1", Some("DE"), Outcome::Success))
            .unwrap();
        store
            .append(&event("bob", 10, "2.2.2.2", Some("DE"), Outcome::Success))
            .unwrap();

        let accounts = store
            .active_keys(
                Dimension::Account,
                base_time(),
                base_time() + Duration::seconds(60),
            )
            .unwrap();
        assert_eq!(accounts, vec!["alice".to_string(), "bob".to_string()]);

        let ips = store
            .active_keys(
                Dimension::SourceIp,
                base_time(),
                base_time() + Duration::seconds(60),
            )
            .unwrap();
        assert_eq!(ips.len(), 2);
    }

    #[test]
    fn test_unknown_device_groups_under_unknown() {
        let store = MemoryEventStore::new();
        let mut e = event("alice", 0, "1.1.1.1", Some("DE"), Outcome::Success);
        e.device_id = None;
        store.append(&e).unwrap();

        let keys = store
            .active_keys(
                Dimension::Device,
                base_time(),
                base_time() + Duration::seconds(60),
            )
            .unwrap();
        assert_eq!(keys, vec!["unknown".to_string()]);
    }

    #[test]
    fn test_prune_before() {
        let store = MemoryEventStore::new();
        store
            .append(&event("alice", 0, "1.1.1.1", Some("DE"), Outcome::Success))
            .unwrap();
        store
            .append(&event("alice", 600, "1.1.1.1", Some("DE"), Outcome::Success))
            .unwrap();

        let removed = store
            .prune_before(base_time() + Duration::seconds(300))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().unwrap(), 1);
    }
}
