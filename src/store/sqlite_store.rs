//! SQLite implementation of the EventStore trait

use super::{EventStore, StoreError};
use crate::models::{Dimension, EventRecord, Outcome};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, Row};
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use uuid::Uuid;

/// SQLite-backed event store.
///
/// The durable append log lives in one `events` table with per-dimension
/// indexes; all reads are time-range queries so the daemon can restart
/// and re-derive any window from disk.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Open (or create) the database at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteEventStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory database (useful for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteEventStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    /// Key expression per dimension; unknown devices group under "unknown"
    fn key_expr(dimension: Dimension) -> &'static str {
        match dimension {
            Dimension::Account => "account",
            Dimension::Device => "ifnull(device, 'unknown')",
            Dimension::SourceIp => "ip",
        }
    }

    fn row_to_event(row: &Row<'_>) -> rusqlite::Result<(String, i64, String, Option<String>, String, Option<String>, i64)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn decode(
        (id, ts_ms, account, device, ip, country, outcome): (
            String,
            i64,
            String,
            Option<String>,
            String,
            Option<String>,
            i64,
        ),
    ) -> Result<EventRecord, StoreError> {
        let attempt_id = Uuid::from_str(&id)
            .map_err(|_| StoreError::InvalidData(format!("Invalid attempt id: {}", id)))?;
        let timestamp = Utc
            .timestamp_millis_opt(ts_ms)
            .single()
            .ok_or_else(|| StoreError::InvalidData(format!("Invalid timestamp: {}", ts_ms)))?;
        let source_ip = IpAddr::from_str(&ip)
            .map_err(|_| StoreError::InvalidData(format!("Invalid IP address: {}", ip)))?;
        Ok(EventRecord {
            attempt_id,
            timestamp,
            account_id: account,
            device_id: device,
            source_ip,
            country_code: country,
            outcome: if outcome == 1 {
                Outcome::Success
            } else {
                Outcome::Failure
            },
        })
    }
}

impl EventStore for SqliteEventStore {
    fn append(&self, event: &EventRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO events (attempt_id, ts, account, device, ip, country, outcome)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                event.attempt_id.to_string(),
                event.timestamp.timestamp_millis(),
                event.account_id,
                event.device_id,
                event.source_ip.to_string(),
                event.country_code,
                if event.outcome.is_success() { 1i64 } else { 0i64 },
            ],
        )?;
        Ok(())
    }

    fn events_in_range(
        &self,
        dimension: Dimension,
        key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT attempt_id, ts, account, device, ip, country, outcome
             FROM events
             WHERE {} = ? AND ts >= ? AND ts < ?
             ORDER BY ts, attempt_id",
            Self::key_expr(dimension)
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![key, from.timestamp_millis(), to.timestamp_millis()],
                Self::row_to_event,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(Self::decode).collect()
    }

    fn active_keys(
        &self,
        dimension: Dimension,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT DISTINCT {} FROM events WHERE ts >= ? AND ts < ? ORDER BY 1",
            Self::key_expr(dimension)
        );
        let mut stmt = conn.prepare(&sql)?;
        let keys = stmt
            .query_map(
                params![from.timestamp_millis(), to.timestamp_millis()],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM events WHERE ts < ?",
            params![cutoff.timestamp_millis()],
        )?;
        Ok(deleted)
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM events", [])?;
        Ok(())
    }
}
