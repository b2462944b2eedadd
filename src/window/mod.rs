//! Window aggregation: turns one grouping key's events in a fixed time
//! window into a deterministic feature vector.
//!
//! Windows are right-open `[start, start + size)` with starts aligned to
//! size boundaries, so every event maps to exactly one window per
//! grouping dimension. Aggregation is a pure function of store contents
//! for the queried ranges.

use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;
use std::sync::Arc;

use crate::models::{Dimension, EventRecord, FeatureVector, WindowKey};
use crate::store::{EventStore, StoreError};

/// Category label used when a country or device is unreported.
/// Unknown is its own distinct category, never dropped.
const UNKNOWN: &str = "unknown";

pub struct WindowAggregator {
    store: Arc<dyn EventStore>,
    window_size: Duration,
    lookback_horizon: Duration,
    rare_min_occurrences: u64,
}

impl WindowAggregator {
    pub fn new(
        store: Arc<dyn EventStore>,
        window_size_seconds: i64,
        lookback_horizon_seconds: i64,
        rare_min_occurrences: u64,
    ) -> Self {
        WindowAggregator {
            store,
            window_size: Duration::seconds(window_size_seconds),
            lookback_horizon: Duration::seconds(lookback_horizon_seconds),
            rare_min_occurrences,
        }
    }

    pub fn window_size(&self) -> Duration {
        self.window_size
    }

    /// Align a timestamp down to the enclosing window start
    pub fn align_down(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let size = self.window_size.num_seconds();
        let secs = ts.timestamp();
        DateTime::from_timestamp(secs - secs.rem_euclid(size), 0)
            .unwrap_or(ts)
    }

    /// Compute the feature vector for one window.
    ///
    /// Returns `None` for a window with zero events; empty windows are
    /// never emitted.
    pub fn close_window(
        &self,
        dimension: Dimension,
        key: &str,
        window_start: DateTime<Utc>,
    ) -> Result<Option<FeatureVector>, StoreError> {
        let window_end = window_start + self.window_size;
        let events = self
            .store
            .events_in_range(dimension, key, window_start, window_end)?;
        if events.is_empty() {
            return Ok(None);
        }

        let history = self.store.events_in_range(
            dimension,
            key,
            window_start - self.lookback_horizon,
            window_start,
        )?;

        let horizon_secs = self.lookback_horizon.num_seconds() as f64;
        let attempt_count = events.len() as u64;
        let failure_count = events
            .iter()
            .filter(|e| !e.outcome.is_success())
            .count() as u64;
        let failure_ratio = if attempt_count == 0 {
            0.0
        } else {
            failure_count as f64 / attempt_count as f64
        };

        let distinct_ip_count = events
            .iter()
            .map(|e| e.source_ip)
            .collect::<HashSet<_>>()
            .len() as u64;
        let distinct_device_count = events
            .iter()
            .map(|e| device_of(e))
            .collect::<HashSet<_>>()
            .len() as u64;
        let distinct_country_count = events
            .iter()
            .map(|e| country_of(e))
            .collect::<HashSet<_>>()
            .len() as u64;

        let hour = window_start.hour() as f64;
        let hour_sin = (2.0 * PI * hour / 24.0).sin();
        let hour_cos = (2.0 * PI * hour / 24.0).cos();

        let mut country_seen: HashMap<&str, u64> = HashMap::new();
        let mut device_seen: HashMap<&str, u64> = HashMap::new();
        for e in &history {
            *country_seen.entry(country_of(e)).or_insert(0) += 1;
            *device_seen.entry(device_of(e)).or_insert(0) += 1;
        }
        let rare_country_count = events
            .iter()
            .filter(|e| {
                country_seen.get(country_of(e)).copied().unwrap_or(0) < self.rare_min_occurrences
            })
            .count() as u64;
        let rare_device_count = events
            .iter()
            .filter(|e| {
                device_seen.get(device_of(e)).copied().unwrap_or(0) < self.rare_min_occurrences
            })
            .count() as u64;

        Ok(Some(FeatureVector {
            window_key: WindowKey {
                dimension,
                key: key.to_string(),
                window_start,
                window_end,
            },
            attempt_count,
            failure_count,
            failure_ratio,
            distinct_ip_count,
            distinct_device_count,
            distinct_country_count,
            max_attempts_per_second: max_attempts_per_second(&events),
            time_since_last_success_secs: time_since_last_success(
                &events,
                &history,
                window_end,
                horizon_secs,
            ),
            hour_sin,
            hour_cos,
            rare_country_count,
            rare_device_count,
            min_country_switch_secs: min_country_switch(&events, &history, horizon_secs),
        }))
    }
}

fn country_of(e: &EventRecord) -> &str {
    e.country_code.as_deref().unwrap_or(UNKNOWN)
}

fn device_of(e: &EventRecord) -> &str {
    e.device_id.as_deref().unwrap_or(UNKNOWN)
}

/// Peak event count in any sliding 1-second sub-interval.
/// Expects events sorted by timestamp (the store guarantees this).
fn max_attempts_per_second(events: &[EventRecord]) -> u64 {
    let times: Vec<i64> = events.iter().map(|e| e.timestamp.timestamp_millis()).collect();
    let mut max = 0usize;
    let mut lo = 0usize;
    for hi in 0..times.len() {
        while times[hi] - times[lo] >= 1000 {
            lo += 1;
        }
        max = max.max(hi - lo + 1);
    }
    max as u64
}

/// Seconds from window end back to the most recent success; the horizon
/// sentinel when no success exists in window or lookback history.
fn time_since_last_success(
    events: &[EventRecord],
    history: &[EventRecord],
    window_end: DateTime<Utc>,
    horizon_secs: f64,
) -> f64 {
    let last = events
        .iter()
        .chain(history.iter())
        .filter(|e| e.outcome.is_success())
        .map(|e| e.timestamp)
        .max();
    match last {
        Some(ts) => ((window_end - ts).num_milliseconds() as f64 / 1000.0).min(horizon_secs),
        None => horizon_secs,
    }
}

/// Smallest gap between two consecutive successes from different known
/// countries, considering the latest pre-window success as the leading
/// element. The horizon sentinel when no such pair exists.
fn min_country_switch(
    events: &[EventRecord],
    history: &[EventRecord],
    horizon_secs: f64,
) -> f64 {
    let mut successes: Vec<&EventRecord> = Vec::new();
    if let Some(prev) = history
        .iter()
        .filter(|e| e.outcome.is_success())
        .max_by_key(|e| (e.timestamp, e.attempt_id))
    {
        successes.push(prev);
    }
    successes.extend(events.iter().filter(|e| e.outcome.is_success()));

    let mut min_gap = horizon_secs;
    for pair in successes.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        match (&a.country_code, &b.country_code) {
            (Some(ca), Some(cb)) if ca != cb => {
                let gap = (b.timestamp - a.timestamp).num_milliseconds() as f64 / 1000.0;
                min_gap = min_gap.min(gap);
            }
            _ => {}
        }
    }
    min_gap
}
