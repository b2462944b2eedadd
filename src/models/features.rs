use serde::{Deserialize, Serialize};

use crate::models::WindowKey;

/// Number of numeric features in the fixed model schema
pub const FEATURE_COUNT: usize = 13;

/// Fixed feature order used by `FeatureVector::to_array`. The model is
/// fit and scored against arrays in exactly this order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "attempt_count",
    "failure_count",
    "failure_ratio",
    "distinct_ip_count",
    "distinct_device_count",
    "distinct_country_count",
    "max_attempts_per_second",
    "time_since_last_success_secs",
    "hour_sin",
    "hour_cos",
    "rare_country_count",
    "rare_device_count",
    "min_country_switch_secs",
];

/// Deterministic numeric summary of one window's events.
///
/// Given the same set of events the vector is bit-identical: all inputs
/// are sorted before aggregation and no randomness is involved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub window_key: WindowKey,
    pub attempt_count: u64,
    pub failure_count: u64,
    /// failure_count / attempt_count; 0.0 by convention when attempt_count is 0
    pub failure_ratio: f64,
    pub distinct_ip_count: u64,
    pub distinct_device_count: u64,
    /// Unknown country counts as its own distinct category
    pub distinct_country_count: u64,
    /// Peak event count in any sliding 1-second sub-interval of the window
    pub max_attempts_per_second: u64,
    /// Seconds from window end back to the most recent success within the
    /// lookback horizon; equals the horizon when there is none
    pub time_since_last_success_secs: f64,
    /// Cyclical encoding of the window-start hour of day
    pub hour_sin: f64,
    pub hour_cos: f64,
    /// Events whose country was seen fewer than `rare_min_occurrences`
    /// times for this key within the lookback horizon
    pub rare_country_count: u64,
    pub rare_device_count: u64,
    /// Smallest gap between consecutive successes from different
    /// countries; equals the horizon when no such pair exists
    pub min_country_switch_secs: f64,
}

impl FeatureVector {
    /// Convert to the fixed-order numeric array the model consumes.
    /// Non-finite values collapse to 0.0 so the model never sees NaN.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        let raw = [
            self.attempt_count as f64,
            self.failure_count as f64,
            self.failure_ratio,
            self.distinct_ip_count as f64,
            self.distinct_device_count as f64,
            self.distinct_country_count as f64,
            self.max_attempts_per_second as f64,
            self.time_since_last_success_secs,
            self.hour_sin,
            self.hour_cos,
            self.rare_country_count as f64,
            self.rare_device_count as f64,
            self.min_country_switch_secs,
        ];
        raw.map(|v| if v.is_finite() { v } else { 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Dimension;
    use chrono::{TimeZone, Utc};

    fn vector() -> FeatureVector {
        let start = Utc.with_ymd_and_hms(2023, 4, 13, 10, 0, 0).unwrap();
        FeatureVector {
            window_key: WindowKey {
                dimension: Dimension::Account,
                key: "alice".to_string(),
                window_start: start,
                window_end: start + chrono::Duration::seconds(300),
            },
            attempt_count: 4,
            failure_count: 1,
            failure_ratio: 0.25,
            distinct_ip_count: 2,
            distinct_device_count: 1,
            distinct_country_count: 1,
            max_attempts_per_second: 2,
            time_since_last_success_secs: 60.0,
            hour_sin: 0.5,
            hour_cos: -0.5,
            rare_country_count: 0,
            rare_device_count: 0,
            min_country_switch_secs: 86_400.0,
        }
    }

    #[test]
    fn test_array_matches_schema() {
        let arr = vector().to_array();
        assert_eq!(arr.len(), FEATURE_NAMES.len());
        assert_eq!(arr[0], 4.0);
        assert_eq!(arr[2], 0.25);
        assert_eq!(arr[12], 86_400.0);
    }

    #[test]
    fn test_non_finite_collapses_to_zero() {
        let mut v = vector();
        v.failure_ratio = f64::NAN;
        v.time_since_last_success_secs = f64::INFINITY;
        let arr = v.to_array();
        assert_eq!(arr[2], 0.0);
        assert_eq!(arr[7], 0.0);
    }
}
