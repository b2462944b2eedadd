use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grouping dimension a window is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Account,
    Device,
    SourceIp,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Account, Dimension::Device, Dimension::SourceIp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Account => "account",
            Dimension::Device => "device",
            Dimension::SourceIp => "source_ip",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one fixed-size, right-open window `[start, start + size)`
/// for one grouping key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowKey {
    pub dimension: Dimension,
    pub key: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={} [{} .. {})",
            self.dimension, self.key, self.window_start, self.window_end
        )
    }
}

/// Severity bands shared by rules and model-score mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}

/// Result of evaluating one rule against one feature vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleVerdict {
    pub rule_name: String,
    pub triggered: bool,
    pub severity: Severity,
    pub explanation: String,
}

impl RuleVerdict {
    pub fn pass(rule_name: &str) -> Self {
        RuleVerdict {
            rule_name: rule_name.to_string(),
            triggered: false,
            severity: Severity::Low,
            explanation: String::new(),
        }
    }
}

/// Anomaly score produced by one model snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelScore {
    /// Higher means more anomalous; isolation scores live in (0, 1]
    pub score: f64,
    pub model_version: u64,
    pub fitted_at: DateTime<Utc>,
}

/// Terminal artifact of the pipeline for one closed window.
/// Immutable once emitted; consumed by external alerting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub window_key: WindowKey,
    pub is_anomaly: bool,
    pub severity: Severity,
    /// Every triggered rule name; may be empty when only the model flagged
    pub contributing_rules: Vec<String>,
    pub model_score: Option<ModelScore>,
    pub model_contributed: bool,
    /// When the window was closed and this verdict emitted
    pub emitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert_eq!(
            [Severity::Medium, Severity::High, Severity::Low]
                .into_iter()
                .max(),
            Some(Severity::High)
        );
    }

    #[test]
    fn test_severity_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
        let back: Severity = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(back, Severity::Medium);
    }

    #[test]
    fn test_dimension_roundtrip() {
        for dim in Dimension::ALL {
            let json = serde_json::to_string(&dim).unwrap();
            let back: Dimension = serde_json::from_str(&json).unwrap();
            assert_eq!(dim, back);
        }
    }
}
