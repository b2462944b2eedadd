use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::models::Severity;

/// Configuration for the LADS daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core detection engine configuration
    pub engine: EngineConfig,
    /// Input source configuration
    pub input: InputConfig,
    /// Event store configuration
    pub store: StoreConfig,
    /// Verdict output configuration
    pub output: OutputConfig,
    /// Webhook alerting configuration
    pub alerting: AlertConfig,
    /// GeoIP lookup configuration
    pub geoip: GeoIpConfig,
}

/// Core engine configuration: windowing, rule thresholds and the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Window size in seconds (windows are `[start, start + size)`)
    pub window_size_seconds: i64,
    /// How far back history is consulted for last-success, rarity and
    /// country-switch features; also the sentinel for "never seen"
    pub lookback_horizon_seconds: i64,
    /// A country/device seen fewer than this many times for a key within
    /// the lookback horizon counts as rare
    pub rare_min_occurrences: u64,
    /// Per-rule thresholds
    pub rules: RuleThresholds,
    /// Outlier model configuration
    pub model: ModelConfig,
}

/// Thresholds for the built-in rule set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleThresholds {
    /// FailureBurst: minimum failures in a window
    pub failure_burst_min_failures: u64,
    /// FailureBurst: minimum failure ratio in a window
    pub failure_burst_min_ratio: f64,
    /// IpFanOut: minimum distinct source IPs in a window
    pub ip_fan_out_min_ips: u64,
    /// GeoFanOut: minimum distinct countries in a window
    pub geo_fan_out_min_countries: u64,
    /// ImpossibleVelocity: minimum plausible travel time between
    /// successes from different countries, in seconds
    pub impossible_velocity_min_travel_seconds: i64,
}

/// Outlier model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of isolation trees in the ensemble
    pub n_trees: usize,
    /// Seed for the tree-growing RNG; fixed seed means reproducible scores
    pub seed: u64,
    /// Refit after this many newly closed non-empty windows
    pub retrain_interval_windows: usize,
    /// Skip the fit entirely below this many training vectors
    pub min_training_vectors: usize,
    /// Rolling cap on the training history
    pub history_cap: usize,
    /// Model scores at or above this contribute an anomaly
    pub score_threshold: f64,
    /// Model scores at or above this map to High severity
    pub high_score_threshold: f64,
}

/// Input source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Path to the CSV login log (`ts,user,device,ip,country,success`)
    pub log_path: PathBuf,
    /// Read the whole file on startup instead of tailing from the end
    pub from_start: bool,
}

/// Event store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend: "memory" or "sqlite"
    pub backend: String,
    /// SQLite database path (if backend is "sqlite")
    pub db_path: Option<PathBuf>,
}

/// Verdict output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format: "json", "jsonl", or "console"
    pub format: String,
    /// Output file path (if format is not "console")
    pub file_path: Option<PathBuf>,
}

/// Webhook alerting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub enabled: bool,
    /// Only verdicts at or above this severity are dispatched
    pub min_severity: Severity,
    pub slack: Option<SlackConfig>,
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

/// Slack incoming-webhook alert channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    pub channel: String,
    pub username: Option<String>,
}

/// Generic webhook alert channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
    /// HTTP method, "POST" (default) or "PUT"
    pub method: Option<String>,
    pub headers: Option<HashMap<String, String>>,
}

/// GeoIP lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    pub enabled: bool,
    /// Path to a MaxMind GeoLite2-Country.mmdb file
    pub db_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine: EngineConfig::default(),
            input: InputConfig {
                log_path: PathBuf::from("login_log.csv"),
                from_start: false,
            },
            store: StoreConfig {
                backend: "memory".to_string(),
                db_path: Some(PathBuf::from("lads_events.db")),
            },
            output: OutputConfig {
                format: "jsonl".to_string(),
                file_path: Some(PathBuf::from("verdicts.jsonl")),
            },
            alerting: AlertConfig {
                enabled: false,
                min_severity: Severity::Medium,
                slack: None,
                webhooks: Vec::new(),
            },
            geoip: GeoIpConfig {
                enabled: false,
                db_path: Some(PathBuf::from("GeoLite2-Country.mmdb")),
            },
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            window_size_seconds: 300,
            lookback_horizon_seconds: 86_400,
            rare_min_occurrences: 3,
            rules: RuleThresholds::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for RuleThresholds {
    fn default() -> Self {
        RuleThresholds {
            failure_burst_min_failures: 10,
            failure_burst_min_ratio: 0.8,
            ip_fan_out_min_ips: 5,
            geo_fan_out_min_countries: 3,
            impossible_velocity_min_travel_seconds: 3600,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            n_trees: 100,
            seed: 42,
            retrain_interval_windows: 50,
            min_training_vectors: 20,
            history_cap: 5000,
            score_threshold: 0.65,
            high_score_threshold: 0.8,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
