//! Deterministic rule detectors.
//!
//! Each rule is a pure predicate over one feature vector plus its own
//! configured thresholds. Rules never consult each other's output and
//! never mutate shared state; the engine is an open registry of trait
//! objects, so rules can be added or removed independently.

pub mod failure_burst;
pub mod geo_fan_out;
pub mod impossible_velocity;
pub mod ip_fan_out;

pub use failure_burst::FailureBurst;
pub use geo_fan_out::GeoFanOut;
pub use impossible_velocity::ImpossibleVelocity;
pub use ip_fan_out::IpFanOut;

use crate::config::RuleThresholds;
use crate::models::{FeatureVector, RuleVerdict};

/// A deterministic detector over one feature vector
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;
    fn evaluate(&self, features: &FeatureVector) -> RuleVerdict;
}

/// Registry of rules, evaluated independently per window
pub struct RuleEngine {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        RuleEngine { rules: Vec::new() }
    }

    /// Build the engine with the built-in rule set
    pub fn from_thresholds(thresholds: &RuleThresholds) -> Self {
        let mut engine = RuleEngine::new();
        engine.register(Box::new(FailureBurst::new(
            thresholds.failure_burst_min_failures,
            thresholds.failure_burst_min_ratio,
        )));
        engine.register(Box::new(IpFanOut::new(thresholds.ip_fan_out_min_ips)));
        engine.register(Box::new(GeoFanOut::new(
            thresholds.geo_fan_out_min_countries,
        )));
        engine.register(Box::new(ImpossibleVelocity::new(
            thresholds.impossible_velocity_min_travel_seconds,
        )));
        engine
    }

    pub fn register(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Evaluate every registered rule against one feature vector
    pub fn evaluate(&self, features: &FeatureVector) -> Vec<RuleVerdict> {
        self.rules.iter().map(|r| r.evaluate(features)).collect()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::benign_vector;
    use super::*;
    use crate::models::Severity;

    #[test]
    fn test_registry_runs_all_rules() {
        let engine = RuleEngine::from_thresholds(&RuleThresholds::default());
        let verdicts = engine.evaluate(&benign_vector());
        assert_eq!(verdicts.len(), 4);
        assert!(verdicts.iter().all(|v| !v.triggered));
    }

    #[test]
    fn test_adding_a_rule_does_not_change_others() {
        struct AlwaysOn;
        impl Rule for AlwaysOn {
            fn name(&self) -> &str {
                "AlwaysOn"
            }
            fn evaluate(&self, features: &FeatureVector) -> RuleVerdict {
                RuleVerdict {
                    rule_name: self.name().to_string(),
                    triggered: true,
                    severity: Severity::Low,
                    explanation: format!("window {}", features.window_key),
                }
            }
        }

        let thresholds = RuleThresholds::default();
        let baseline = RuleEngine::from_thresholds(&thresholds);
        let before = baseline.evaluate(&benign_vector());

        let mut extended = RuleEngine::from_thresholds(&thresholds);
        extended.register(Box::new(AlwaysOn));
        let after = extended.evaluate(&benign_vector());

        assert_eq!(after.len(), before.len() + 1);
        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a.rule_name, b.rule_name);
            assert_eq!(a.triggered, b.triggered);
            assert_eq!(a.severity, b.severity);
        }
        assert!(after.last().unwrap().triggered);
    }
}
