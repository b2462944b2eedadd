//! Geo fan-out detection: one key touched from many distinct countries

use super::Rule;
use crate::models::{FeatureVector, RuleVerdict, Severity};

/// Triggers when a window holds attempts from at least `min_countries`
/// distinct countries (unknown counts as its own category).
pub struct GeoFanOut {
    min_countries: u64,
}

impl GeoFanOut {
    pub fn new(min_countries: u64) -> Self {
        GeoFanOut { min_countries }
    }
}

impl Rule for GeoFanOut {
    fn name(&self) -> &str {
        "GeoFanOut"
    }

    fn evaluate(&self, features: &FeatureVector) -> RuleVerdict {
        if features.distinct_country_count < self.min_countries {
            return RuleVerdict::pass(self.name());
        }

        let severity = if features.distinct_country_count >= 2 * self.min_countries {
            Severity::High
        } else {
            Severity::Medium
        };
        RuleVerdict {
            rule_name: self.name().to_string(),
            triggered: true,
            severity,
            explanation: format!(
                "{} distinct countries in one window (threshold: {})",
                features.distinct_country_count, self.min_countries
            ),
        }
    }
}
