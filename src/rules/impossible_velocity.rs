//! Impossible travel detection between consecutive successes

use super::Rule;
use crate::models::{FeatureVector, RuleVerdict, Severity};

/// Triggers when consecutive successes from different countries are
/// closer together than a plausible travel time. The aggregator carries
/// the smallest such gap in `min_country_switch_secs`, with the lookback
/// horizon as the "no such pair" sentinel.
pub struct ImpossibleVelocity {
    min_travel_secs: i64,
}

impl ImpossibleVelocity {
    pub fn new(min_travel_secs: i64) -> Self {
        ImpossibleVelocity { min_travel_secs }
    }
}

impl Rule for ImpossibleVelocity {
    fn name(&self) -> &str {
        "ImpossibleVelocity"
    }

    fn evaluate(&self, features: &FeatureVector) -> RuleVerdict {
        let gap = features.min_country_switch_secs;
        let min_travel = self.min_travel_secs as f64;
        if gap >= min_travel {
            return RuleVerdict::pass(self.name());
        }

        let severity = if gap < min_travel / 4.0 {
            Severity::High
        } else {
            Severity::Medium
        };
        RuleVerdict {
            rule_name: self.name().to_string(),
            triggered: true,
            severity,
            explanation: format!(
                "successes from different countries {:.0}s apart; minimum \
                 plausible travel time is {}s",
                gap, self.min_travel_secs
            ),
        }
    }
}
