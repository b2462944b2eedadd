//! IP fan-out detection: one key touched from many distinct addresses

use super::Rule;
use crate::models::{FeatureVector, RuleVerdict, Severity};

/// Triggers when a window holds attempts from at least `min_ips`
/// distinct source IPs. High severity at twice the threshold.
pub struct IpFanOut {
    min_ips: u64,
}

impl IpFanOut {
    pub fn new(min_ips: u64) -> Self {
        IpFanOut { min_ips }
    }
}

impl Rule for IpFanOut {
    fn name(&self) -> &str {
        "IpFanOut"
    }

    fn evaluate(&self, features: &FeatureVector) -> RuleVerdict {
        if features.distinct_ip_count < self.min_ips {
            return RuleVerdict::pass(self.name());
        }

        let severity = if features.distinct_ip_count >= 2 * self.min_ips {
            Severity::High
        } else {
            Severity::Medium
        };
        RuleVerdict {
            rule_name: self.name().to_string(),
            triggered: true,
            severity,
            explanation: format!(
                "{} distinct source IPs in one window (threshold: {})",
                features.distinct_ip_count, self.min_ips
            ),
        }
    }
}
