//! Failure burst detection for credential stuffing and brute force

use super::Rule;
use crate::models::{FeatureVector, RuleVerdict, Severity};

/// Triggers when a window holds both many failures and a high failure
/// ratio. High severity at twice the failure threshold.
pub struct FailureBurst {
    min_failures: u64,
    min_ratio: f64,
}

impl FailureBurst {
    pub fn new(min_failures: u64, min_ratio: f64) -> Self {
        FailureBurst {
            min_failures,
            min_ratio,
        }
    }
}

impl Rule for FailureBurst {
    fn name(&self) -> &str {
        "FailureBurst"
    }

    fn evaluate(&self, features: &FeatureVector) -> RuleVerdict {
        if features.failure_count < self.min_failures || features.failure_ratio < self.min_ratio {
            return RuleVerdict::pass(self.name());
        }

        let severity = if features.failure_count >= 2 * self.min_failures {
            Severity::High
        } else {
            Severity::Medium
        };
        RuleVerdict {
            rule_name: self.name().to_string(),
            triggered: true,
            severity,
            explanation: format!(
                "{} failures out of {} attempts (ratio {:.2}) in one window; \
                 thresholds: {} failures at ratio {:.2}",
                features.failure_count,
                features.attempt_count,
                features.failure_ratio,
                self.min_failures,
                self.min_ratio
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::benign_vector;

    fn rule() -> FailureBurst {
        FailureBurst::new(10, 0.8)
    }

    #[test]
    fn test_no_failures_never_triggers() {
        let mut fv = benign_vector();
        fv.attempt_count = 100;
        fv.failure_count = 0;
        fv.failure_ratio = 0.0;
        fv.distinct_ip_count = 50;
        assert!(!rule().evaluate(&fv).triggered);
    }

    #[test]
    fn test_high_count_low_ratio_does_not_trigger() {
        let mut fv = benign_vector();
        fv.attempt_count = 100;
        fv.failure_count = 20;
        fv.failure_ratio = 0.2;
        assert!(!rule().evaluate(&fv).triggered);
    }

    #[test]
    fn test_burst_triggers_medium() {
        let mut fv = benign_vector();
        fv.attempt_count = 12;
        fv.failure_count = 11;
        fv.failure_ratio = 11.0 / 12.0;
        let verdict = rule().evaluate(&fv);
        assert!(verdict.triggered);
        assert_eq!(verdict.severity, Severity::Medium);
        assert!(verdict.explanation.contains("11 failures"));
    }

    #[test]
    fn test_double_threshold_is_high() {
        let mut fv = benign_vector();
        fv.attempt_count = 20;
        fv.failure_count = 20;
        fv.failure_ratio = 1.0;
        let verdict = rule().evaluate(&fv);
        assert!(verdict.triggered);
        assert_eq!(verdict.severity, Severity::High);
    }
}
