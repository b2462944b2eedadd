//! Fusion of rule verdicts and the model score into one final verdict.
//!
//! Rules and model are weighed on equal footing: neither silently
//! overrides the other, and every triggered signal's provenance is
//! carried on the verdict.

use chrono::{DateTime, Utc};

use crate::config::ModelConfig;
use crate::models::{ModelScore, RuleVerdict, Severity, Verdict, WindowKey};

pub struct FusionPolicy {
    score_threshold: f64,
    high_score_threshold: f64,
}

impl FusionPolicy {
    pub fn new(model: &ModelConfig) -> Self {
        FusionPolicy {
            score_threshold: model.score_threshold,
            high_score_threshold: model.high_score_threshold,
        }
    }

    /// Combine rule verdicts and an optional model score.
    ///
    /// `model_score` is `None` whenever no snapshot scored this window
    /// (no fit yet, or a degenerate cycle); the verdict then records
    /// `model_contributed = false` and is purely rule-driven.
    pub fn decide(
        &self,
        window_key: WindowKey,
        rule_verdicts: &[RuleVerdict],
        model_score: Option<ModelScore>,
        emitted_at: DateTime<Utc>,
    ) -> Verdict {
        let contributing_rules: Vec<String> = rule_verdicts
            .iter()
            .filter(|v| v.triggered)
            .map(|v| v.rule_name.clone())
            .collect();

        let rule_severity = rule_verdicts
            .iter()
            .filter(|v| v.triggered)
            .map(|v| v.severity)
            .max();

        let model_contributed = model_score.is_some();
        let model_flagged = model_score
            .as_ref()
            .map(|s| s.score >= self.score_threshold)
            .unwrap_or(false);
        let model_severity = model_score.as_ref().and_then(|s| {
            if s.score >= self.high_score_threshold {
                Some(Severity::High)
            } else if s.score >= self.score_threshold {
                Some(Severity::Medium)
            } else {
                None
            }
        });

        let is_anomaly = !contributing_rules.is_empty() || model_flagged;
        let severity = rule_severity
            .into_iter()
            .chain(model_severity)
            .max()
            .unwrap_or(Severity::Low);

        Verdict {
            window_key,
            is_anomaly,
            severity,
            contributing_rules,
            model_score,
            model_contributed,
            emitted_at,
        }
    }
}
