//! Pipeline orchestration: ingest -> window aggregation -> {rules,
//! model} -> fusion -> verdict emission.
//!
//! The pipeline is the only component holding references to all the
//! others. Windows close strictly after their end boundary has elapsed
//! on the injected clock, so closing is a read-only range query; late
//! events are accepted into the store for audit but never merged into a
//! closed window.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::fusion::FusionPolicy;
use crate::model::{ModelError, OutlierModel};
use crate::models::{Dimension, EventRecord, FeatureVector, IngestError, Verdict};
use crate::rules::RuleEngine;
use crate::store::EventStore;
use crate::window::WindowAggregator;

struct PipelineState {
    /// Start of the next window to close; set from the first ingested
    /// event, aligned down to a window boundary
    watermark: Option<DateTime<Utc>>,
    /// Rolling training history of closed-window feature vectors
    history: VecDeque<FeatureVector>,
    windows_since_fit: usize,
}

pub struct Pipeline {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    aggregator: WindowAggregator,
    rules: RuleEngine,
    model: OutlierModel,
    fusion: FusionPolicy,
    retrain_interval: usize,
    history_cap: usize,
    state: Mutex<PipelineState>,
    verdicts: RwLock<Vec<Verdict>>,
    late_events: AtomicU64,
    shutdown: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: &EngineConfig, store: Arc<dyn EventStore>, clock: Arc<dyn Clock>) -> Self {
        Pipeline {
            aggregator: WindowAggregator::new(
                Arc::clone(&store),
                config.window_size_seconds,
                config.lookback_horizon_seconds,
                config.rare_min_occurrences,
            ),
            rules: RuleEngine::from_thresholds(&config.rules),
            model: OutlierModel::new(config.model.clone()),
            fusion: FusionPolicy::new(&config.model),
            retrain_interval: config.model.retrain_interval_windows,
            history_cap: config.model.history_cap,
            store,
            clock,
            state: Mutex::new(PipelineState {
                watermark: None,
                history: VecDeque::new(),
                windows_since_fit: 0,
            }),
            verdicts: RwLock::new(Vec::new()),
            late_events: AtomicU64::new(0),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag observed by the daemon loop and by a fit in progress;
    /// flipping it abandons the fit without swapping a partial model in
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Accept one login attempt into the store.
    ///
    /// Events for already-closed windows still succeed; they bump the
    /// late-events counter instead of reopening the window, preserving
    /// reproducibility of emitted feature vectors.
    pub fn ingest(&self, event: EventRecord) -> Result<(), IngestError> {
        event.validate()?;

        {
            let mut state = self.state.lock().unwrap();
            match state.watermark {
                None => {
                    state.watermark = Some(self.aggregator.align_down(event.timestamp));
                }
                Some(watermark) if event.timestamp < watermark => {
                    let late = self.late_events.fetch_add(1, Ordering::SeqCst) + 1;
                    log::debug!(
                        "Late event {} for account '{}' ({} late so far)",
                        event.attempt_id,
                        event.account_id,
                        late
                    );
                }
                Some(_) => {}
            }
        }

        self.store.append(&event)?;
        Ok(())
    }

    /// Number of events that arrived after their window had closed
    pub fn late_event_count(&self) -> u64 {
        self.late_events.load(Ordering::SeqCst)
    }

    /// Close every window whose end boundary has elapsed and emit
    /// verdicts for the non-empty ones. Returns the verdicts emitted by
    /// this call; all of them are also retained for `poll_verdicts`.
    pub fn tick(&self) -> Vec<Verdict> {
        let now = self.clock.now();
        let window_size = self.aggregator.window_size();
        let mut emitted = Vec::new();

        let mut state = self.state.lock().unwrap();
        while let Some(watermark) = state.watermark {
            if watermark + window_size > now {
                break;
            }
            self.close_windows_at(watermark, now, &mut state, &mut emitted);
            state.watermark = Some(watermark + window_size);
        }

        if state.windows_since_fit >= self.retrain_interval && !state.history.is_empty() {
            let training: Vec<FeatureVector> = state.history.iter().cloned().collect();
            state.windows_since_fit = 0;
            match self.model.fit(&training, now, &self.shutdown) {
                Ok(version) => log::debug!("Model refit complete (version {})", version),
                Err(ModelError::DegenerateTrainingData(reason)) => {
                    log::warn!("Skipping model fit: {}", reason);
                }
                Err(ModelError::Cancelled) => log::info!("Model fit abandoned by shutdown"),
                Err(ModelError::Unavailable) => unreachable!("fit never reports Unavailable"),
            }
        }
        drop(state);

        if !emitted.is_empty() {
            self.verdicts.write().unwrap().extend(emitted.iter().cloned());
        }
        emitted
    }

    /// Evaluate one elapsed window across all dimensions. A failure for
    /// one key is logged and never blocks verdicts for the others.
    fn close_windows_at(
        &self,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
        state: &mut PipelineState,
        emitted: &mut Vec<Verdict>,
    ) {
        let window_end = window_start + self.aggregator.window_size();
        for dimension in Dimension::ALL {
            let keys = match self.store.active_keys(dimension, window_start, window_end) {
                Ok(keys) => keys,
                Err(e) => {
                    log::error!("Failed to list {} keys for window: {}", dimension, e);
                    continue;
                }
            };
            for key in keys {
                let features = match self.aggregator.close_window(dimension, &key, window_start) {
                    Ok(Some(fv)) => fv,
                    Ok(None) => continue,
                    Err(e) => {
                        log::error!("Failed to close window for {}={}: {}", dimension, key, e);
                        continue;
                    }
                };

                let rule_verdicts = self.rules.evaluate(&features);
                let model_score = match self.model.score(&features) {
                    Ok(score) => Some(score),
                    Err(ModelError::Unavailable) => None,
                    Err(e) => {
                        log::error!("Model scoring failed for {}={}: {}", dimension, key, e);
                        None
                    }
                };

                let verdict = self.fusion.decide(
                    features.window_key.clone(),
                    &rule_verdicts,
                    model_score,
                    now,
                );
                if verdict.is_anomaly {
                    log::warn!(
                        "ANOMALY: {} severity={} rules=[{}] model_score={:?}",
                        verdict.window_key,
                        verdict.severity,
                        verdict.contributing_rules.join(", "),
                        verdict.model_score.as_ref().map(|s| s.score),
                    );
                }
                emitted.push(verdict);

                state.history.push_back(features);
                while state.history.len() > self.history_cap {
                    state.history.pop_front();
                }
                state.windows_since_fit += 1;
            }
        }
    }

    /// All verdicts emitted at or after `since`. Verdicts are immutable
    /// once emitted, so re-querying the same `since` returns the same set.
    pub fn poll_verdicts(&self, since: DateTime<Utc>) -> Vec<Verdict> {
        self.verdicts
            .read()
            .unwrap()
            .iter()
            .filter(|v| v.emitted_at >= since)
            .cloned()
            .collect()
    }

    /// Current model version, if a snapshot has been fitted
    pub fn model_version(&self) -> Option<u64> {
        self.model.current_version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{Outcome, Severity};
    use crate::store::test_support::{base_time, event};
    use crate::store::MemoryEventStore;
    use chrono::Duration;

    const COUNTRIES: [&str; 4] = ["DE", "FR", "US", "CN"];

    fn pipeline_with_clock() -> (Pipeline, Arc<ManualClock>) {
        let store = Arc::new(MemoryEventStore::new());
        let clock = Arc::new(ManualClock::new(base_time()));
        let config = EngineConfig::default();
        let pipeline = Pipeline::new(&config, store, clock.clone());
        (pipeline, clock)
    }

    fn account_verdict<'a>(verdicts: &'a [Verdict], key: &str) -> &'a Verdict {
        verdicts
            .iter()
            .find(|v| v.window_key.dimension == Dimension::Account && v.window_key.key == key)
            .expect("expected an account-dimension verdict")
    }

    #[test]
    fn test_ingest_rejects_empty_account() {
        let (pipeline, _clock) = pipeline_with_clock();
        let mut e = event("", 0, "1.1.1.1", Some("DE"), Outcome::Failure);
        e.account_id = String::new();
        assert!(matches!(
            pipeline.ingest(e),
            Err(IngestError::Validation(_))
        ));
    }

    #[test]
    fn test_no_verdicts_before_window_elapses() {
        let (pipeline, _clock) = pipeline_with_clock();
        pipeline
            .ingest(event("alice", 10, "1.1.1.1", Some("DE"), Outcome::Success))
            .unwrap();
        // Clock still inside the window
        assert!(pipeline.tick().is_empty());
    }

    #[test]
    fn test_credential_stuffing_burst_flags_all_three_rules() {
        let (pipeline, clock) = pipeline_with_clock();
        // 20 failures from 15 distinct IPs across 4 countries in 5 minutes
        for i in 0..20u8 {
            pipeline
                .ingest(event(
                    "account_a",
                    i as i64 * 10,
                    &format!("10.0.0.{}", (i % 15) + 1),
                    Some(COUNTRIES[(i % 4) as usize]),
                    Outcome::Failure,
                ))
                .unwrap();
        }

        clock.advance(Duration::seconds(300));
        let verdicts = pipeline.tick();
        let verdict = account_verdict(&verdicts, "account_a");

        assert!(verdict.is_anomaly);
        assert_eq!(verdict.severity, Severity::High);
        for rule in ["FailureBurst", "IpFanOut", "GeoFanOut"] {
            assert!(
                verdict.contributing_rules.contains(&rule.to_string()),
                "{} should have triggered",
                rule
            );
        }
        assert!(!verdict.model_contributed, "no fit has happened yet");
    }

    #[test]
    fn test_country_switch_triggers_impossible_velocity() {
        let (pipeline, clock) = pipeline_with_clock();
        pipeline
            .ingest(event("account_b", 0, "1.1.1.1", Some("DE"), Outcome::Success))
            .unwrap();
        pipeline
            .ingest(event("account_b", 30, "9.9.9.9", Some("US"), Outcome::Success))
            .unwrap();

        clock.advance(Duration::seconds(300));
        let verdicts = pipeline.tick();
        let verdict = account_verdict(&verdicts, "account_b");

        assert!(verdict.is_anomaly);
        assert!(verdict
            .contributing_rules
            .contains(&"ImpossibleVelocity".to_string()));
    }

    #[test]
    fn test_normal_logins_are_benign() {
        let (pipeline, clock) = pipeline_with_clock();
        for i in 0..3 {
            pipeline
                .ingest(event(
                    "account_c",
                    i * 60,
                    "1.1.1.1",
                    Some("DE"),
                    Outcome::Success,
                ))
                .unwrap();
        }

        clock.advance(Duration::seconds(300));
        let verdicts = pipeline.tick();
        let verdict = account_verdict(&verdicts, "account_c");

        assert!(!verdict.is_anomaly);
        assert_eq!(verdict.severity, Severity::Low);
        assert!(verdict.contributing_rules.is_empty());
        assert!(!verdict.model_contributed);
        assert!(verdict.model_score.is_none());
    }

    #[test]
    fn test_late_event_counted_and_window_not_recomputed() {
        let (pipeline, clock) = pipeline_with_clock();
        pipeline
            .ingest(event("alice", 10, "1.1.1.1", Some("DE"), Outcome::Success))
            .unwrap();

        clock.advance(Duration::seconds(300));
        let first = pipeline.tick();
        assert!(!first.is_empty());
        let verdict_count = pipeline.poll_verdicts(base_time()).len();

        // Arrives after its window closed
        pipeline
            .ingest(event("alice", 20, "1.1.1.1", Some("DE"), Outcome::Failure))
            .unwrap();
        assert_eq!(pipeline.late_event_count(), 1);

        let again = pipeline.tick();
        assert!(again.is_empty(), "closed window is never recomputed");
        assert_eq!(pipeline.poll_verdicts(base_time()).len(), verdict_count);
    }

    #[test]
    fn test_poll_verdicts_is_idempotent() {
        let (pipeline, clock) = pipeline_with_clock();
        pipeline
            .ingest(event("alice", 10, "1.1.1.1", Some("DE"), Outcome::Success))
            .unwrap();
        clock.advance(Duration::seconds(300));
        pipeline.tick();

        let first = pipeline.poll_verdicts(base_time());
        let second = pipeline.poll_verdicts(base_time());
        assert!(!first.is_empty());
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.window_key, b.window_key);
            assert_eq!(a.is_anomaly, b.is_anomaly);
            assert_eq!(a.emitted_at, b.emitted_at);
        }
    }

    #[test]
    fn test_model_fits_after_enough_windows_and_scores() {
        let store = Arc::new(MemoryEventStore::new());
        let clock = Arc::new(ManualClock::new(base_time()));
        let mut config = EngineConfig::default();
        config.model.retrain_interval_windows = 10;
        config.model.min_training_vectors = 10;
        let pipeline = Pipeline::new(&config, store, clock.clone());

        // Varied benign traffic over many windows; each window emits
        // account, device and ip verdicts, so history grows fast
        for w in 0..12i64 {
            for i in 0..(2 + (w % 3)) {
                pipeline
                    .ingest(event(
                        &format!("user_{}", w % 4),
                        w * 300 + i * 45,
                        &format!("1.1.1.{}", (w % 5) + 1),
                        Some(COUNTRIES[(w % 2) as usize]),
                        if i == 0 { Outcome::Failure } else { Outcome::Success },
                    ))
                    .unwrap();
            }
            clock.advance(Duration::seconds(300));
            pipeline.tick();
        }

        assert!(pipeline.model_version().is_some(), "model should have fit");

        // A subsequent window now carries a model score
        pipeline
            .ingest(event("user_0", 12 * 300 + 5, "1.1.1.1", Some("DE"), Outcome::Success))
            .unwrap();
        clock.advance(Duration::seconds(300));
        let verdicts = pipeline.tick();
        let verdict = account_verdict(&verdicts, "user_0");
        assert!(verdict.model_contributed);
        let score = verdict.model_score.as_ref().unwrap();
        assert!(score.score > 0.0 && score.score <= 1.0);
        assert_eq!(Some(score.model_version), pipeline.model_version());
    }

    #[test]
    fn test_every_dimension_gets_a_window() {
        let (pipeline, clock) = pipeline_with_clock();
        pipeline
            .ingest(event("alice", 10, "1.1.1.1", Some("DE"), Outcome::Success))
            .unwrap();
        clock.advance(Duration::seconds(300));
        let verdicts = pipeline.tick();

        let dims: Vec<Dimension> = verdicts.iter().map(|v| v.window_key.dimension).collect();
        assert!(dims.contains(&Dimension::Account));
        assert!(dims.contains(&Dimension::Device));
        assert!(dims.contains(&Dimension::SourceIp));
    }
}
