//! Unsupervised outlier model with immutable snapshot swap.
//!
//! A fit builds a complete new `ModelSnapshot` and atomically replaces
//! the current one; in-flight score calls keep the `Arc` they already
//! acquired, so scoring never blocks on a concurrent fit. Degenerate
//! training data skips the fit and retains the previous snapshot, and
//! the pipeline defers to rule-only verdicts for that cycle.

pub mod forest;

pub use forest::IsolationForest;

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::config::ModelConfig;
use crate::models::{FeatureVector, ModelScore, FEATURE_COUNT};

/// Errors from the outlier model
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("No fitted model snapshot available")]
    Unavailable,

    #[error("Degenerate training data: {0}")]
    DegenerateTrainingData(String),

    #[error("Fit abandoned by shutdown")]
    Cancelled,
}

/// One fully fitted, immutable model version
pub struct ModelSnapshot {
    forest: IsolationForest,
    pub version: u64,
    pub fitted_at: DateTime<Utc>,
}

impl ModelSnapshot {
    pub fn score(&self, features: &FeatureVector) -> ModelScore {
        ModelScore {
            score: self.forest.score(&features.to_array()),
            model_version: self.version,
            fitted_at: self.fitted_at,
        }
    }
}

/// Holder of the current snapshot plus fit logic
pub struct OutlierModel {
    config: ModelConfig,
    snapshot: RwLock<Option<Arc<ModelSnapshot>>>,
    next_version: AtomicU64,
}

impl OutlierModel {
    pub fn new(config: ModelConfig) -> Self {
        OutlierModel {
            config,
            snapshot: RwLock::new(None),
            next_version: AtomicU64::new(1),
        }
    }

    /// The last fully fitted snapshot, if any
    pub fn snapshot(&self) -> Option<Arc<ModelSnapshot>> {
        self.snapshot.read().unwrap().clone()
    }

    pub fn current_version(&self) -> Option<u64> {
        self.snapshot().map(|s| s.version)
    }

    /// Score against the current snapshot
    pub fn score(&self, features: &FeatureVector) -> Result<ModelScore, ModelError> {
        let snapshot = self.snapshot().ok_or(ModelError::Unavailable)?;
        Ok(snapshot.score(features))
    }

    /// Fit a new snapshot from the rolling history and swap it in.
    ///
    /// Returns the new version. On degenerate input or shutdown the
    /// previous snapshot stays current.
    pub fn fit(
        &self,
        training: &[FeatureVector],
        now: DateTime<Utc>,
        shutdown: &AtomicBool,
    ) -> Result<u64, ModelError> {
        if training.len() < self.config.min_training_vectors {
            return Err(ModelError::DegenerateTrainingData(format!(
                "{} vectors, need at least {}",
                training.len(),
                self.config.min_training_vectors
            )));
        }

        let data: Vec<[f64; FEATURE_COUNT]> =
            training.iter().map(|fv| fv.to_array()).collect();
        if all_zero_variance(&data) {
            return Err(ModelError::DegenerateTrainingData(
                "all features have zero variance".to_string(),
            ));
        }

        let forest = IsolationForest::fit(&data, self.config.n_trees, self.config.seed, || {
            !shutdown.load(Ordering::SeqCst)
        })
        .ok_or(ModelError::Cancelled)?;

        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let snapshot = Arc::new(ModelSnapshot {
            forest,
            version,
            fitted_at: now,
        });
        *self.snapshot.write().unwrap() = Some(snapshot);
        log::info!(
            "Fitted model version {} on {} vectors",
            version,
            training.len()
        );
        Ok(version)
    }
}

fn all_zero_variance(data: &[[f64; FEATURE_COUNT]]) -> bool {
    match data.first() {
        Some(first) => data.iter().all(|row| row == first),
        None => true,
    }
}
