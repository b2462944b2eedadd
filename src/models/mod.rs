//! Data model for the detection engine: event records, feature vectors
//! and the verdict types emitted per closed window.

pub mod event;
pub mod features;
pub mod verdict;

pub use event::{EventRecord, IngestError, Outcome};
pub use features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use verdict::{Dimension, ModelScore, RuleVerdict, Severity, Verdict, WindowKey};
