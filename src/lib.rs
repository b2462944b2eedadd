pub mod alerting;
pub mod clock;
pub mod config;
pub mod fusion;
pub mod geolocation;
pub mod input;
pub mod model;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod rules;
pub mod store;
pub mod window;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use models::{Dimension, EventRecord, FeatureVector, IngestError, Outcome, Severity, Verdict};
pub use pipeline::Pipeline;
pub use store::{EventStore, MemoryEventStore, SqliteEventStore};
pub use alerting::{AlertDispatcher, AlertQueue};
pub use geolocation::CountryResolver;
