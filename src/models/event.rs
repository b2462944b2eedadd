use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;
use uuid::Uuid;

/// Outcome of a single login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// One normalized login attempt. Immutable once created; the store owns
/// the history and the pipeline only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default = "Uuid::new_v4")]
    pub attempt_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub account_id: String,
    /// Absent means the client did not report a device identity
    pub device_id: Option<String>,
    pub source_ip: IpAddr,
    /// ISO 3166-1 alpha-2; absent means the origin country is unknown
    pub country_code: Option<String>,
    pub outcome: Outcome,
}

impl EventRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        account_id: impl Into<String>,
        device_id: Option<String>,
        source_ip: IpAddr,
        country_code: Option<String>,
        outcome: Outcome,
    ) -> Self {
        EventRecord {
            attempt_id: Uuid::new_v4(),
            timestamp,
            account_id: account_id.into(),
            device_id,
            source_ip,
            country_code,
            outcome,
        }
    }

    /// Grouping key of this event for one window dimension.
    ///
    /// An absent device id maps to the "unknown" key so every event
    /// belongs to exactly one window per dimension.
    pub fn key(&self, dimension: crate::models::Dimension) -> String {
        use crate::models::Dimension;
        match dimension {
            Dimension::Account => self.account_id.clone(),
            Dimension::Device => self
                .device_id
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            Dimension::SourceIp => self.source_ip.to_string(),
        }
    }

    /// Reject records the engine cannot attribute to an account.
    ///
    /// Unknown IP, country or device are legitimate feature values and
    /// never a validation failure.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.account_id.trim().is_empty() {
            return Err(IngestError::Validation(
                "account_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Errors surfaced by `Pipeline::ingest`
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid event record: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),
}
