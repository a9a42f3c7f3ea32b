//! Engine configuration.
//!
//! Every field has a default matching the production app, so an empty JSON
//! object (or no config file at all) yields the standard behaviour.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

use crate::classifier::RiskTiers;
use crate::locator::LocateStrategy;
use crate::notifier::AlertTemplate;
use crate::threshold::ThresholdTable;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid risk tiers: {0}")]
    InvalidTiers(String),

    #[error("Invalid bucket size: {0}")]
    InvalidBucketSize(f64),

    #[error("No occurrence property keys configured")]
    NoOccurrenceKeys,

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration for the geofencing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Candidate selection for containment queries (default: BoundingBox)
    pub locate_strategy: LocateStrategy,

    /// Bucket edge length in degrees for `LocateStrategy::Bucketed` (default: 0.01, ~1.1 km)
    pub bucket_size_deg: f64,

    /// Occurrence count → risk level boundaries
    pub tiers: RiskTiers,

    /// Preference → minimum ordinal mapping (default: Identity)
    pub threshold_table: ThresholdTable,

    /// Feature property names tried, in order, for the occurrence count
    pub occurrence_keys: Vec<String>,

    /// Notification text
    pub alert_template: AlertTemplate,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            locate_strategy: LocateStrategy::BoundingBox,
            bucket_size_deg: 0.01,
            tiers: RiskTiers::default(),
            threshold_table: ThresholdTable::Identity,
            occurrence_keys: vec![
                "occurrenceCount".to_string(),
                "occurrences".to_string(),
                "count".to_string(),
                "weight".to_string(),
            ],
            alert_template: AlertTemplate::default(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path.as_ref())?;
        let config: EngineConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tiers.validate()?;

        if !(self.bucket_size_deg.is_finite() && self.bucket_size_deg > 0.0) {
            return Err(ConfigError::InvalidBucketSize(self.bucket_size_deg));
        }

        if self.occurrence_keys.is_empty() {
            return Err(ConfigError::NoOccurrenceKeys);
        }

        Ok(())
    }
}
