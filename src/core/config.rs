//! Run settings for a factory simulation
//!
//! Carried in the factory document under `"simulation"` and adjustable in code
//! through the builder methods.

use super::errors::ConfigError;
use super::types::SimTime;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

fn default_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Configuration for simulation execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed of the single random source
    pub seed: u64,
    /// When false every random draw collapses to its expected value
    pub randomize: bool,
    /// Calendar datetime of simulated time zero
    pub start: NaiveDateTime,
    /// Length of one production step
    #[serde(alias = "production-step-secs")]
    pub production_step_secs: SimTime,
    /// Collector sampling period in simulated time
    #[serde(alias = "sample-interval-secs")]
    pub sample_interval_secs: SimTime,
    /// Samples kept per time-series key (`None` keeps everything)
    pub retention: Option<usize>,
}

impl SimulationConfig {
    /// Create a new simulation configuration with default values
    pub fn new() -> Self {
        Self {
            seed: 0,
            randomize: true,
            start: default_start(),
            production_step_secs: 60,
            sample_interval_secs: 60,
            retention: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_randomize(mut self, randomize: bool) -> Self {
        self.randomize = randomize;
        self
    }

    pub fn with_start(mut self, start: NaiveDateTime) -> Self {
        self.start = start;
        self
    }

    pub fn with_production_step(mut self, secs: SimTime) -> Self {
        self.production_step_secs = secs;
        self
    }

    pub fn with_sample_interval(mut self, secs: SimTime) -> Self {
        self.sample_interval_secs = secs;
        self
    }

    /// Keep at most `samples` values per time-series key
    pub fn with_retention(mut self, samples: usize) -> Self {
        self.retention = Some(samples);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.production_step_secs == 0 {
            return Err(ConfigError::invalid(
                "simulation.production_step_secs",
                "must be positive",
            ));
        }
        if self.sample_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "simulation.sample_interval_secs",
                "must be positive",
            ));
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert!(config.randomize);
        assert_eq!(config.production_step_secs, 60);
        assert_eq!(config.retention, None);
        assert_eq!(config.start.to_string(), "2024-01-01 00:00:00");
    }

    #[test]
    fn test_config_builder() {
        let config = SimulationConfig::new()
            .with_seed(9)
            .with_randomize(false)
            .with_sample_interval(15)
            .with_retention(100);

        assert_eq!(config.seed, 9);
        assert!(!config.randomize);
        assert_eq!(config.sample_interval_secs, 15);
        assert_eq!(config.retention, Some(100));
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"seed": 5, "start": "2024-03-04T06:00:00"}"#).unwrap();
        assert_eq!(config.seed, 5);
        assert_eq!(config.sample_interval_secs, 60);
        assert_eq!(config.start.to_string(), "2024-03-04 06:00:00");
    }

    #[test]
    fn test_zero_step_rejected() {
        let config = SimulationConfig::new().with_production_step(0);
        assert!(config.validate().is_err());
    }
}
