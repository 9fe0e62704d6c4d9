//! Engine configuration.
//!
//! All tunable constants of the learning loop live here: the confidence
//! thresholds that derive execution mode, the consolidation blend weights,
//! the flywheel EMA weight, the cold-start discount, and the persistence
//! chunk size. Defaults are the calibrated production values; every field
//! can be overridden from the environment.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Confidence below this resolves to `full_trace`.
pub const DEFAULT_FULL_TRACE_THRESHOLD: f64 = 0.70;

/// Confidence at or above this resolves to `silent`.
pub const DEFAULT_SILENT_THRESHOLD: f64 = 0.95;

/// Confidence seeded for a pattern on first sighting.
pub const DEFAULT_SEED_CONFIDENCE: f64 = 0.5;

/// Confidence assigned to a validated externally-produced intent.
pub const DEFAULT_EXTERNAL_CONFIDENCE: f64 = 0.9;

/// Discount applied to every imported cross-tenant prior.
pub const DEFAULT_COLD_START_DISCOUNT: f64 = 0.6;

/// Density rows written per upsert request.
pub const DEFAULT_UPSERT_CHUNK_SIZE: usize = 100;

/// Configuration for the intent execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Confidence below this executes in `full_trace` mode
    pub full_trace_threshold: f64,
    /// Confidence at or above this executes in `silent` mode
    pub silent_threshold: f64,
    /// Confidence seeded on first sighting of a pattern
    pub seed_confidence: f64,
    /// Confidence assigned to validated external intents
    pub external_confidence: f64,
    /// Weight of the existing confidence in consolidation
    pub consolidation_existing_weight: f64,
    /// Weight of this run's observed confidence in consolidation
    pub consolidation_run_weight: f64,
    /// Penalty multiplier on this run's anomaly rate in consolidation
    pub consolidation_anomaly_penalty: f64,
    /// Weight retained by the existing flywheel aggregate per update
    pub flywheel_retain_weight: f64,
    /// Weight of an incoming training signal in the flywheel EMA
    pub flywheel_incoming_weight: f64,
    /// Discount on imported cold-start priors
    pub cold_start_discount: f64,
    /// Density rows per upsert request
    pub upsert_chunk_size: usize,
    /// Outcome magnitude treated as range-exceeded when an operation has no
    /// tighter expected range of its own
    pub expected_range_max: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            full_trace_threshold: DEFAULT_FULL_TRACE_THRESHOLD,
            silent_threshold: DEFAULT_SILENT_THRESHOLD,
            seed_confidence: DEFAULT_SEED_CONFIDENCE,
            external_confidence: DEFAULT_EXTERNAL_CONFIDENCE,
            consolidation_existing_weight: 0.3,
            consolidation_run_weight: 0.7,
            consolidation_anomaly_penalty: 0.1,
            flywheel_retain_weight: 0.9,
            flywheel_incoming_weight: 0.1,
            cold_start_discount: DEFAULT_COLD_START_DISCOUNT,
            upsert_chunk_size: DEFAULT_UPSERT_CHUNK_SIZE,
            expected_range_max: 1.0e9,
        }
    }
}

impl EngineConfig {
    /// Create from environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            full_trace_threshold: env_f64("ENGINE_FULL_TRACE_THRESHOLD")
                .unwrap_or(defaults.full_trace_threshold),
            silent_threshold: env_f64("ENGINE_SILENT_THRESHOLD")
                .unwrap_or(defaults.silent_threshold),
            seed_confidence: env_f64("ENGINE_SEED_CONFIDENCE").unwrap_or(defaults.seed_confidence),
            external_confidence: env_f64("ENGINE_EXTERNAL_CONFIDENCE")
                .unwrap_or(defaults.external_confidence),
            consolidation_existing_weight: env_f64("ENGINE_CONSOLIDATION_EXISTING_WEIGHT")
                .unwrap_or(defaults.consolidation_existing_weight),
            consolidation_run_weight: env_f64("ENGINE_CONSOLIDATION_RUN_WEIGHT")
                .unwrap_or(defaults.consolidation_run_weight),
            consolidation_anomaly_penalty: env_f64("ENGINE_CONSOLIDATION_ANOMALY_PENALTY")
                .unwrap_or(defaults.consolidation_anomaly_penalty),
            flywheel_retain_weight: env_f64("ENGINE_FLYWHEEL_RETAIN_WEIGHT")
                .unwrap_or(defaults.flywheel_retain_weight),
            flywheel_incoming_weight: env_f64("ENGINE_FLYWHEEL_INCOMING_WEIGHT")
                .unwrap_or(defaults.flywheel_incoming_weight),
            cold_start_discount: env_f64("ENGINE_COLD_START_DISCOUNT")
                .unwrap_or(defaults.cold_start_discount),
            upsert_chunk_size: std::env::var("ENGINE_UPSERT_CHUNK_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.upsert_chunk_size),
            expected_range_max: env_f64("ENGINE_EXPECTED_RANGE_MAX")
                .unwrap_or(defaults.expected_range_max),
        }
    }

    /// Validate threshold ordering and weight sanity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.full_trace_threshold) {
            return Err(ConfigError::OutOfRange("full_trace_threshold"));
        }
        if !(0.0..=1.0).contains(&self.silent_threshold) {
            return Err(ConfigError::OutOfRange("silent_threshold"));
        }
        if self.full_trace_threshold >= self.silent_threshold {
            return Err(ConfigError::ThresholdOrdering {
                full_trace: self.full_trace_threshold,
                silent: self.silent_threshold,
            });
        }
        if !(0.0..=1.0).contains(&self.cold_start_discount) {
            return Err(ConfigError::OutOfRange("cold_start_discount"));
        }
        if self.upsert_chunk_size == 0 {
            return Err(ConfigError::OutOfRange("upsert_chunk_size"));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A field is outside its legal range
    #[error("Configuration field '{0}' is out of range")]
    OutOfRange(&'static str),

    /// Mode thresholds are not strictly ordered
    #[error("full_trace_threshold ({full_trace}) must be below silent_threshold ({silent})")]
    ThresholdOrdering { full_trace: f64, silent: f64 },
}

fn env_f64(var: &str) -> Option<f64> {
    std::env::var(var).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.full_trace_threshold, 0.70);
        assert_eq!(config.silent_threshold, 0.95);
        assert_eq!(config.upsert_chunk_size, 100);
    }

    #[test]
    fn test_threshold_ordering_rejected() {
        let config = EngineConfig {
            full_trace_threshold: 0.95,
            silent_threshold: 0.70,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_consolidation_weights() {
        let config = EngineConfig::default();
        assert_eq!(config.consolidation_existing_weight, 0.3);
        assert_eq!(config.consolidation_run_weight, 0.7);
        assert_eq!(config.consolidation_anomaly_penalty, 0.1);
    }
}
