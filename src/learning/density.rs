//! Pattern density: the persistent, per-tenant, per-signature confidence
//! record that drives adaptive trace depth.

use crate::config::EngineConfig;
use serde::{Deserialize, Serialize};

/// How much diagnostic work is redone for a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Record every resolved source and step, run all detectors
    FullTrace,
    /// Record operation-level steps only, run all detectors
    LightTrace,
    /// Record only the outcome; the data-missing detector stays armed
    Silent,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::FullTrace => write!(f, "full_trace"),
            ExecutionMode::LightTrace => write!(f, "light_trace"),
            ExecutionMode::Silent => write!(f, "silent"),
        }
    }
}

impl ExecutionMode {
    /// Derive the mode for a confidence value.
    ///
    /// Unknown patterns have no confidence at all and must resolve to
    /// [`ExecutionMode::FullTrace`] at the call site — fail open toward
    /// maximum diagnostics, never toward silence.
    pub fn for_confidence(confidence: f64, config: &EngineConfig) -> Self {
        if confidence < config.full_trace_threshold {
            ExecutionMode::FullTrace
        } else if confidence < config.silent_threshold {
            ExecutionMode::LightTrace
        } else {
            ExecutionMode::Silent
        }
    }
}

/// A pattern's accumulated trust for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternDensity {
    pub signature: String,
    /// Always clamped to [0, 1]
    pub confidence: f64,
    pub total_executions: u64,
    pub last_anomaly_rate: f64,
    pub execution_mode: ExecutionMode,
}

impl PatternDensity {
    /// Density seeded on first sighting of a pattern.
    pub fn seed(signature: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            signature: signature.into(),
            confidence: config.seed_confidence,
            total_executions: 0,
            last_anomaly_rate: 0.0,
            execution_mode: ExecutionMode::for_confidence(config.seed_confidence, config),
        }
    }
}

/// Consolidation's output for one pattern, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DensityUpdate {
    pub signature: String,
    pub confidence: f64,
    pub execution_mode: ExecutionMode,
    pub total_executions: u64,
    pub run_anomaly_rate: f64,
}

impl DensityUpdate {
    /// The density record this update produces when applied.
    pub fn into_density(self) -> PatternDensity {
        PatternDensity {
            signature: self.signature,
            confidence: self.confidence,
            total_executions: self.total_executions,
            last_anomaly_rate: self.run_anomaly_rate,
            execution_mode: self.execution_mode,
        }
    }
}

pub(crate) fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_thresholds_at_exact_cut_points() {
        let config = EngineConfig::default();
        assert_eq!(
            ExecutionMode::for_confidence(0.0, &config),
            ExecutionMode::FullTrace
        );
        assert_eq!(
            ExecutionMode::for_confidence(0.69, &config),
            ExecutionMode::FullTrace
        );
        assert_eq!(
            ExecutionMode::for_confidence(0.70, &config),
            ExecutionMode::LightTrace
        );
        assert_eq!(
            ExecutionMode::for_confidence(0.94, &config),
            ExecutionMode::LightTrace
        );
        assert_eq!(
            ExecutionMode::for_confidence(0.95, &config),
            ExecutionMode::Silent
        );
        assert_eq!(
            ExecutionMode::for_confidence(1.0, &config),
            ExecutionMode::Silent
        );
    }

    #[test]
    fn test_seed_density_starts_in_full_trace() {
        let config = EngineConfig::default();
        let density = PatternDensity::seed("constant|scope:entity|mods:none", &config);
        assert_eq!(density.confidence, 0.5);
        assert_eq!(density.execution_mode, ExecutionMode::FullTrace);
        assert_eq!(density.total_executions, 0);
    }

    #[test]
    fn test_mode_serializes_snake_case() {
        let json = serde_json::to_string(&ExecutionMode::FullTrace).unwrap();
        assert_eq!(json, "\"full_trace\"");
    }
}
