//! End-of-run consolidation.
//!
//! Runs once per run, after the entity loop, over every density entry that
//! received at least one `pattern` synapse. Pure: reads the surface,
//! returns updates and training signals, touches no store.

use super::density::{clamp01, DensityUpdate, ExecutionMode};
use crate::config::EngineConfig;
use crate::synaptic::surface::SynapticSurface;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One training signal per pattern per run, destined for the flywheel.
///
/// Carries no tenant or entity identifier: this is the record that crosses
/// the privacy firewall into cross-tenant aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSignal {
    pub signature: String,
    /// Confidence observed this run
    pub confidence: f64,
    /// Anomaly rate observed this run
    pub anomaly_rate: f64,
    /// Pattern executions this run
    pub executions: u64,
}

/// Consolidation's complete output for one run.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationOutput {
    pub updates: Vec<DensityUpdate>,
    pub training_signals: Vec<TrainingSignal>,
}

/// Fold this run's telemetry into new density. Exponential blend of the
/// existing confidence with the run's observed confidence, penalized by
/// the run's anomaly rate, clamped to [0, 1].
pub fn consolidate(surface: &SynapticSurface, config: &EngineConfig) -> ConsolidationOutput {
    let mut output = ConsolidationOutput::default();
    let entity_count = surface.entity_count().max(1);

    for (signature, &component_index) in surface.pattern_components() {
        let executions = surface.pattern_executions(signature);
        if executions == 0 {
            continue;
        }
        let Some(existing) = surface.loaded_density().get(signature) else {
            // Initialization seeds density before any execution; a missing
            // entry here means the caller bypassed the surface API.
            debug!(signature = %signature, "No density entry at consolidation; skipping");
            continue;
        };

        let confidences = surface.confidence_values_for_component(component_index);
        let run_confidence = if confidences.is_empty() {
            existing.confidence
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        let anomaly_rate =
            surface.anomaly_count_for_component(component_index) as f64 / entity_count as f64;

        let new_confidence = clamp01(
            existing.confidence * config.consolidation_existing_weight
                + run_confidence * config.consolidation_run_weight
                - anomaly_rate * config.consolidation_anomaly_penalty,
        );
        let new_mode = ExecutionMode::for_confidence(new_confidence, config);

        debug!(
            signature = %signature,
            component = component_index,
            run_confidence,
            anomaly_rate,
            new_confidence,
            mode = %new_mode,
            "Pattern consolidated"
        );

        output.updates.push(DensityUpdate {
            signature: signature.clone(),
            confidence: new_confidence,
            execution_mode: new_mode,
            total_executions: existing.total_executions + executions,
            run_anomaly_rate: anomaly_rate,
        });
        // Exactly one signal per pattern, not per entity.
        output.training_signals.push(TrainingSignal {
            signature: signature.clone(),
            confidence: run_confidence,
            anomaly_rate,
            executions,
        });
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn surface_with_pattern(confidences: &[f64], anomalies: u64, entities: u64) -> SynapticSurface {
        let config = EngineConfig::default();
        let mut surface = SynapticSurface::new("tenant-1", HashMap::new());
        surface.initialize_pattern_density("sig-a", 0, &config);
        for (i, &confidence) in confidences.iter().enumerate() {
            let entity = format!("e-{i}");
            surface.record_pattern("sig-a", 0, &entity);
            surface.record_confidence(0, &entity, confidence);
        }
        for _ in 0..anomalies {
            surface.record(
                crate::synaptic::SynapseKind::Anomaly,
                0,
                Some("e-0"),
                0.0,
                None,
            );
        }
        for _ in 0..entities {
            surface.mark_entity_processed();
        }
        surface
    }

    #[test]
    fn test_clean_run_raises_confidence() {
        let config = EngineConfig::default();
        let surface = surface_with_pattern(&[1.0, 1.0, 1.0], 0, 3);
        let output = consolidate(&surface, &config);

        assert_eq!(output.updates.len(), 1);
        let update = &output.updates[0];
        // 0.5 * 0.3 + 1.0 * 0.7 - 0 = 0.85
        assert!((update.confidence - 0.85).abs() < 1.0e-9);
        assert_eq!(update.execution_mode, ExecutionMode::LightTrace);
        assert_eq!(update.total_executions, 3);
    }

    #[test]
    fn test_anomalies_penalize_confidence() {
        let config = EngineConfig::default();
        let clean = consolidate(&surface_with_pattern(&[1.0, 1.0], 0, 2), &config);
        let anomalous = consolidate(&surface_with_pattern(&[1.0, 1.0], 2, 2), &config);
        assert!(anomalous.updates[0].confidence < clean.updates[0].confidence);
        assert_eq!(anomalous.updates[0].run_anomaly_rate, 1.0);
    }

    #[test]
    fn test_confidence_bounded_for_any_history() {
        let config = EngineConfig::default();
        for confidences in [
            vec![0.0; 10],
            vec![1.0; 10],
            vec![0.0, 1.0, 0.5, 0.25],
        ] {
            for anomalies in [0u64, 5, 50] {
                let surface = surface_with_pattern(&confidences, anomalies, 10);
                let output = consolidate(&surface, &config);
                let update = &output.updates[0];
                assert!((0.0..=1.0).contains(&update.confidence));
            }
        }
    }

    #[test]
    fn test_no_confidence_synapses_falls_back_to_existing() {
        let config = EngineConfig::default();
        let mut surface = SynapticSurface::new("tenant-1", HashMap::new());
        surface.initialize_pattern_density("sig-a", 0, &config);
        surface.record_pattern("sig-a", 0, "e-0");
        surface.mark_entity_processed();

        let output = consolidate(&surface, &config);
        let update = &output.updates[0];
        // 0.5 * 0.3 + 0.5 * 0.7 = 0.5
        assert!((update.confidence - 0.5).abs() < 1.0e-9);
    }

    #[test]
    fn test_one_training_signal_per_pattern() {
        let config = EngineConfig::default();
        let surface = surface_with_pattern(&[0.9, 0.9, 0.9, 0.9], 0, 4);
        let output = consolidate(&surface, &config);
        assert_eq!(output.training_signals.len(), 1);
        assert_eq!(output.training_signals[0].executions, 4);
    }

    #[test]
    fn test_unexecuted_pattern_is_skipped() {
        let config = EngineConfig::default();
        let mut surface = SynapticSurface::new("tenant-1", HashMap::new());
        surface.initialize_pattern_density("sig-idle", 3, &config);
        let output = consolidate(&surface, &config);
        assert!(output.updates.is_empty());
        assert!(output.training_signals.is_empty());
    }

    #[test]
    fn test_training_signal_carries_no_identifiers() {
        let signal = TrainingSignal {
            signature: "sig".to_string(),
            confidence: 0.8,
            anomaly_rate: 0.1,
            executions: 12,
        };
        let json = serde_json::to_value(&signal).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        for key in keys {
            let lower = key.to_lowercase();
            assert!(!lower.contains("tenant"));
            assert!(!lower.contains("entity"));
        }
    }
}
