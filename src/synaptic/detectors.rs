//! Inline anomaly detectors.
//!
//! Four checks run during execution and write straight to the surface.
//! Each returns the confidence the observation supports, which the
//! executor folds into the entity's execution-confidence synapse:
//!
//! - boundary-hit: a value landed exactly on an edge — neutral, recorded
//!   for audit but not an anomaly and not a confidence penalty
//! - zero-output: non-zero input produced zero — low-confidence signal
//! - data-missing: required field undefined/null/NaN — zero-confidence
//! - range-exceeded: output outside the operation's expected range

use super::surface::{SynapseKind, SynapticSurface};
use tracing::debug;

/// Confidence supported by a zero-output observation.
pub const ZERO_OUTPUT_CONFIDENCE: f64 = 0.3;

/// Confidence supported by a missing-data observation.
pub const DATA_MISSING_CONFIDENCE: f64 = 0.0;

/// Confidence supported by a range-exceeded observation.
pub const RANGE_EXCEEDED_CONFIDENCE: f64 = 0.2;

/// A value landed exactly on a boundary edge. Neutral: legacy tier tables
/// put real volume on their edges, so this is audit signal, not suspicion.
pub fn detect_boundary_hit(
    surface: &mut SynapticSurface,
    component_index: usize,
    entity_id: &str,
    value: f64,
) {
    debug!(
        component = component_index,
        entity = entity_id,
        value,
        "Boundary hit"
    );
    surface.record(
        SynapseKind::BoundaryHit,
        component_index,
        Some(entity_id),
        value,
        Some("value on boundary edge".to_string()),
    );
}

/// Non-zero input produced a zero outcome.
pub fn detect_zero_output(
    surface: &mut SynapticSurface,
    component_index: usize,
    entity_id: &str,
    input_magnitude: f64,
) -> f64 {
    surface.record(
        SynapseKind::Anomaly,
        component_index,
        Some(entity_id),
        0.0,
        Some(format!(
            "zero_output: input magnitude {input_magnitude} produced 0"
        )),
    );
    ZERO_OUTPUT_CONFIDENCE
}

/// A required field was absent, null, or NaN. Execution continues with 0;
/// this is a data-quality fact, not an execution failure.
pub fn detect_data_missing(
    surface: &mut SynapticSurface,
    component_index: usize,
    entity_id: &str,
    field: &str,
) -> f64 {
    surface.record(
        SynapseKind::Anomaly,
        component_index,
        Some(entity_id),
        0.0,
        Some(format!("data_missing: {field}")),
    );
    DATA_MISSING_CONFIDENCE
}

/// An outcome fell outside the operation-appropriate expected range.
pub fn detect_range_exceeded(
    surface: &mut SynapticSurface,
    component_index: usize,
    entity_id: &str,
    value: f64,
    expected_max: f64,
) -> f64 {
    surface.record(
        SynapseKind::Anomaly,
        component_index,
        Some(entity_id),
        value,
        Some(format!(
            "range_exceeded: |{value}| outside expected |x| <= {expected_max}"
        )),
    );
    RANGE_EXCEEDED_CONFIDENCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_boundary_hit_is_neutral() {
        let mut surface = SynapticSurface::new("tenant-1", HashMap::new());
        detect_boundary_hit(&mut surface, 0, "e-1", 100.0);
        assert_eq!(surface.anomaly_count_for_component(0), 0);
        assert_eq!(surface.synapses_of_kind(SynapseKind::BoundaryHit).len(), 1);
    }

    #[test]
    fn test_detectors_record_anomalies_with_notes() {
        let mut surface = SynapticSurface::new("tenant-1", HashMap::new());
        let c1 = detect_zero_output(&mut surface, 0, "e-1", 500.0);
        let c2 = detect_data_missing(&mut surface, 0, "e-1", "revenue");
        let c3 = detect_range_exceeded(&mut surface, 0, "e-1", 1.0e12, 1.0e9);

        assert_eq!(c1, ZERO_OUTPUT_CONFIDENCE);
        assert_eq!(c2, DATA_MISSING_CONFIDENCE);
        assert_eq!(c3, RANGE_EXCEEDED_CONFIDENCE);
        assert_eq!(surface.anomaly_count_for_component(0), 3);

        let notes: Vec<String> = surface
            .synapses_of_kind(SynapseKind::Anomaly)
            .iter()
            .filter_map(|s| s.note.clone())
            .collect();
        assert!(notes.iter().any(|n| n.starts_with("zero_output")));
        assert!(notes.iter().any(|n| n.starts_with("data_missing")));
        assert!(notes.iter().any(|n| n.starts_with("range_exceeded")));
    }
}
