//! Per-entity input data, supplied by the orchestration layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything known about one entity for one calculation run.
///
/// Metric and attribute maps come from committed records; group metrics
/// arrive pre-aggregated; prior results are the outcomes of
/// earlier components in the same rule set, keyed by component index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityData {
    pub entity_id: String,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub group_metrics: Option<HashMap<String, f64>>,
    #[serde(default)]
    pub prior_results: HashMap<usize, f64>,
    #[serde(default)]
    pub period_history: HashMap<String, Vec<f64>>,
}

impl EntityData {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            ..Default::default()
        }
    }

    /// Coerce an attribute to a number: native numbers pass through,
    /// numeric strings parse, everything else is missing data.
    pub fn numeric_attribute(&self, field: &str) -> Option<f64> {
        match self.attributes.get(field)? {
            serde_json::Value::Number(number) => number.as_f64(),
            serde_json::Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
        .filter(|value| value.is_finite())
    }
}
