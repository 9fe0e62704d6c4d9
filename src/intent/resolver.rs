//! Arbitration between externally-produced intents and the compiled
//! fallback.
//!
//! A validated external intent always wins, at confidence 0.9 — it was
//! produced by interpretation, not by direct rewrite. Anything else falls
//! back to the transformer at confidence 1.0. When an external intent was
//! present but invalid, the validator's error list rides along on the
//! resolution for observability; the run itself is unaffected.

use super::compiler::{compile_component, ComponentConfig};
use super::validator::validate_intent;
use super::vocabulary::{ComponentIntent, IntentOperation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Which producer won the arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentOrigin {
    /// Validated externally-produced intent
    External,
    /// Deterministic compiler fallback
    Transformer,
}

impl std::fmt::Display for IntentOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentOrigin::External => write!(f, "external"),
            IntentOrigin::Transformer => write!(f, "transformer"),
        }
    }
}

/// Resolver output for one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIntent {
    pub intent: ComponentIntent,
    pub origin: IntentOrigin,
    /// Validator errors when an external intent was present but rejected
    #[serde(default)]
    pub validation_errors: Vec<String>,
}

/// Resolve one component: external intent if it validates, compiled
/// fallback otherwise.
///
/// Never returns `None` for a component with usable configuration — that is
/// the compiler's guarantee. `None` means the component is disabled or has
/// nothing to compile (and no valid external intent stood in).
pub fn resolve_component(
    config: &ComponentConfig,
    external: Option<&Value>,
    external_confidence: f64,
) -> Option<ResolvedIntent> {
    // A disabled component contributes nothing, no matter who produced an
    // intent for it.
    if !config.enabled {
        return None;
    }

    let mut validation_errors = Vec::new();

    if let Some(candidate) = external {
        let report = validate_intent(candidate);
        if report.valid {
            // A structurally valid tree must deserialize; treat a parse
            // failure as one more rejection and fall through.
            match serde_json::from_value::<IntentOperation>(candidate.clone()) {
                Ok(operation) => {
                    debug!(
                        component = config.component_index,
                        label = %config.label,
                        "Using externally-produced intent"
                    );
                    let mut intent = ComponentIntent {
                        component_index: config.component_index,
                        label: config.label.clone(),
                        confidence: external_confidence,
                        required_metrics: Vec::new(),
                        variant_router: None,
                        operation: Some(operation),
                        modifiers: Vec::new(),
                    };
                    intent.required_metrics = intent.collect_required_metrics();
                    return Some(ResolvedIntent {
                        intent,
                        origin: IntentOrigin::External,
                        validation_errors: Vec::new(),
                    });
                }
                Err(e) => {
                    validation_errors.push(format!("deserialization failed: {e}"));
                }
            }
        } else {
            validation_errors = report.errors;
        }
        warn!(
            component = config.component_index,
            label = %config.label,
            errors = validation_errors.len(),
            "External intent rejected, falling back to transformer"
        );
    }

    let intent = compile_component(config)?;
    Some(ResolvedIntent {
        intent,
        origin: IntentOrigin::Transformer,
        validation_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_EXTERNAL_CONFIDENCE;
    use crate::intent::compiler::{CalculationType, PercentageConfig};
    use serde_json::json;

    fn percentage_component() -> ComponentConfig {
        ComponentConfig {
            component_index: 2,
            label: "Revenue share".to_string(),
            enabled: true,
            calculation_type: CalculationType::Percentage,
            tier_config: None,
            matrix_config: None,
            percentage_config: Some(PercentageConfig {
                metric: "revenue".to_string(),
                rate: 0.03,
                minimum_threshold: None,
                maximum_payout: None,
            }),
            conditional_config: None,
        }
    }

    #[test]
    fn test_valid_external_intent_wins() {
        let external = json!({
            "operation": "scalar_multiply",
            "input": {"source": "metric", "field": "revenue"},
            "rate": {"source": "constant", "value": 0.04}
        });
        let resolved = resolve_component(
            &percentage_component(),
            Some(&external),
            DEFAULT_EXTERNAL_CONFIDENCE,
        )
        .unwrap();
        assert_eq!(resolved.origin, IntentOrigin::External);
        assert_eq!(resolved.intent.confidence, 0.9);
        assert!(resolved.validation_errors.is_empty());
    }

    #[test]
    fn test_invalid_external_falls_back_with_errors() {
        let external = json!({"operation": "bogus"});
        let resolved = resolve_component(
            &percentage_component(),
            Some(&external),
            DEFAULT_EXTERNAL_CONFIDENCE,
        )
        .unwrap();
        assert_eq!(resolved.origin, IntentOrigin::Transformer);
        assert_eq!(resolved.intent.confidence, 1.0);
        assert!(!resolved.validation_errors.is_empty());
    }

    #[test]
    fn test_missing_external_uses_transformer_cleanly() {
        let resolved =
            resolve_component(&percentage_component(), None, DEFAULT_EXTERNAL_CONFIDENCE).unwrap();
        assert_eq!(resolved.origin, IntentOrigin::Transformer);
        assert!(resolved.validation_errors.is_empty());
    }

    #[test]
    fn test_disabled_component_resolves_to_none() {
        let config = ComponentConfig {
            enabled: false,
            ..percentage_component()
        };
        assert!(resolve_component(&config, None, DEFAULT_EXTERNAL_CONFIDENCE).is_none());
    }
}
