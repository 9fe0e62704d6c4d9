//! Structural pattern signatures.
//!
//! A signature describes the *shape* of an intent tree and nothing else:
//! operation tags, source kinds, boundary and grid cardinalities, blend
//! input counts, window size and aggregation — never field names, labels,
//! tenant data, or values. Two structurally identical components hash to
//! the same signature regardless of tenant, metric names, or currency,
//! which makes the signature the join key for all cross-tenant learning.

use super::vocabulary::{ComponentIntent, IntentOperation, IntentSource, Operand};
use sha2::{Digest, Sha256};

/// Generate the structural signature of a component intent.
pub fn generate_pattern_signature(intent: &ComponentIntent) -> String {
    let body = match (&intent.variant_router, &intent.operation) {
        (Some(router), _) => {
            let routes: Vec<String> = router
                .routes
                .iter()
                .map(|route| operation_signature(&route.operation))
                .collect();
            format!("variants{}({})", router.routes.len(), routes.join("+"))
        }
        (None, Some(operation)) => operation_signature(operation),
        (None, None) => "empty".to_string(),
    };

    let scope = if uses_group_scope(intent) { "group" } else { "entity" };

    let mut modifier_names: Vec<&str> = intent.modifiers.iter().map(|m| m.name()).collect();
    modifier_names.sort_unstable();
    modifier_names.dedup();
    let modifiers = if modifier_names.is_empty() {
        "none".to_string()
    } else {
        modifier_names.join("+")
    };

    format!("{body}|scope:{scope}|mods:{modifiers}")
}

/// Compact hex digest of a signature, for storage keys.
pub fn signature_digest(signature: &str) -> String {
    let hash = Sha256::digest(signature.as_bytes());
    format!("{hash:x}")
}

fn operation_signature(operation: &IntentOperation) -> String {
    match operation {
        IntentOperation::BoundedLookup1d {
            input, boundaries, ..
        } => format!(
            "bounded_lookup_1d({},b{})",
            operand_signature(input),
            boundaries.len()
        ),
        IntentOperation::BoundedLookup2d {
            row_input,
            column_input,
            row_boundaries,
            column_boundaries,
            ..
        } => format!(
            "bounded_lookup_2d({},{},g{}x{})",
            operand_signature(row_input),
            operand_signature(column_input),
            row_boundaries.len(),
            column_boundaries.len()
        ),
        IntentOperation::ScalarMultiply { input, rate } => format!(
            "scalar_multiply({},{})",
            operand_signature(input),
            operand_signature(rate)
        ),
        IntentOperation::ConditionalGate {
            left,
            right,
            on_true,
            on_false,
            ..
        } => format!(
            "conditional_gate({},{},{},{})",
            operand_signature(left),
            operand_signature(right),
            operand_signature(on_true),
            operand_signature(on_false)
        ),
        IntentOperation::Aggregate { .. } => "aggregate".to_string(),
        IntentOperation::Ratio {
            numerator,
            denominator,
            ..
        } => format!(
            "ratio({},{})",
            operand_signature(numerator),
            operand_signature(denominator)
        ),
        IntentOperation::Constant { .. } => "constant".to_string(),
        IntentOperation::WeightedBlend { inputs } => {
            format!("weighted_blend({}inputs)", inputs.len())
        }
        IntentOperation::TemporalWindow {
            input,
            window_size,
            aggregation,
            ..
        } => format!(
            "temporal_window({},w{}:{})",
            operand_signature(input),
            window_size,
            aggregation.name()
        ),
    }
}

fn operand_signature(operand: &Operand) -> String {
    match operand {
        Operand::Source(source) => source_kind(source).to_string(),
        Operand::Operation(operation) => operation_signature(operation),
    }
}

fn source_kind(source: &IntentSource) -> &'static str {
    match source {
        IntentSource::Metric { .. } => "metric",
        IntentSource::Ratio { .. } => "ratio",
        IntentSource::Aggregate { .. } => "aggregate",
        IntentSource::Constant { .. } => "constant",
        IntentSource::Attribute { .. } => "attribute",
        IntentSource::PriorComponent { .. } => "prior",
    }
}

fn uses_group_scope(intent: &ComponentIntent) -> bool {
    fn operand_uses_group(operand: &Operand) -> bool {
        match operand {
            Operand::Source(source) => matches!(source, IntentSource::Aggregate { .. }),
            Operand::Operation(operation) => operation_uses_group(operation),
        }
    }
    fn operation_uses_group(operation: &IntentOperation) -> bool {
        match operation {
            IntentOperation::BoundedLookup1d { input, .. } => operand_uses_group(input),
            IntentOperation::BoundedLookup2d {
                row_input,
                column_input,
                ..
            } => operand_uses_group(row_input) || operand_uses_group(column_input),
            IntentOperation::ScalarMultiply { input, rate } => {
                operand_uses_group(input) || operand_uses_group(rate)
            }
            IntentOperation::ConditionalGate {
                left,
                right,
                on_true,
                on_false,
                ..
            } => {
                operand_uses_group(left)
                    || operand_uses_group(right)
                    || operand_uses_group(on_true)
                    || operand_uses_group(on_false)
            }
            IntentOperation::Aggregate { .. } => true,
            IntentOperation::Ratio {
                numerator,
                denominator,
                ..
            } => operand_uses_group(numerator) || operand_uses_group(denominator),
            IntentOperation::Constant { .. } => false,
            IntentOperation::WeightedBlend { inputs } => {
                inputs.iter().any(|input| operand_uses_group(&input.value))
            }
            IntentOperation::TemporalWindow { input, .. } => operand_uses_group(input),
        }
    }

    let operation_scoped = intent
        .operation
        .as_ref()
        .map(operation_uses_group)
        .unwrap_or(false);
    let router_scoped = intent
        .variant_router
        .as_ref()
        .map(|router| {
            router
                .routes
                .iter()
                .any(|route| operation_uses_group(&route.operation))
        })
        .unwrap_or(false);
    operation_scoped || router_scoped
}
