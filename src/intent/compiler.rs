//! Deterministic lowering of legacy rule configuration into the intent
//! vocabulary.
//!
//! The transformer is pure and side-effect-free; its output carries
//! confidence 1.0 because it is a direct structural rewrite of trusted
//! configuration, with no interpretation uncertainty. A disabled component,
//! or one missing the configuration object its calculation type requires,
//! compiles to `None` — the caller treats that as "contributes zero, skip".

use super::vocabulary::{
    default_true, Boundary, Comparator, ComponentIntent, IntentModifier, IntentOperation,
    IntentSource, NoMatchBehavior, Operand,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Confidence of every compiled intent.
pub const TRANSFORMER_CONFIDENCE: f64 = 1.0;

/// Legacy calculation types the transformer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationType {
    TierLookup,
    MatrixLookup,
    Percentage,
    ConditionalPercentage,
}

/// One band of a legacy tier table. Legacy bands are declared
/// inclusive-inclusive (`[min, max]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierBand {
    pub min: f64,
    #[serde(default)]
    pub max: Option<f64>,
    pub payout: f64,
}

/// Legacy tier-lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierConfig {
    pub metric: String,
    pub tiers: Vec<TierBand>,
}

/// One axis band of a legacy matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixBand {
    pub min: f64,
    #[serde(default)]
    pub max: Option<f64>,
}

/// Legacy matrix-lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixConfig {
    pub row_metric: String,
    pub column_metric: String,
    pub rows: Vec<MatrixBand>,
    pub columns: Vec<MatrixBand>,
    pub payout_grid: Vec<Vec<f64>>,
}

/// Legacy flat-percentage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentageConfig {
    pub metric: String,
    pub rate: f64,
    #[serde(default)]
    pub minimum_threshold: Option<f64>,
    #[serde(default)]
    pub maximum_payout: Option<f64>,
}

/// One condition of a legacy conditional-percentage table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalRate {
    pub metric: String,
    pub minimum: f64,
    #[serde(default)]
    pub maximum: Option<f64>,
    pub rate: f64,
}

/// Legacy conditional-percentage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalConfig {
    pub conditions: Vec<ConditionalRate>,
}

/// One rule-set line item as stored by rule-set storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
    pub component_index: usize,
    pub label: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub calculation_type: CalculationType,
    #[serde(default)]
    pub tier_config: Option<TierConfig>,
    #[serde(default)]
    pub matrix_config: Option<MatrixConfig>,
    #[serde(default)]
    pub percentage_config: Option<PercentageConfig>,
    #[serde(default)]
    pub conditional_config: Option<ConditionalConfig>,
}

/// Lower one legacy component configuration into a [`ComponentIntent`].
pub fn compile_component(config: &ComponentConfig) -> Option<ComponentIntent> {
    if !config.enabled {
        debug!(
            component = config.component_index,
            label = %config.label,
            "Skipping disabled component"
        );
        return None;
    }

    let (operation, modifiers) = match config.calculation_type {
        CalculationType::TierLookup => (compile_tier(config.tier_config.as_ref()?), Vec::new()),
        CalculationType::MatrixLookup => {
            (compile_matrix(config.matrix_config.as_ref()?), Vec::new())
        }
        CalculationType::Percentage => {
            let percentage = config.percentage_config.as_ref()?;
            let modifiers = match percentage.maximum_payout {
                Some(max) => vec![IntentModifier::Cap { max }],
                None => Vec::new(),
            };
            (compile_percentage(percentage), modifiers)
        }
        CalculationType::ConditionalPercentage => {
            let conditional = config.conditional_config.as_ref()?;
            if conditional.conditions.is_empty() {
                return None;
            }
            (compile_conditional(conditional), Vec::new())
        }
    };

    let mut intent = ComponentIntent {
        component_index: config.component_index,
        label: config.label.clone(),
        confidence: TRANSFORMER_CONFIDENCE,
        required_metrics: Vec::new(),
        variant_router: None,
        operation: Some(operation),
        modifiers,
    };
    intent.required_metrics = intent.collect_required_metrics();
    Some(intent)
}

/// Tier table → `bounded_lookup_1d`. Boundaries are built
/// inclusive-inclusive to preserve legacy band semantics.
fn compile_tier(config: &TierConfig) -> IntentOperation {
    let boundaries = config
        .tiers
        .iter()
        .map(|tier| Boundary::inclusive(tier.min, tier.max))
        .collect();
    let outputs = config.tiers.iter().map(|tier| tier.payout).collect();
    IntentOperation::BoundedLookup1d {
        input: metric(&config.metric),
        boundaries,
        outputs,
        no_match_behavior: NoMatchBehavior::default(),
    }
}

/// Matrix table → `bounded_lookup_2d`, same inclusive-inclusive bands.
fn compile_matrix(config: &MatrixConfig) -> IntentOperation {
    let band = |b: &MatrixBand| Boundary::inclusive(b.min, b.max);
    IntentOperation::BoundedLookup2d {
        row_input: metric(&config.row_metric),
        column_input: metric(&config.column_metric),
        row_boundaries: config.rows.iter().map(band).collect(),
        column_boundaries: config.columns.iter().map(band).collect(),
        output_grid: config.payout_grid.clone(),
        no_match_behavior: NoMatchBehavior::default(),
    }
}

/// Percentage → `scalar_multiply`, gated when a minimum threshold exists.
fn compile_percentage(config: &PercentageConfig) -> IntentOperation {
    let multiply = IntentOperation::ScalarMultiply {
        input: metric(&config.metric),
        rate: constant(config.rate),
    };
    match config.minimum_threshold {
        Some(threshold) => IntentOperation::ConditionalGate {
            left: metric(&config.metric),
            comparator: Comparator::Gte,
            right: constant(threshold),
            on_true: multiply.into(),
            on_false: constant(0.0),
        },
        None => multiply,
    }
}

/// Conditional percentage → a chain of `conditional_gate`s, built from the
/// last condition backward so later conditions become the `onFalse`
/// fallback of earlier ones.
fn compile_conditional(config: &ConditionalConfig) -> IntentOperation {
    let single_metric = config
        .conditions
        .windows(2)
        .all(|pair| pair[0].metric == pair[1].metric);

    if single_metric {
        // Single-metric cascade: sort descending by minimum so the highest
        // threshold met wins, then fold from the smallest threshold back up.
        let mut ordered: Vec<&ConditionalRate> = config.conditions.iter().collect();
        ordered.sort_by(|a, b| {
            b.minimum
                .partial_cmp(&a.minimum)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut fallback: Operand = constant(0.0);
        for condition in ordered.iter().rev() {
            fallback = IntentOperation::ConditionalGate {
                left: metric(&condition.metric),
                comparator: Comparator::Gte,
                right: constant(condition.minimum),
                on_true: payout(condition).into(),
                on_false: fallback,
            }
            .into();
        }
        unwrap_root(fallback)
    } else {
        // Mixed metrics: per-condition min/max dual gates, chained in the
        // original declared order.
        let mut fallback: Operand = constant(0.0);
        for condition in config.conditions.iter().rev() {
            let body: Operand = match condition.maximum {
                Some(maximum) => IntentOperation::ConditionalGate {
                    left: metric(&condition.metric),
                    comparator: Comparator::Lte,
                    right: constant(maximum),
                    on_true: payout(condition).into(),
                    on_false: fallback.clone(),
                }
                .into(),
                None => payout(condition).into(),
            };
            fallback = IntentOperation::ConditionalGate {
                left: metric(&condition.metric),
                comparator: Comparator::Gte,
                right: constant(condition.minimum),
                on_true: body,
                on_false: fallback,
            }
            .into();
        }
        unwrap_root(fallback)
    }
}

fn payout(condition: &ConditionalRate) -> IntentOperation {
    IntentOperation::ScalarMultiply {
        input: metric(&condition.metric),
        rate: constant(condition.rate),
    }
}

fn metric(field: &str) -> Operand {
    IntentSource::Metric {
        field: field.to_string(),
    }
    .into()
}

fn constant(value: f64) -> Operand {
    IntentSource::Constant { value }.into()
}

fn unwrap_root(operand: Operand) -> IntentOperation {
    match operand {
        Operand::Operation(op) => *op,
        // Conditions are checked non-empty before folding; a bare source
        // root still degrades to a ratio-free constant wrapper.
        Operand::Source(IntentSource::Constant { value }) => IntentOperation::Constant { value },
        Operand::Source(source) => IntentOperation::ScalarMultiply {
            input: source.into(),
            rate: IntentSource::Constant { value: 1.0 }.into(),
        },
    }
}
