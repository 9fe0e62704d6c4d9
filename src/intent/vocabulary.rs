//! The closed intent vocabulary.
//!
//! Pure data model, no behavior: sources, boundaries, the nine operations,
//! modifiers, and the per-component wrapper. The operation set is closed
//! and non-Turing-complete — no loops, no user-defined functions — so every
//! computation stays explainable and replayable.
//!
//! Wire shape: operation tags are snake_case (`bounded_lookup_1d`), field
//! names are camelCase (`onTrue`, `outputGrid`, `minInclusive`), matching
//! the externally-produced intent format.

use serde::{Deserialize, Serialize};

/// Where a scalar value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum IntentSource {
    /// A field from the entity's metric map
    Metric { field: String },
    /// A ratio of two metric fields
    Ratio { numerator: String, denominator: String },
    /// A pre-aggregated group-scope value
    Aggregate {
        scope: AggregateScope,
        function: AggregateFunction,
        field: String,
    },
    /// A literal constant
    Constant { value: f64 },
    /// A field from the entity's attribute map, coerced to a number
    Attribute { field: String },
    /// The outcome of an earlier component in the same rule set
    PriorComponent { index: usize },
}

/// Scope of an aggregate source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateScope {
    /// The entity's group (team, store, region)
    Group,
    /// The whole tenant population
    Tenant,
}

/// Aggregation the orchestration layer applied when producing group metrics.
///
/// Advisory: group values arrive pre-aggregated; the function is carried for
/// the trace and the pattern signature, not re-computed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Sum,
    Average,
    Min,
    Max,
    Count,
}

/// One band of a lookup table.
///
/// Deliberately asymmetric defaults: lower edges are inclusive, upper edges
/// exclusive. Callers wanting inclusive-inclusive bands (legacy tier tables)
/// must set both flags explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Boundary {
    /// Lower edge; `None` = unbounded below
    #[serde(default)]
    pub min: Option<f64>,
    /// Upper edge; `None` = unbounded above
    #[serde(default)]
    pub max: Option<f64>,
    /// Whether the lower edge matches exactly (default true)
    #[serde(default = "default_true")]
    pub min_inclusive: bool,
    /// Whether the upper edge matches exactly (default false)
    #[serde(default)]
    pub max_inclusive: bool,
}

impl Boundary {
    /// A boundary with both edges unbounded; matches everything.
    pub fn unbounded() -> Self {
        Self {
            min: None,
            max: None,
            min_inclusive: true,
            max_inclusive: false,
        }
    }

    /// A half-open `[min, max)` band with default edge flags.
    pub fn half_open(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            min_inclusive: true,
            max_inclusive: false,
        }
    }

    /// An inclusive-inclusive `[min, max]` band, the legacy tier shape.
    pub fn inclusive(min: f64, max: Option<f64>) -> Self {
        Self {
            min: Some(min),
            max,
            min_inclusive: true,
            max_inclusive: true,
        }
    }

    /// Whether `value` lands inside this band.
    pub fn matches(&self, value: f64) -> bool {
        let above = match self.min {
            None => true,
            Some(min) => {
                if self.min_inclusive {
                    value >= min
                } else {
                    value > min
                }
            }
        };
        let below = match self.max {
            None => true,
            Some(max) => {
                if self.max_inclusive {
                    value <= max
                } else {
                    value < max
                }
            }
        };
        above && below
    }

    /// Whether `value` sits exactly on one of the declared edges.
    pub fn is_edge(&self, value: f64) -> bool {
        self.min == Some(value) || self.max == Some(value)
    }
}

/// An operand is either a leaf source or a nested operation — the single
/// recursion point of the vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Operation(Box<IntentOperation>),
    Source(IntentSource),
}

impl From<IntentSource> for Operand {
    fn from(source: IntentSource) -> Self {
        Operand::Source(source)
    }
}

impl From<IntentOperation> for Operand {
    fn from(operation: IntentOperation) -> Self {
        Operand::Operation(Box::new(operation))
    }
}

/// Comparison operator for `conditional_gate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
}

impl Comparator {
    pub fn evaluate(&self, left: f64, right: f64) -> bool {
        match self {
            Comparator::Gte => left >= right,
            Comparator::Gt => left > right,
            Comparator::Lte => left <= right,
            Comparator::Lt => left < right,
            Comparator::Eq => left == right,
            Comparator::Neq => left != right,
        }
    }
}

/// Declared no-match policy for bounded lookups.
///
/// The executor currently collapses every value to the `Zero` behavior; the
/// enum is carried so producers can declare intent ahead of support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoMatchBehavior {
    #[default]
    Zero,
    Nearest,
    Error,
}

/// Declared zero-denominator policy for `ratio`. Collapsed to `Zero` at
/// execution time, same as [`NoMatchBehavior`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroDenominatorBehavior {
    #[default]
    Zero,
    Skip,
    Error,
}

/// Reduction applied to a temporal window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowAggregation {
    Sum,
    Average,
    Min,
    Max,
    /// Ordinary-least-squares slope against index 0..n-1
    Trend,
}

impl WindowAggregation {
    pub fn name(&self) -> &'static str {
        match self {
            WindowAggregation::Sum => "sum",
            WindowAggregation::Average => "average",
            WindowAggregation::Min => "min",
            WindowAggregation::Max => "max",
            WindowAggregation::Trend => "trend",
        }
    }
}

/// One weighted input of a `weighted_blend`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendInput {
    pub value: Operand,
    pub weight: f64,
}

/// One of the nine closed operations. Each operand may itself be a nested
/// operation; the tree is immutable and built once per component per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum IntentOperation {
    #[serde(rename_all = "camelCase")]
    BoundedLookup1d {
        input: Operand,
        boundaries: Vec<Boundary>,
        outputs: Vec<f64>,
        #[serde(default)]
        no_match_behavior: NoMatchBehavior,
    },
    #[serde(rename_all = "camelCase")]
    BoundedLookup2d {
        row_input: Operand,
        column_input: Operand,
        row_boundaries: Vec<Boundary>,
        column_boundaries: Vec<Boundary>,
        output_grid: Vec<Vec<f64>>,
        #[serde(default)]
        no_match_behavior: NoMatchBehavior,
    },
    #[serde(rename_all = "camelCase")]
    ScalarMultiply { input: Operand, rate: Operand },
    #[serde(rename_all = "camelCase")]
    ConditionalGate {
        left: Operand,
        comparator: Comparator,
        right: Operand,
        on_true: Operand,
        on_false: Operand,
    },
    #[serde(rename_all = "camelCase")]
    Aggregate { source: IntentSource },
    #[serde(rename_all = "camelCase")]
    Ratio {
        numerator: Operand,
        denominator: Operand,
        #[serde(default)]
        zero_denominator_behavior: ZeroDenominatorBehavior,
    },
    #[serde(rename_all = "camelCase")]
    Constant { value: f64 },
    #[serde(rename_all = "camelCase")]
    WeightedBlend { inputs: Vec<BlendInput> },
    #[serde(rename_all = "camelCase")]
    TemporalWindow {
        input: Operand,
        window_size: usize,
        aggregation: WindowAggregation,
        #[serde(default = "default_true")]
        include_current: bool,
        /// History series to read; defaults to the input's metric field
        #[serde(default)]
        history_field: Option<String>,
    },
}

impl IntentOperation {
    /// The wire tag of this operation.
    pub fn tag(&self) -> &'static str {
        match self {
            IntentOperation::BoundedLookup1d { .. } => "bounded_lookup_1d",
            IntentOperation::BoundedLookup2d { .. } => "bounded_lookup_2d",
            IntentOperation::ScalarMultiply { .. } => "scalar_multiply",
            IntentOperation::ConditionalGate { .. } => "conditional_gate",
            IntentOperation::Aggregate { .. } => "aggregate",
            IntentOperation::Ratio { .. } => "ratio",
            IntentOperation::Constant { .. } => "constant",
            IntentOperation::WeightedBlend { .. } => "weighted_blend",
            IntentOperation::TemporalWindow { .. } => "temporal_window",
        }
    }
}

/// Post-processing step, applied in declared order after the base value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntentModifier {
    #[serde(rename_all = "camelCase")]
    Cap { max: f64 },
    #[serde(rename_all = "camelCase")]
    Floor { min: f64 },
    #[serde(rename_all = "camelCase")]
    Proration {
        numerator: IntentSource,
        denominator: IntentSource,
    },
    /// Accepted by the type system; a no-op in single-period execution.
    #[serde(rename_all = "camelCase")]
    TemporalAdjustment {
        #[serde(default)]
        factor: Option<f64>,
    },
}

impl IntentModifier {
    pub fn name(&self) -> &'static str {
        match self {
            IntentModifier::Cap { .. } => "cap",
            IntentModifier::Floor { .. } => "floor",
            IntentModifier::Proration { .. } => "proration",
            IntentModifier::TemporalAdjustment { .. } => "temporal_adjustment",
        }
    }
}

/// No-match policy for a variant router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoMatchPolicy {
    /// Fall back to the first declared route
    #[default]
    First,
    /// Contribute zero
    Skip,
    /// Contribute zero; reserved for a future hard-failure mode
    Error,
}

/// One route of a variant router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRoute {
    /// Declared value; matched by string equality against the resolved
    /// routing attribute
    #[serde(rename = "match")]
    pub match_value: serde_json::Value,
    pub operation: IntentOperation,
}

/// Routes a component to one of several operation trees based on an entity
/// attribute (plan variant, role, region).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRouter {
    pub attribute: String,
    pub routes: Vec<VariantRoute>,
    #[serde(default)]
    pub no_match_policy: NoMatchPolicy,
}

/// One rule-set line item, ready to execute. Rebuilt each run.
///
/// Invariant: exactly one operation at the root when no variant router is
/// present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentIntent {
    pub component_index: usize,
    pub label: String,
    pub confidence: f64,
    #[serde(default)]
    pub required_metrics: Vec<String>,
    #[serde(default)]
    pub variant_router: Option<VariantRouter>,
    #[serde(default)]
    pub operation: Option<IntentOperation>,
    #[serde(default)]
    pub modifiers: Vec<IntentModifier>,
}

impl ComponentIntent {
    /// Metric fields the intent tree reads, deduplicated in first-seen order.
    pub fn collect_required_metrics(&self) -> Vec<String> {
        let mut fields = Vec::new();
        if let Some(op) = &self.operation {
            collect_operation_metrics(op, &mut fields);
        }
        if let Some(router) = &self.variant_router {
            for route in &router.routes {
                collect_operation_metrics(&route.operation, &mut fields);
            }
        }
        for modifier in &self.modifiers {
            if let IntentModifier::Proration {
                numerator,
                denominator,
            } = modifier
            {
                collect_source_metrics(numerator, &mut fields);
                collect_source_metrics(denominator, &mut fields);
            }
        }
        fields
    }
}

fn collect_operation_metrics(op: &IntentOperation, out: &mut Vec<String>) {
    match op {
        IntentOperation::BoundedLookup1d { input, .. } => collect_operand_metrics(input, out),
        IntentOperation::BoundedLookup2d {
            row_input,
            column_input,
            ..
        } => {
            collect_operand_metrics(row_input, out);
            collect_operand_metrics(column_input, out);
        }
        IntentOperation::ScalarMultiply { input, rate } => {
            collect_operand_metrics(input, out);
            collect_operand_metrics(rate, out);
        }
        IntentOperation::ConditionalGate {
            left,
            right,
            on_true,
            on_false,
            ..
        } => {
            collect_operand_metrics(left, out);
            collect_operand_metrics(right, out);
            collect_operand_metrics(on_true, out);
            collect_operand_metrics(on_false, out);
        }
        IntentOperation::Aggregate { source } => collect_source_metrics(source, out),
        IntentOperation::Ratio {
            numerator,
            denominator,
            ..
        } => {
            collect_operand_metrics(numerator, out);
            collect_operand_metrics(denominator, out);
        }
        IntentOperation::Constant { .. } => {}
        IntentOperation::WeightedBlend { inputs } => {
            for input in inputs {
                collect_operand_metrics(&input.value, out);
            }
        }
        IntentOperation::TemporalWindow {
            input,
            history_field,
            ..
        } => {
            collect_operand_metrics(input, out);
            if let Some(field) = history_field {
                push_unique(out, field);
            }
        }
    }
}

fn collect_operand_metrics(operand: &Operand, out: &mut Vec<String>) {
    match operand {
        Operand::Source(source) => collect_source_metrics(source, out),
        Operand::Operation(op) => collect_operation_metrics(op, out),
    }
}

fn collect_source_metrics(source: &IntentSource, out: &mut Vec<String>) {
    match source {
        IntentSource::Metric { field } => push_unique(out, field),
        IntentSource::Ratio {
            numerator,
            denominator,
        } => {
            push_unique(out, numerator);
            push_unique(out, denominator);
        }
        _ => {}
    }
}

fn push_unique(out: &mut Vec<String>, field: &str) {
    if !out.iter().any(|f| f == field) {
        out.push(field.to_string());
    }
}

pub(crate) fn default_true() -> bool {
    true
}
