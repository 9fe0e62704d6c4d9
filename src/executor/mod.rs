//! The intent executor: a state-free recursive evaluator.
//!
//! Evaluates one [`ComponentIntent`] against one entity's data and returns
//! the outcome plus a replayable trace. Evaluation is synchronous,
//! call-and-return, structurally recursive over [`Operand`] — exhaustive
//! match, no runtime type tests — and shares no mutable state beyond the
//! run's own synaptic surface.
//!
//! Degenerate runtime situations never raise: no boundary match, a zero
//! denominator, and an empty temporal window all have defined deterministic
//! fallback values. Declared-but-collapsed policy enums record a trace note
//! when their declaration differs from the effective behavior.

pub mod entity;
pub mod trace;

pub use entity::EntityData;
pub use trace::{ExecutionResult, ExecutionTrace, TraceStep, TraceStepKind};

use crate::config::EngineConfig;
use crate::intent::vocabulary::{
    ComponentIntent, IntentModifier, IntentOperation, IntentSource, NoMatchBehavior,
    NoMatchPolicy, Operand, WindowAggregation, ZeroDenominatorBehavior,
};
use crate::learning::density::ExecutionMode;
use crate::synaptic::detectors;
use crate::synaptic::surface::SynapticSurface;
use trace::TraceStepKind as Kind;

/// Evaluate one component for one entity.
pub fn execute_component(
    intent: &ComponentIntent,
    entity: &EntityData,
    mode: ExecutionMode,
    surface: &mut SynapticSurface,
    config: &EngineConfig,
) -> ExecutionResult {
    let mut ctx = Ctx {
        intent,
        entity,
        mode,
        surface,
        config,
        trace: ExecutionTrace::new(mode),
        execution_confidence: intent.confidence,
        max_input_magnitude: 0.0,
    };

    let base = ctx.evaluate_root();
    let outcome = ctx.apply_modifiers(base);
    ctx.run_outcome_detectors(outcome);
    ctx.trace
        .push_always(Kind::Outcome, "component outcome".to_string(), outcome);

    ctx.surface
        .record_confidence(intent.component_index, &entity.entity_id, ctx.execution_confidence);

    ExecutionResult {
        entity_id: entity.entity_id.clone(),
        component_index: intent.component_index,
        outcome,
        trace: ctx.trace,
    }
}

struct Ctx<'a> {
    intent: &'a ComponentIntent,
    entity: &'a EntityData,
    mode: ExecutionMode,
    surface: &'a mut SynapticSurface,
    config: &'a EngineConfig,
    trace: ExecutionTrace,
    execution_confidence: f64,
    max_input_magnitude: f64,
}

impl<'a> Ctx<'a> {
    fn evaluate_root(&mut self) -> f64 {
        if let Some(router) = &self.intent.variant_router {
            let routing_value = self.resolve_attribute_string(&router.attribute);
            let matched = router
                .routes
                .iter()
                .position(|route| stringify(&route.match_value) == routing_value);
            match matched {
                Some(index) => {
                    self.step(
                        Kind::RouteSelected,
                        format!("route {index} matched '{routing_value}'"),
                        index as f64,
                    );
                    self.eval_operation(&router.routes[index].operation)
                }
                None => match router.no_match_policy {
                    NoMatchPolicy::First if !router.routes.is_empty() => {
                        self.step(
                            Kind::RouteSelected,
                            format!("no route matched '{routing_value}'; policy first"),
                            0.0,
                        );
                        self.eval_operation(&router.routes[0].operation)
                    }
                    policy => {
                        // `skip` and `error` both currently contribute zero.
                        self.step(
                            Kind::PolicyCollapsed,
                            format!("no route matched '{routing_value}'; policy {policy:?} yields 0"),
                            0.0,
                        );
                        0.0
                    }
                },
            }
        } else if let Some(operation) = &self.intent.operation {
            self.eval_operation(operation)
        } else {
            self.step(Kind::Warning, "component has no operation".to_string(), 0.0);
            0.0
        }
    }

    fn eval_operand(&mut self, operand: &Operand) -> f64 {
        match operand {
            Operand::Source(source) => self.resolve_source(source),
            Operand::Operation(operation) => self.eval_operation(operation),
        }
    }

    fn eval_operation(&mut self, operation: &IntentOperation) -> f64 {
        let value = match operation {
            IntentOperation::BoundedLookup1d {
                input,
                boundaries,
                outputs,
                no_match_behavior,
            } => {
                let needle = self.eval_operand(input);
                self.lookup_1d(needle, boundaries, outputs, *no_match_behavior)
            }
            IntentOperation::BoundedLookup2d {
                row_input,
                column_input,
                row_boundaries,
                column_boundaries,
                output_grid,
                no_match_behavior,
            } => {
                let row_needle = self.eval_operand(row_input);
                let column_needle = self.eval_operand(column_input);
                let row = self.match_boundary(row_needle, row_boundaries);
                let column = self.match_boundary(column_needle, column_boundaries);
                match (row, column) {
                    (Some(r), Some(c)) => output_grid
                        .get(r)
                        .and_then(|cells| cells.get(c))
                        .copied()
                        .unwrap_or(0.0),
                    _ => {
                        self.note_no_match(*no_match_behavior);
                        0.0
                    }
                }
            }
            IntentOperation::ScalarMultiply { input, rate } => {
                let input_value = self.eval_operand(input);
                let rate_value = self.eval_operand(rate);
                input_value * rate_value
            }
            IntentOperation::ConditionalGate {
                left,
                comparator,
                right,
                on_true,
                on_false,
            } => {
                let left_value = self.eval_operand(left);
                let right_value = self.eval_operand(right);
                let taken = comparator.evaluate(left_value, right_value);
                self.step(
                    Kind::OperationEvaluated,
                    format!("gate {left_value} {comparator:?} {right_value} -> {taken}"),
                    if taken { 1.0 } else { 0.0 },
                );
                if taken {
                    self.eval_operand(on_true)
                } else {
                    self.eval_operand(on_false)
                }
            }
            IntentOperation::Aggregate { source } => self.resolve_source(source),
            IntentOperation::Ratio {
                numerator,
                denominator,
                zero_denominator_behavior,
            } => {
                let numerator_value = self.eval_operand(numerator);
                let denominator_value = self.eval_operand(denominator);
                if denominator_value == 0.0 {
                    // Always 0 on a zero denominator, whatever was declared.
                    if *zero_denominator_behavior != ZeroDenominatorBehavior::Zero {
                        self.step(
                            Kind::PolicyCollapsed,
                            format!(
                                "declared zeroDenominatorBehavior {zero_denominator_behavior:?} collapsed to zero"
                            ),
                            0.0,
                        );
                    }
                    0.0
                } else {
                    numerator_value / denominator_value
                }
            }
            IntentOperation::Constant { value } => *value,
            IntentOperation::WeightedBlend { inputs } => {
                let weight_sum: f64 = inputs.iter().map(|input| input.weight).sum();
                if (weight_sum - 1.0).abs() > 1.0e-6 {
                    self.step(
                        Kind::Warning,
                        format!("blend weights sum to {weight_sum}; not renormalized"),
                        weight_sum,
                    );
                }
                let mut blended = 0.0;
                for input in inputs {
                    blended += self.eval_operand(&input.value) * input.weight;
                }
                blended
            }
            IntentOperation::TemporalWindow {
                input,
                window_size,
                aggregation,
                include_current,
                history_field,
            } => {
                let current = self.eval_operand(input);
                let field = history_field
                    .clone()
                    .or_else(|| operand_metric_field(input));
                let history = field
                    .as_deref()
                    .and_then(|field| self.entity.period_history.get(field))
                    .cloned()
                    .unwrap_or_default();

                let mut window: Vec<f64> = history
                    .iter()
                    .rev()
                    .take(*window_size)
                    .rev()
                    .copied()
                    .collect();
                if *include_current {
                    window.push(current);
                }
                if window.is_empty() {
                    // No history and current excluded: degrade gracefully.
                    self.step(
                        Kind::OperationEvaluated,
                        "empty temporal window; current value passthrough".to_string(),
                        current,
                    );
                    current
                } else {
                    reduce_window(&window, *aggregation)
                }
            }
        };

        self.step(
            Kind::OperationEvaluated,
            format!("{} = {value}", operation.tag()),
            value,
        );
        value
    }

    fn lookup_1d(
        &mut self,
        needle: f64,
        boundaries: &[crate::intent::vocabulary::Boundary],
        outputs: &[f64],
        no_match_behavior: NoMatchBehavior,
    ) -> f64 {
        match self.match_boundary(needle, boundaries) {
            Some(index) => outputs.get(index).copied().unwrap_or(0.0),
            None => {
                self.note_no_match(no_match_behavior);
                0.0
            }
        }
    }

    /// First matching boundary in declared order wins. Boundaries are not
    /// required to be sorted here — that is the producer's convention.
    fn match_boundary(
        &mut self,
        needle: f64,
        boundaries: &[crate::intent::vocabulary::Boundary],
    ) -> Option<usize> {
        for (index, boundary) in boundaries.iter().enumerate() {
            if boundary.matches(needle) {
                if boundary.is_edge(needle) && self.detectors_armed() {
                    detectors::detect_boundary_hit(
                        self.surface,
                        self.intent.component_index,
                        &self.entity.entity_id,
                        needle,
                    );
                }
                return Some(index);
            }
        }
        None
    }

    fn note_no_match(&mut self, declared: NoMatchBehavior) {
        // No boundary match always yields 0, whatever was declared.
        if declared != NoMatchBehavior::Zero {
            self.step(
                Kind::PolicyCollapsed,
                format!("declared noMatchBehavior {declared:?} collapsed to zero"),
                0.0,
            );
        } else {
            self.step(
                Kind::Warning,
                "no boundary matched; yielding 0".to_string(),
                0.0,
            );
        }
    }

    fn resolve_source(&mut self, source: &IntentSource) -> f64 {
        let (value, detail) = match source {
            IntentSource::Metric { field } => match self.lookup_metric(field) {
                Some(value) => (value, format!("metric {field}")),
                None => {
                    let penalty = detectors::detect_data_missing(
                        self.surface,
                        self.intent.component_index,
                        &self.entity.entity_id,
                        field,
                    );
                    self.degrade_confidence(penalty);
                    (0.0, format!("metric {field} missing"))
                }
            },
            IntentSource::Ratio {
                numerator,
                denominator,
            } => {
                let numerator_value = self.resolve_source(&IntentSource::Metric {
                    field: numerator.clone(),
                });
                let denominator_value = self.resolve_source(&IntentSource::Metric {
                    field: denominator.clone(),
                });
                let value = if denominator_value == 0.0 {
                    0.0
                } else {
                    numerator_value / denominator_value
                };
                (value, format!("ratio {numerator}/{denominator}"))
            }
            IntentSource::Aggregate { field, .. } => {
                match self
                    .entity
                    .group_metrics
                    .as_ref()
                    .and_then(|metrics| metrics.get(field))
                    .copied()
                    .filter(|value| value.is_finite())
                {
                    Some(value) => (value, format!("aggregate {field}")),
                    None => {
                        let penalty = detectors::detect_data_missing(
                            self.surface,
                            self.intent.component_index,
                            &self.entity.entity_id,
                            field,
                        );
                        self.degrade_confidence(penalty);
                        (0.0, format!("aggregate {field} missing"))
                    }
                }
            }
            IntentSource::Constant { value } => (*value, "constant".to_string()),
            IntentSource::Attribute { field } => match self.entity.numeric_attribute(field) {
                Some(value) => (value, format!("attribute {field}")),
                None => {
                    let penalty = detectors::detect_data_missing(
                        self.surface,
                        self.intent.component_index,
                        &self.entity.entity_id,
                        field,
                    );
                    self.degrade_confidence(penalty);
                    (0.0, format!("attribute {field} missing"))
                }
            },
            IntentSource::PriorComponent { index } => {
                match self.entity.prior_results.get(index).copied() {
                    Some(value) => (value, format!("prior component {index}")),
                    None => {
                        let penalty = detectors::detect_data_missing(
                            self.surface,
                            self.intent.component_index,
                            &self.entity.entity_id,
                            &format!("prior_component[{index}]"),
                        );
                        self.degrade_confidence(penalty);
                        (0.0, format!("prior component {index} missing"))
                    }
                }
            }
        };

        self.max_input_magnitude = self.max_input_magnitude.max(value.abs());
        if self.mode == ExecutionMode::FullTrace {
            self.trace.push_always(Kind::SourceResolved, detail, value);
        }
        value
    }

    fn lookup_metric(&self, field: &str) -> Option<f64> {
        self.entity
            .metrics
            .get(field)
            .copied()
            .filter(|value| value.is_finite())
    }

    fn apply_modifiers(&mut self, mut value: f64) -> f64 {
        for modifier in &self.intent.modifiers {
            value = match modifier {
                IntentModifier::Cap { max } => value.min(*max),
                IntentModifier::Floor { min } => value.max(*min),
                IntentModifier::Proration {
                    numerator,
                    denominator,
                } => {
                    let numerator_value = self.resolve_source(numerator);
                    let denominator_value = self.resolve_source(denominator);
                    if denominator_value == 0.0 {
                        0.0
                    } else {
                        value * (numerator_value / denominator_value)
                    }
                }
                IntentModifier::TemporalAdjustment { .. } => {
                    // No-op in single-period execution.
                    self.step(
                        Kind::PolicyCollapsed,
                        "temporal_adjustment declared; no-op in single-period execution"
                            .to_string(),
                        value,
                    );
                    value
                }
            };
            self.step(
                Kind::ModifierApplied,
                format!("{} -> {value}", modifier.name()),
                value,
            );
        }
        value
    }

    fn run_outcome_detectors(&mut self, outcome: f64) {
        if !self.detectors_armed() {
            return;
        }
        if outcome == 0.0 && self.max_input_magnitude > 0.0 {
            let penalty = detectors::detect_zero_output(
                self.surface,
                self.intent.component_index,
                &self.entity.entity_id,
                self.max_input_magnitude,
            );
            self.degrade_confidence(penalty);
        }
        let expected_max = self.expected_range();
        if outcome.abs() > expected_max {
            let penalty = detectors::detect_range_exceeded(
                self.surface,
                self.intent.component_index,
                &self.entity.entity_id,
                outcome,
                expected_max,
            );
            self.degrade_confidence(penalty);
        }
    }

    /// Operation-appropriate expected output range: lookups can never
    /// legitimately exceed their own output table by much, everything else
    /// falls back to the configured ceiling.
    fn expected_range(&self) -> f64 {
        let operation = match (&self.intent.variant_router, &self.intent.operation) {
            (_, Some(operation)) => Some(operation),
            (Some(router), None) => router.routes.first().map(|route| &route.operation),
            _ => None,
        };
        match operation {
            Some(IntentOperation::BoundedLookup1d { outputs, .. }) => {
                max_abs(outputs.iter().copied()) * 10.0
            }
            Some(IntentOperation::BoundedLookup2d { output_grid, .. }) => {
                max_abs(output_grid.iter().flatten().copied()) * 10.0
            }
            _ => self.config.expected_range_max,
        }
    }

    fn detectors_armed(&self) -> bool {
        self.mode != ExecutionMode::Silent
    }

    fn degrade_confidence(&mut self, supported: f64) {
        self.execution_confidence = self.execution_confidence.min(supported);
    }

    /// Record an operation-level trace step, gated by execution mode.
    fn step(&mut self, kind: TraceStepKind, detail: String, value: f64) {
        if self.mode != ExecutionMode::Silent {
            self.trace.push_always(kind, detail, value);
        }
    }

    fn resolve_attribute_string(&mut self, attribute: &str) -> String {
        match self.entity.attributes.get(attribute) {
            Some(value) => stringify(value),
            None => {
                let penalty = detectors::detect_data_missing(
                    self.surface,
                    self.intent.component_index,
                    &self.entity.entity_id,
                    attribute,
                );
                self.degrade_confidence(penalty);
                String::new()
            }
        }
    }
}

/// Declared route values match by string equality against the resolved
/// attribute, so `5` and `"5"` route identically.
fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn operand_metric_field(operand: &Operand) -> Option<String> {
    match operand {
        Operand::Source(IntentSource::Metric { field }) => Some(field.clone()),
        _ => None,
    }
}

fn max_abs(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(0.0, |acc, value| acc.max(value.abs()))
}

fn reduce_window(window: &[f64], aggregation: WindowAggregation) -> f64 {
    match aggregation {
        WindowAggregation::Sum => window.iter().sum(),
        WindowAggregation::Average => window.iter().sum::<f64>() / window.len() as f64,
        WindowAggregation::Min => window.iter().copied().fold(f64::INFINITY, f64::min),
        WindowAggregation::Max => window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        WindowAggregation::Trend => ols_slope(window),
    }
}

/// Ordinary-least-squares slope against index 0..n-1.
fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        numerator += (x - x_mean) * (y - y_mean);
        denominator += (x - x_mean).powi(2);
    }

    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
