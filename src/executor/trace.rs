//! Execution traces for replay and audit.
//!
//! Every resolved source and every modifier step is recorded (subject to
//! the pattern's execution mode), so any outcome can be replayed and
//! explained from the trace alone.

use crate::learning::density::ExecutionMode;
use serde::{Deserialize, Serialize};

/// Classification of one trace step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStepKind {
    /// A leaf source resolved to a value
    SourceResolved,
    /// An operation produced its value
    OperationEvaluated,
    /// A variant route was selected
    RouteSelected,
    /// A modifier transformed the running value
    ModifierApplied,
    /// A declared policy value was collapsed to the effective behavior
    PolicyCollapsed,
    /// Suspicious-but-legal observation
    Warning,
    /// The component's final outcome
    Outcome,
}

/// One step of an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    pub kind: TraceStepKind,
    pub detail: String,
    pub value: f64,
}

/// The full trace of one component execution for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTrace {
    /// Mode the execution ran under; governs how much was recorded
    pub mode: ExecutionMode,
    pub steps: Vec<TraceStep>,
}

impl ExecutionTrace {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            steps: Vec::new(),
        }
    }

    /// Append a step unconditionally; mode gating happens at the call site.
    pub fn push_always(&mut self, kind: TraceStepKind, detail: String, value: f64) {
        self.steps.push(TraceStep { kind, detail, value });
    }

    /// Warnings recorded during this execution.
    pub fn warnings(&self) -> impl Iterator<Item = &TraceStep> {
        self.steps
            .iter()
            .filter(|step| step.kind == TraceStepKind::Warning)
    }
}

/// Outcome of one component execution for one entity, consumed by
/// reconciliation and reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub entity_id: String,
    pub component_index: usize,
    pub outcome: f64,
    pub trace: ExecutionTrace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_serialization_round_trip() {
        let mut trace = ExecutionTrace::new(ExecutionMode::FullTrace);
        trace.push_always(TraceStepKind::SourceResolved, "metric revenue".to_string(), 100.0);
        trace.push_always(TraceStepKind::Outcome, "component outcome".to_string(), 5.0);

        let json = serde_json::to_string(&trace).unwrap();
        let parsed: ExecutionTrace = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.steps.len(), 2);
        assert_eq!(parsed.steps[0].kind, TraceStepKind::SourceResolved);
    }

    #[test]
    fn test_warning_filter() {
        let mut trace = ExecutionTrace::new(ExecutionMode::FullTrace);
        trace.push_always(TraceStepKind::Warning, "weights".to_string(), 0.9);
        trace.push_always(TraceStepKind::Outcome, "outcome".to_string(), 1.0);
        assert_eq!(trace.warnings().count(), 1);
    }
}
