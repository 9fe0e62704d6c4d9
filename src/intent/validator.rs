//! Structural validation of untrusted externally-produced intents.
//!
//! The validator is the boundary contract for the upstream interpretation
//! step: its input is arbitrary JSON and must be treated as hostile.
//! Validation never panics and never returns `Err` — it only classifies.
//! A tree with zero structural errors is "valid" even if it would produce
//! degenerate output at runtime (empty ranges, unreachable bands); runtime
//! degeneracy is an anomaly-detection concern, not a validation concern.

use serde_json::Value;
use tracing::debug;

/// The nine legal operation tags.
pub const OPERATION_TAGS: [&str; 9] = [
    "bounded_lookup_1d",
    "bounded_lookup_2d",
    "scalar_multiply",
    "conditional_gate",
    "aggregate",
    "ratio",
    "constant",
    "weighted_blend",
    "temporal_window",
];

const SOURCE_TAGS: [&str; 6] = [
    "metric",
    "ratio",
    "aggregate",
    "constant",
    "attribute",
    "prior_component",
];

const COMPARATORS: [&str; 6] = [">=", ">", "<=", "<", "==", "!="];

const WINDOW_AGGREGATIONS: [&str; 5] = ["sum", "average", "min", "max", "trend"];

/// Outcome of validating one intent tree.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// True when no structural errors were found
    pub valid: bool,
    /// Structural errors; a non-empty list rejects the intent
    pub errors: Vec<String>,
    /// Suspicious-but-accepted constructs (inverted boundaries, odd weights)
    pub warnings: Vec<String>,
}

/// Validate an untrusted intent operation tree.
pub fn validate_intent(value: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_operation(value, "", &mut report);
    report.valid = report.errors.is_empty();
    debug!(
        valid = report.valid,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "Intent validation completed"
    );
    report
}

fn validate_operation(value: &Value, prefix: &str, report: &mut ValidationReport) {
    let Some(obj) = value.as_object() else {
        report
            .errors
            .push(format!("{prefix}operation must be an object"));
        return;
    };

    let tag = match obj.get("operation").and_then(Value::as_str) {
        Some(tag) => tag,
        None => {
            report
                .errors
                .push(format!("{prefix}missing 'operation' tag"));
            return;
        }
    };

    if !OPERATION_TAGS.contains(&tag) {
        report
            .errors
            .push(format!("{prefix}unknown operation '{tag}'"));
        return;
    }

    match tag {
        "bounded_lookup_1d" => validate_lookup_1d(obj, prefix, report),
        "bounded_lookup_2d" => validate_lookup_2d(obj, prefix, report),
        "scalar_multiply" => {
            validate_operand_field(obj, "input", prefix, report);
            validate_operand_field(obj, "rate", prefix, report);
        }
        "conditional_gate" => validate_gate(obj, prefix, report),
        "aggregate" => match obj.get("source") {
            Some(source) => validate_source(source, &format!("{prefix}source: "), report),
            None => report.errors.push(format!("{prefix}aggregate requires 'source'")),
        },
        "ratio" => {
            validate_operand_field(obj, "numerator", prefix, report);
            validate_operand_field(obj, "denominator", prefix, report);
        }
        "constant" => {
            if !obj.get("value").map(is_number).unwrap_or(false) {
                report
                    .errors
                    .push(format!("{prefix}constant requires numeric 'value'"));
            }
        }
        "weighted_blend" => validate_blend(obj, prefix, report),
        "temporal_window" => validate_window(obj, prefix, report),
        _ => unreachable!("tag membership checked above"),
    }
}

fn validate_lookup_1d(
    obj: &serde_json::Map<String, Value>,
    prefix: &str,
    report: &mut ValidationReport,
) {
    validate_operand_field(obj, "input", prefix, report);

    let boundaries = obj.get("boundaries").and_then(Value::as_array);
    let outputs = obj.get("outputs").and_then(Value::as_array);

    match (boundaries, outputs) {
        (Some(boundaries), Some(outputs)) => {
            if boundaries.len() != outputs.len() {
                report.errors.push(format!(
                    "{prefix}boundaries ({}) and outputs ({}) must have equal length",
                    boundaries.len(),
                    outputs.len()
                ));
            }
            for (i, boundary) in boundaries.iter().enumerate() {
                validate_boundary(boundary, &format!("{prefix}boundaries[{i}]: "), report);
            }
            for (i, output) in outputs.iter().enumerate() {
                if !is_number(output) {
                    report
                        .errors
                        .push(format!("{prefix}outputs[{i}] must be a number"));
                }
            }
        }
        _ => report.errors.push(format!(
            "{prefix}bounded_lookup_1d requires 'boundaries' and 'outputs' arrays"
        )),
    }
}

fn validate_lookup_2d(
    obj: &serde_json::Map<String, Value>,
    prefix: &str,
    report: &mut ValidationReport,
) {
    validate_operand_field(obj, "rowInput", prefix, report);
    validate_operand_field(obj, "columnInput", prefix, report);

    let rows = obj.get("rowBoundaries").and_then(Value::as_array);
    let columns = obj.get("columnBoundaries").and_then(Value::as_array);
    let grid = obj.get("outputGrid").and_then(Value::as_array);

    let (Some(rows), Some(columns), Some(grid)) = (rows, columns, grid) else {
        report.errors.push(format!(
            "{prefix}bounded_lookup_2d requires 'rowBoundaries', 'columnBoundaries' and 'outputGrid'"
        ));
        return;
    };

    if grid.len() != rows.len() {
        report.errors.push(format!(
            "{prefix}outputGrid rows ({}) must equal rowBoundaries ({})",
            grid.len(),
            rows.len()
        ));
    }
    for (i, row) in grid.iter().enumerate() {
        match row.as_array() {
            Some(cells) => {
                if cells.len() != columns.len() {
                    report.errors.push(format!(
                        "{prefix}outputGrid[{i}] length ({}) must equal columnBoundaries ({})",
                        cells.len(),
                        columns.len()
                    ));
                }
                for (j, cell) in cells.iter().enumerate() {
                    if !is_number(cell) {
                        report
                            .errors
                            .push(format!("{prefix}outputGrid[{i}][{j}] must be a number"));
                    }
                }
            }
            None => report
                .errors
                .push(format!("{prefix}outputGrid[{i}] must be an array")),
        }
    }
    for (i, boundary) in rows.iter().enumerate() {
        validate_boundary(boundary, &format!("{prefix}rowBoundaries[{i}]: "), report);
    }
    for (i, boundary) in columns.iter().enumerate() {
        validate_boundary(boundary, &format!("{prefix}columnBoundaries[{i}]: "), report);
    }
}

fn validate_gate(
    obj: &serde_json::Map<String, Value>,
    prefix: &str,
    report: &mut ValidationReport,
) {
    validate_operand_field(obj, "left", prefix, report);
    validate_operand_field(obj, "right", prefix, report);

    match obj.get("comparator").and_then(Value::as_str) {
        Some(comparator) if COMPARATORS.contains(&comparator) => {}
        Some(comparator) => report
            .errors
            .push(format!("{prefix}unknown comparator '{comparator}'")),
        None => report
            .errors
            .push(format!("{prefix}conditional_gate requires 'comparator'")),
    }

    // Nested branches get their own position prefix so a deep failure is
    // attributable from the message alone.
    match obj.get("onTrue") {
        Some(branch) => validate_operand(branch, &format!("{prefix}onTrue: "), report),
        None => report
            .errors
            .push(format!("{prefix}conditional_gate requires 'onTrue'")),
    }
    match obj.get("onFalse") {
        Some(branch) => validate_operand(branch, &format!("{prefix}onFalse: "), report),
        None => report
            .errors
            .push(format!("{prefix}conditional_gate requires 'onFalse'")),
    }
}

fn validate_blend(
    obj: &serde_json::Map<String, Value>,
    prefix: &str,
    report: &mut ValidationReport,
) {
    let Some(inputs) = obj.get("inputs").and_then(Value::as_array) else {
        report
            .errors
            .push(format!("{prefix}weighted_blend requires 'inputs' array"));
        return;
    };
    if inputs.is_empty() {
        report
            .errors
            .push(format!("{prefix}weighted_blend requires at least one input"));
        return;
    }

    let mut weight_sum = 0.0;
    let mut all_weights_present = true;
    for (i, input) in inputs.iter().enumerate() {
        let item_prefix = format!("{prefix}inputs[{i}]: ");
        let Some(item) = input.as_object() else {
            report.errors.push(format!("{item_prefix}must be an object"));
            continue;
        };
        match item.get("value") {
            Some(value) => validate_operand(value, &item_prefix, report),
            None => report.errors.push(format!("{item_prefix}missing 'value'")),
        }
        match item.get("weight").and_then(Value::as_f64) {
            Some(weight) => weight_sum += weight,
            None => {
                all_weights_present = false;
                report
                    .errors
                    .push(format!("{item_prefix}missing numeric 'weight'"));
            }
        }
    }
    if all_weights_present && (weight_sum - 1.0).abs() > 1.0e-6 {
        report.warnings.push(format!(
            "{prefix}blend weights sum to {weight_sum}, not 1.0; outputs are not renormalized"
        ));
    }
}

fn validate_window(
    obj: &serde_json::Map<String, Value>,
    prefix: &str,
    report: &mut ValidationReport,
) {
    validate_operand_field(obj, "input", prefix, report);

    match obj.get("windowSize").and_then(Value::as_u64) {
        Some(size) if size > 0 => {}
        Some(_) => report
            .errors
            .push(format!("{prefix}windowSize must be positive")),
        None => report.errors.push(format!(
            "{prefix}temporal_window requires positive integer 'windowSize'"
        )),
    }

    match obj.get("aggregation").and_then(Value::as_str) {
        Some(aggregation) if WINDOW_AGGREGATIONS.contains(&aggregation) => {}
        Some(aggregation) => report
            .errors
            .push(format!("{prefix}unknown aggregation '{aggregation}'")),
        None => report
            .errors
            .push(format!("{prefix}temporal_window requires 'aggregation'")),
    }
}

fn validate_operand_field(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    prefix: &str,
    report: &mut ValidationReport,
) {
    match obj.get(field) {
        Some(value) => validate_operand(value, &format!("{prefix}{field}: "), report),
        None => report.errors.push(format!("{prefix}missing '{field}'")),
    }
}

fn validate_operand(value: &Value, prefix: &str, report: &mut ValidationReport) {
    let Some(obj) = value.as_object() else {
        report
            .errors
            .push(format!("{prefix}operand must be an object"));
        return;
    };
    if obj.contains_key("operation") {
        validate_operation(value, prefix, report);
    } else if obj.contains_key("source") {
        validate_source(value, prefix, report);
    } else {
        report.errors.push(format!(
            "{prefix}operand must carry an 'operation' or 'source' tag"
        ));
    }
}

fn validate_source(value: &Value, prefix: &str, report: &mut ValidationReport) {
    let Some(obj) = value.as_object() else {
        report.errors.push(format!("{prefix}source must be an object"));
        return;
    };
    let tag = match obj.get("source").and_then(Value::as_str) {
        Some(tag) => tag,
        None => {
            report.errors.push(format!("{prefix}missing 'source' tag"));
            return;
        }
    };
    if !SOURCE_TAGS.contains(&tag) {
        report.errors.push(format!("{prefix}unknown source '{tag}'"));
        return;
    }
    match tag {
        "metric" | "attribute" => {
            if !obj.get("field").map(|v| v.is_string()).unwrap_or(false) {
                report
                    .errors
                    .push(format!("{prefix}{tag} source requires string 'field'"));
            }
        }
        "ratio" => {
            for field in ["numerator", "denominator"] {
                if !obj.get(field).map(|v| v.is_string()).unwrap_or(false) {
                    report
                        .errors
                        .push(format!("{prefix}ratio source requires string '{field}'"));
                }
            }
        }
        "aggregate" => {
            if !obj.get("field").map(|v| v.is_string()).unwrap_or(false) {
                report
                    .errors
                    .push(format!("{prefix}aggregate source requires string 'field'"));
            }
            match obj.get("scope").and_then(Value::as_str) {
                Some("group" | "tenant") => {}
                Some(scope) => report
                    .errors
                    .push(format!("{prefix}unknown aggregate scope '{scope}'")),
                None => report
                    .errors
                    .push(format!("{prefix}aggregate source requires 'scope'")),
            }
            match obj.get("function").and_then(Value::as_str) {
                Some("sum" | "average" | "min" | "max" | "count") => {}
                Some(function) => report
                    .errors
                    .push(format!("{prefix}unknown aggregate function '{function}'")),
                None => report
                    .errors
                    .push(format!("{prefix}aggregate source requires 'function'")),
            }
        }
        "constant" => {
            if !obj.get("value").map(is_number).unwrap_or(false) {
                report
                    .errors
                    .push(format!("{prefix}constant source requires numeric 'value'"));
            }
        }
        "prior_component" => {
            if obj.get("index").and_then(Value::as_u64).is_none() {
                report.errors.push(format!(
                    "{prefix}prior_component source requires integer 'index'"
                ));
            }
        }
        _ => unreachable!("tag membership checked above"),
    }
}

fn validate_boundary(value: &Value, prefix: &str, report: &mut ValidationReport) {
    let Some(obj) = value.as_object() else {
        report
            .errors
            .push(format!("{prefix}boundary must be an object"));
        return;
    };
    for field in ["min", "max"] {
        if let Some(edge) = obj.get(field) {
            if !edge.is_null() && !is_number(edge) {
                report
                    .errors
                    .push(format!("{prefix}'{field}' must be a number or null"));
            }
        }
    }
    for field in ["minInclusive", "maxInclusive"] {
        if let Some(flag) = obj.get(field) {
            if !flag.is_boolean() {
                report
                    .errors
                    .push(format!("{prefix}'{field}' must be a boolean"));
            }
        }
    }
    // Inverted bands are producer mistakes but structurally sound; the band
    // simply never matches.
    if let (Some(min), Some(max)) = (
        obj.get("min").and_then(Value::as_f64),
        obj.get("max").and_then(Value::as_f64),
    ) {
        if min > max {
            report
                .warnings
                .push(format!("{prefix}inverted boundary (min {min} > max {max})"));
        }
    }
}

fn is_number(value: &Value) -> bool {
    value.as_f64().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_operation_rejected() {
        let report = validate_intent(&json!({"operation": "bogus"}));
        assert!(!report.valid);
        assert!(report.errors[0].contains("unknown operation"));
    }

    #[test]
    fn test_valid_scalar_multiply() {
        let report = validate_intent(&json!({
            "operation": "scalar_multiply",
            "input": {"source": "metric", "field": "revenue"},
            "rate": {"source": "constant", "value": 0.05}
        }));
        assert!(report.valid, "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_lookup_cardinality_mismatch() {
        let report = validate_intent(&json!({
            "operation": "bounded_lookup_1d",
            "input": {"source": "metric", "field": "attainment"},
            "boundaries": [{"min": 0, "max": 100}],
            "outputs": [100.0, 200.0]
        }));
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("equal length")));
    }

    #[test]
    fn test_grid_shape_mismatch() {
        let report = validate_intent(&json!({
            "operation": "bounded_lookup_2d",
            "rowInput": {"source": "metric", "field": "a"},
            "columnInput": {"source": "metric", "field": "b"},
            "rowBoundaries": [{"min": 0}, {"min": 10}],
            "columnBoundaries": [{"min": 0}],
            "outputGrid": [[1.0], [2.0, 3.0]]
        }));
        assert!(!report.valid);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("outputGrid[1]") && e.contains("columnBoundaries")));
    }

    #[test]
    fn test_nested_error_position_prefix() {
        let report = validate_intent(&json!({
            "operation": "conditional_gate",
            "left": {"source": "metric", "field": "sales"},
            "comparator": ">=",
            "right": {"source": "constant", "value": 1000},
            "onTrue": {"operation": "bogus"},
            "onFalse": {"source": "constant", "value": 0}
        }));
        assert!(!report.valid);
        assert!(report
            .errors
            .iter()
            .any(|e| e.starts_with("onTrue: ") && e.contains("unknown operation")));
    }

    #[test]
    fn test_inverted_boundary_is_warning_not_error() {
        let report = validate_intent(&json!({
            "operation": "bounded_lookup_1d",
            "input": {"source": "metric", "field": "attainment"},
            "boundaries": [{"min": 100, "max": 0}],
            "outputs": [50.0]
        }));
        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.contains("inverted")));
    }

    #[test]
    fn test_blend_weight_sum_warning() {
        let report = validate_intent(&json!({
            "operation": "weighted_blend",
            "inputs": [
                {"value": {"source": "metric", "field": "a"}, "weight": 0.5},
                {"value": {"source": "metric", "field": "b"}, "weight": 0.3}
            ]
        }));
        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.contains("sum to")));
    }

    #[test]
    fn test_validation_never_panics_on_garbage() {
        for garbage in [
            json!(null),
            json!(42),
            json!("string"),
            json!([]),
            json!({"operation": 17}),
            json!({"operation": "ratio", "numerator": null, "denominator": []}),
        ] {
            let report = validate_intent(&garbage);
            assert!(!report.valid);
        }
    }

    #[test]
    fn test_valid_tree_deserializes() {
        let value = json!({
            "operation": "conditional_gate",
            "left": {"source": "metric", "field": "sales"},
            "comparator": ">=",
            "right": {"source": "constant", "value": 1000},
            "onTrue": {
                "operation": "scalar_multiply",
                "input": {"source": "metric", "field": "sales"},
                "rate": {"source": "constant", "value": 0.05}
            },
            "onFalse": {"source": "constant", "value": 0}
        });
        let report = validate_intent(&value);
        assert!(report.valid);
        let parsed: Result<crate::intent::IntentOperation, _> = serde_json::from_value(value);
        assert!(parsed.is_ok());
    }
}
