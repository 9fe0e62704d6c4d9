//! End-to-end executor scenarios through the public API:
//! compile → resolve → execute, with the run's own surface.

use intent_engine::{
    compile_component, execute_component, resolve_component, Boundary, ComponentConfig,
    ComponentIntent, EngineConfig, EntityData, ExecutionMode, IntentOperation, IntentOrigin,
    IntentSource, Operand, SynapticSurface,
};
use intent_engine::intent::{
    CalculationType, ConditionalConfig, ConditionalRate, MatrixBand, MatrixConfig, TierBand,
    TierConfig,
};
use intent_engine::intent::vocabulary::NoMatchBehavior;
use serde_json::json;
use std::collections::HashMap;

fn entity(metrics: &[(&str, f64)]) -> EntityData {
    let mut entity = EntityData::new("e-1");
    for (field, value) in metrics {
        entity.metrics.insert(field.to_string(), *value);
    }
    entity
}

fn execute(intent: &ComponentIntent, data: &EntityData) -> f64 {
    let config = EngineConfig::default();
    let mut surface = SynapticSurface::new("tenant-1", HashMap::new());
    execute_component(intent, data, ExecutionMode::FullTrace, &mut surface, &config).outcome
}

fn bare_intent(operation: IntentOperation) -> ComponentIntent {
    ComponentIntent {
        component_index: 0,
        label: "scenario".to_string(),
        confidence: 1.0,
        required_metrics: Vec::new(),
        variant_router: None,
        operation: Some(operation),
        modifiers: Vec::new(),
    }
}

/// Tier scenario: [0,100)→0, [100,105)→150, [105,110)→300, [110,∞)→500.
/// Value 100 lands in the second band because lower edges are inclusive by
/// default; 999 falls through to the unbounded top band.
#[test]
fn test_tier_boundary_scenario() {
    let operation = IntentOperation::BoundedLookup1d {
        input: IntentSource::Metric {
            field: "attainment".to_string(),
        }
        .into(),
        boundaries: vec![
            Boundary::half_open(0.0, 100.0),
            Boundary::half_open(100.0, 105.0),
            Boundary::half_open(105.0, 110.0),
            Boundary {
                min: Some(110.0),
                max: None,
                min_inclusive: true,
                max_inclusive: false,
            },
        ],
        outputs: vec![0.0, 150.0, 300.0, 500.0],
        no_match_behavior: NoMatchBehavior::default(),
    };
    let intent = bare_intent(operation);

    assert_eq!(execute(&intent, &entity(&[("attainment", 100.0)])), 150.0);
    assert_eq!(execute(&intent, &entity(&[("attainment", 999.0)])), 500.0);
    assert_eq!(execute(&intent, &entity(&[("attainment", 0.0)])), 0.0);
    assert_eq!(execute(&intent, &entity(&[("attainment", 109.99)])), 300.0);
}

/// Boundary edge property: v = min matches iff minInclusive ≠ false,
/// v = max matches iff maxInclusive == true.
#[test]
fn test_boundary_edge_inclusivity_property() {
    for (min_inclusive, max_inclusive) in
        [(true, false), (true, true), (false, false), (false, true)]
    {
        let boundary = Boundary {
            min: Some(10.0),
            max: Some(20.0),
            min_inclusive,
            max_inclusive,
        };
        assert_eq!(boundary.matches(10.0), min_inclusive);
        assert_eq!(boundary.matches(20.0), max_inclusive);
        assert!(boundary.matches(15.0));
    }
}

/// Same-metric cascade: {min:0, rate:0.03}, {min:100, rate:0.05}. At 80 the
/// 0.03 band applies; at 120 the 0.05 band wins (highest threshold first).
#[test]
fn test_compiled_cascade_selects_rate_by_threshold() {
    let config = ComponentConfig {
        component_index: 0,
        label: "Commission".to_string(),
        enabled: true,
        calculation_type: CalculationType::ConditionalPercentage,
        tier_config: None,
        matrix_config: None,
        percentage_config: None,
        conditional_config: Some(ConditionalConfig {
            conditions: vec![
                ConditionalRate {
                    metric: "sales".to_string(),
                    minimum: 0.0,
                    maximum: None,
                    rate: 0.03,
                },
                ConditionalRate {
                    metric: "sales".to_string(),
                    minimum: 100.0,
                    maximum: None,
                    rate: 0.05,
                },
            ],
        }),
    };
    let intent = compile_component(&config).unwrap();

    let low = execute(&intent, &entity(&[("sales", 80.0)]));
    assert!((low - 80.0 * 0.03).abs() < 1.0e-9);

    let high = execute(&intent, &entity(&[("sales", 120.0)]));
    assert!((high - 120.0 * 0.05).abs() < 1.0e-9);
}

/// Compiled matrix lookup resolves the right grid cell.
#[test]
fn test_compiled_matrix_lookup() {
    let config = ComponentConfig {
        component_index: 1,
        label: "Matrix bonus".to_string(),
        enabled: true,
        calculation_type: CalculationType::MatrixLookup,
        tier_config: None,
        matrix_config: Some(MatrixConfig {
            row_metric: "attainment".to_string(),
            column_metric: "csat".to_string(),
            rows: vec![
                MatrixBand {
                    min: 0.0,
                    max: Some(99.0),
                },
                MatrixBand {
                    min: 100.0,
                    max: None,
                },
            ],
            columns: vec![
                MatrixBand {
                    min: 0.0,
                    max: Some(4.0),
                },
                MatrixBand {
                    min: 4.1,
                    max: None,
                },
            ],
            payout_grid: vec![vec![0.0, 100.0], vec![250.0, 600.0]],
        }),
        percentage_config: None,
        conditional_config: None,
    };
    let intent = compile_component(&config).unwrap();

    let outcome = execute(&intent, &entity(&[("attainment", 110.0), ("csat", 4.8)]));
    assert_eq!(outcome, 600.0);
    let outcome = execute(&intent, &entity(&[("attainment", 50.0), ("csat", 4.8)]));
    assert_eq!(outcome, 100.0);
}

/// execute(compile(config)) is deterministic: identical inputs always
/// produce identical outcome and trace.
#[test]
fn test_compile_execute_determinism() {
    let config = ComponentConfig {
        component_index: 0,
        label: "Tiers".to_string(),
        enabled: true,
        calculation_type: CalculationType::TierLookup,
        tier_config: Some(TierConfig {
            metric: "attainment".to_string(),
            tiers: vec![
                TierBand {
                    min: 0.0,
                    max: Some(99.0),
                    payout: 0.0,
                },
                TierBand {
                    min: 100.0,
                    max: None,
                    payout: 750.0,
                },
            ],
        }),
        matrix_config: None,
        percentage_config: None,
        conditional_config: None,
    };
    let data = entity(&[("attainment", 101.5)]);
    let engine_config = EngineConfig::default();

    let mut traces = Vec::new();
    for _ in 0..3 {
        let intent = compile_component(&config).unwrap();
        let mut surface = SynapticSurface::new("tenant-1", HashMap::new());
        let result = execute_component(
            &intent,
            &data,
            ExecutionMode::FullTrace,
            &mut surface,
            &engine_config,
        );
        assert_eq!(result.outcome, 750.0);
        traces.push(
            result
                .trace
                .steps
                .iter()
                .map(|step| (step.detail.clone(), step.value))
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(traces[0], traces[1]);
    assert_eq!(traces[1], traces[2]);
}

/// Ratio with denominator 0 returns 0 for any numerator, never panics.
#[test]
fn test_ratio_zero_denominator_for_any_numerator() {
    for numerator in [-1.0e12, -1.0, 0.0, 1.0, 42.0, 1.0e12] {
        let operation = IntentOperation::Ratio {
            numerator: Operand::Source(IntentSource::Constant { value: numerator }),
            denominator: Operand::Source(IntentSource::Constant { value: 0.0 }),
            zero_denominator_behavior: Default::default(),
        };
        assert_eq!(execute(&bare_intent(operation), &entity(&[])), 0.0);
    }
}

/// An invalid external intent resolved against a valid fallback yields the
/// transformer's intent plus the validator's error list.
#[test]
fn test_invalid_external_intent_falls_back_to_transformer() {
    let config = ComponentConfig {
        component_index: 0,
        label: "Tiers".to_string(),
        enabled: true,
        calculation_type: CalculationType::TierLookup,
        tier_config: Some(TierConfig {
            metric: "attainment".to_string(),
            tiers: vec![TierBand {
                min: 0.0,
                max: None,
                payout: 100.0,
            }],
        }),
        matrix_config: None,
        percentage_config: None,
        conditional_config: None,
    };
    let bogus = json!({"operation": "bogus"});

    let resolved = resolve_component(&config, Some(&bogus), 0.9).unwrap();
    assert_eq!(resolved.origin, IntentOrigin::Transformer);
    assert!(!resolved.validation_errors.is_empty());

    let outcome = execute(&resolved.intent, &entity(&[("attainment", 55.0)]));
    assert_eq!(outcome, 100.0);
}

/// Structurally identical plans from different tenants share a signature;
/// the signature never leaks field names.
#[test]
fn test_signatures_join_across_tenants() {
    use intent_engine::generate_pattern_signature;

    let plan = |metric: &str| ComponentConfig {
        component_index: 0,
        label: format!("{metric} plan"),
        enabled: true,
        calculation_type: CalculationType::TierLookup,
        tier_config: Some(TierConfig {
            metric: metric.to_string(),
            tiers: vec![
                TierBand {
                    min: 0.0,
                    max: Some(99.0),
                    payout: 0.0,
                },
                TierBand {
                    min: 100.0,
                    max: None,
                    payout: 500.0,
                },
            ],
        }),
        matrix_config: None,
        percentage_config: None,
        conditional_config: None,
    };

    let us = compile_component(&plan("revenue_usd")).unwrap();
    let de = compile_component(&plan("umsatz_eur")).unwrap();

    let signature = generate_pattern_signature(&us);
    assert_eq!(signature, generate_pattern_signature(&de));
    assert!(!signature.contains("revenue_usd"));
    assert!(!signature.contains("umsatz_eur"));
}
