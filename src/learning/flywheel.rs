//! Flywheel aggregation: Tiers 2 and 3, plus cold-start prior transfer.
//!
//! Tier 2 ("foundational") aggregates purely by pattern signature across
//! all tenants. Tier 3 ("domain") is the same aggregation additionally
//! partitioned by `(signature, domain_id, vertical_hint)`.
//!
//! # Privacy firewall
//!
//! Neither aggregate carries a tenant or entity identifier — not as an
//! omitted field, as a field that does not exist. The schema *is* the
//! firewall; `tests/` assert it on the serialized rows. A tenant counter
//! records how many distinct tenant observations fed a row, which is the
//! only tenant-adjacent fact the flywheel is allowed to know.
//!
//! Aggregation is advisory. Concurrent read-modify-write from different
//! tenants races on the EMA and the last writer wins; the aggregate is a
//! prior, never authoritative for any tenant's outcome.

use super::consolidation::TrainingSignal;
use super::density::{clamp01, ExecutionMode, PatternDensity};
use crate::config::EngineConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Tier-2 row: cross-tenant, keyed by signature alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundationalAggregate {
    pub signature: String,
    /// EMA of observed run confidence across tenants
    pub confidence: f64,
    /// EMA of observed run anomaly rate across tenants
    pub anomaly_rate: f64,
    pub execution_count: u64,
    /// Distinct observation batches folded in, across all tenants
    pub tenant_observations: u64,
}

/// Tier-3 row: Tier-2 shape partitioned by domain and vertical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainAggregate {
    pub signature: String,
    pub domain_id: String,
    pub vertical_hint: String,
    pub confidence: f64,
    pub anomaly_rate: f64,
    pub execution_count: u64,
    pub tenant_observations: u64,
}

/// Fold one training signal into a Tier-2 row.
///
/// `new = existing * retain + incoming * incoming_weight`; a first
/// observation adopts the signal's values directly.
pub fn fold_foundational(
    existing: Option<FoundationalAggregate>,
    signal: &TrainingSignal,
    config: &EngineConfig,
) -> FoundationalAggregate {
    match existing {
        Some(row) => FoundationalAggregate {
            signature: row.signature,
            confidence: ema(row.confidence, signal.confidence, config),
            anomaly_rate: ema(row.anomaly_rate, signal.anomaly_rate, config),
            execution_count: row.execution_count + signal.executions,
            tenant_observations: row.tenant_observations + 1,
        },
        None => FoundationalAggregate {
            signature: signal.signature.clone(),
            confidence: clamp01(signal.confidence),
            anomaly_rate: signal.anomaly_rate,
            execution_count: signal.executions,
            tenant_observations: 1,
        },
    }
}

/// Fold one training signal into a Tier-3 row for a domain partition.
pub fn fold_domain(
    existing: Option<DomainAggregate>,
    signal: &TrainingSignal,
    domain_id: &str,
    vertical_hint: &str,
    config: &EngineConfig,
) -> DomainAggregate {
    match existing {
        Some(row) => DomainAggregate {
            signature: row.signature,
            domain_id: row.domain_id,
            vertical_hint: row.vertical_hint,
            confidence: ema(row.confidence, signal.confidence, config),
            anomaly_rate: ema(row.anomaly_rate, signal.anomaly_rate, config),
            execution_count: row.execution_count + signal.executions,
            tenant_observations: row.tenant_observations + 1,
        },
        None => DomainAggregate {
            signature: signal.signature.clone(),
            domain_id: domain_id.to_string(),
            vertical_hint: vertical_hint.to_string(),
            confidence: clamp01(signal.confidence),
            anomaly_rate: signal.anomaly_rate,
            execution_count: signal.executions,
            tenant_observations: 1,
        },
    }
}

fn ema(existing: f64, incoming: f64, config: &EngineConfig) -> f64 {
    clamp01(existing * config.flywheel_retain_weight + incoming * config.flywheel_incoming_weight)
}

/// Seed a new tenant's density from cross-tenant priors.
///
/// Tier-2 priors load first, then Tier-3 priors overlay matching
/// signatures — domain knowledge takes precedence over the structural
/// baseline. Every imported confidence is discounted: priors are
/// structural suggestions, unproven for this tenant. The discount keeps
/// every seeded pattern below the silent band, so a new tenant always
/// starts with real verification.
pub fn cold_start_priors(
    foundational: &[FoundationalAggregate],
    domain: &[DomainAggregate],
    config: &EngineConfig,
) -> HashMap<String, PatternDensity> {
    let mut seeded: HashMap<String, PatternDensity> = HashMap::new();

    for row in foundational {
        seeded.insert(
            row.signature.clone(),
            discounted_density(&row.signature, row.confidence, row.anomaly_rate, config),
        );
    }
    for row in domain {
        seeded.insert(
            row.signature.clone(),
            discounted_density(&row.signature, row.confidence, row.anomaly_rate, config),
        );
    }

    info!(
        foundational = foundational.len(),
        domain = domain.len(),
        seeded = seeded.len(),
        discount = config.cold_start_discount,
        "Cold-start priors seeded"
    );
    seeded
}

fn discounted_density(
    signature: &str,
    confidence: f64,
    anomaly_rate: f64,
    config: &EngineConfig,
) -> PatternDensity {
    let discounted = clamp01(confidence * config.cold_start_discount);
    let density = PatternDensity {
        signature: signature.to_string(),
        confidence: discounted,
        total_executions: 0,
        last_anomaly_rate: anomaly_rate,
        execution_mode: ExecutionMode::for_confidence(discounted, config),
    };
    debug!(
        signature = %signature,
        confidence = discounted,
        mode = %density.execution_mode,
        "Prior imported"
    );
    density
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(signature: &str, confidence: f64, anomaly_rate: f64) -> TrainingSignal {
        TrainingSignal {
            signature: signature.to_string(),
            confidence,
            anomaly_rate,
            executions: 10,
        }
    }

    #[test]
    fn test_first_observation_adopts_signal() {
        let config = EngineConfig::default();
        let row = fold_foundational(None, &signal("sig-a", 0.8, 0.05), &config);
        assert_eq!(row.confidence, 0.8);
        assert_eq!(row.tenant_observations, 1);
        assert_eq!(row.execution_count, 10);
    }

    #[test]
    fn test_ema_update_weights() {
        let config = EngineConfig::default();
        let first = fold_foundational(None, &signal("sig-a", 1.0, 0.0), &config);
        let second = fold_foundational(Some(first), &signal("sig-a", 0.0, 1.0), &config);
        // 1.0 * 0.9 + 0.0 * 0.1
        assert!((second.confidence - 0.9).abs() < 1.0e-9);
        assert!((second.anomaly_rate - 0.1).abs() < 1.0e-9);
        assert_eq!(second.tenant_observations, 2);
        assert_eq!(second.execution_count, 20);
    }

    #[test]
    fn test_domain_partition_keys_preserved() {
        let config = EngineConfig::default();
        let row = fold_domain(
            None,
            &signal("sig-a", 0.7, 0.0),
            "retail",
            "apparel",
            &config,
        );
        assert_eq!(row.domain_id, "retail");
        assert_eq!(row.vertical_hint, "apparel");
    }

    #[test]
    fn test_cold_start_domain_overlays_foundational() {
        let config = EngineConfig::default();
        let foundational = vec![FoundationalAggregate {
            signature: "sig-a".to_string(),
            confidence: 0.9,
            anomaly_rate: 0.02,
            execution_count: 10_000,
            tenant_observations: 40,
        }];
        let domain = vec![DomainAggregate {
            signature: "sig-a".to_string(),
            domain_id: "retail".to_string(),
            vertical_hint: "apparel".to_string(),
            confidence: 0.5,
            anomaly_rate: 0.10,
            execution_count: 800,
            tenant_observations: 6,
        }];
        let seeded = cold_start_priors(&foundational, &domain, &config);
        let density = seeded.get("sig-a").unwrap();
        // Domain prior wins: 0.5 * 0.6.
        assert!((density.confidence - 0.30).abs() < 1.0e-9);
        assert_eq!(density.total_executions, 0);
    }

    #[test]
    fn test_discount_never_seeds_silent() {
        let config = EngineConfig::default();
        let foundational = vec![FoundationalAggregate {
            signature: "sig-perfect".to_string(),
            confidence: 1.0,
            anomaly_rate: 0.0,
            execution_count: 1,
            tenant_observations: 1,
        }];
        let seeded = cold_start_priors(&foundational, &[], &config);
        let density = seeded.get("sig-perfect").unwrap();
        // 1.0 * 0.6 = 0.6 < 0.70: always lands in the full-trace band.
        assert_eq!(density.execution_mode, ExecutionMode::FullTrace);
    }
}
