//! Per-run telemetry bus.
//!
//! # Bus Rules
//!
//! All synapses MUST:
//! - Be atomic (single observation, no aggregation)
//! - Be appended by the run that owns the surface (single writer)
//! - Never be mutated or removed before consolidation reads them

use crate::config::EngineConfig;
use crate::learning::density::{ExecutionMode, PatternDensity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Classification of one telemetry fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynapseKind {
    /// A pattern executed for one entity
    Pattern,
    /// Observed execution confidence for one entity × component
    Confidence,
    /// A detector fired: zero-output, data-missing, or range-exceeded
    Anomaly,
    /// A value landed exactly on a boundary edge — neutral, not an anomaly
    BoundaryHit,
    /// A downstream correction fed back into the run
    Correction,
}

impl std::fmt::Display for SynapseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SynapseKind::Pattern => write!(f, "pattern"),
            SynapseKind::Confidence => write!(f, "confidence"),
            SynapseKind::Anomaly => write!(f, "anomaly"),
            SynapseKind::BoundaryHit => write!(f, "boundary_hit"),
            SynapseKind::Correction => write!(f, "correction"),
        }
    }
}

/// One telemetry fact. Lives only for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Synapse {
    pub kind: SynapseKind,
    pub component_index: usize,
    pub entity_id: Option<String>,
    pub value: f64,
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Counters accumulated while the surface is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub entities_processed: u64,
    pub synapses_recorded: u64,
    pub anomalies: u64,
    pub boundary_hits: u64,
    pub patterns_initialized: u64,
}

/// The run's telemetry bus.
///
/// Synapses live in an append-only arena; the three indexes hold arena
/// offsets, giving O(1) amortized writes and O(k) reads per query.
#[derive(Debug)]
pub struct SynapticSurface {
    run_id: Uuid,
    tenant_id: String,
    arena: Vec<Synapse>,
    by_kind: HashMap<SynapseKind, Vec<usize>>,
    by_component: HashMap<usize, Vec<usize>>,
    by_entity: HashMap<String, Vec<usize>>,
    /// Density loaded at run start, plus seeds for first-sighted patterns
    density: HashMap<String, PatternDensity>,
    /// Pattern → component-index association recorded at initialization;
    /// consolidation joins run telemetry back to signatures through it
    pattern_components: HashMap<String, usize>,
    /// Executions per pattern this run
    pattern_executions: HashMap<String, u64>,
    stats: RunStats,
}

impl SynapticSurface {
    /// Create the surface for one run, seeded with the density loaded for
    /// this tenant (empty map when the load failed or the tenant is new).
    pub fn new(tenant_id: impl Into<String>, density: HashMap<String, PatternDensity>) -> Self {
        let tenant_id = tenant_id.into();
        let run_id = Uuid::new_v4();
        debug!(
            run_id = %run_id,
            tenant = %tenant_id,
            loaded_patterns = density.len(),
            "Synaptic surface created"
        );
        Self {
            run_id,
            tenant_id,
            arena: Vec::new(),
            by_kind: HashMap::new(),
            by_component: HashMap::new(),
            by_entity: HashMap::new(),
            density,
            pattern_components: HashMap::new(),
            pattern_executions: HashMap::new(),
            stats: RunStats::default(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Register a pattern for this run. Must be called exactly once per
    /// distinct pattern, before any entity is processed for it; seeds
    /// density at first sight and records the pattern→component
    /// association consolidation needs later.
    pub fn initialize_pattern_density(
        &mut self,
        signature: &str,
        component_index: usize,
        config: &EngineConfig,
    ) {
        if self.pattern_components.contains_key(signature) {
            warn!(
                signature = %signature,
                component = component_index,
                "Pattern density initialized twice in one run"
            );
            return;
        }
        self.pattern_components
            .insert(signature.to_string(), component_index);
        self.stats.patterns_initialized += 1;
        if !self.density.contains_key(signature) {
            debug!(signature = %signature, "First sighting; seeding pattern density");
            self.density
                .insert(signature.to_string(), PatternDensity::seed(signature, config));
        }
    }

    /// Execution mode for a pattern. Unknown patterns fail open to
    /// `full_trace` — maximum diagnostics, never silence.
    pub fn mode_for(&self, signature: &str) -> ExecutionMode {
        self.density
            .get(signature)
            .map(|density| density.execution_mode)
            .unwrap_or(ExecutionMode::FullTrace)
    }

    /// Append one synapse. The only write path.
    pub fn record(
        &mut self,
        kind: SynapseKind,
        component_index: usize,
        entity_id: Option<&str>,
        value: f64,
        note: Option<String>,
    ) {
        let offset = self.arena.len();
        self.arena.push(Synapse {
            kind,
            component_index,
            entity_id: entity_id.map(str::to_string),
            value,
            note,
            timestamp: Utc::now(),
        });
        self.by_kind.entry(kind).or_default().push(offset);
        self.by_component
            .entry(component_index)
            .or_default()
            .push(offset);
        if let Some(entity_id) = entity_id {
            self.by_entity
                .entry(entity_id.to_string())
                .or_default()
                .push(offset);
        }
        self.stats.synapses_recorded += 1;
        match kind {
            SynapseKind::Anomaly => self.stats.anomalies += 1,
            SynapseKind::BoundaryHit => self.stats.boundary_hits += 1,
            _ => {}
        }
    }

    /// Record one pattern execution for an entity.
    pub fn record_pattern(&mut self, signature: &str, component_index: usize, entity_id: &str) {
        *self
            .pattern_executions
            .entry(signature.to_string())
            .or_insert(0) += 1;
        self.record(
            SynapseKind::Pattern,
            component_index,
            Some(entity_id),
            1.0,
            Some(signature.to_string()),
        );
    }

    /// Record the observed execution confidence for one entity × component.
    pub fn record_confidence(&mut self, component_index: usize, entity_id: &str, confidence: f64) {
        self.record(
            SynapseKind::Confidence,
            component_index,
            Some(entity_id),
            confidence,
            None,
        );
    }

    pub fn mark_entity_processed(&mut self) {
        self.stats.entities_processed += 1;
    }

    // Queries. Each resolves an index then maps offsets; O(k) in results.

    pub fn synapses_of_kind(&self, kind: SynapseKind) -> Vec<&Synapse> {
        self.by_kind
            .get(&kind)
            .map(|offsets| offsets.iter().map(|&i| &self.arena[i]).collect())
            .unwrap_or_default()
    }

    pub fn synapses_for_component(&self, component_index: usize) -> Vec<&Synapse> {
        self.by_component
            .get(&component_index)
            .map(|offsets| offsets.iter().map(|&i| &self.arena[i]).collect())
            .unwrap_or_default()
    }

    pub fn synapses_for_entity(&self, entity_id: &str) -> Vec<&Synapse> {
        self.by_entity
            .get(entity_id)
            .map(|offsets| offsets.iter().map(|&i| &self.arena[i]).collect())
            .unwrap_or_default()
    }

    /// Confidence values recorded for one component this run.
    pub fn confidence_values_for_component(&self, component_index: usize) -> Vec<f64> {
        self.synapses_for_component(component_index)
            .into_iter()
            .filter(|synapse| synapse.kind == SynapseKind::Confidence)
            .map(|synapse| synapse.value)
            .collect()
    }

    /// Anomaly count for one component this run. Boundary hits are neutral
    /// and deliberately excluded.
    pub fn anomaly_count_for_component(&self, component_index: usize) -> u64 {
        self.synapses_for_component(component_index)
            .into_iter()
            .filter(|synapse| synapse.kind == SynapseKind::Anomaly)
            .count() as u64
    }

    pub fn loaded_density(&self) -> &HashMap<String, PatternDensity> {
        &self.density
    }

    pub fn pattern_components(&self) -> &HashMap<String, usize> {
        &self.pattern_components
    }

    pub fn pattern_executions(&self, signature: &str) -> u64 {
        self.pattern_executions.get(signature).copied().unwrap_or(0)
    }

    pub fn entity_count(&self) -> u64 {
        self.stats.entities_processed
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }
}
