//! The calculation run session: pure compute, then fallible apply.
//!
//! A run is two explicit phases. The compute phase resolves intents,
//! executes every entity × component synchronously against the
//! exclusively-owned synaptic surface, consolidates, and returns pure
//! results plus the pending persistence work. The apply phase executes
//! that work — chunked density upsert, then Tier-2 and Tier-3 flywheel
//! aggregation concurrently — and reports per-effect success without ever
//! re-entering compute and without ever failing the run.
//!
//! Nothing blocks on persistence inside the entity loop: density is read
//! once before the loop and every write happens after it.

use crate::config::EngineConfig;
use crate::executor::{execute_component, EntityData, ExecutionResult};
use crate::intent::{generate_pattern_signature, ResolvedIntent};
use crate::learning::consolidation::{consolidate, TrainingSignal};
use crate::learning::density::{DensityUpdate, PatternDensity};
use crate::learning::flywheel::{cold_start_priors, fold_domain, fold_foundational};
use crate::learning::store::{
    load_density_best_effort, upsert_chunked, DensityStore, FlywheelStore,
};
use crate::synaptic::surface::SynapticSurface;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Identifies whose run this is and where its learning may flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunContext {
    pub tenant_id: String,
    /// Tier-3 partition key; no domain aggregation without it
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub vertical_hint: Option<String>,
}

impl RunContext {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            domain_id: None,
            vertical_hint: None,
        }
    }

    pub fn with_domain(
        mut self,
        domain_id: impl Into<String>,
        vertical_hint: impl Into<String>,
    ) -> Self {
        self.domain_id = Some(domain_id.into());
        self.vertical_hint = Some(vertical_hint.into());
        self
    }
}

/// Tenant-visible aggregate summary of one run. There is no per-entity
/// exception surface by design.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub tenant_id: String,
    pub entities_processed: u64,
    pub components_executed: usize,
    pub patterns_observed: u64,
    pub anomalies_detected: u64,
    pub boundary_hits: u64,
    pub synapses_recorded: u64,
}

/// Pure output of the compute phase.
#[derive(Debug)]
pub struct RunOutput {
    pub results: Vec<ExecutionResult>,
    pub density_updates: Vec<DensityUpdate>,
    pub training_signals: Vec<TrainingSignal>,
    pub summary: RunSummary,
}

/// One calculation run over one tenant's entity batch.
pub struct RunSession {
    context: RunContext,
    config: EngineConfig,
    surface: SynapticSurface,
    results: Vec<ExecutionResult>,
    components_executed: usize,
}

impl RunSession {
    /// Create a session with density loaded best-effort from the store.
    /// A load failure yields an empty map — maximal diagnostics, not a
    /// run failure.
    pub async fn prepare(
        context: RunContext,
        config: EngineConfig,
        store: &dyn DensityStore,
    ) -> Self {
        let density = load_density_best_effort(store, &context.tenant_id).await;
        Self::with_density(context, config, density)
    }

    /// Create a session over an already-loaded density map.
    pub fn with_density(
        context: RunContext,
        config: EngineConfig,
        density: HashMap<String, PatternDensity>,
    ) -> Self {
        let surface = SynapticSurface::new(context.tenant_id.clone(), density);
        info!(
            run_id = %surface.run_id(),
            tenant = %context.tenant_id,
            "Run session prepared"
        );
        Self {
            context,
            config,
            surface,
            results: Vec::new(),
            components_executed: 0,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.surface.run_id()
    }

    /// Execute every entity against every resolved component.
    ///
    /// Pattern density is initialized once per distinct pattern, before
    /// any entity is processed for it; the per-pattern execution mode is
    /// fixed for the whole batch.
    pub fn execute_batch(&mut self, components: &[ResolvedIntent], entities: &[EntityData]) {
        let mut patterns = Vec::with_capacity(components.len());
        for resolved in components {
            let signature = generate_pattern_signature(&resolved.intent);
            // Initialization is once per distinct pattern; structurally
            // identical components share a signature and a mode.
            if !self.surface.pattern_components().contains_key(&signature) {
                self.surface.initialize_pattern_density(
                    &signature,
                    resolved.intent.component_index,
                    &self.config,
                );
            }
            let mode = self.surface.mode_for(&signature);
            patterns.push((signature, mode));
        }
        self.components_executed = components.len();

        for entity in entities {
            for (resolved, (signature, mode)) in components.iter().zip(&patterns) {
                self.surface.record_pattern(
                    signature,
                    resolved.intent.component_index,
                    &entity.entity_id,
                );
                let result = execute_component(
                    &resolved.intent,
                    entity,
                    *mode,
                    &mut self.surface,
                    &self.config,
                );
                self.results.push(result);
            }
            self.surface.mark_entity_processed();
        }
    }

    /// Consolidate and close the compute phase.
    pub fn finish(self) -> RunOutput {
        let consolidation = consolidate(&self.surface, &self.config);
        let stats = self.surface.stats();
        let summary = RunSummary {
            run_id: self.surface.run_id(),
            tenant_id: self.context.tenant_id.clone(),
            entities_processed: stats.entities_processed,
            components_executed: self.components_executed,
            patterns_observed: stats.patterns_initialized,
            anomalies_detected: stats.anomalies,
            boundary_hits: stats.boundary_hits,
            synapses_recorded: stats.synapses_recorded,
        };
        info!(
            run_id = %summary.run_id,
            tenant = %summary.tenant_id,
            entities = summary.entities_processed,
            anomalies = summary.anomalies_detected,
            patterns = summary.patterns_observed,
            "Run compute phase finished"
        );
        RunOutput {
            results: self.results,
            density_updates: consolidation.updates,
            training_signals: consolidation.training_signals,
            summary,
        }
    }
}

/// Outcome of one apply-phase effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectReport {
    pub effect: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Apply-phase report. Failures are recorded, never propagated: the worst
/// outcome of any failed effect is "re-verify the pattern fully next run".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub effects: Vec<EffectReport>,
}

impl ApplyReport {
    pub fn all_succeeded(&self) -> bool {
        self.effects.iter().all(|effect| effect.success)
    }

    fn record(&mut self, effect: &str, result: anyhow::Result<()>) {
        match result {
            Ok(()) => self.effects.push(EffectReport {
                effect: effect.to_string(),
                success: true,
                error: None,
            }),
            Err(e) => {
                error!(effect = %effect, error = %e, "Apply-phase effect failed");
                self.effects.push(EffectReport {
                    effect: effect.to_string(),
                    success: false,
                    error: Some(format!("{e:#}")),
                });
            }
        }
    }
}

/// Execute the pending persistence of a finished run.
///
/// Density upserts first; Tier-2 and Tier-3 aggregation then run
/// concurrently, and a failure in either never aborts the other or the
/// caller.
pub async fn apply_run_output(
    output: &RunOutput,
    context: &RunContext,
    config: &EngineConfig,
    density_store: &dyn DensityStore,
    flywheel_store: Option<&dyn FlywheelStore>,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    let density_result = upsert_chunked(
        density_store,
        &context.tenant_id,
        &output.density_updates,
        config.upsert_chunk_size,
    )
    .await
    .context("density upsert");
    report.record("density_upsert", density_result);

    let Some(flywheel) = flywheel_store else {
        return report;
    };
    if output.training_signals.is_empty() {
        return report;
    }

    let (foundational, domain) = tokio::join!(
        aggregate_foundational(flywheel, &output.training_signals, config),
        aggregate_domain(flywheel, &output.training_signals, context, config),
    );
    report.record("flywheel_foundational", foundational);
    if let Some(domain) = domain {
        report.record("flywheel_domain", domain);
    }

    report
}

async fn aggregate_foundational(
    store: &dyn FlywheelStore,
    signals: &[TrainingSignal],
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let signatures: Vec<String> = signals.iter().map(|s| s.signature.clone()).collect();
    let existing = store
        .load_foundational(&signatures)
        .await
        .context("foundational load")?;
    let mut by_signature: HashMap<String, _> = existing
        .into_iter()
        .map(|row| (row.signature.clone(), row))
        .collect();

    let rows: Vec<_> = signals
        .iter()
        .map(|signal| fold_foundational(by_signature.remove(&signal.signature), signal, config))
        .collect();
    store
        .upsert_foundational(&rows)
        .await
        .context("foundational upsert")?;
    info!(rows = rows.len(), "Foundational flywheel updated");
    Ok(())
}

async fn aggregate_domain(
    store: &dyn FlywheelStore,
    signals: &[TrainingSignal],
    context: &RunContext,
    config: &EngineConfig,
) -> Option<anyhow::Result<()>> {
    let (domain_id, vertical_hint) = match (&context.domain_id, &context.vertical_hint) {
        (Some(domain_id), Some(vertical_hint)) => (domain_id.clone(), vertical_hint.clone()),
        _ => return None,
    };

    let result = async {
        let signatures: Vec<String> = signals.iter().map(|s| s.signature.clone()).collect();
        let existing = store
            .load_domain(&domain_id, &vertical_hint, &signatures)
            .await
            .context("domain load")?;
        let mut by_signature: HashMap<String, _> = existing
            .into_iter()
            .map(|row| (row.signature.clone(), row))
            .collect();

        let rows: Vec<_> = signals
            .iter()
            .map(|signal| {
                fold_domain(
                    by_signature.remove(&signal.signature),
                    signal,
                    &domain_id,
                    &vertical_hint,
                    config,
                )
            })
            .collect();
        store.upsert_domain(&rows).await.context("domain upsert")?;
        info!(
            rows = rows.len(),
            domain = %domain_id,
            vertical = %vertical_hint,
            "Domain flywheel updated"
        );
        Ok(())
    }
    .await;
    Some(result)
}

/// Seed a new tenant's Tier-1 density from cross-tenant priors for the
/// given signatures. Tier-2 loads first, Tier-3 overlays matching rows,
/// every confidence is discounted, and the result is written at zero
/// executions.
pub async fn cold_start_tenant(
    context: &RunContext,
    config: &EngineConfig,
    signatures: &[String],
    density_store: &dyn DensityStore,
    flywheel_store: &dyn FlywheelStore,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    let result = async {
        let foundational = flywheel_store
            .load_foundational(signatures)
            .await
            .context("foundational priors load")?;
        let domain = match (&context.domain_id, &context.vertical_hint) {
            (Some(domain_id), Some(vertical_hint)) => flywheel_store
                .load_domain(domain_id, vertical_hint, signatures)
                .await
                .context("domain priors load")?,
            _ => Vec::new(),
        };

        let seeded = cold_start_priors(&foundational, &domain, config);
        if seeded.is_empty() {
            warn!(tenant = %context.tenant_id, "No priors found for cold start");
            return Ok(());
        }
        let updates: Vec<DensityUpdate> = seeded
            .into_values()
            .map(|density| DensityUpdate {
                signature: density.signature,
                confidence: density.confidence,
                execution_mode: density.execution_mode,
                total_executions: 0,
                run_anomaly_rate: density.last_anomaly_rate,
            })
            .collect();
        upsert_chunked(
            density_store,
            &context.tenant_id,
            &updates,
            config.upsert_chunk_size,
        )
        .await
        .context("cold-start density seed")?;
        Ok(())
    }
    .await;
    report.record("cold_start_seed", result);
    report
}
