//! Adaptive intent execution engine.
//!
//! Computes financial outcomes for entities (employees, stores, teams) from
//! tenant-supplied, declaratively-configured rules, and learns how much
//! diagnostic work to redo on each future run.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Calculation Run                         │
//! │  ┌───────────┐  ┌────────────┐  ┌─────────────────────────┐  │
//! │  │ Validator │→ │  Resolver  │→ │   Recursive Executor    │  │
//! │  │ Compiler  │  │ (arbiter)  │  │  (outcome + trace)      │  │
//! │  └───────────┘  └────────────┘  └───────────┬─────────────┘  │
//! │                                             │ synapses       │
//! │  ┌──────────────────────────────────────────▼─────────────┐  │
//! │  │     Synaptic Surface (per-run telemetry bus)           │  │
//! │  └──────────────────────────────────────────┬─────────────┘  │
//! └─────────────────────────────────────────────┼────────────────┘
//!                                               │ consolidation
//!                     ┌─────────────────────────▼─────────────┐
//!                     │  Pattern Density (per tenant)  Tier 1 │
//!                     │  Structural flywheel           Tier 2 │
//!                     │  Domain/vertical flywheel      Tier 3 │
//!                     └───────────────────────────────────────┘
//! ```
//!
//! # Key Components
//!
//! - [`intent`]: the closed intent vocabulary, structural validator for
//!   untrusted external intents, deterministic legacy-configuration
//!   compiler, resolver, and the structural pattern-signature generator
//! - [`executor`]: state-free recursive evaluator producing an outcome and
//!   a replayable execution trace per entity per component
//! - [`synaptic`]: the per-run append-only telemetry bus and the four
//!   inline anomaly detectors that feed it
//! - [`learning`]: persistent pattern density, execution-mode derivation,
//!   end-of-run consolidation, and the three-tier flywheel aggregation
//!   with its privacy firewall
//! - [`run`]: the two-phase run session (pure compute, fallible apply)
//!
//! # What the engine MUST NEVER DO
//!
//! - Fail a run because persistence failed (it degrades to full diagnostics)
//! - Write a tenant or entity identifier into a Tier-2/3 aggregate row
//! - Evaluate anything outside the closed, non-Turing-complete operation set

pub mod config;
pub mod executor;
pub mod intent;
pub mod learning;
pub mod run;
pub mod synaptic;

pub use config::{ConfigError, EngineConfig};
pub use executor::{
    execute_component, EntityData, ExecutionResult, ExecutionTrace, TraceStep, TraceStepKind,
};
pub use intent::{
    compile_component, generate_pattern_signature, resolve_component, validate_intent, Boundary,
    ComponentConfig, ComponentIntent, IntentModifier, IntentOperation, IntentOrigin, IntentSource,
    Operand, ResolvedIntent, ValidationReport,
};
pub use learning::{
    consolidate, ConsolidationOutput, DensityStore, DensityUpdate, ExecutionMode, FlywheelStore,
    FoundationalAggregate, DomainAggregate, InMemoryDensityStore, InMemoryFlywheelStore,
    PatternDensity, StoreError, TrainingSignal,
};
pub use run::{
    apply_run_output, cold_start_tenant, ApplyReport, EffectReport, RunContext, RunOutput,
    RunSession, RunSummary,
};
pub use synaptic::{Synapse, SynapseKind, SynapticSurface};
