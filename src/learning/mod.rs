//! The learning loop: pattern density, consolidation, and the flywheel.
//!
//! Tier 1 is per-tenant [`PatternDensity`], updated once per run by
//! [`consolidate`]. Tier 2 aggregates purely by pattern signature across
//! all tenants; Tier 3 additionally partitions by domain and vertical.
//! Tier-2/3 rows carry **no tenant or entity identifier** — the privacy
//! firewall is a schema-level invariant, enforced here and tested by
//! serializing rows and asserting the forbidden keys are absent.

pub mod consolidation;
pub mod density;
pub mod flywheel;
pub mod store;

pub use consolidation::{consolidate, ConsolidationOutput, TrainingSignal};
pub use density::{DensityUpdate, ExecutionMode, PatternDensity};
pub use flywheel::{
    cold_start_priors, fold_domain, fold_foundational, DomainAggregate, FoundationalAggregate,
};
pub use store::{
    DensityStore, FlywheelStore, InMemoryDensityStore, InMemoryFlywheelStore, StoreError,
};
