//! The intent layer: vocabulary, validation, compilation, resolution,
//! and pattern signatures.
//!
//! An *intent* is a declarative, composable description of how to derive
//! one numeric outcome from entity data. Intents arrive from two producers:
//!
//! - an upstream interpretation step, delivering untrusted JSON that must
//!   pass the [`validator`] before it is ever evaluated, and
//! - the deterministic [`compiler`], which lowers legacy tier / matrix /
//!   percentage / conditional configuration into the same vocabulary.
//!
//! The [`resolver`] arbitrates between the two, always preferring a
//! validated external intent and always falling back to the compiled form.
//! The [`signature`] module fingerprints an intent tree's *shape* — never
//! its data — producing the join key for all cross-run learning.

pub mod compiler;
pub mod resolver;
pub mod signature;
pub mod validator;
pub mod vocabulary;

pub use compiler::{
    compile_component, CalculationType, ComponentConfig, ConditionalConfig, ConditionalRate,
    MatrixBand, MatrixConfig, PercentageConfig, TierBand, TierConfig,
};
pub use resolver::{resolve_component, IntentOrigin, ResolvedIntent};
pub use signature::{generate_pattern_signature, signature_digest};
pub use validator::{validate_intent, ValidationReport};
pub use vocabulary::{
    AggregateFunction, AggregateScope, BlendInput, Boundary, Comparator, ComponentIntent,
    IntentModifier, IntentOperation, IntentSource, NoMatchBehavior, NoMatchPolicy, Operand,
    VariantRoute, VariantRouter, WindowAggregation, ZeroDenominatorBehavior,
};
