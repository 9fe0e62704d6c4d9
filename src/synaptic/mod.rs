//! The synaptic surface: the run's ephemeral telemetry bus.
//!
//! Created at run start, exclusively owned by that run, discarded after
//! consolidation. Single writer, append only, three independent indexes so
//! any consumer can ask "all anomalies this run", "everything for component
//! 3", or "everything about entity X" without scanning.

pub mod detectors;
pub mod surface;

pub use surface::{RunStats, Synapse, SynapseKind, SynapticSurface};
