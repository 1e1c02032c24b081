//! Convenient re-exports for downstream crates.

pub use crate::compat::{needs_shuffle, resolve, WideResolution};
pub use crate::config::PlannerConfig;
pub use crate::error::{Error, Result};
pub use crate::hash::Hash256;
pub use crate::id::{DatasetId, ShuffleId, StageId};
pub use crate::manifest::{ManifestId, PlanManifest};
pub use crate::partitioning::{
    AggregatorRef, KeyFn, PartitionRequirement, PartitionScheme, Partitioning, SchemeFamily,
};
