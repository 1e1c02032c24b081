//! Plan manifest for audit.
//!
//! One manifest is emitted per planning run; two runs over the same lineage
//! and config carry the same `graph_hash`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;
use crate::id::DatasetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanManifest {
    pub id: ManifestId,

    /// The action's target dataset.
    pub target: DatasetId,

    /// Stable hash of the produced stage graph.
    pub graph_hash: Hash256,

    pub stages: usize,
    pub shuffles: usize,

    /// Planner version string for provenance.
    pub planner_version: String,

    /// Milliseconds since Unix epoch (UTC).
    pub planned_ms: u64,
}

impl PlanManifest {
    pub fn new(
        target: DatasetId,
        graph_hash: Hash256,
        stages: usize,
        shuffles: usize,
        planned_ms: u64,
    ) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            target,
            graph_hash,
            stages,
            shuffles,
            planner_version: crate::VERSION.to_string(),
            planned_ms,
        }
    }
}
