//! Dataset nodes: immutable descriptions of one transformation's output.

use serde::{Deserialize, Serialize};

use stagecut_core::id::DatasetId;
use stagecut_core::partitioning::Partitioning;

use crate::dependency::Dependency;
use crate::transform::Transformation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DatasetKind {
    /// Partitioned input read by the stage that contains it.
    Source { name: String },
    /// Input small enough to be shipped whole to every consumer partition.
    BroadcastSource { name: String },
    Derived { transform: Transformation },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetNode {
    pub id: DatasetId,
    pub kind: DatasetKind,
    /// Ordered parent edges; empty exactly for sources.
    pub parents: Vec<Dependency>,
    pub partitioning: Partitioning,
    /// Layout wide operations need their inputs in; `None` otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Partitioning>,
}

impl DatasetNode {
    pub fn is_source(&self) -> bool {
        matches!(
            self.kind,
            DatasetKind::Source { .. } | DatasetKind::BroadcastSource { .. }
        )
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self.kind, DatasetKind::BroadcastSource { .. })
    }

    pub fn transform(&self) -> Option<&Transformation> {
        match &self.kind {
            DatasetKind::Derived { transform } => Some(transform),
            _ => None,
        }
    }

    pub fn parent_ids(&self) -> impl Iterator<Item = DatasetId> + '_ {
        self.parents.iter().map(|d| d.parent)
    }

    pub fn num_partitions(&self) -> usize {
        self.partitioning.partitions
    }

    /// Short human label, e.g. `reduce_by_key#4` or `source:lines#0`.
    pub fn label(&self) -> String {
        match &self.kind {
            DatasetKind::Source { name } => format!("source:{name}#{}", self.id.get()),
            DatasetKind::BroadcastSource { name } => format!("broadcast:{name}#{}", self.id.get()),
            DatasetKind::Derived { transform } => format!("{}#{}", transform.name(), self.id.get()),
        }
    }
}
