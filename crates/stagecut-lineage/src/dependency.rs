//! Classified parent edges of a dataset node.

use serde::{Deserialize, Serialize};

use stagecut_core::id::DatasetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Each child partition reads a bounded, statically known set of parent partitions.
    Narrow,
    /// A child partition may read records from any parent partition.
    Wide,
    /// Parent is a broadcast source looked up in memory by every child partition.
    Broadcast,
}

/// Child partition -> parent partitions, for narrow edges.
/// Informational only: the planner never executes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mapping")]
pub enum PartitionMapping {
    OneToOne,
    /// Child partitions `[out_start, out_start + len)` read parent partitions
    /// `[in_start, in_start + len)` one to one.
    Range {
        in_start: usize,
        out_start: usize,
        len: usize,
    },
    /// Child partition `i` reads the half-open parent range `groups[i]`.
    Coalesced { groups: Vec<(usize, usize)> },
}

impl PartitionMapping {
    /// Evenly split `parent_partitions` into `partitions` contiguous groups.
    pub fn coalesce(parent_partitions: usize, partitions: usize) -> Self {
        let n = partitions.clamp(1, parent_partitions.max(1));
        let groups = (0..n)
            .map(|i| (i * parent_partitions / n, (i + 1) * parent_partitions / n))
            .collect();
        PartitionMapping::Coalesced { groups }
    }

    pub fn parents_of(&self, child: usize) -> Vec<usize> {
        match self {
            PartitionMapping::OneToOne => vec![child],
            PartitionMapping::Range {
                in_start,
                out_start,
                len,
            } => {
                if child >= *out_start && child < out_start + len {
                    vec![child - out_start + in_start]
                } else {
                    Vec::new()
                }
            }
            PartitionMapping::Coalesced { groups } => groups
                .get(child)
                .map(|(start, end)| (*start..*end).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub parent: DatasetId,
    pub kind: DependencyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<PartitionMapping>,
}

impl Dependency {
    pub fn narrow(parent: DatasetId, mapping: PartitionMapping) -> Self {
        Self {
            parent,
            kind: DependencyKind::Narrow,
            mapping: Some(mapping),
        }
    }

    pub fn wide(parent: DatasetId) -> Self {
        Self {
            parent,
            kind: DependencyKind::Wide,
            mapping: None,
        }
    }

    pub fn broadcast(parent: DatasetId) -> Self {
        Self {
            parent,
            kind: DependencyKind::Broadcast,
            mapping: None,
        }
    }

    pub fn is_narrow(&self) -> bool {
        self.kind == DependencyKind::Narrow
    }

    pub fn is_wide(&self) -> bool {
        self.kind == DependencyKind::Wide
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_mapping_offsets_union_inputs() {
        let m = PartitionMapping::Range {
            in_start: 0,
            out_start: 4,
            len: 3,
        };
        assert_eq!(m.parents_of(5), vec![1]);
        assert!(m.parents_of(2).is_empty());
        assert!(m.parents_of(7).is_empty());
    }

    #[test]
    fn coalesce_groups_are_contiguous_and_cover_parent() {
        let m = PartitionMapping::coalesce(10, 3);
        let covered: Vec<usize> = (0..3).flat_map(|i| m.parents_of(i)).collect();
        assert_eq!(covered, (0..10).collect::<Vec<_>>());
        assert_eq!(m.parents_of(0), vec![0, 1, 2]);
    }

    #[test]
    fn coalesce_never_grows_past_parent_count() {
        let PartitionMapping::Coalesced { groups } = PartitionMapping::coalesce(2, 8) else {
            panic!("expected coalesced mapping");
        };
        assert_eq!(groups, vec![(0, 1), (1, 2)]);
    }
}
