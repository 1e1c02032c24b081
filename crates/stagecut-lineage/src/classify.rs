//! Dependency classification.
//!
//! Given a transformation and its parents, tag every parent edge narrow, wide
//! or broadcast and compute the new node's partitioning. Each edge of a
//! multi-parent transformation is classified on its own.

use stagecut_core::compat;
use stagecut_core::error::{Error, Result};
use stagecut_core::id::DatasetId;
use stagecut_core::partitioning::Partitioning;

use crate::dependency::{Dependency, DependencyKind, PartitionMapping};
use crate::node::DatasetNode;
use crate::transform::Transformation;

/// What the classifier needs to know about one parent.
#[derive(Debug, Clone, Copy)]
pub struct ParentInfo<'a> {
    pub id: DatasetId,
    pub partitioning: &'a Partitioning,
    pub broadcast: bool,
}

impl<'a> From<&'a DatasetNode> for ParentInfo<'a> {
    fn from(node: &'a DatasetNode) -> Self {
        Self {
            id: node.id,
            partitioning: &node.partitioning,
            broadcast: node.is_broadcast(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub dependencies: Vec<Dependency>,
    pub partitioning: Partitioning,
    pub required: Option<Partitioning>,
}

/// Kind of the edge from `parents[index]` into a node built by `transform`.
pub fn classify_edge(
    transform: &Transformation,
    parents: &[ParentInfo<'_>],
    index: usize,
) -> DependencyKind {
    if let Some(side) = broadcast_side(transform, parents) {
        return if side == index {
            DependencyKind::Broadcast
        } else {
            DependencyKind::Narrow
        };
    }
    if transform.is_wide() {
        DependencyKind::Wide
    } else {
        DependencyKind::Narrow
    }
}

/// Index of the broadcast parent when `transform` is a join with exactly one
/// broadcast side.
fn broadcast_side(transform: &Transformation, parents: &[ParentInfo<'_>]) -> Option<usize> {
    if !matches!(transform, Transformation::Join { .. }) {
        return None;
    }
    let mut sides = parents.iter().enumerate().filter(|(_, p)| p.broadcast);
    match (sides.next(), sides.next()) {
        (Some((idx, _)), None) => Some(idx),
        _ => None,
    }
}

pub fn classify(
    transform: &Transformation,
    parents: &[ParentInfo<'_>],
    default_partitions: Option<usize>,
) -> Result<Classification> {
    if !transform.arity().accepts(parents.len()) {
        return Err(Error::Transform(format!(
            "{} does not accept {} parent(s)",
            transform.name(),
            parents.len()
        )));
    }

    if transform.is_element_wise() {
        let parent = &parents[0];
        let partitioning = if transform.is_key_preserving() {
            parent.partitioning.clone()
        } else {
            Partitioning::unpartitioned(parent.partitioning.partitions)
        };
        return Ok(Classification {
            dependencies: vec![Dependency::narrow(parent.id, PartitionMapping::OneToOne)],
            partitioning,
            required: None,
        });
    }

    match transform {
        Transformation::Coalesce {
            partitions,
            shuffle: false,
        } => coalesce(&parents[0], *partitions),
        Transformation::Union => Ok(union(parents)),
        Transformation::Join { .. } if broadcast_side(transform, parents).is_some() => {
            Ok(broadcast_join(transform, parents))
        }
        _ => wide(transform, parents, default_partitions),
    }
}

fn coalesce(parent: &ParentInfo<'_>, partitions: usize) -> Result<Classification> {
    if partitions == 0 {
        return Err(Error::Transform("coalesce to zero partitions".to_string()));
    }
    let out = partitions.min(parent.partitioning.partitions);
    Ok(Classification {
        dependencies: vec![Dependency::narrow(
            parent.id,
            PartitionMapping::coalesce(parent.partitioning.partitions, out),
        )],
        partitioning: Partitioning::unpartitioned(out),
        required: None,
    })
}

fn union(parents: &[ParentInfo<'_>]) -> Classification {
    let first = parents[0].partitioning;
    let aligned = first.is_keyed() && parents.iter().all(|p| p.partitioning == first);

    if aligned {
        // Partitioner-aware union: partition i reads partition i of every parent.
        return Classification {
            dependencies: parents
                .iter()
                .map(|p| Dependency::narrow(p.id, PartitionMapping::OneToOne))
                .collect(),
            partitioning: first.clone(),
            required: None,
        };
    }

    let mut out_start = 0;
    let mut dependencies = Vec::with_capacity(parents.len());
    for p in parents {
        let len = p.partitioning.partitions;
        dependencies.push(Dependency::narrow(
            p.id,
            PartitionMapping::Range {
                in_start: 0,
                out_start,
                len,
            },
        ));
        out_start += len;
    }
    Classification {
        dependencies,
        partitioning: Partitioning::unpartitioned(out_start),
        required: None,
    }
}

fn broadcast_join(transform: &Transformation, parents: &[ParentInfo<'_>]) -> Classification {
    let mut dependencies = Vec::with_capacity(parents.len());
    let mut partitioning = None;
    for (idx, p) in parents.iter().enumerate() {
        match classify_edge(transform, parents, idx) {
            DependencyKind::Broadcast => dependencies.push(Dependency::broadcast(p.id)),
            _ => {
                partitioning = Some(p.partitioning.clone());
                dependencies.push(Dependency::narrow(p.id, PartitionMapping::OneToOne));
            }
        }
    }
    Classification {
        dependencies,
        // A binary join with exactly one broadcast side has exactly one streamed side.
        partitioning: partitioning.unwrap_or_else(|| parents[0].partitioning.clone()),
        required: None,
    }
}

fn wide(
    transform: &Transformation,
    parents: &[ParentInfo<'_>],
    default_partitions: Option<usize>,
) -> Result<Classification> {
    let requirement = transform.requirement().ok_or_else(|| {
        Error::Invariant(format!("{} classified wide without a requirement", transform.name()))
    })?;
    let layouts: Vec<&Partitioning> = parents.iter().map(|p| p.partitioning).collect();
    let resolution = compat::resolve(&layouts, &requirement, default_partitions)?;

    Ok(Classification {
        dependencies: parents.iter().map(|p| Dependency::wide(p.id)).collect(),
        partitioning: resolution.target.clone(),
        required: Some(resolution.target),
    })
}
