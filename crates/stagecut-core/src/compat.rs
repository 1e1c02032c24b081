//! Partitioner compatibility analysis.
//!
//! Decides, per wide dependency edge, whether the parent's existing layout
//! already satisfies the operation's requirement so the shuffle can be elided.
//! The check is purely structural: scheme family, key function identity and
//! partition count. No statistics, no cost model.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::partitioning::{PartitionRequirement, Partitioning};

/// True when `parent` must be redistributed to satisfy `required`.
pub fn needs_shuffle(parent: &Partitioning, required: &Partitioning) -> bool {
    !parent.satisfies(required)
}

/// Outcome of resolving one wide operation against all of its parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WideResolution {
    /// Partitioning every input must be in; also the operation's output partitioning.
    pub target: Partitioning,
    /// `shuffle[i]` is true when parent `i` has to be reshuffled into `target`.
    pub shuffle: Vec<bool>,
}

impl WideResolution {
    pub fn shuffles(&self) -> usize {
        self.shuffle.iter().filter(|s| **s).count()
    }

    pub fn is_fully_elided(&self) -> bool {
        self.shuffles() == 0
    }
}

/// Resolve the target partitioning of a wide operation and which parents need a shuffle.
///
/// Count selection, in order:
/// 1. the count fixed by the requirement (explicit, or implied by range bounds);
/// 2. the largest count among parents already laid out by the required scheme,
///    so only the smaller sides get reshuffled;
/// 3. `default_partitions`.
///
/// Applies to any number of parents; with more than two, every parent not
/// matching the chosen target is reshuffled.
pub fn resolve(
    parents: &[&Partitioning],
    required: &PartitionRequirement,
    default_partitions: Option<usize>,
) -> Result<WideResolution> {
    let inherited = || {
        parents
            .iter()
            .filter(|p| p.scheme.compatible_with(&required.scheme))
            .map(|p| p.partitions)
            .max()
    };

    let partitions = required
        .explicit_partitions()
        .or_else(inherited)
        .or(default_partitions)
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            Error::UnresolvedPartitionCount(format!(
                "requirement {:?} has no explicit count, no compatible parent and no default",
                required.scheme
            ))
        })?;

    let target = Partitioning {
        scheme: required.scheme.clone(),
        partitions,
    };
    let shuffle: Vec<bool> = parents.iter().map(|p| needs_shuffle(p, &target)).collect();

    #[cfg(feature = "tracing")]
    tracing::trace!(
        resolved = %target,
        parents = parents.len(),
        shuffles = shuffle.iter().filter(|s| **s).count(),
        "resolved wide requirement"
    );

    Ok(WideResolution { target, shuffle })
}
