//! Transformations that derive a dataset from its parents.
//!
//! Parameters such as requested partition counts are embedded here at
//! composition time; a missing count falls back to the configured default.

use serde::{Deserialize, Serialize};

use stagecut_core::partitioning::{AggregatorRef, KeyFn, PartitionRequirement};

/// How many parents a transformation accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Unary,
    Binary,
    /// One or more.
    Variadic,
}

impl Arity {
    pub fn accepts(self, parents: usize) -> bool {
        match self {
            Arity::Unary => parents == 1,
            Arity::Binary => parents == 2,
            Arity::Variadic => parents >= 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Transformation {
    Map {
        #[serde(default)]
        preserves_partitioning: bool,
    },
    Filter,
    FlatMap,
    MapValues,
    FlatMapValues,
    MapPartitions {
        #[serde(default)]
        preserves_partitioning: bool,
    },
    /// Merge partitions down to `partitions`; without `shuffle` no data moves.
    Coalesce {
        partitions: usize,
        #[serde(default)]
        shuffle: bool,
    },
    Union,
    GroupByKey {
        key: KeyFn,
        #[serde(default)]
        partitions: Option<usize>,
    },
    ReduceByKey {
        key: KeyFn,
        #[serde(default)]
        partitions: Option<usize>,
        combiner: AggregatorRef,
    },
    AggregateByKey {
        key: KeyFn,
        #[serde(default)]
        partitions: Option<usize>,
        combiner: AggregatorRef,
    },
    Join {
        key: KeyFn,
        #[serde(default)]
        partitions: Option<usize>,
    },
    Cogroup {
        key: KeyFn,
        #[serde(default)]
        partitions: Option<usize>,
    },
    /// Full redistribution; hashed by `key` when given, round-robin otherwise.
    Repartition {
        #[serde(default)]
        partitions: Option<usize>,
        #[serde(default)]
        key: Option<KeyFn>,
    },
    /// Redistribute with a named custom partitioner.
    PartitionBy {
        partitioner: String,
        key: KeyFn,
        partitions: usize,
    },
    SortByKey {
        key: KeyFn,
        bounds: Vec<String>,
    },
}

impl Transformation {
    pub fn name(&self) -> &'static str {
        use Transformation::*;
        match self {
            Map { .. } => "map",
            Filter => "filter",
            FlatMap => "flat_map",
            MapValues => "map_values",
            FlatMapValues => "flat_map_values",
            MapPartitions { .. } => "map_partitions",
            Coalesce { .. } => "coalesce",
            Union => "union",
            GroupByKey { .. } => "group_by_key",
            ReduceByKey { .. } => "reduce_by_key",
            AggregateByKey { .. } => "aggregate_by_key",
            Join { .. } => "join",
            Cogroup { .. } => "cogroup",
            Repartition { .. } => "repartition",
            PartitionBy { .. } => "partition_by",
            SortByKey { .. } => "sort_by_key",
        }
    }

    pub fn arity(&self) -> Arity {
        use Transformation::*;
        match self {
            Union | Cogroup { .. } => Arity::Variadic,
            Join { .. } => Arity::Binary,
            _ => Arity::Unary,
        }
    }

    pub fn is_element_wise(&self) -> bool {
        use Transformation::*;
        matches!(
            self,
            Map { .. } | Filter | FlatMap | MapValues | FlatMapValues | MapPartitions { .. }
        )
    }

    /// Element-wise output keeps the parent's keys in the parent's partitions.
    pub fn is_key_preserving(&self) -> bool {
        use Transformation::*;
        match self {
            Filter | MapValues | FlatMapValues => true,
            Map {
                preserves_partitioning,
            }
            | MapPartitions {
                preserves_partitioning,
            } => *preserves_partitioning,
            _ => false,
        }
    }

    /// The layout a key-redistributing transformation needs its inputs in.
    /// `None` for transformations that never move data.
    pub fn requirement(&self) -> Option<PartitionRequirement> {
        use Transformation::*;
        match self {
            GroupByKey { key, partitions }
            | ReduceByKey {
                key, partitions, ..
            }
            | AggregateByKey {
                key, partitions, ..
            }
            | Join { key, partitions }
            | Cogroup { key, partitions } => {
                Some(PartitionRequirement::hash(key.clone(), *partitions))
            }
            Repartition {
                partitions,
                key: Some(key),
            } => Some(PartitionRequirement::hash(key.clone(), *partitions)),
            Repartition {
                partitions,
                key: None,
            } => Some(PartitionRequirement::unkeyed(*partitions)),
            Coalesce {
                partitions,
                shuffle: true,
            } => Some(PartitionRequirement::unkeyed(Some(*partitions))),
            PartitionBy {
                partitioner,
                key,
                partitions,
            } => Some(PartitionRequirement::custom(
                partitioner.clone(),
                key.clone(),
                *partitions,
            )),
            SortByKey { key, bounds } => {
                Some(PartitionRequirement::range(key.clone(), bounds.clone()))
            }
            Map { .. }
            | Filter
            | FlatMap
            | MapValues
            | FlatMapValues
            | MapPartitions { .. }
            | Coalesce { shuffle: false, .. }
            | Union => None,
        }
    }

    pub fn is_wide(&self) -> bool {
        self.requirement().is_some()
    }

    /// Associative reductions can pre-aggregate before the shuffle.
    pub fn map_side_combine(&self) -> bool {
        matches!(
            self,
            Transformation::ReduceByKey { .. } | Transformation::AggregateByKey { .. }
        )
    }

    pub fn aggregator(&self) -> Option<&AggregatorRef> {
        match self {
            Transformation::ReduceByKey { combiner, .. }
            | Transformation::AggregateByKey { combiner, .. } => Some(combiner),
            _ => None,
        }
    }
}
