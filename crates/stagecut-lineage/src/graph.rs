//! The lineage graph: an append-only arena of dataset nodes.
//!
//! Writers are serialized by a mutex and publish each append as a new
//! immutable snapshot. Readers load the current snapshot without locking and
//! keep a consistent view for as long as they hold it, so planning on other
//! threads never observes a half-built node. Snapshots share node storage,
//! so publishing does not copy earlier nodes.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use stagecut_core::config::PlannerConfig;
use stagecut_core::error::{Error, Result};
use stagecut_core::id::DatasetId;
use stagecut_core::partitioning::{AggregatorRef, KeyFn, Partitioning};

use crate::arena::NodeArena;
use crate::classify::{classify, ParentInfo};
use crate::node::{DatasetKind, DatasetNode};
use crate::transform::Transformation;

/// Read access to dataset nodes by id. The planner only needs this.
pub trait LineageSource {
    fn dataset(&self, id: DatasetId) -> Option<&DatasetNode>;
}

/// Immutable view of the graph at one point in time.
#[derive(Debug, Clone, Default)]
pub struct LineageSnapshot {
    nodes: NodeArena,
}

impl LineageSnapshot {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 0
    }

    pub fn get(&self, id: DatasetId) -> Option<&Arc<DatasetNode>> {
        self.nodes.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatasetNode> {
        self.nodes.iter().map(|n| n.as_ref())
    }
}

impl LineageSource for LineageSnapshot {
    fn dataset(&self, id: DatasetId) -> Option<&DatasetNode> {
        self.get(id).map(|n| n.as_ref())
    }
}

pub struct LineageGraph {
    current: ArcSwap<LineageSnapshot>,
    append: Mutex<()>,
    default_partitions: Option<usize>,
}

impl Default for LineageGraph {
    fn default() -> Self {
        Self::new(&PlannerConfig::default())
    }
}

impl std::fmt::Debug for LineageGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineageGraph")
            .field("len", &self.len())
            .field("default_partitions", &self.default_partitions)
            .finish()
    }
}

impl LineageGraph {
    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(LineageSnapshot::default()),
            append: Mutex::new(()),
            default_partitions: config.default_partitions,
        }
    }

    /// Lock-free view of every node appended so far.
    pub fn snapshot(&self) -> Arc<LineageSnapshot> {
        self.current.load_full()
    }

    pub fn get(&self, id: DatasetId) -> Option<Arc<DatasetNode>> {
        self.current.load().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn default_partitions(&self) -> Option<usize> {
        self.default_partitions
    }

    /// Add a partitioned source.
    pub fn source(&self, name: impl Into<String>, partitioning: Partitioning) -> Result<DatasetId> {
        let name = name.into();
        if partitioning.partitions == 0 {
            return Err(Error::Transform(format!("source {name} has zero partitions")));
        }
        self.push(|id| DatasetNode {
            id,
            kind: DatasetKind::Source { name },
            parents: Vec::new(),
            partitioning,
            required: None,
        })
    }

    /// Add a source small enough to broadcast to every consumer partition.
    pub fn broadcast_source(
        &self,
        name: impl Into<String>,
        partitions: usize,
    ) -> Result<DatasetId> {
        let name = name.into();
        if partitions == 0 {
            return Err(Error::Transform(format!("broadcast source {name} has zero partitions")));
        }
        self.push(|id| DatasetNode {
            id,
            kind: DatasetKind::BroadcastSource { name },
            parents: Vec::new(),
            partitioning: Partitioning::unpartitioned(partitions),
            required: None,
        })
    }

    /// Derive a new dataset from existing ones. Parents must already be in the graph.
    pub fn derive(&self, transform: Transformation, parents: &[DatasetId]) -> Result<DatasetId> {
        let _guard = self.append.lock();
        let snapshot = self.current.load_full();

        let parent_nodes = parents
            .iter()
            .map(|id| snapshot.dataset(*id).ok_or(Error::UnknownDataset(*id)))
            .collect::<Result<Vec<_>>>()?;
        let infos: Vec<ParentInfo<'_>> =
            parent_nodes.iter().map(|n| ParentInfo::from(*n)).collect();
        let classification = classify(&transform, &infos, self.default_partitions)?;

        let id = DatasetId::new(snapshot.len() as u64);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            dataset = %id,
            op = transform.name(),
            partitioning = %classification.partitioning,
            "derived dataset"
        );

        let node = DatasetNode {
            id,
            kind: DatasetKind::Derived { transform },
            parents: classification.dependencies,
            partitioning: classification.partitioning,
            required: classification.required,
        };
        self.publish(&snapshot, node)?;
        Ok(id)
    }

    fn push(&self, build: impl FnOnce(DatasetId) -> DatasetNode) -> Result<DatasetId> {
        let _guard = self.append.lock();
        let snapshot = self.current.load_full();
        let id = DatasetId::new(snapshot.len() as u64);
        self.publish(&snapshot, build(id))?;
        Ok(id)
    }

    // Caller holds the append lock and `base` is the current snapshot.
    fn publish(&self, base: &LineageSnapshot, node: DatasetNode) -> Result<()> {
        let nodes = base.nodes.append(node)?;
        self.current.store(Arc::new(LineageSnapshot { nodes }));
        Ok(())
    }

    pub fn map(&self, parent: DatasetId) -> Result<DatasetId> {
        self.derive(
            Transformation::Map {
                preserves_partitioning: false,
            },
            &[parent],
        )
    }

    pub fn filter(&self, parent: DatasetId) -> Result<DatasetId> {
        self.derive(Transformation::Filter, &[parent])
    }

    pub fn flat_map(&self, parent: DatasetId) -> Result<DatasetId> {
        self.derive(Transformation::FlatMap, &[parent])
    }

    pub fn map_values(&self, parent: DatasetId) -> Result<DatasetId> {
        self.derive(Transformation::MapValues, &[parent])
    }

    pub fn coalesce(&self, parent: DatasetId, partitions: usize) -> Result<DatasetId> {
        self.derive(
            Transformation::Coalesce {
                partitions,
                shuffle: false,
            },
            &[parent],
        )
    }

    pub fn union(&self, parents: &[DatasetId]) -> Result<DatasetId> {
        self.derive(Transformation::Union, parents)
    }

    pub fn group_by_key(
        &self,
        parent: DatasetId,
        key: &str,
        partitions: Option<usize>,
    ) -> Result<DatasetId> {
        self.derive(
            Transformation::GroupByKey {
                key: KeyFn::new(key),
                partitions,
            },
            &[parent],
        )
    }

    pub fn reduce_by_key(
        &self,
        parent: DatasetId,
        key: &str,
        partitions: Option<usize>,
        combiner: &str,
    ) -> Result<DatasetId> {
        self.derive(
            Transformation::ReduceByKey {
                key: KeyFn::new(key),
                partitions,
                combiner: AggregatorRef::new(combiner),
            },
            &[parent],
        )
    }

    pub fn join(
        &self,
        left: DatasetId,
        right: DatasetId,
        key: &str,
        partitions: Option<usize>,
    ) -> Result<DatasetId> {
        self.derive(
            Transformation::Join {
                key: KeyFn::new(key),
                partitions,
            },
            &[left, right],
        )
    }

    pub fn cogroup(
        &self,
        parents: &[DatasetId],
        key: &str,
        partitions: Option<usize>,
    ) -> Result<DatasetId> {
        self.derive(
            Transformation::Cogroup {
                key: KeyFn::new(key),
                partitions,
            },
            parents,
        )
    }

    pub fn repartition(
        &self,
        parent: DatasetId,
        partitions: usize,
        key: Option<&str>,
    ) -> Result<DatasetId> {
        self.derive(
            Transformation::Repartition {
                partitions: Some(partitions),
                key: key.map(KeyFn::new),
            },
            &[parent],
        )
    }

    pub fn sort_by_key(
        &self,
        parent: DatasetId,
        key: &str,
        bounds: Vec<String>,
    ) -> Result<DatasetId> {
        self.derive(
            Transformation::SortByKey {
                key: KeyFn::new(key),
                bounds,
            },
            &[parent],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::DependencyKind;

    fn graph() -> LineageGraph {
        LineageGraph::new(&PlannerConfig::default().with_default_partitions(Some(8)))
    }

    #[test]
    fn ids_are_sequential_and_parents_precede_children() {
        let g = graph();
        let src = g.source("lines", Partitioning::unpartitioned(4)).unwrap();
        let words = g.flat_map(src).unwrap();
        let counts = g.reduce_by_key(words, "word", None, "sum").unwrap();
        assert_eq!((src.get(), words.get(), counts.get()), (0, 1, 2));

        let snap = g.snapshot();
        for node in snap.iter() {
            assert!(node.parent_ids().all(|p| p < node.id));
        }
        let reduce = snap.dataset(counts).unwrap();
        assert_eq!(reduce.partitioning, Partitioning::hash("word", 8));
        assert_eq!(reduce.parents[0].kind, DependencyKind::Wide);
    }

    #[test]
    fn unknown_parent_is_rejected_and_nothing_is_appended() {
        let g = graph();
        g.source("s", Partitioning::unpartitioned(1)).unwrap();
        let err = g.map(DatasetId::new(9)).unwrap_err();
        assert!(matches!(err, Error::UnknownDataset(id) if id == DatasetId::new(9)));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn zero_partition_source_is_rejected() {
        let g = graph();
        assert!(g.source("empty", Partitioning::unpartitioned(0)).is_err());
        assert!(g.is_empty());
    }

    #[test]
    fn snapshots_are_stable_across_appends() {
        let g = graph();
        let src = g.source("s", Partitioning::unpartitioned(2)).unwrap();
        let before = g.snapshot();
        g.map(src).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(g.snapshot().len(), 2);
    }

    #[test]
    fn long_append_runs_keep_every_snapshot_intact() {
        let g = graph();
        let mut cur = g.source("s", Partitioning::unpartitioned(2)).unwrap();
        let mut held = Vec::new();
        for i in 0..5_000 {
            cur = g.map(cur).unwrap();
            if i % 1_000 == 0 {
                held.push(g.snapshot());
            }
        }

        assert_eq!(g.len(), 5_001);
        for (n, snap) in held.iter().enumerate() {
            let len = n * 1_000 + 2;
            assert_eq!(snap.len(), len);
            assert_eq!(snap.iter().count(), len);
            assert!(snap.dataset(DatasetId::new(len as u64)).is_none());
        }
        let last = g.get(cur).unwrap();
        assert_eq!(last.parent_ids().next(), Some(DatasetId::new(4_999)));
    }

    #[test]
    fn concurrent_appends_get_distinct_ids() {
        let g = graph();
        let src = g.source("s", Partitioning::unpartitioned(2)).unwrap();
        let mut ids: Vec<DatasetId> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| (0..25).map(|_| g.filter(src).unwrap()).collect::<Vec<_>>())
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 100);
        assert_eq!(g.len(), 101);
    }

    #[test]
    fn broadcast_source_feeds_join_without_wide_edge() {
        let g = graph();
        let facts = g.source("facts", Partitioning::unpartitioned(16)).unwrap();
        let dims = g.broadcast_source("dims", 1).unwrap();
        let joined = g.join(facts, dims, "id", None).unwrap();
        let node = g.get(joined).unwrap();
        assert_eq!(node.parents[0].kind, DependencyKind::Narrow);
        assert_eq!(node.parents[1].kind, DependencyKind::Broadcast);
        assert_eq!(node.num_partitions(), 16);
    }
}
