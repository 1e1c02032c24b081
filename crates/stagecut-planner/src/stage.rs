//! Stage graph: the planner's output, consumed by the execution layer.
//!
//! Stages are stored by id. Every shuffle input of a stage names a parent
//! stage with a smaller id, so the storage order is already a valid
//! execution order; `topological_order` recomputes it from the edges.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use stagecut_core::error::{Error, Result};
use stagecut_core::hash::{hash_serde, Hash256};
use stagecut_core::id::{DatasetId, ShuffleId, StageId};
use stagecut_core::manifest::PlanManifest;
use stagecut_core::partitioning::{AggregatorRef, Partitioning};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageKind {
    /// Writes shuffle output for downstream stages.
    ShuffleMap,
    /// Computes the action's target.
    Result,
}

/// Describes one data redistribution at a non-elided wide edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffleDescriptor {
    pub id: ShuffleId,
    pub source_stage: StageId,
    /// Dataset whose output is written by the source stage.
    pub source_dataset: DatasetId,
    /// Dataset that reads the shuffled data.
    pub consumer: DatasetId,
    pub target: Partitioning,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<AggregatorRef>,
    pub map_side_combine: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum StageInput {
    /// Source dataset read directly by the stage.
    External { dataset: DatasetId },
    Shuffle {
        parent: StageId,
        descriptor: ShuffleDescriptor,
    },
}

/// A logically wide edge whose shuffle was elided because the parent was
/// already laid out as required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElidedShuffle {
    pub parent: DatasetId,
    pub consumer: DatasetId,
    pub partitioning: Partitioning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub kind: StageKind,
    pub sink: DatasetId,
    /// Topological within the stage; `sink` is last.
    pub nodes: Vec<DatasetId>,
    pub inputs: Vec<StageInput>,
    pub broadcasts: Vec<DatasetId>,
    pub elided: Vec<ElidedShuffle>,
    pub output_partitioning: Partitioning,
}

impl Stage {
    pub fn num_partitions(&self) -> usize {
        self.output_partitioning.partitions
    }

    pub fn contains(&self, dataset: DatasetId) -> bool {
        self.nodes.contains(&dataset)
    }

    pub fn reads_external(&self) -> bool {
        self.inputs
            .iter()
            .any(|i| matches!(i, StageInput::External { .. }))
    }

    pub fn shuffle_inputs(&self) -> impl Iterator<Item = &ShuffleDescriptor> {
        self.inputs.iter().filter_map(|i| match i {
            StageInput::Shuffle { descriptor, .. } => Some(descriptor),
            StageInput::External { .. } => None,
        })
    }

    /// Distinct parent stages, ascending.
    pub fn parent_stages(&self) -> Vec<StageId> {
        self.inputs
            .iter()
            .filter_map(|i| match i {
                StageInput::Shuffle { parent, .. } => Some(*parent),
                StageInput::External { .. } => None,
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageGraph {
    target: DatasetId,
    stages: Vec<Stage>,
    final_stage: StageId,
}

impl StageGraph {
    pub(crate) fn new(target: DatasetId, stages: Vec<Stage>, final_stage: StageId) -> Self {
        Self {
            target,
            stages,
            final_stage,
        }
    }

    /// The action's target dataset.
    pub fn target(&self) -> DatasetId {
        self.target
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(id.index())
    }

    pub fn final_stage_id(&self) -> StageId {
        self.final_stage
    }

    pub fn final_stage(&self) -> Option<&Stage> {
        self.stage(self.final_stage)
    }

    /// `(parent, child)` pairs, deduplicated and sorted.
    pub fn edges(&self) -> Vec<(StageId, StageId)> {
        let mut edges = BTreeSet::new();
        for stage in &self.stages {
            for parent in stage.parent_stages() {
                edges.insert((parent, stage.id));
            }
        }
        edges.into_iter().collect()
    }

    pub fn parents(&self, id: StageId) -> Vec<StageId> {
        self.stage(id).map(Stage::parent_stages).unwrap_or_default()
    }

    pub fn children(&self, id: StageId) -> Vec<StageId> {
        self.stages
            .iter()
            .filter(|s| s.parent_stages().contains(&id))
            .map(|s| s.id)
            .collect()
    }

    /// Stages with no shuffle inputs.
    pub fn roots(&self) -> Vec<StageId> {
        self.stages
            .iter()
            .filter(|s| s.shuffle_inputs().next().is_none())
            .map(|s| s.id)
            .collect()
    }

    /// Distinct shuffle descriptors, by id.
    pub fn shuffles(&self) -> Vec<&ShuffleDescriptor> {
        let mut by_id = BTreeMap::new();
        for stage in &self.stages {
            for d in stage.shuffle_inputs() {
                by_id.entry(d.id).or_insert(d);
            }
        }
        by_id.into_values().collect()
    }

    /// First stage (by id) that computes `dataset`.
    pub fn stage_of(&self, dataset: DatasetId) -> Option<StageId> {
        self.stages
            .iter()
            .find(|s| s.contains(dataset))
            .map(|s| s.id)
    }

    /// Stage ids ordered so every parent precedes its children. Ties are broken
    /// by id, so the order is deterministic. Fails on a cycle or a dangling
    /// parent reference.
    pub fn topological_order(&self) -> Result<Vec<StageId>> {
        let mut in_degree: BTreeMap<StageId, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<StageId, Vec<StageId>> = BTreeMap::new();
        for stage in &self.stages {
            in_degree.entry(stage.id).or_default();
            for parent in stage.parent_stages() {
                if self.stage(parent).is_none() {
                    return Err(Error::Inconsistent(format!(
                        "{} reads from missing {parent}",
                        stage.id
                    )));
                }
                *in_degree.entry(stage.id).or_default() += 1;
                dependents.entry(parent).or_default().push(stage.id);
            }
        }

        let mut ready: BTreeSet<StageId> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.stages.len());

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for child in dependents.get(&next).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(child) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(*child);
                    }
                }
            }
        }

        if order.len() != self.stages.len() {
            return Err(Error::Inconsistent("stage graph contains a cycle".to_string()));
        }
        Ok(order)
    }

    /// Stable content hash; equal for structurally identical graphs.
    pub fn fingerprint(&self) -> Result<Hash256> {
        hash_serde(self)
    }

    pub fn manifest(&self, planned_ms: u64) -> Result<PlanManifest> {
        Ok(PlanManifest::new(
            self.target,
            self.fingerprint()?,
            self.len(),
            self.shuffles().len(),
            planned_ms,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::StagePlanner;
    use stagecut_core::config::PlannerConfig;
    use stagecut_lineage::LineageGraph;

    fn two_way_join() -> StageGraph {
        let config = PlannerConfig::default().with_default_partitions(Some(8));
        let g = LineageGraph::new(&config);
        let a = g.source("a", Partitioning::unpartitioned(4)).unwrap();
        let b = g.source("b", Partitioning::unpartitioned(6)).unwrap();
        let joined = g.join(a, b, "k", None).unwrap();
        StagePlanner::new(config).unwrap().plan_latest(&g, joined).unwrap()
    }

    #[test]
    fn queries_agree_with_edges() {
        let graph = two_way_join();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.roots(), vec![StageId::new(0), StageId::new(1)]);
        assert_eq!(graph.parents(StageId::new(2)), vec![StageId::new(0), StageId::new(1)]);
        assert_eq!(graph.children(StageId::new(0)), vec![StageId::new(2)]);
        assert_eq!(
            graph.topological_order().unwrap(),
            vec![StageId::new(0), StageId::new(1), StageId::new(2)]
        );
        assert!(graph.stage(StageId::new(0)).unwrap().reads_external());
        assert!(!graph.final_stage().unwrap().reads_external());
    }

    #[test]
    fn fingerprint_is_stable_and_round_trips_through_json() {
        let graph = two_way_join();
        assert_eq!(graph.fingerprint().unwrap(), two_way_join().fingerprint().unwrap());

        let json = serde_json::to_string(&graph).unwrap();
        let back: StageGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back, graph);

        let manifest = graph.manifest(1).unwrap();
        assert_eq!(manifest.stages, 3);
        assert_eq!(manifest.shuffles, 2);
        assert_eq!(manifest.graph_hash, graph.fingerprint().unwrap());
    }
}
