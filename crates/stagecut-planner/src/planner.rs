//! Stage planning.
//!
//! Walks the lineage backward from an action's target. Narrow edges pull the
//! parent into the current stage; a wide edge is re-checked against the
//! parent's layout and either elided (followed like a narrow edge) or turned
//! into a shuffle boundary that seeds the parent's own stage. Broadcast edges
//! are recorded and never planned.
//!
//! All planning state lives in one `PlanState` per call, so concurrent calls
//! over the same lineage snapshot share nothing mutable.

use std::collections::{HashMap, HashSet};

use stagecut_core::compat::{self, WideResolution};
use stagecut_core::config::PlannerConfig;
use stagecut_core::error::{Error, Result};
use stagecut_core::id::{DatasetId, ShuffleId, StageId};
use stagecut_core::partitioning::{AggregatorRef, Partitioning};
use stagecut_lineage::{
    DatasetKind, DatasetNode, DependencyKind, LineageGraph, LineageSource, Transformation,
};

use crate::stage::{ElidedShuffle, ShuffleDescriptor, Stage, StageGraph, StageInput, StageKind};
use crate::verify;

#[derive(Debug, Clone)]
pub struct StagePlanner {
    config: PlannerConfig,
}

impl StagePlanner {
    pub fn new(config: PlannerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan the stages needed to compute `target`.
    pub fn plan<L>(&self, lineage: &L, target: DatasetId) -> Result<StageGraph>
    where
        L: LineageSource + ?Sized,
    {
        let mut state = PlanState::new(lineage, &self.config);
        let final_stage = state.build_stage(target, StageKind::Result)?;
        let graph = StageGraph::new(target, state.stages, final_stage);

        if self.config.verify {
            verify::check(&graph)?;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            target_dataset = %target,
            stages = graph.len(),
            shuffles = graph.shuffles().len(),
            "planned action"
        );

        Ok(graph)
    }

    /// Plan against the graph's current snapshot.
    pub fn plan_latest(&self, graph: &LineageGraph, target: DatasetId) -> Result<StageGraph> {
        let snapshot = graph.snapshot();
        self.plan(snapshot.as_ref(), target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    InProgress,
    Done,
}

/// A wide edge that could not be elided.
#[derive(Debug)]
struct Boundary {
    consumer: DatasetId,
    parent_index: usize,
    parent: DatasetId,
    target: Partitioning,
    aggregator: Option<AggregatorRef>,
    map_side_combine: bool,
}

/// Nodes of one stage under construction.
#[derive(Debug, Default)]
struct Region {
    marks: HashMap<DatasetId, NodeState>,
    nodes: Vec<DatasetId>,
    externals: Vec<DatasetId>,
    boundaries: Vec<Boundary>,
    broadcasts: Vec<DatasetId>,
    elided: Vec<ElidedShuffle>,
}

/// A stage waiting on the stages behind its shuffle boundaries.
#[derive(Debug)]
struct PendingStage {
    sink: DatasetId,
    kind: StageKind,
    region: Region,
    inputs: Vec<StageInput>,
    /// Reversed, so `pop` yields boundaries in discovery order.
    boundaries: Vec<Boundary>,
}

/// Work item for the region walk. Edges of a node are visited in order
/// between its `Enter` and `Exit`.
enum Step<'n> {
    Enter(DatasetId),
    Edge {
        node: &'n DatasetNode,
        transform: &'n Transformation,
        index: usize,
    },
    Exit(DatasetId),
}

struct PlanState<'a, L: ?Sized> {
    lineage: &'a L,
    config: &'a PlannerConfig,
    stages: Vec<Stage>,
    stage_by_sink: HashMap<DatasetId, StageId>,
    building: HashSet<DatasetId>,
    shuffles: HashMap<(DatasetId, usize), ShuffleId>,
}

impl<'a, L> PlanState<'a, L>
where
    L: LineageSource + ?Sized,
{
    fn new(lineage: &'a L, config: &'a PlannerConfig) -> Self {
        Self {
            lineage,
            config,
            stages: Vec::new(),
            stage_by_sink: HashMap::new(),
            building: HashSet::new(),
            shuffles: HashMap::new(),
        }
    }

    fn node(&self, id: DatasetId) -> Result<&'a DatasetNode> {
        let lineage: &'a L = self.lineage;
        lineage.dataset(id).ok_or(Error::UnknownDataset(id))
    }

    /// Get or create the stage whose sink is `target`. Upstream stages are
    /// completed first, so a stage id is always larger than its parents'.
    fn build_stage(&mut self, target: DatasetId, kind: StageKind) -> Result<StageId> {
        if let Some(id) = self.stage_by_sink.get(&target) {
            return Ok(*id);
        }

        let mut stack = vec![self.open_stage(target, kind)?];
        while let Some(pending) = stack.last_mut() {
            if let Some(boundary) = pending.boundaries.pop() {
                if let Some(&parent) = self.stage_by_sink.get(&boundary.parent) {
                    let descriptor = self.describe(boundary, parent);
                    pending.inputs.push(StageInput::Shuffle { parent, descriptor });
                } else {
                    let upstream = boundary.parent;
                    pending.boundaries.push(boundary);
                    let opened = self.open_stage(upstream, StageKind::ShuffleMap)?;
                    stack.push(opened);
                }
                continue;
            }

            if let Some(done) = stack.pop() {
                let id = self.close_stage(done)?;
                if stack.is_empty() {
                    return Ok(id);
                }
            }
        }
        Err(Error::Invariant(format!("no stage closed for {target}")))
    }

    fn open_stage(&mut self, sink: DatasetId, kind: StageKind) -> Result<PendingStage> {
        // Seeding a stage that is still being built means the lineage loops
        // back through a shuffle.
        if !self.building.insert(sink) {
            return Err(Error::Cycle(sink));
        }

        let mut region = Region::default();
        self.collect(sink, &mut region)?;

        let inputs = region
            .externals
            .iter()
            .map(|dataset| StageInput::External { dataset: *dataset })
            .collect();
        let mut boundaries = std::mem::take(&mut region.boundaries);
        boundaries.reverse();
        Ok(PendingStage {
            sink,
            kind,
            region,
            inputs,
            boundaries,
        })
    }

    fn close_stage(&mut self, pending: PendingStage) -> Result<StageId> {
        let PendingStage {
            sink,
            kind,
            region,
            inputs,
            ..
        } = pending;
        let id = StageId::new(self.stages.len() as u64);
        let output_partitioning = self.node(sink)?.partitioning.clone();

        #[cfg(feature = "tracing")]
        tracing::trace!(
            stage = %id,
            sink = %sink,
            nodes = region.nodes.len(),
            inputs = inputs.len(),
            "stage complete"
        );

        self.stages.push(Stage {
            id,
            kind,
            sink,
            nodes: region.nodes,
            inputs,
            broadcasts: region.broadcasts,
            elided: region.elided,
            output_partitioning,
        });
        self.building.remove(&sink);
        self.stage_by_sink.insert(sink, id);
        Ok(id)
    }

    /// Depth-first over narrow and elided edges; pushes nodes in post-order so
    /// the region is topologically sorted.
    fn collect(&self, sink: DatasetId, region: &mut Region) -> Result<()> {
        let mut resolutions: HashMap<DatasetId, WideResolution> = HashMap::new();
        let mut stack = vec![Step::Enter(sink)];

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(id) => {
                    match region.marks.get(&id) {
                        Some(NodeState::InProgress) => return Err(Error::Cycle(id)),
                        Some(NodeState::Done) => continue,
                        None => {}
                    }
                    region.marks.insert(id, NodeState::InProgress);
                    let node = self.node(id)?;

                    match &node.kind {
                        DatasetKind::Source { .. } | DatasetKind::BroadcastSource { .. } => {
                            if !node.parents.is_empty() {
                                return Err(Error::MalformedLineage(format!(
                                    "{} is a source with parents",
                                    node.label()
                                )));
                            }
                            region.externals.push(id);
                            region.marks.insert(id, NodeState::Done);
                            region.nodes.push(id);
                        }
                        DatasetKind::Derived { transform } => {
                            if node.parents.is_empty() {
                                return Err(Error::MalformedLineage(format!(
                                    "{} has no parents",
                                    node.label()
                                )));
                            }
                            if let Some(resolution) = self.resolve_wide(node, transform)? {
                                resolutions.insert(id, resolution);
                            }
                            stack.push(Step::Exit(id));
                            stack.extend(
                                (0..node.parents.len())
                                    .rev()
                                    .map(|index| Step::Edge { node, transform, index }),
                            );
                        }
                    }
                }
                Step::Edge {
                    node,
                    transform,
                    index,
                } => {
                    let dep = &node.parents[index];
                    match dep.kind {
                        DependencyKind::Narrow => stack.push(Step::Enter(dep.parent)),
                        DependencyKind::Broadcast => {
                            self.node(dep.parent)?;
                            if !region.broadcasts.contains(&dep.parent) {
                                region.broadcasts.push(dep.parent);
                            }
                        }
                        DependencyKind::Wide => {
                            let res = resolutions.get(&node.id).ok_or_else(|| {
                                Error::Invariant(format!("{} wide edge unresolved", node.label()))
                            })?;
                            if res.shuffle[index] {
                                region.boundaries.push(Boundary {
                                    consumer: node.id,
                                    parent_index: index,
                                    parent: dep.parent,
                                    target: res.target.clone(),
                                    aggregator: transform.aggregator().cloned(),
                                    map_side_combine: transform.map_side_combine(),
                                });
                            } else {
                                region.elided.push(ElidedShuffle {
                                    parent: dep.parent,
                                    consumer: node.id,
                                    partitioning: res.target.clone(),
                                });
                                stack.push(Step::Enter(dep.parent));
                            }
                        }
                    }
                }
                Step::Exit(id) => {
                    region.marks.insert(id, NodeState::Done);
                    region.nodes.push(id);
                }
            }
        }
        Ok(())
    }

    /// Re-run the compatibility analysis for a node's wide edges with this
    /// planner's defaults. A result that disagrees with what the node recorded
    /// at composition time is a configuration inconsistency.
    fn resolve_wide(
        &self,
        node: &DatasetNode,
        transform: &Transformation,
    ) -> Result<Option<WideResolution>> {
        if !node.parents.iter().any(|d| d.is_wide()) {
            return Ok(None);
        }
        let requirement = transform.requirement().ok_or_else(|| {
            Error::Invariant(format!("{} has wide edges but no requirement", node.label()))
        })?;
        let layouts = node
            .parents
            .iter()
            .map(|d| self.node(d.parent).map(|p| &p.partitioning))
            .collect::<Result<Vec<_>>>()?;
        let resolution = compat::resolve(&layouts, &requirement, self.config.default_partitions)?;

        if node.required.as_ref() != Some(&resolution.target) {
            let recorded = node
                .required
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "none".to_string());
            return Err(Error::Inconsistent(format!(
                "{} recorded {recorded} but resolves to {}",
                node.label(),
                resolution.target
            )));
        }
        Ok(Some(resolution))
    }

    fn describe(&mut self, boundary: Boundary, source_stage: StageId) -> ShuffleDescriptor {
        let next = ShuffleId::new(self.shuffles.len() as u64);
        let id = *self
            .shuffles
            .entry((boundary.consumer, boundary.parent_index))
            .or_insert(next);
        ShuffleDescriptor {
            id,
            source_stage,
            source_dataset: boundary.parent,
            consumer: boundary.consumer,
            target: boundary.target,
            aggregator: boundary.aggregator,
            map_side_combine: boundary.map_side_combine,
        }
    }
}
