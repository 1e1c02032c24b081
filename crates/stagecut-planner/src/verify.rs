//! Structural checks over a finished stage graph.
//!
//! The planner runs these when `PlannerConfig::verify` is set. They are also
//! public so that graphs loaded from elsewhere (e.g. deserialized manifests)
//! can be validated before execution.

use std::collections::HashSet;

use stagecut_core::error::{Error, Result};

use crate::stage::{StageGraph, StageInput, StageKind};

/// Run every check.
pub fn check(graph: &StageGraph) -> Result<()> {
    check_acyclic(graph)?;
    check_topological(graph)?;
    check_descriptors(graph)?;
    check_stages(graph)?;
    Ok(())
}

pub fn check_acyclic(graph: &StageGraph) -> Result<()> {
    graph.topological_order().map(|_| ())
}

/// Stage ids match storage positions and every parent id is smaller than its
/// child's.
pub fn check_topological(graph: &StageGraph) -> Result<()> {
    for (pos, stage) in graph.stages().iter().enumerate() {
        if stage.id.index() != pos {
            return Err(Error::Inconsistent(format!("{} stored at position {pos}", stage.id)));
        }
        for parent in stage.parent_stages() {
            if parent >= stage.id {
                return Err(Error::Inconsistent(format!("{} reads from later {parent}", stage.id)));
            }
        }
    }
    Ok(())
}

/// Every shuffle input names the stage that writes it, the stage's sink as
/// its source dataset, and a consumer inside the reading stage.
pub fn check_descriptors(graph: &StageGraph) -> Result<()> {
    for stage in graph.stages() {
        for input in &stage.inputs {
            let StageInput::Shuffle { parent, descriptor } = input else {
                continue;
            };
            if descriptor.source_stage != *parent {
                return Err(Error::Inconsistent(format!(
                    "{} in {} names {} but is read from {parent}",
                    descriptor.id, stage.id, descriptor.source_stage
                )));
            }
            let source = graph.stage(*parent).ok_or_else(|| {
                Error::Inconsistent(format!("{} reads from missing {parent}", stage.id))
            })?;
            if source.kind != StageKind::ShuffleMap {
                return Err(Error::Inconsistent(format!(
                    "{} is read by {} but is not a shuffle-map stage",
                    source.id, stage.id
                )));
            }
            if source.sink != descriptor.source_dataset {
                return Err(Error::Inconsistent(format!(
                    "{} source {} is not the sink of {}",
                    descriptor.id, descriptor.source_dataset, source.id
                )));
            }
            if !stage.contains(descriptor.consumer) {
                return Err(Error::Inconsistent(format!(
                    "{} consumer {} is outside {}",
                    descriptor.id, descriptor.consumer, stage.id
                )));
            }
            if descriptor.target.partitions == 0 {
                return Err(Error::Inconsistent(format!(
                    "{} targets zero partitions",
                    descriptor.id
                )));
            }
        }
    }
    Ok(())
}

/// Exactly one result stage computing the target; every stage ends at its
/// sink and lists each node once.
pub fn check_stages(graph: &StageGraph) -> Result<()> {
    let final_stage = graph.final_stage().ok_or_else(|| {
        Error::Inconsistent(format!("final {} is missing", graph.final_stage_id()))
    })?;
    if final_stage.kind != StageKind::Result || final_stage.sink != graph.target() {
        return Err(Error::Inconsistent(format!(
            "{} does not compute target {}",
            final_stage.id,
            graph.target()
        )));
    }

    for stage in graph.stages() {
        if stage.kind == StageKind::Result && stage.id != final_stage.id {
            return Err(Error::Inconsistent(format!("extra result stage {}", stage.id)));
        }
        if stage.nodes.last() != Some(&stage.sink) {
            return Err(Error::Inconsistent(format!(
                "{} does not end at its sink {}",
                stage.id, stage.sink
            )));
        }
        let mut seen = HashSet::with_capacity(stage.nodes.len());
        if let Some(dup) = stage.nodes.iter().find(|n| !seen.insert(**n)) {
            return Err(Error::Inconsistent(format!("{} lists {dup} twice", stage.id)));
        }
    }
    Ok(())
}
