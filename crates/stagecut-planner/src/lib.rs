#![forbid(unsafe_code)]
//! stagecut-planner: cut a lineage graph into stages at shuffle boundaries.
//!
//! - `planner`: walks back from an action's target and builds the `StageGraph`
//! - `stage`: the output model (stages, shuffle descriptors, elided edges)
//! - `verify`: structural checks over a finished graph
//! - `explain`: text rendering for humans
//! - `dsl::yaml`: YAML pipeline documents → `LineageGraph`

pub mod dsl;
pub mod explain;
pub mod planner;
pub mod stage;
pub mod verify;

pub use dsl::yaml::{parse_yaml_pipeline, DslError, ParsedPipeline, PipelineConfig, PipelineDoc};
pub use explain::{explain_lineage, explain_stage_graph};
pub use planner::StagePlanner;
pub use stage::{ElidedShuffle, ShuffleDescriptor, Stage, StageGraph, StageInput, StageKind};
