#![forbid(unsafe_code)]
//! stagecut-lineage: the dataset DAG built as transformations are composed.
//!
//! Every append classifies the new node's parent edges (narrow / wide /
//! broadcast) and fixes its partitioning; nodes are immutable afterwards.
//! The planner reads the graph through [`LineageSource`].

mod arena;
pub mod classify;
pub mod dependency;
pub mod graph;
pub mod node;
pub mod transform;

pub use classify::{classify, classify_edge, Classification, ParentInfo};
pub use dependency::{Dependency, DependencyKind, PartitionMapping};
pub use graph::{LineageGraph, LineageSnapshot, LineageSource};
pub use node::{DatasetKind, DatasetNode};
pub use transform::{Arity, Transformation};
