#![forbid(unsafe_code)]
//! stagecut-core: shared vocabulary for lineage planning.
//!
//! - strongly-typed ids (`DatasetId`, `StageId`, `ShuffleId`)
//! - partitioning schemes and the compatibility analyzer that elides shuffles
//! - planner configuration, the error taxonomy, hashing and plan manifests
//!
//! No graph traversal and no I/O here; see `stagecut-lineage` and `stagecut-planner`.

pub mod compat;
pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod manifest;
pub mod partitioning;
pub mod prelude;

pub use error::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
