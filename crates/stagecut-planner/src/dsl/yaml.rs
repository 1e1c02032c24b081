//! YAML pipeline documents → lineage graph.
//!
//! Example:
//! ```yaml
//! config:
//!   default_partitions: 8
//! datasets:
//!   - name: lines
//!     source: { partitions: 4 }
//!   - name: words
//!     transform: { op: flat_map }
//!     inputs: [lines]
//!   - name: counts
//!     transform: { op: reduce_by_key, key: word, combiner: sum }
//!     inputs: [words]
//! actions: [counts]
//! ```
//!
//! Inputs may only name datasets defined earlier in the document, so every
//! document describes a DAG.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stagecut_core::config::PlannerConfig;
use stagecut_core::id::DatasetId;
use stagecut_core::partitioning::{PartitionScheme, Partitioning};
use stagecut_lineage::{LineageGraph, Transformation};

#[derive(Debug, Error)]
pub enum DslError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("dataset '{dataset}' reads unknown input '{input}'")]
    UnknownInput { dataset: String, input: String },

    #[error("dataset '{0}' is defined more than once")]
    Duplicate(String),

    #[error("dataset '{dataset}': {reason}")]
    Definition { dataset: String, reason: String },

    #[error("action targets unknown dataset '{0}'")]
    UnknownAction(String),

    #[error(transparent)]
    Lineage(#[from] stagecut_core::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineDoc {
    #[serde(default)]
    pub config: Option<PipelineConfig>,
    pub datasets: Vec<DatasetDef>,
    /// Datasets to plan, by name.
    #[serde(default)]
    pub actions: Vec<String>,
}

/// Overrides applied on top of the caller's base configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub default_partitions: Option<usize>,
    pub verify: Option<bool>,
}

impl PipelineConfig {
    pub fn apply(&self, mut base: PlannerConfig) -> PlannerConfig {
        if let Some(n) = self.default_partitions {
            base.default_partitions = Some(n);
        }
        if let Some(v) = self.verify {
            base.verify = v;
        }
        base
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDef {
    pub name: String,
    #[serde(default)]
    pub source: Option<SourceDef>,
    #[serde(default)]
    pub transform: Option<Transformation>,
    #[serde(default)]
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDef {
    pub partitions: usize,
    #[serde(default)]
    pub broadcast: bool,
    /// Layout the source is already stored in; unpartitioned when absent.
    #[serde(default)]
    pub partitioning: Option<PartitionScheme>,
}

#[derive(Debug)]
pub struct ParsedPipeline {
    pub graph: LineageGraph,
    pub names: BTreeMap<String, DatasetId>,
    pub actions: Vec<DatasetId>,
    pub config: PlannerConfig,
}

impl ParsedPipeline {
    pub fn dataset(&self, name: &str) -> Option<DatasetId> {
        self.names.get(name).copied()
    }
}

impl PipelineDoc {
    pub fn from_yaml(src: &str) -> Result<Self, DslError> {
        Ok(serde_yaml::from_str(src)?)
    }

    /// The document's config overrides applied to `base`.
    pub fn resolve_config(&self, base: PlannerConfig) -> PlannerConfig {
        match &self.config {
            Some(overrides) => overrides.apply(base),
            None => base,
        }
    }

    /// Build the lineage graph with `config` as the final configuration.
    pub fn build(&self, config: &PlannerConfig) -> Result<ParsedPipeline, DslError> {
        config.validate()?;
        let graph = LineageGraph::new(config);
        let mut names: BTreeMap<String, DatasetId> = BTreeMap::new();

        for def in &self.datasets {
            if names.contains_key(&def.name) {
                return Err(DslError::Duplicate(def.name.clone()));
            }
            let id = match (&def.source, &def.transform) {
                (Some(source), None) => {
                    if !def.inputs.is_empty() {
                        return Err(definition(def, "a source cannot have inputs"));
                    }
                    add_source(&graph, def, source)?
                }
                (None, Some(transform)) => {
                    let parents = def
                        .inputs
                        .iter()
                        .map(|input| {
                            names.get(input).copied().ok_or_else(|| DslError::UnknownInput {
                                dataset: def.name.clone(),
                                input: input.clone(),
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    graph.derive(transform.clone(), &parents)?
                }
                (Some(_), Some(_)) => {
                    return Err(definition(def, "has both a source and a transform"))
                }
                (None, None) => return Err(definition(def, "needs a source or a transform")),
            };
            names.insert(def.name.clone(), id);
        }

        let actions = self
            .actions
            .iter()
            .map(|a| {
                names
                    .get(a)
                    .copied()
                    .ok_or_else(|| DslError::UnknownAction(a.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ParsedPipeline {
            graph,
            names,
            actions,
            config: config.clone(),
        })
    }
}

fn definition(def: &DatasetDef, reason: &str) -> DslError {
    DslError::Definition {
        dataset: def.name.clone(),
        reason: reason.to_string(),
    }
}

fn add_source(
    graph: &LineageGraph,
    def: &DatasetDef,
    source: &SourceDef,
) -> Result<DatasetId, DslError> {
    if source.broadcast {
        if source.partitioning.as_ref().is_some_and(PartitionScheme::is_keyed) {
            return Err(definition(def, "a broadcast source cannot be keyed"));
        }
        return Ok(graph.broadcast_source(def.name.clone(), source.partitions)?);
    }

    let scheme = source
        .partitioning
        .clone()
        .unwrap_or(PartitionScheme::Unpartitioned);
    if let Some(implied) = scheme.implied_partitions() {
        if implied != source.partitions {
            return Err(definition(
                def,
                &format!(
                    "range bounds imply {implied} partitions but {} were given",
                    source.partitions
                ),
            ));
        }
    }
    let partitioning = Partitioning {
        scheme,
        partitions: source.partitions,
    };
    Ok(graph.source(def.name.clone(), partitioning)?)
}

/// Parse a document and build it on top of `base` plus the document's own
/// config overrides.
pub fn parse_yaml_pipeline(src: &str, base: &PlannerConfig) -> Result<ParsedPipeline, DslError> {
    let doc = PipelineDoc::from_yaml(src)?;
    let config = doc.resolve_config(base.clone());
    doc.build(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORD_COUNT: &str = r#"
config:
  default_partitions: 8
datasets:
  - name: lines
    source: { partitions: 4 }
  - name: words
    transform: { op: flat_map }
    inputs: [lines]
  - name: counts
    transform: { op: reduce_by_key, key: word, combiner: sum }
    inputs: [words]
actions: [counts]
"#;

    #[test]
    fn builds_word_count() {
        let parsed = parse_yaml_pipeline(WORD_COUNT, &PlannerConfig::default()).unwrap();
        assert_eq!(parsed.config.default_partitions, Some(8));
        assert_eq!(parsed.graph.len(), 3);
        let counts = parsed.dataset("counts").unwrap();
        assert_eq!(parsed.actions, vec![counts]);
        assert_eq!(
            parsed.graph.get(counts).unwrap().partitioning,
            Partitioning::hash("word", 8)
        );
    }

    #[test]
    fn keyed_source_layout_is_read() {
        let src = r#"
datasets:
  - name: events
    source: { partitions: 8, partitioning: { kind: hash, key: user } }
"#;
        let parsed = parse_yaml_pipeline(src, &PlannerConfig::default()).unwrap();
        let id = parsed.dataset("events").unwrap();
        assert_eq!(parsed.graph.get(id).unwrap().partitioning, Partitioning::hash("user", 8));
    }

    #[test]
    fn forward_reference_is_unknown_input() {
        let src = r#"
datasets:
  - name: a
    transform: { op: filter }
    inputs: [b]
  - name: b
    source: { partitions: 1 }
"#;
        let err = parse_yaml_pipeline(src, &PlannerConfig::default()).unwrap_err();
        assert!(matches!(err, DslError::UnknownInput { ref input, .. } if input == "b"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let src = r#"
datasets:
  - name: a
    source: { partitions: 1 }
  - name: a
    source: { partitions: 2 }
"#;
        assert!(matches!(
            parse_yaml_pipeline(src, &PlannerConfig::default()),
            Err(DslError::Duplicate(name)) if name == "a"
        ));
    }

    #[test]
    fn definition_needs_exactly_one_kind() {
        let neither = "datasets:\n  - name: a\n";
        assert!(matches!(
            parse_yaml_pipeline(neither, &PlannerConfig::default()),
            Err(DslError::Definition { .. })
        ));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let src = "datasets:\n  - name: a\n    source: { partitions: 1 }\nactions: [zzz]\n";
        assert!(matches!(
            parse_yaml_pipeline(src, &PlannerConfig::default()),
            Err(DslError::UnknownAction(name)) if name == "zzz"
        ));
    }

    #[test]
    fn range_bounds_must_match_count() {
        let src = r#"
datasets:
  - name: r
    source: { partitions: 5, partitioning: { kind: range, key: ts, bounds: ["a", "m"] } }
"#;
        assert!(matches!(
            parse_yaml_pipeline(src, &PlannerConfig::default()),
            Err(DslError::Definition { .. })
        ));
    }

    #[test]
    fn arity_errors_surface_as_lineage_errors() {
        let src = r#"
datasets:
  - name: a
    source: { partitions: 2 }
  - name: j
    transform: { op: join, key: k }
    inputs: [a]
"#;
        assert!(matches!(
            parse_yaml_pipeline(src, &PlannerConfig::default()),
            Err(DslError::Lineage(stagecut_core::Error::Transform(_)))
        ));
    }
}
