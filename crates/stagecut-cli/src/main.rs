//! stagecut CLI: plan, validate and explain YAML lineage pipelines.

use clap::{Parser, Subcommand};
use stagecut_core::config::PlannerConfig;
use stagecut_core::id::DatasetId;
use stagecut_planner::{
    explain_lineage, explain_stage_graph, ParsedPipeline, PipelineDoc, StagePlanner,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stagecut")]
#[command(about = "Cut lineage pipelines into stages at shuffle boundaries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan every action (or one) of a pipeline
    Plan {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Plan only this dataset
        #[arg(long)]
        action: Option<String>,

        /// Default shuffle partition count (overrides env and pipeline config)
        #[arg(long)]
        default_partitions: Option<usize>,

        /// Print stage graphs and manifests as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a pipeline YAML file and plan its actions
    Validate {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Default shuffle partition count (overrides env and pipeline config)
        #[arg(long)]
        default_partitions: Option<usize>,
    },

    /// Show the lineage and stage graph for a pipeline (EXPLAIN)
    Explain {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Explain only this dataset
        #[arg(long)]
        action: Option<String>,

        /// Default shuffle partition count (overrides env and pipeline config)
        #[arg(long)]
        default_partitions: Option<usize>,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            pipeline,
            action,
            default_partitions,
            json,
        } => {
            if let Err(e) = plan_pipeline(&pipeline, action.as_deref(), default_partitions, json) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Validate {
            pipeline,
            default_partitions,
        } => match validate_pipeline(&pipeline, default_partitions) {
            Ok(planned) => println!("✓ Pipeline is valid ({planned} action(s) planned)"),
            Err(e) => {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
        },
        Commands::Explain {
            pipeline,
            action,
            default_partitions,
        } => {
            if let Err(e) = explain_pipeline(&pipeline, action.as_deref(), default_partitions) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Environment, then the pipeline's own config, then CLI flags.
fn resolve_config(doc: &PipelineDoc, default_partitions: Option<usize>) -> PlannerConfig {
    let mut config = doc.resolve_config(PlannerConfig::from_env());
    if let Some(n) = default_partitions {
        config.default_partitions = Some(n);
    }
    config
}

fn load(path: &Path, default_partitions: Option<usize>) -> CliResult<ParsedPipeline> {
    let yaml_content = fs::read_to_string(path)?;
    let doc = PipelineDoc::from_yaml(&yaml_content)?;
    let config = resolve_config(&doc, default_partitions);
    tracing::debug!(?config, datasets = doc.datasets.len(), "loaded pipeline");
    Ok(doc.build(&config)?)
}

/// `(name, id)` of the datasets to plan: the named one, or every action.
fn targets(parsed: &ParsedPipeline, action: Option<&str>) -> CliResult<Vec<(String, DatasetId)>> {
    match action {
        Some(name) => {
            let id = parsed
                .dataset(name)
                .ok_or_else(|| format!("unknown dataset '{name}'"))?;
            Ok(vec![(name.to_string(), id)])
        }
        None => {
            if parsed.actions.is_empty() {
                return Err("pipeline declares no actions; pass --action".into());
            }
            Ok(parsed
                .actions
                .iter()
                .map(|id| (name_of(parsed, *id), *id))
                .collect())
        }
    }
}

fn name_of(parsed: &ParsedPipeline, id: DatasetId) -> String {
    parsed
        .names
        .iter()
        .find(|(_, v)| **v == id)
        .map(|(k, _)| k.clone())
        .unwrap_or_else(|| id.to_string())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn plan_pipeline(
    pipeline_path: &Path,
    action: Option<&str>,
    default_partitions: Option<usize>,
    json: bool,
) -> CliResult<()> {
    let parsed = load(pipeline_path, default_partitions)?;
    let planner = StagePlanner::new(parsed.config.clone())?;
    let snapshot = parsed.graph.snapshot();

    let mut reports = Vec::new();
    for (name, id) in targets(&parsed, action)? {
        let graph = planner.plan(snapshot.as_ref(), id)?;
        let manifest = graph.manifest(now_ms())?;

        if json {
            reports.push(serde_json::json!({
                "action": name,
                "manifest": manifest,
                "stage_graph": graph,
            }));
        } else {
            println!("Action '{name}'");
            println!(
                "  Stages: {}  Shuffles: {}  Hash: {}",
                manifest.stages,
                manifest.shuffles,
                manifest.graph_hash.short()
            );
            for stage in graph.stages() {
                println!(
                    "  Stage {} ({:?}): {} node(s), {} input(s), output {}",
                    stage.id.get(),
                    stage.kind,
                    stage.nodes.len(),
                    stage.inputs.len(),
                    stage.output_partitioning
                );
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(())
}

fn validate_pipeline(pipeline_path: &Path, default_partitions: Option<usize>) -> CliResult<usize> {
    let parsed = load(pipeline_path, default_partitions)?;
    let planner = StagePlanner::new(parsed.config.clone())?;
    let snapshot = parsed.graph.snapshot();
    for id in &parsed.actions {
        planner.plan(snapshot.as_ref(), *id)?;
    }
    Ok(parsed.actions.len())
}

fn explain_pipeline(
    pipeline_path: &Path,
    action: Option<&str>,
    default_partitions: Option<usize>,
) -> CliResult<()> {
    let parsed = load(pipeline_path, default_partitions)?;
    let planner = StagePlanner::new(parsed.config.clone())?;
    let snapshot = parsed.graph.snapshot();

    println!("Pipeline Stage Plan");
    println!("===================");
    println!();
    match parsed.config.default_partitions {
        Some(n) => println!("Default partitions: {n}"),
        None => println!("Default partitions: none"),
    }

    for (name, id) in targets(&parsed, action)? {
        let graph = planner.plan(snapshot.as_ref(), id)?;
        println!();
        println!("Action '{name}'");
        println!();
        println!("Lineage:");
        print!("{}", explain_lineage(snapshot.as_ref(), id));
        println!();
        print!("{}", explain_stage_graph(&graph, snapshot.as_ref()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
config:
  default_partitions: 16
datasets:
  - name: lines
    source: { partitions: 4 }
  - name: counts
    transform: { op: reduce_by_key, key: word, combiner: sum }
    inputs: [lines]
actions: [counts]
"#;

    #[test]
    fn pipeline_config_overrides_env_defaults() {
        let doc = PipelineDoc::from_yaml(DOC).unwrap();
        let config = resolve_config(&doc, None);
        assert_eq!(config.default_partitions, Some(16));
    }

    #[test]
    fn cli_flag_has_highest_priority() {
        let doc = PipelineDoc::from_yaml(DOC).unwrap();
        let config = resolve_config(&doc, Some(3));
        assert_eq!(config.default_partitions, Some(3));
    }

    #[test]
    fn default_targets_are_the_declared_actions() {
        let doc = PipelineDoc::from_yaml(DOC).unwrap();
        let parsed = doc.build(&resolve_config(&doc, None)).unwrap();
        let all = targets(&parsed, None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "counts");
        assert!(targets(&parsed, Some("missing")).is_err());
        assert_eq!(targets(&parsed, Some("lines")).unwrap()[0].1, DatasetId::new(0));
    }
}
