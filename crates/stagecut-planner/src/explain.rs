//! EXPLAIN text for stage graphs and the lineage behind them.

use std::collections::HashSet;

use stagecut_core::id::DatasetId;
use stagecut_lineage::{DependencyKind, LineageSource};

use crate::stage::{Stage, StageGraph, StageInput, StageKind};

/// Render a stage graph as human-readable multiline text, parents first.
pub fn explain_stage_graph<L>(graph: &StageGraph, lineage: &L) -> String
where
    L: LineageSource + ?Sized,
{
    let mut out = String::new();
    out.push_str(&format!(
        "StageGraph target={} stages={} shuffles={}\n",
        label(lineage, graph.target()),
        graph.len(),
        graph.shuffles().len()
    ));

    let order = graph
        .topological_order()
        .unwrap_or_else(|_| graph.stages().iter().map(|s| s.id).collect());
    for id in order {
        if let Some(stage) = graph.stage(id) {
            fmt_stage(stage, lineage, &mut out);
        }
    }
    out
}

/// Render the lineage reachable from `target`, one node per line with its
/// parent edges.
pub fn explain_lineage<L>(lineage: &L, target: DatasetId) -> String
where
    L: LineageSource + ?Sized,
{
    let mut out = String::new();
    fmt_lineage(lineage, target, &mut out);
    out
}

fn fmt_stage<L: LineageSource + ?Sized>(stage: &Stage, lineage: &L, out: &mut String) {
    let kind = match stage.kind {
        StageKind::ShuffleMap => "shuffle_map",
        StageKind::Result => "result",
    };
    out.push_str(&format!(
        "Stage {} [{kind}] sink={} partitions={} output={}\n",
        stage.id.get(),
        label(lineage, stage.sink),
        stage.num_partitions(),
        stage.output_partitioning
    ));

    let nodes: Vec<String> = stage.nodes.iter().map(|n| label(lineage, *n)).collect();
    out.push_str(&format!("  nodes: {}\n", nodes.join(" -> ")));

    for input in &stage.inputs {
        match input {
            StageInput::External { dataset } => {
                out.push_str(&format!("  read {}\n", label(lineage, *dataset)));
            }
            StageInput::Shuffle { parent, descriptor } => {
                let combine = descriptor
                    .aggregator
                    .as_ref()
                    .map(|a| format!(" combine={a}"))
                    .unwrap_or_default();
                out.push_str(&format!(
                    "  shuffle {} <- stage {}: {} into {} as {}{combine} map_side_combine={}\n",
                    descriptor.id.get(),
                    parent.get(),
                    label(lineage, descriptor.source_dataset),
                    label(lineage, descriptor.consumer),
                    descriptor.target,
                    descriptor.map_side_combine
                ));
            }
        }
    }
    for e in &stage.elided {
        out.push_str(&format!(
            "  elided {} -> {} already {}\n",
            label(lineage, e.parent),
            label(lineage, e.consumer),
            e.partitioning
        ));
    }
    for b in &stage.broadcasts {
        out.push_str(&format!("  broadcast {}\n", label(lineage, *b)));
    }
}

/// One output line of the lineage tree.
enum Line {
    Node { id: DatasetId, indent: usize },
    Edge { kind: &'static str, indent: usize },
}

fn fmt_lineage<L: LineageSource + ?Sized>(lineage: &L, target: DatasetId, out: &mut String) {
    let mut seen = HashSet::new();
    let mut stack = vec![Line::Node {
        id: target,
        indent: 0,
    }];

    while let Some(line) = stack.pop() {
        let (id, indent) = match line {
            Line::Edge { kind, indent } => {
                out.push_str(&format!("{}<{kind}>\n", "  ".repeat(indent)));
                continue;
            }
            Line::Node { id, indent } => (id, indent),
        };

        let pad = "  ".repeat(indent);
        let Some(node) = lineage.dataset(id) else {
            out.push_str(&format!("{pad}<missing {id}>\n"));
            continue;
        };
        if !seen.insert(id) {
            out.push_str(&format!("{pad}{} (see above)\n", node.label()));
            continue;
        }

        out.push_str(&format!("{pad}{} {}\n", node.label(), node.partitioning));
        for dep in node.parents.iter().rev() {
            let kind = match dep.kind {
                DependencyKind::Narrow => "narrow",
                DependencyKind::Wide => "wide",
                DependencyKind::Broadcast => "broadcast",
            };
            stack.push(Line::Node {
                id: dep.parent,
                indent: indent + 2,
            });
            stack.push(Line::Edge {
                kind,
                indent: indent + 1,
            });
        }
    }
}

fn label<L: LineageSource + ?Sized>(lineage: &L, id: DatasetId) -> String {
    lineage
        .dataset(id)
        .map(|n| n.label())
        .unwrap_or_else(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::StagePlanner;
    use stagecut_core::config::PlannerConfig;
    use stagecut_core::partitioning::Partitioning;
    use stagecut_lineage::LineageGraph;

    #[test]
    fn word_count_explain_names_both_stages() {
        let config = PlannerConfig::default().with_default_partitions(Some(8));
        let g = LineageGraph::new(&config);
        let src = g.source("lines", Partitioning::unpartitioned(4)).unwrap();
        let words = g.flat_map(src).unwrap();
        let counts = g.reduce_by_key(words, "word", None, "sum").unwrap();

        let plan = StagePlanner::new(config).unwrap().plan_latest(&g, counts).unwrap();
        let text = explain_stage_graph(&plan, g.snapshot().as_ref());

        assert!(text.starts_with("StageGraph target=reduce_by_key#2 stages=2 shuffles=1\n"));
        assert!(text.contains("Stage 0 [shuffle_map] sink=flat_map#1 partitions=4"));
        assert!(text.contains("nodes: source:lines#0 -> flat_map#1"));
        assert!(text.contains("Stage 1 [result] sink=reduce_by_key#2 partitions=8"));
        assert!(text.contains("combine=sum map_side_combine=true"));
    }

    #[test]
    fn lineage_explain_marks_edge_kinds() {
        let g = LineageGraph::new(&PlannerConfig::default().with_default_partitions(Some(8)));
        let facts = g.source("facts", Partitioning::unpartitioned(4)).unwrap();
        let dims = g.broadcast_source("dims", 1).unwrap();
        let joined = g.join(facts, dims, "id", None).unwrap();

        let text = explain_lineage(g.snapshot().as_ref(), joined);
        assert!(text.starts_with("join#2"));
        assert!(text.contains("<narrow>"));
        assert!(text.contains("<broadcast>"));
        assert!(text.contains("broadcast:dims#1"));
    }

    #[test]
    fn shared_parent_is_printed_once() {
        let g = LineageGraph::new(&PlannerConfig::default().with_default_partitions(Some(8)));
        let src = g.source("s", Partitioning::unpartitioned(2)).unwrap();
        let both = g.union(&[src, src]).unwrap();

        let text = explain_lineage(g.snapshot().as_ref(), both);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("union#1"));
        assert_eq!(lines[1], "  <narrow>");
        assert!(lines[2].starts_with("    source:s#0"));
        assert_eq!(lines[4], "    source:s#0 (see above)");
    }

    #[test]
    fn deep_lineage_renders_every_level() {
        let g = LineageGraph::new(&PlannerConfig::default().with_default_partitions(Some(8)));
        let mut cur = g.source("s", Partitioning::unpartitioned(2)).unwrap();
        for _ in 0..3_000 {
            cur = g.filter(cur).unwrap();
        }

        let text = explain_lineage(g.snapshot().as_ref(), cur);
        assert_eq!(text.lines().count(), 2 * 3_000 + 1);
        let last = text.lines().last().unwrap();
        assert!(last.trim_start().starts_with("source:s#0"));
        assert_eq!(last.len() - last.trim_start().len(), 4 * 3_000);
    }
}
