//! Planning very long lineage chains, far deeper than a thread's call stack
//! could walk one frame per node.

use stagecut_core::config::PlannerConfig;
use stagecut_core::id::{DatasetId, StageId};
use stagecut_core::partitioning::Partitioning;
use stagecut_lineage::LineageGraph;
use stagecut_planner::{verify, StageInput, StageKind, StagePlanner};

fn config() -> PlannerConfig {
    PlannerConfig::default().with_default_partitions(Some(8))
}

#[test]
fn test_hundred_thousand_narrow_nodes_form_one_stage() {
    let g = LineageGraph::new(&config());
    let src = g.source("events", Partitioning::unpartitioned(4)).unwrap();
    let mut cur = src;
    for _ in 0..100_000 {
        cur = g.filter(cur).unwrap();
    }
    assert_eq!(g.len(), 100_001);

    let graph = StagePlanner::new(config()).unwrap().plan_latest(&g, cur).unwrap();
    assert_eq!(graph.len(), 1);
    assert!(graph.shuffles().is_empty());

    let stage = graph.final_stage().unwrap();
    assert_eq!(stage.kind, StageKind::Result);
    assert_eq!(stage.nodes.len(), 100_001);
    assert_eq!(stage.inputs, vec![StageInput::External { dataset: src }]);
    assert!(stage.nodes.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_ten_thousand_alternating_map_and_group_nodes() {
    let g = LineageGraph::new(&config());
    let src = g.source("events", Partitioning::unpartitioned(4)).unwrap();
    let mut cur = src;
    let mut groups = Vec::new();
    for _ in 0..5_000 {
        cur = g.map(cur).unwrap();
        cur = g.group_by_key(cur, "k", None).unwrap();
        groups.push(cur);
    }
    assert_eq!(g.len(), 10_001);

    let graph = StagePlanner::new(config()).unwrap().plan_latest(&g, cur).unwrap();
    verify::check(&graph).unwrap();
    assert_eq!(graph.len(), 5_001);
    assert_eq!(graph.shuffles().len(), 5_000);

    // Stage 0 reads the source; each later stage starts at one group.
    let first = graph.stage(StageId::new(0)).unwrap();
    assert_eq!(first.nodes, vec![src, DatasetId::new(1)]);
    for (i, group) in groups.iter().enumerate() {
        let stage = graph.stage(StageId::new(i as u64 + 1)).unwrap();
        assert_eq!(stage.nodes[0], *group);
        assert_eq!(graph.parents(stage.id), vec![StageId::new(i as u64)]);
    }
    assert_eq!(graph.final_stage().unwrap().sink, cur);
    assert_eq!(graph.topological_order().unwrap().len(), 5_001);
}
