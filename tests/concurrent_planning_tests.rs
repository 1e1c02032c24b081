//! Planning on several threads while the lineage graph keeps growing

use std::sync::Arc;

use stagecut_core::config::PlannerConfig;
use stagecut_core::partitioning::Partitioning;
use stagecut_lineage::LineageGraph;
use stagecut_planner::StagePlanner;

#[test]
fn test_parallel_plans_of_one_snapshot_agree() {
    let config = PlannerConfig::default().with_default_partitions(Some(8));
    let g = LineageGraph::new(&config);
    let src = g.source("s", Partitioning::unpartitioned(4)).unwrap();
    let words = g.flat_map(src).unwrap();
    let counts = g.reduce_by_key(words, "w", None, "sum").unwrap();
    let joined = g.join(counts, counts, "w", None).unwrap();

    let planner = Arc::new(StagePlanner::new(config).unwrap());
    let snapshot = g.snapshot();
    let expected = planner.plan(snapshot.as_ref(), joined).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let planner = Arc::clone(&planner);
                let snapshot = Arc::clone(&snapshot);
                scope.spawn(move || planner.plan(snapshot.as_ref(), joined).unwrap())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_planning_while_appending_sees_consistent_snapshots() {
    let config = PlannerConfig::default().with_default_partitions(Some(4));
    let g = LineageGraph::new(&config);
    let src = g.source("s", Partitioning::unpartitioned(2)).unwrap();
    let planner = StagePlanner::new(config).unwrap();

    std::thread::scope(|scope| {
        let writer = scope.spawn(|| {
            let mut cur = src;
            for i in 0..50 {
                cur = if i % 5 == 4 {
                    g.group_by_key(cur, "k", None).unwrap()
                } else {
                    g.map(cur).unwrap()
                };
            }
            cur
        });

        for _ in 0..50 {
            let snapshot = g.snapshot();
            let last = snapshot.iter().last().unwrap().id;
            let graph = planner.plan(snapshot.as_ref(), last).unwrap();
            assert_eq!(graph.target(), last);
        }

        let tip = writer.join().unwrap();
        let graph = planner.plan_latest(&g, tip).unwrap();
        assert_eq!(graph.len(), 11);
    });
}
