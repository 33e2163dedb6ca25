//! Planner round-trip invariants: every produced schedule respects the
//! graph arcs, every preserve, and every reversal.

use eventrace::graph::DirectedGraph;
use eventrace::reorder::{
    PlannerOptions, Preserve, ReorderPlanner, Reverse, Schedule, ScheduleEntry,
};

fn graph_from(n: usize, arcs: &[(usize, usize)]) -> DirectedGraph {
    let mut g = DirectedGraph::new();
    g.add_nodes_up_to(n - 1);
    for &(a, b) in arcs {
        g.add_arc(a, b);
    }
    g
}

fn position(schedule: &[ScheduleEntry], event: usize) -> usize {
    schedule
        .iter()
        .position(|e| *e == ScheduleEntry::Event(event))
        .unwrap_or_else(|| panic!("event {event} missing from schedule"))
}

fn assert_valid(
    schedule: &[ScheduleEntry],
    graph: &DirectedGraph,
    reverses: &[Reverse],
    preserves: &[Preserve],
) {
    for node in 0..graph.num_nodes() {
        for &succ in graph.successors(node) {
            assert!(
                position(schedule, node) < position(schedule, succ),
                "arc {node} -> {succ}"
            );
        }
    }
    for pres in preserves {
        assert!(
            position(schedule, pres.node1) < position(schedule, pres.node2),
            "preserve {pres:?}"
        );
    }
    for rev in reverses {
        assert!(
            position(schedule, rev.node2) < position(schedule, rev.node1),
            "reverse {rev:?}"
        );
    }
}

#[test]
fn feasible_constraint_sets_round_trip() {
    struct Case {
        name: &'static str,
        n: usize,
        arcs: &'static [(usize, usize)],
        reverses: &'static [Reverse],
        preserves: &'static [Preserve],
    }
    let cases = [
        Case {
            name: "no constraints",
            n: 5,
            arcs: &[(0, 1), (1, 2), (2, 3), (3, 4)],
            reverses: &[],
            preserves: &[],
        },
        Case {
            name: "single reversal on branch",
            n: 6,
            arcs: &[(0, 1), (1, 2), (2, 4), (4, 5), (2, 3)],
            reverses: &[Reverse { node1: 3, node2: 5 }],
            preserves: &[],
        },
        Case {
            name: "preserve across components",
            n: 4,
            arcs: &[(0, 1)],
            reverses: &[],
            preserves: &[Preserve { node1: 3, node2: 0 }],
        },
        Case {
            name: "reversal plus preserve",
            n: 5,
            arcs: &[(0, 1), (0, 2)],
            reverses: &[Reverse { node1: 1, node2: 2 }],
            preserves: &[Preserve { node1: 3, node2: 4 }],
        },
    ];
    for case in &cases {
        let g = graph_from(case.n, case.arcs);
        for minimize in [false, true] {
            let options = PlannerOptions {
                include_change_marker: true,
                relax_after_all_reverses: true,
                minimize_variation_from_original: minimize,
            };
            let schedule = ReorderPlanner::new()
                .plan(&g, case.reverses, case.preserves, &options)
                .unwrap_or_else(|| panic!("{}: expected feasible", case.name));
            assert_valid(&schedule, &g, case.reverses, case.preserves);
        }
    }
}

#[test]
fn minimize_variation_stays_close_to_original() {
    // With minimization, everything before the reversal stays in original
    // order and the reversed target's successors resume immediately.
    let g = graph_from(6, &[(0, 1), (1, 2), (2, 4), (4, 5), (2, 3)]);
    let reverses = [Reverse { node1: 3, node2: 5 }];
    let schedule = ReorderPlanner::new()
        .plan(&g, &reverses, &[], &PlannerOptions::default())
        .unwrap();
    let events: Vec<usize> = schedule
        .iter()
        .filter_map(|e| match e {
            ScheduleEntry::Event(id) => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(events, vec![0, 1, 2, 4, 5, 3]);
}

#[test]
fn contradictory_preserves_are_infeasible() {
    let g = graph_from(2, &[]);
    let preserves = [
        Preserve { node1: 0, node2: 1 },
        Preserve { node1: 1, node2: 0 },
    ];
    assert!(ReorderPlanner::new()
        .plan(&g, &[], &preserves, &PlannerOptions::default())
        .is_none());
}

#[test]
fn schedule_files_round_trip_through_planner_output() {
    let g = graph_from(4, &[(0, 1), (2, 3)]);
    let reverses = [Reverse { node1: 1, node2: 2 }];
    let options = PlannerOptions {
        include_change_marker: true,
        relax_after_all_reverses: true,
        minimize_variation_from_original: true,
    };
    let entries = ReorderPlanner::new()
        .plan(&g, &reverses, &[], &options)
        .unwrap();

    let mut schedule = Schedule::new();
    for id in 0..4 {
        schedule.set_payload(id, format!("params-{id}"));
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schedule.txt");
    schedule.save_path(&path, &entries).unwrap();

    let reloaded = Schedule::load_path(&path).unwrap();
    for id in 0..4 {
        assert_eq!(reloaded.payload(id), format!("params-{id}"));
    }
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("<change>"));
    assert!(text.contains("<relax>"));
}
