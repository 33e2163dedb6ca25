//! What-if schedule planning: serialize the happens-before graph while
//! reversing a chosen set of races.
//!
//! The planner runs a topological enumeration with three edge sources:
//! the original happens-before arcs, **preserve** constraints (`n1` stays
//! before `n2`), and **reverse** constraints (`n2` must move before `n1`).
//! Infeasible constraint sets yield no schedule rather than an error.

pub mod schedule;

pub use schedule::{Schedule, ScheduleEntry, ScheduleFileError};

use tracing::{debug, warn};

use crate::action_log::EventId;
use crate::graph::directed::DirectedGraph;
use crate::races::detect::{RaceDetector, RaceId};

/// Demand that `node2` is scheduled before `node1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reverse {
    /// The event originally first; scheduled second.
    pub node1: EventId,
    /// The event originally second; scheduled first.
    pub node2: EventId,
}

/// Demand that `node1` stays scheduled before `node2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preserve {
    /// The earlier event.
    pub node1: EventId,
    /// The later event.
    pub node2: EventId,
}

/// Planner behavior switches.
#[derive(Debug, Clone, Copy)]
pub struct PlannerOptions {
    /// Emit a `<change>` marker before the first node with a reversal
    /// out-edge.
    pub include_change_marker: bool,
    /// Emit a `<relax>` marker once every reversal is satisfied.
    pub relax_after_all_reverses: bool,
    /// After satisfying a reversal, rewind the scan to the reversed
    /// target so the schedule drifts as little as possible from the
    /// original order.
    pub minimize_variation_from_original: bool,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            include_change_marker: false,
            relax_after_all_reverses: false,
            minimize_variation_from_original: true,
        }
    }
}

/// The schedule planner over a frozen happens-before graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReorderPlanner;

impl ReorderPlanner {
    /// Creates a planner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Plans a serial order honoring the graph plus the given constraints.
    ///
    /// Returns `None` when the constraints cannot be satisfied (a cycle
    /// across the three edge sources); no partial schedule is produced.
    #[must_use]
    pub fn plan(
        &self,
        graph: &DirectedGraph,
        reverses: &[Reverse],
        preserves: &[Preserve],
        options: &PlannerOptions,
    ) -> Option<Vec<ScheduleEntry>> {
        let num_nodes = graph.num_nodes();
        let mut reverse_succ: Vec<Vec<EventId>> = vec![Vec::new(); num_nodes];
        for rev in reverses {
            if rev.node1 >= num_nodes || rev.node2 >= num_nodes {
                continue;
            }
            reverse_succ[rev.node2].push(rev.node1);
        }
        let mut preserve_succ: Vec<Vec<EventId>> = vec![Vec::new(); num_nodes];
        for pres in preserves {
            if pres.node1 >= num_nodes || pres.node2 >= num_nodes {
                continue;
            }
            preserve_succ[pres.node1].push(pres.node2);
        }

        let mut in_degree = vec![0usize; num_nodes];
        let mut num_reverses = 0usize;
        for node in 0..num_nodes {
            for &succ in graph.successors(node) {
                if succ < node {
                    warn!(node, succ, "backward arc in planner input");
                }
                in_degree[succ] += 1;
            }
            for &succ in &preserve_succ[node] {
                in_degree[succ] += 1;
            }
            for &succ in &reverse_succ[node] {
                in_degree[succ] += 1;
                num_reverses += 1;
            }
        }

        let mut emitted = vec![false; num_nodes];
        let mut schedule = Vec::with_capacity(num_nodes);
        let mut num_output = 0usize;
        let mut change_marker_emitted = false;

        // Passes over the id range repeat until a fixpoint: a reversal can
        // unblock a node the scan already passed.
        loop {
            let emitted_before_pass = num_output;
            let mut cursor: isize = 0;
            while (cursor as usize) < num_nodes {
                let node = cursor as usize;
                if in_degree[node] == 0 && !emitted[node] {
                    if options.include_change_marker
                        && !change_marker_emitted
                        && !reverse_succ[node].is_empty()
                    {
                        schedule.push(ScheduleEntry::Change);
                        change_marker_emitted = true;
                    }
                    emitted[node] = true;
                    schedule.push(ScheduleEntry::Event(node));
                    num_output += 1;
                    for &succ in graph.successors(node) {
                        in_degree[succ] -= 1;
                    }
                    for &succ in &preserve_succ[node] {
                        in_degree[succ] -= 1;
                    }
                    for &succ in &reverse_succ[node] {
                        in_degree[succ] -= 1;
                        num_reverses -= 1;
                        if num_reverses == 0 && options.relax_after_all_reverses {
                            schedule.push(ScheduleEntry::Relax);
                        }
                        if options.minimize_variation_from_original && succ < node {
                            // Rewind so the reversed target is considered
                            // immediately.
                            cursor = succ as isize - 1;
                        }
                    }
                }
                cursor += 1;
            }
            if num_output == emitted_before_pass {
                break;
            }
        }

        if num_output == num_nodes {
            Some(schedule)
        } else {
            debug!(
                emitted = num_output,
                nodes = num_nodes,
                "planner constraints are infeasible"
            );
            None
        }
    }

    /// Plans a schedule that reverses the given races and preserves every
    /// other root race.
    ///
    /// A preserve is dropped when some reversal could conflict with it:
    /// any reverse whose target event equals the preserve's target and
    /// whose source does not come later. This over-approximates cycle
    /// creation without consulting happens-before.
    #[must_use]
    pub fn plan_from_races(
        &self,
        detector: &RaceDetector,
        reversed_races: &[RaceId],
        graph: &DirectedGraph,
        options: &PlannerOptions,
    ) -> Option<Vec<ScheduleEntry>> {
        let races = detector.races();
        let mut non_reversed: std::collections::BTreeSet<RaceId> = races
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_uncovered() && r.multi_parent_races.is_empty())
            .map(|(id, _)| id)
            .collect();

        let mut reverses = Vec::new();
        for &race_id in reversed_races {
            let Some(race) = races.get(race_id) else {
                continue;
            };
            reverses.push(Reverse {
                node1: race.event1,
                node2: race.event2,
            });
            non_reversed.remove(&race_id);
            if let Some(covered_by) = race.covered_by {
                non_reversed.remove(&covered_by);
            }
            for parent in &race.multi_parent_races {
                non_reversed.remove(parent);
            }
        }

        let mut preserves = Vec::new();
        for &race_id in &non_reversed {
            let race = &races[race_id];
            let pres = Preserve {
                node1: race.event1,
                node2: race.event2,
            };
            let can_enforce = !reverses
                .iter()
                .any(|rev| rev.node2 == pres.node2 && rev.node1 <= pres.node1);
            if can_enforce {
                preserves.push(pres);
            }
        }

        self.plan(graph, &reverses, &preserves, options)
    }
}
