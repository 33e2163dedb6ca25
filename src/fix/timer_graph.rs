//! Arcs inferred from timer durations.
//!
//! If a timer armed at `u` with duration `d'` fires at `h'`, and another
//! timer with duration `d >= d'` is armed at a node that can reach `u`
//! backwards and fires at `h`, then `h'` must fire before `h`. This pass
//! witnesses exactly that closure without inflating the general graph with
//! unrelated arcs.

use std::collections::HashSet;

use tracing::debug;

use crate::action_log::{EventId, TraceArc};
use crate::graph::directed::{BfsIter, DirectedGraph};

/// Derives timer-ordering arcs from the timed subset of the input arcs.
#[derive(Debug, Clone, Default)]
pub struct TimerGraph {
    timed_arcs: Vec<TraceArc>,
}

impl TimerGraph {
    /// Collects the timed arcs between live nodes, sorted by
    /// `(tail, head)`.
    #[must_use]
    pub fn new(arcs: &[TraceArc], graph: &DirectedGraph) -> Self {
        let mut timed_arcs: Vec<TraceArc> = arcs
            .iter()
            .filter(|a| a.is_timed() && !graph.is_deleted(a.tail) && !graph.is_deleted(a.head))
            .copied()
            .collect();
        timed_arcs.sort_by_key(|a| (a.tail, a.head));
        debug!(num_timed_arcs = timed_arcs.len(), "collected timed arcs");
        Self { timed_arcs }
    }

    /// Number of timed arcs under consideration.
    #[must_use]
    pub fn num_timed_arcs(&self) -> usize {
        self.timed_arcs.len()
    }

    /// Adds the inferred arcs to `graph`. Returns how many were added.
    ///
    /// Per timed arc `(t, h, d)` in order: walk backwards from `t`; at each
    /// visited node, scan its previously recorded outgoing timed arcs
    /// newest-first and connect every fire-head with duration `<= d` to
    /// `h` (unless that head was already visited or its ordering is
    /// already covered). An equal-duration arc ends the scan at that node,
    /// and a node whose minimum outgoing duration equals `d` is not
    /// expanded further backwards: anything behind it is already ordered
    /// through that timer.
    pub fn build(&self, graph: &mut DirectedGraph) -> usize {
        let num_nodes = graph.num_nodes();
        let mut min_outgoing_duration = vec![i32::MAX; num_nodes];
        let mut outgoing_arcs: Vec<Vec<usize>> = vec![Vec::new(); num_nodes];

        let mut num_added = 0usize;
        for (arc_index, arc) in self.timed_arcs.iter().enumerate() {
            if arc.tail >= num_nodes || arc.head >= num_nodes {
                continue;
            }
            let mut covered_heads: HashSet<EventId> = HashSet::new();
            let mut pending: Vec<(EventId, EventId)> = Vec::new();

            {
                let mut it = BfsIter::new(graph, usize::MAX, false);
                it.push(arc.tail);
                while let Some(node) = it.next_no_expand() {
                    if min_outgoing_duration[node] <= arc.duration {
                        for &prev_index in outgoing_arcs[node].iter().rev() {
                            let prev = self.timed_arcs[prev_index];
                            if it.is_visited(prev.head) {
                                continue;
                            }
                            if prev.duration <= arc.duration {
                                if !covered_heads.contains(&prev.head) {
                                    pending.push((prev.head, arc.head));
                                }
                                covered_heads.extend(graph.predecessors(prev.head).iter().copied());
                            }
                            if prev.duration == arc.duration {
                                break;
                            }
                        }
                    }
                    if min_outgoing_duration[node] != arc.duration {
                        it.expand(node);
                    }
                }
            }
            for (src, dst) in pending {
                if graph.add_arc_if_needed(src, dst) {
                    num_added += 1;
                }
            }

            min_outgoing_duration[arc.tail] = min_outgoing_duration[arc.tail].min(arc.duration);
            outgoing_arcs[arc.tail].push(arc_index);
        }
        debug!(num_added, "timer arcs added");
        num_added
    }
}
