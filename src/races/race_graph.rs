//! Race-to-race reachability for the multi-cover analysis.
//!
//! The nodes of this graph are the **top races** (races with no direct
//! cover). There is an edge `j -> i` when the second event of race `j`
//! happens before the first event of race `i`: synchronizing `j` and then
//! `i` chains their orderings. A top race is *multi-covered* when such a
//! chain runs from its first endpoint to a point before its second
//! endpoint, i.e. a set of other races jointly prevents it.

use std::collections::VecDeque;

use tracing::debug;

use crate::action_log::EventId;
use crate::graph::hb::{HappensBefore, HbEngine};
use crate::races::detect::{Race, RaceId};

/// The graph over top (uncovered) races.
#[derive(Debug, Default)]
pub struct RaceGraph {
    /// Race ids of the top races, ascending.
    top_races: Vec<RaceId>,
    /// Edges as indices into `top_races`.
    edges: Vec<Vec<usize>>,
}

impl RaceGraph {
    /// Builds the top-race graph for a sorted race list.
    #[must_use]
    pub fn build(races: &[Race], engine: &HbEngine) -> Self {
        let top_races: Vec<RaceId> = races
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_uncovered())
            .map(|(id, _)| id)
            .collect();
        debug!(top = top_races.len(), "building race graph over top races");

        let mut edges = vec![Vec::new(); top_races.len()];
        for j in 0..top_races.len() {
            let rj = &races[top_races[j]];
            for i in j + 1..top_races.len() {
                let ri = &races[top_races[i]];
                if engine.ordered(rj.event2, ri.event1) {
                    edges[j].push(i);
                }
            }
        }
        Self { top_races, edges }
    }

    /// Number of top races.
    #[must_use]
    pub fn num_top_races(&self) -> usize {
        self.top_races.len()
    }

    /// Fills `multi_parent_races` for every multi-covered top race.
    pub fn mark_multi_covered(&self, races: &mut [Race], engine: &HbEngine) {
        let mut num_multi_covered = 0usize;
        for &race_id in &self.top_races {
            let (event1, event2, cmd2) = {
                let race = &races[race_id];
                (race.event1, race.event2, race.cmd2)
            };
            if let Some(path) = self.path_via_races(races, engine, event1, event2, cmd2) {
                if !path.is_empty() {
                    races[race_id].multi_parent_races = path;
                    num_multi_covered += 1;
                }
            }
        }
        debug!(num_multi_covered, "multi-cover analysis finished");
    }

    /// BFS from `n1` through happens-before and top races toward the
    /// command `cmd_in_n2` of `n2`.
    ///
    /// Returns `Some(vec![])` when `n1` already happens-before `n2`,
    /// `Some(path)` listing the traversed race ids otherwise, and `None`
    /// when unreachable.
    #[must_use]
    pub fn path_via_races(
        &self,
        races: &[Race],
        engine: &HbEngine,
        n1: EventId,
        n2: EventId,
        cmd_in_n2: usize,
    ) -> Option<Vec<RaceId>> {
        if n1 > n2 {
            return None;
        }
        if engine.ordered(n1, n2) {
            return Some(Vec::new());
        }

        // Parent pointers double as the visited set: None = unvisited,
        // Some(None) = search root, Some(Some(p)) = reached from p.
        let mut parent: Vec<Option<Option<usize>>> = vec![None; self.top_races.len()];
        let mut queue = VecDeque::new();
        for (idx, &race_id) in self.top_races.iter().enumerate() {
            if engine.ordered(n1, races[race_id].event1) {
                parent[idx] = Some(None);
                queue.push_back(idx);
            }
        }
        while let Some(curr_idx) = queue.pop_front() {
            let curr = &races[self.top_races[curr_idx]];
            if curr.event2 > n2 {
                continue;
            }
            if !curr.can_synchronize_in_this_order() {
                continue;
            }
            let arrives_before_target = (curr.event2 == n2 && curr.cmd2 < cmd_in_n2)
                || (curr.event2 < n2 && engine.ordered(curr.event2, n2));
            if arrives_before_target {
                let mut path = Vec::new();
                let mut cursor = Some(curr_idx);
                while let Some(idx) = cursor {
                    path.push(self.top_races[idx]);
                    cursor = parent[idx].expect("visited node has parent entry");
                }
                path.reverse();
                return Some(path);
            }
            for &next in &self.edges[curr_idx] {
                if parent[next].is_none() {
                    parent[next] = Some(Some(curr_idx));
                    queue.push_back(next);
                }
            }
        }
        None
    }
}
