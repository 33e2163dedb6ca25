//! Side index of arc durations and dropped nodes.

use std::collections::{BTreeMap, HashSet};

use crate::action_log::{ActionLog, EventId};

/// Arc-duration lookup and the set of nodes dropped by the fixer.
///
/// Derived graphs (the timer graph in particular) own separate copies of
/// the DAG; this index stays attached to the input so consumers can still
/// tell which arcs were timed and which nodes the fixer removed.
#[derive(Debug, Clone, Default)]
pub struct GraphInfo {
    arc_duration: BTreeMap<(EventId, EventId), i32>,
    dropped: HashSet<EventId>,
}

impl GraphInfo {
    /// Indexes the durations of all recorded arcs.
    #[must_use]
    pub fn from_log(log: &ActionLog) -> Self {
        let mut info = Self::default();
        for arc in log.arcs() {
            info.arc_duration.insert((arc.tail, arc.head), arc.duration);
        }
        info
    }

    /// Duration of an arc; `None` for unknown or untimed arcs.
    #[must_use]
    pub fn arc_duration(&self, tail: EventId, head: EventId) -> Option<i32> {
        self.arc_duration
            .get(&(tail, head))
            .copied()
            .filter(|&d| d >= 0)
    }

    /// Marks a node as dropped by the fixer.
    pub fn drop_node(&mut self, id: EventId) {
        self.dropped.insert(id);
    }

    /// True if the fixer dropped this node.
    #[must_use]
    pub fn is_dropped(&self, id: EventId) -> bool {
        self.dropped.contains(&id)
    }

    /// Number of dropped nodes.
    #[must_use]
    pub fn num_dropped(&self) -> usize {
        self.dropped.len()
    }
}
