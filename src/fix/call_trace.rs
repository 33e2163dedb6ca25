//! Cause-event and enclosing-scope indexes.
//!
//! Both indexes are built in one linear pass over the log:
//!
//! - the **cause-event map** propagates the originating user/timer event
//!   through continuation chains (arcs with positive duration)
//! - the **parent-scope table** records, per command, the index of its
//!   enclosing enter-scope command (if any), and which command triggered
//!   each event action

use crate::action_log::{ActionLog, Command, EventId};
use crate::graph::directed::DirectedGraph;

/// Per-event cause and per-command scope nesting.
#[derive(Debug, Clone, Default)]
pub struct CallTraces {
    cause_event: Vec<EventId>,
    trigger_predecessor: Vec<Option<(EventId, usize)>>,
    parent_scope: Vec<Vec<Option<usize>>>,
}

impl CallTraces {
    /// Builds both indexes from the log and the input graph.
    #[must_use]
    pub fn build(log: &ActionLog, graph: &DirectedGraph) -> Self {
        // Cause propagation: follow arcs with a known positive duration in
        // (tail, head) order so earlier causes are resolved first.
        let mut timed: Vec<(EventId, EventId)> = log
            .arcs()
            .iter()
            .filter(|a| a.duration > 0)
            .map(|a| (a.tail, a.head))
            .collect();
        timed.sort_unstable();
        let num_nodes = graph.num_nodes().max(log.num_events());
        let mut cause_event: Vec<EventId> = (0..num_nodes).collect();
        for (tail, head) in timed {
            if tail < num_nodes && head < num_nodes {
                cause_event[head] = cause_event[tail];
            }
        }

        let num_events = log.num_events();
        let mut trigger_predecessor = vec![None; num_events];
        let mut parent_scope = vec![Vec::new(); num_events];
        let mut scope_stack: Vec<usize> = Vec::new();
        for event_id in 0..num_events {
            let event = log.event(event_id);
            scope_stack.clear();
            let parents = &mut parent_scope[event_id];
            parents.resize(event.commands.len(), None);
            for (cmd_id, cmd) in event.commands.iter().enumerate() {
                parents[cmd_id] = scope_stack.last().copied();
                match cmd {
                    Command::EnterScope(_) => scope_stack.push(cmd_id),
                    Command::ExitScope => {
                        scope_stack.pop();
                    }
                    Command::TriggerArc(target) => {
                        if *target < num_events {
                            trigger_predecessor[*target] = Some((event_id, cmd_id));
                        }
                    }
                    _ => {}
                }
            }
        }

        Self {
            cause_event,
            trigger_predecessor,
            parent_scope,
        }
    }

    /// The user/timer event this event action ultimately descends from.
    /// An event with no recorded cause is its own cause.
    #[must_use]
    pub fn event_created_by(&self, event: EventId) -> EventId {
        self.cause_event.get(event).copied().unwrap_or(event)
    }

    /// The `(event, command)` whose trigger created this event action.
    #[must_use]
    pub fn event_creation_command(&self, event: EventId) -> Option<(EventId, usize)> {
        self.trigger_predecessor.get(event).copied().flatten()
    }

    /// The enclosing enter-scope command indices for a command, outermost
    /// first. Empty for top-level commands or unknown positions.
    #[must_use]
    pub fn call_trace_of_command(&self, event: EventId, cmd: usize) -> Vec<usize> {
        let mut trace = Vec::new();
        let Some(parents) = self.parent_scope.get(event) else {
            return trace;
        };
        let mut cursor = cmd;
        while let Some(&Some(parent)) = parents.get(cursor) {
            trace.push(parent);
            cursor = parent;
        }
        trace.reverse();
        trace
    }
}
