//! Deterministic graph transformations applied after load.
//!
//! The passes run in a fixed order (see [`crate::analysis`]), with the
//! timer closure of [`crate::fix::timer_graph`] following as a fifth
//! stage; ordering is load-bearing because the per-target renames must
//! happen before the race detector indexes variable accesses.

use tracing::debug;

use crate::action_log::{ActionLog, Command, EventId, EventKind};
use crate::fix::graph_info::GraphInfo;
use crate::graph::directed::DirectedGraph;
use crate::strings::StringTable;

const CACHED_RESOURCE_PREFIX: &str = "CachedResource-";
const SCRIPT_RUNNER_PREFIX: &str = "ScriptRunner-";
const NODE_TREE_PREFIX: &str = "NodeTree:";
const AUTO_EXPLORE_SCOPE: &str = "auto:explore";

/// Applies the graph transformations to a freshly loaded trace.
pub struct GraphFixer<'a> {
    log: &'a mut ActionLog,
    vars: &'a mut StringTable,
    scopes: &'a StringTable,
    graph: &'a mut DirectedGraph,
    info: &'a mut GraphInfo,
}

fn script_or_resource_suffix(name: &str) -> Option<&str> {
    name.strip_prefix(CACHED_RESOURCE_PREFIX)
        .or_else(|| name.strip_prefix(SCRIPT_RUNNER_PREFIX))
}

fn node_tree_suffix(name: &str) -> Option<&str> {
    name.strip_prefix(NODE_TREE_PREFIX)
}

impl<'a> GraphFixer<'a> {
    /// Creates a fixer over the mutable load-time state.
    pub fn new(
        log: &'a mut ActionLog,
        vars: &'a mut StringTable,
        scopes: &'a StringTable,
        graph: &'a mut DirectedGraph,
        info: &'a mut GraphInfo,
    ) -> Self {
        Self {
            log,
            vars,
            scopes,
            graph,
            info,
        }
    }

    /// Deletes events with no successors and no commands.
    ///
    /// Such events cannot participate in any race; removing them (in
    /// descending id order, so empty chains cascade) shrinks every later
    /// pass. Purely an optimization.
    pub fn drop_no_follower_empty_events(&mut self) {
        let mut dropped = 0usize;
        for id in (0..self.graph.num_nodes()).rev() {
            if self.graph.successors(id).is_empty() && self.log.event(id).commands.is_empty() {
                self.graph.delete_node(id, false);
                self.info.drop_node(id);
                dropped += 1;
            }
        }
        debug!(dropped, "dropped empty events with no followers");
    }

    /// Fans out automatically explored user-interface events.
    ///
    /// Consecutive `auto:explore` UI events arrive chained to each other by
    /// the recorder, which would serialize exploration that is really
    /// independent. Each new auto event is re-attached to the last
    /// non-auto UI event, and the skipped auto events are merged into the
    /// next non-auto event so downstream ordering is preserved.
    pub fn make_independent_event_exploration(&mut self) {
        let mut rewired = 0usize;
        let mut last_ui: Option<EventId> = None;
        let mut last_auto: Option<EventId> = None;
        let mut last_non_auto: Option<EventId> = None;
        let mut merge_pending: Vec<EventId> = Vec::new();

        for id in 0..=self.log.max_event_id().unwrap_or(0) {
            if self.graph.is_deleted(id) {
                continue;
            }
            let event = self.log.event(id);
            if event.kind != EventKind::UserInterface {
                continue;
            }
            let is_auto = matches!(
                event.commands.first(),
                Some(Command::EnterScope(scope))
                    if self.scopes.get(*scope) == Some(AUTO_EXPLORE_SCOPE)
            );
            if is_auto {
                if let (Some(non_auto), Some(auto), Some(ui)) = (last_non_auto, last_auto, last_ui)
                {
                    if ui == auto {
                        self.graph.delete_arc(auto, id);
                        self.graph.add_arc(non_auto, id);
                        merge_pending.push(auto);
                        rewired += 1;
                    }
                }
                last_auto = Some(id);
            } else {
                for &skipped in &merge_pending {
                    self.graph.add_arc(skipped, id);
                }
                merge_pending.clear();
                last_non_auto = Some(id);
            }
            last_ui = Some(id);
        }
        debug!(rewired, "made event exploration independent");
    }

    /// Serializes accesses to the same cached resource or script runner.
    ///
    /// Variable names prefixed `CachedResource-` or `ScriptRunner-` carry a
    /// resource id in their suffix; the browser left their ordering
    /// implicit, so an arc is added from each previously observing event to
    /// the current one.
    pub fn add_scripts_and_resources_happens_before(&mut self) {
        let mut added = 0usize;
        let mut last_seen: std::collections::HashMap<String, EventId> =
            std::collections::HashMap::new();
        for id in 0..=self.log.max_event_id().unwrap_or(0) {
            if self.graph.is_deleted(id) {
                continue;
            }
            for cmd_idx in 0..self.log.event(id).commands.len() {
                let Some(var) = self.log.event(id).commands[cmd_idx].memory_location() else {
                    continue;
                };
                let Some(suffix) = self.vars.get(var).and_then(script_or_resource_suffix) else {
                    continue;
                };
                let suffix = suffix.to_owned();
                if let Some(&prev) = last_seen.get(&suffix) {
                    if self.graph.add_arc_if_needed(prev, id) {
                        added += 1;
                    }
                }
                last_seen.insert(suffix, id);
            }
        }
        debug!(added, "added script and resource arcs");
    }

    /// Orders events on a DOM node after the node's construction.
    ///
    /// Writes to `NodeTree:<suffix>` variables are renamed to embed the
    /// writing event (`NodeTree:<suffix>-<event>`), and later reads are
    /// renamed to refer to the most recent writer, with an arc from the
    /// writer to the reading event. After this pass the race detector sees
    /// per-construction variables instead of one shared name.
    pub fn add_event_after_target_happens_before(&mut self) {
        let mut added = 0usize;
        let mut last_writer: std::collections::HashMap<String, EventId> =
            std::collections::HashMap::new();
        for id in 0..=self.log.max_event_id().unwrap_or(0) {
            if self.graph.is_deleted(id) {
                continue;
            }
            for cmd_idx in 0..self.log.event(id).commands.len() {
                let cmd = self.log.event(id).commands[cmd_idx];
                match cmd {
                    Command::WriteMemory(var) => {
                        let Some((name, suffix)) = self.named_node_tree(var) else {
                            continue;
                        };
                        last_writer.insert(suffix, id);
                        let renamed = self.vars.intern(&format!("{name}-{id}"));
                        self.log.event_mut(id).commands[cmd_idx] = Command::WriteMemory(renamed);
                    }
                    Command::ReadMemory(var) => {
                        let Some((name, suffix)) = self.named_node_tree(var) else {
                            continue;
                        };
                        let Some(&writer) = last_writer.get(&suffix) else {
                            continue;
                        };
                        if self.graph.add_arc_if_needed(writer, id) {
                            added += 1;
                        }
                        let renamed = self.vars.intern(&format!("{name}-{writer}"));
                        self.log.event_mut(id).commands[cmd_idx] = Command::ReadMemory(renamed);
                    }
                    _ => {}
                }
            }
        }
        debug!(added, "added per-target ordering arcs");
    }

    fn named_node_tree(&self, var: u32) -> Option<(String, String)> {
        let name = self.vars.get(var)?;
        let suffix = node_tree_suffix(name)?;
        Some((name.to_owned(), suffix.to_owned()))
    }
}
