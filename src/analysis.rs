//! The end-to-end analysis pipeline and the per-trace analysis cache.
//!
//! [`RaceAnalysis::load`] drives the fixed stage order:
//! read string tables and the action log, build the input graph, index
//! call traces, run the graph fixer, index variable accesses, derive the
//! timer graph on a copy, run race detection with the configured engine,
//! and finally the cover analyses. [`RaceTags`] classification is derived
//! on demand.
//!
//! # Trace file layout
//!
//! The binary trace file is read in this fixed sequence: variable
//! [`StringTable`], scope [`StringTable`], [`ActionLog`]; then two
//! optional trailing tables (JavaScript sources, memory values) whose
//! presence is determined by EOF. All integers are little-endian; the
//! format is not portable across endianness.

use std::io::{BufReader, Read};
use std::path::Path;

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::action_log::{ActionLog, EventId};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::fix::{CallTraces, GraphFixer, GraphInfo, TimerGraph};
use crate::graph::directed::DirectedGraph;
use crate::io_util::at_eof;
use crate::races::detect::{Race, RaceDetector, RaceId};
use crate::races::tags::{RaceTagSet, RaceTags, VarSummary};
use crate::reorder::{PlannerOptions, ReorderPlanner, ScheduleEntry};
use crate::strings::{StringTable, VarId};

/// A fully built analysis of one trace.
#[derive(Debug)]
pub struct RaceAnalysis {
    vars: StringTable,
    scopes: StringTable,
    js_sources: StringTable,
    values: StringTable,
    log: ActionLog,
    input_graph: DirectedGraph,
    timer_graph: DirectedGraph,
    graph_info: GraphInfo,
    call_traces: CallTraces,
    detector: RaceDetector,
}

impl RaceAnalysis {
    /// Loads a trace and runs the full pipeline.
    ///
    /// Trace-format errors fail the load; no partial analysis escapes.
    pub fn load(reader: impl Read, config: &AnalysisConfig) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let mut vars = StringTable::load(&mut reader)?;
        let scopes = StringTable::load(&mut reader)?;
        let mut log = ActionLog::load(&mut reader)?;
        let js_sources = if at_eof(&mut reader)? {
            StringTable::new()
        } else {
            StringTable::load(&mut reader)?
        };
        let values = if at_eof(&mut reader)? {
            StringTable::new()
        } else {
            StringTable::load(&mut reader)?
        };
        info!(
            num_events = log.num_events(),
            num_arcs = log.arcs().len(),
            "trace loaded"
        );

        // Arcs are forward in event-id order; anything else is recorder
        // corruption that detection must not see.
        let mut input_graph = DirectedGraph::new();
        if let Some(max) = log.max_event_id() {
            input_graph.add_nodes_up_to(max);
        }
        for arc in log.arcs() {
            if arc.tail > arc.head {
                tracing::warn!(tail = arc.tail, head = arc.head, "skipping backward arc");
                continue;
            }
            input_graph.add_arc(arc.tail, arc.head);
        }

        let call_traces = CallTraces::build(&log, &input_graph);
        let mut graph_info = GraphInfo::from_log(&log);

        {
            let mut fixer = GraphFixer::new(
                &mut log,
                &mut vars,
                &scopes,
                &mut input_graph,
                &mut graph_info,
            );
            fixer.drop_no_follower_empty_events();
            fixer.make_independent_event_exploration();
            fixer.add_scripts_and_resources_happens_before();
            fixer.add_event_after_target_happens_before();
        }

        let mut detector = RaceDetector::new();
        detector.index(&log);
        debug!(num_vars = detector.variables().len(), "variables indexed");

        // The timer closure runs on a copy so the input graph stays
        // available for diffing derived arcs against recorded ones.
        let mut timer_graph = input_graph.clone();
        let timers = TimerGraph::new(log.arcs(), &timer_graph);
        timers.build(&mut timer_graph);

        detector.find_races(&timer_graph, config);
        info!(
            num_races = detector.races().len(),
            timed_out = detector.timed_out(),
            "analysis complete"
        );

        Ok(Self {
            vars,
            scopes,
            js_sources,
            values,
            log,
            input_graph,
            timer_graph,
            graph_info,
            call_traces,
            detector,
        })
    }

    /// Loads a trace file and runs the full pipeline.
    pub fn load_path(path: impl AsRef<Path>, config: &AnalysisConfig) -> Result<Self> {
        Self::load(std::fs::File::open(path)?, config)
    }

    /// The interned variable names.
    #[must_use]
    pub fn var_names(&self) -> &StringTable {
        &self.vars
    }

    /// The interned scope names.
    #[must_use]
    pub fn scope_names(&self) -> &StringTable {
        &self.scopes
    }

    /// The interned JavaScript sources, when present in the trace.
    #[must_use]
    pub fn js_sources(&self) -> &StringTable {
        &self.js_sources
    }

    /// The interned memory values, when present in the trace.
    #[must_use]
    pub fn value_names(&self) -> &StringTable {
        &self.values
    }

    /// The loaded (and fixer-rewritten) action log.
    #[must_use]
    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// The input graph after fixing, before timer closure.
    #[must_use]
    pub fn input_graph(&self) -> &DirectedGraph {
        &self.input_graph
    }

    /// The graph detection ran on (input graph plus timer arcs).
    #[must_use]
    pub fn timer_graph(&self) -> &DirectedGraph {
        &self.timer_graph
    }

    /// Arc durations and dropped-node bookkeeping.
    #[must_use]
    pub fn graph_info(&self) -> &GraphInfo {
        &self.graph_info
    }

    /// Cause-event and scope-nesting indexes.
    #[must_use]
    pub fn call_traces(&self) -> &CallTraces {
        &self.call_traces
    }

    /// The finished detector.
    #[must_use]
    pub fn detector(&self) -> &RaceDetector {
        &self.detector
    }

    /// Ids of variables with at least one race.
    #[must_use]
    pub fn racing_variables(&self) -> Vec<VarId> {
        self.detector
            .variables()
            .iter()
            .filter(|(_, data)| !data.all_races.is_empty())
            .map(|(&var, _)| var)
            .collect()
    }

    /// All detected races.
    #[must_use]
    pub fn races(&self) -> &[Race] {
        self.detector.races()
    }

    /// One race by id.
    #[must_use]
    pub fn race(&self, id: RaceId) -> Option<&Race> {
        self.detector.race(id)
    }

    /// The classification engine over this analysis.
    #[must_use]
    pub fn tags(&self) -> RaceTags<'_> {
        RaceTags::new(
            &self.detector,
            &self.log,
            &self.vars,
            &self.scopes,
            &self.values,
            &self.call_traces,
        )
    }

    /// Tag set for one variable.
    #[must_use]
    pub fn variable_tags(&self, var: VarId) -> RaceTagSet {
        self.tags().variable_tags(var)
    }

    /// Tags plus initialization-race verdict for one variable.
    #[must_use]
    pub fn var_summary(&self, var: VarId) -> VarSummary {
        self.tags().var_summary(var)
    }

    /// Whether a read of the variable can observe uninitialized state.
    #[must_use]
    pub fn has_undefined_initialization_race(&self, var: VarId) -> bool {
        self.tags().has_undefined_initialization_race(var)
    }

    /// Whether the variable has an uncovered network-response race.
    #[must_use]
    pub fn has_network_response_race(&self, var: VarId, ww_only: bool) -> bool {
        self.tags().has_network_response_race(var, ww_only)
    }

    /// Path search through happens-before and top races.
    #[must_use]
    pub fn has_path_via_races(
        &self,
        n1: EventId,
        n2: EventId,
        cmd_in_n2: usize,
    ) -> Option<Vec<RaceId>> {
        self.detector.has_path_via_races(n1, n2, cmd_in_n2)
    }

    /// Plans a schedule reversing the given races on the detection graph.
    #[must_use]
    pub fn plan_schedule(
        &self,
        reversed_races: &[RaceId],
        options: &PlannerOptions,
    ) -> Option<Vec<ScheduleEntry>> {
        ReorderPlanner::new().plan_from_races(
            &self.detector,
            reversed_races,
            &self.timer_graph,
            options,
        )
    }
}

/// A bounded cache of built analyses keyed by trace id.
///
/// Construction is serialized: only one analysis build runs at a time per
/// process, and concurrent readers of already-built entries are cheap
/// clones of the `Arc`.
pub struct AnalysisCache {
    capacity: usize,
    entries: Mutex<Vec<(String, Arc<RaceAnalysis>)>>,
}

impl AnalysisCache {
    /// Creates a cache holding up to `capacity` analyses.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Returns the cached analysis for `key`, building and inserting it on
    /// a miss. The least recently used entry is evicted at capacity.
    pub fn get_or_build(
        &self,
        key: &str,
        build: impl FnOnce() -> Result<RaceAnalysis>,
    ) -> Result<Arc<RaceAnalysis>> {
        let mut entries = self.entries.lock();
        if let Some(pos) = entries.iter().position(|(k, _)| k == key) {
            let entry = entries.remove(pos);
            let analysis = entry.1.clone();
            entries.push(entry);
            return Ok(analysis);
        }
        let analysis = Arc::new(build()?);
        if entries.len() >= self.capacity {
            entries.remove(0);
        }
        entries.push((key.to_owned(), analysis.clone()));
        Ok(analysis)
    }

    /// Number of cached analyses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
