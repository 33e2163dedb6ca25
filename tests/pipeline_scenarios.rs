//! End-to-end pipeline scenarios on hand-built traces.
//!
//! Each scenario serializes a trace in the binary layout, runs the full
//! analysis, and checks races, covers, and tags.

use eventrace::action_log::{ActionLog, Command, EventKind};
use eventrace::analysis::RaceAnalysis;
use eventrace::config::AnalysisConfig;
use eventrace::races::{AccessKind, RaceTag};
use eventrace::strings::StringTable;

struct TraceBuilder {
    vars: StringTable,
    scopes: StringTable,
    values: StringTable,
    log: ActionLog,
}

impl TraceBuilder {
    fn new() -> Self {
        Self {
            vars: StringTable::new(),
            scopes: StringTable::new(),
            values: StringTable::new(),
            log: ActionLog::new(),
        }
    }

    fn var(&mut self, name: &str) -> u32 {
        self.vars.intern(name)
    }

    fn value(&mut self, name: &str) -> u32 {
        self.values.intern(name)
    }

    fn event(&mut self, id: usize, kind: EventKind, commands: &[Command]) -> &mut Self {
        self.log.start_event_action(id);
        self.log.set_event_kind(kind);
        for &cmd in commands {
            self.log.log_command(cmd);
        }
        self.log.end_event_action();
        self
    }

    fn arc(&mut self, tail: usize, head: usize, duration: i32) -> &mut Self {
        self.log.add_arc(tail, head, duration);
        self
    }

    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.vars.save(&mut buf).unwrap();
        self.scopes.save(&mut buf).unwrap();
        self.log.save(&mut buf).unwrap();
        StringTable::new().save(&mut buf).unwrap();
        self.values.save(&mut buf).unwrap();
        buf
    }

    fn analyze(&self) -> RaceAnalysis {
        RaceAnalysis::load(self.serialize().as_slice(), &AnalysisConfig::default()).unwrap()
    }
}

#[test]
fn same_value_write_write_race() {
    let mut t = TraceBuilder::new();
    let x = t.var("X");
    let one = t.value("1");
    t.event(
        0,
        EventKind::Unknown,
        &[Command::WriteMemory(x), Command::MemoryValue(one)],
    );
    t.event(
        1,
        EventKind::Unknown,
        &[Command::WriteMemory(x), Command::MemoryValue(one)],
    );
    let analysis = t.analyze();

    assert_eq!(analysis.races().len(), 1);
    let race = &analysis.races()[0];
    assert_eq!(race.access1, AccessKind::Write);
    assert_eq!(race.access2, AccessKind::Write);
    assert!(race.is_uncovered());
    assert!(analysis.variable_tags(x).has(RaceTag::WriteSameValue));
}

#[test]
fn differing_value_writes_have_no_same_value_tag() {
    let mut t = TraceBuilder::new();
    let x = t.var("X");
    let a = t.value("A");
    let b = t.value("B");
    t.event(
        0,
        EventKind::Unknown,
        &[Command::WriteMemory(x), Command::MemoryValue(a)],
    );
    t.event(
        1,
        EventKind::Unknown,
        &[Command::WriteMemory(x), Command::MemoryValue(b)],
    );
    let analysis = t.analyze();

    assert_eq!(analysis.races().len(), 1);
    assert_eq!(analysis.races()[0].kind_str(), "WRITE-WRITE");
    assert!(!analysis.variable_tags(x).has(RaceTag::WriteSameValue));
    assert!(!analysis.has_undefined_initialization_race(x));
}

#[test]
fn unordered_object_read_is_an_initialization_race() {
    let mut t = TraceBuilder::new();
    let x = t.var("X");
    let obj = t.value("obj#1");
    t.event(0, EventKind::Unknown, &[Command::WriteMemory(x)]);
    t.event(
        1,
        EventKind::Unknown,
        &[Command::ReadMemory(x), Command::MemoryValue(obj)],
    );
    let analysis = t.analyze();

    assert_eq!(analysis.races().len(), 1);
    assert_eq!(analysis.races()[0].kind_str(), "WRITE-READ");
    assert!(analysis.has_undefined_initialization_race(x));
}

#[test]
fn undefined_annotated_read_is_a_primitive_observation() {
    // A read that observed the literal "undefined" value saw a defined
    // primitive; only non-primitive observations count as potential
    // uninitialized-object accesses.
    let mut t = TraceBuilder::new();
    let x = t.var("X");
    let undef = t.value("undefined");
    t.event(0, EventKind::Unknown, &[Command::WriteMemory(x)]);
    t.event(
        1,
        EventKind::Unknown,
        &[Command::ReadMemory(x), Command::MemoryValue(undef)],
    );
    let analysis = t.analyze();
    assert_eq!(analysis.races().len(), 1);
    assert!(!analysis.has_undefined_initialization_race(x));
}

#[test]
fn arc_ordered_accesses_do_not_race() {
    let mut t = TraceBuilder::new();
    let x = t.var("X");
    t.event(0, EventKind::Unknown, &[Command::WriteMemory(x)]);
    t.event(1, EventKind::Unknown, &[Command::ReadMemory(x)]);
    t.arc(0, 1, -1);
    let analysis = t.analyze();
    assert!(analysis.races().is_empty());
}

#[test]
fn three_concurrent_writes_race_adjacent_pairs() {
    // The forward pass relates each access to the most recent write, so
    // three pairwise-concurrent writes produce the two adjacent races,
    // both uncovered, neither multi-covered.
    let mut t = TraceBuilder::new();
    let x = t.var("X");
    for id in 0..3 {
        t.event(id, EventKind::Unknown, &[Command::WriteMemory(x)]);
    }
    let analysis = t.analyze();

    let pairs: Vec<(usize, usize)> = analysis
        .races()
        .iter()
        .map(|r| (r.event1, r.event2))
        .collect();
    assert_eq!(pairs, vec![(0, 1), (1, 2)]);
    for race in analysis.races() {
        assert!(race.is_uncovered());
        assert!(race.multi_parent_races.is_empty());
    }
}

#[test]
fn every_reported_race_is_unordered_under_the_active_engine() {
    use eventrace::graph::HappensBefore;
    let mut t = TraceBuilder::new();
    let x = t.var("X");
    let y = t.var("Y");
    t.event(0, EventKind::Unknown, &[Command::WriteMemory(x)]);
    t.event(
        1,
        EventKind::Unknown,
        &[Command::ReadMemory(x), Command::WriteMemory(y)],
    );
    t.event(2, EventKind::Unknown, &[Command::WriteMemory(y)]);
    t.event(3, EventKind::Unknown, &[Command::ReadMemory(y)]);
    t.arc(0, 2, -1);
    let analysis = t.analyze();
    let engine = analysis.detector().engine().expect("engine built");
    assert!(!analysis.races().is_empty());
    for race in analysis.races() {
        assert!(
            !engine.ordered(race.event1, race.event2),
            "race ({}, {}) is ordered",
            race.event1,
            race.event2
        );
        assert!(engine.ordered(race.event1, race.event1));
    }
}

#[test]
fn detection_engines_agree_end_to_end() {
    use eventrace::config::Connectivity;
    for connectivity in [
        Connectivity::ChainDecomposition,
        Connectivity::BitClocks,
        Connectivity::Bfs,
    ] {
        let mut t = TraceBuilder::new();
        let x = t.var("X");
        let y = t.var("Y");
        t.event(0, EventKind::Unknown, &[Command::WriteMemory(x)]);
        t.event(
            1,
            EventKind::Unknown,
            &[Command::ReadMemory(x), Command::WriteMemory(y)],
        );
        t.event(2, EventKind::Unknown, &[Command::WriteMemory(y)]);
        t.arc(0, 1, -1);
        let config = AnalysisConfig::new().with_connectivity(connectivity);
        let analysis =
            RaceAnalysis::load(t.serialize().as_slice(), &config).unwrap();
        let pairs: Vec<(usize, usize)> = analysis
            .races()
            .iter()
            .map(|r| (r.event1, r.event2))
            .collect();
        assert_eq!(pairs, vec![(1, 2)], "{connectivity:?}");
    }
}

#[test]
fn timer_durations_order_fire_heads() {
    // Node 0 arms a 10ms timer (fires at 1) and a 20ms timer (fires at
    // 2); both fire-heads write X. The inferred arc orders them, so no
    // race remains.
    let mut t = TraceBuilder::new();
    let x = t.var("X");
    t.event(0, EventKind::Timer, &[]);
    t.event(1, EventKind::Timer, &[Command::WriteMemory(x)]);
    t.event(2, EventKind::Timer, &[Command::WriteMemory(x)]);
    t.arc(0, 1, 10);
    t.arc(0, 2, 20);
    let analysis = t.analyze();
    assert!(analysis.races().is_empty());
    // The derived arc lives in the timer graph, not the input graph.
    assert!(analysis.timer_graph().ordered(1, 2));
    assert!(!analysis.input_graph().ordered(1, 2));
}

#[test]
fn node_tree_renames_split_per_construction() {
    let mut t = TraceBuilder::new();
    let node = t.var("NodeTree:div7");
    t.event(0, EventKind::Unknown, &[Command::WriteMemory(node)]);
    t.event(1, EventKind::Unknown, &[Command::ReadMemory(node)]);
    let analysis = t.analyze();
    // The write-to-read arc serializes the pair: no race, and both
    // commands now name the per-construction variable.
    assert!(analysis.races().is_empty());
    let renamed = analysis.var_names().id_of("NodeTree:div7-0").unwrap();
    assert_eq!(
        analysis.log().event(1).commands[0],
        Command::ReadMemory(renamed)
    );
}

#[test]
fn empty_tail_events_disappear_from_analysis() {
    let mut t = TraceBuilder::new();
    let x = t.var("X");
    t.event(0, EventKind::Unknown, &[Command::WriteMemory(x)]);
    t.event(1, EventKind::Unknown, &[]);
    t.event(2, EventKind::Unknown, &[]);
    t.arc(1, 2, -1);
    let analysis = t.analyze();
    assert!(analysis.graph_info().is_dropped(1));
    assert!(analysis.graph_info().is_dropped(2));
    assert!(analysis.races().is_empty());
}

#[test]
fn action_log_save_load_round_trip() {
    let mut t = TraceBuilder::new();
    let x = t.var("X");
    let v = t.value("7");
    t.event(
        0,
        EventKind::Network,
        &[
            Command::EnterScope(0),
            Command::WriteMemory(x),
            Command::MemoryValue(v),
            Command::ExitScope,
        ],
    );
    t.event(1, EventKind::Continuation, &[Command::TriggerArc(2)]);
    t.event(2, EventKind::UserInterface, &[Command::ReadMemory(x)]);
    t.arc(0, 1, 30);
    t.arc(1, 2, -1);

    let mut buf = Vec::new();
    t.log.save(&mut buf).unwrap();
    let loaded = ActionLog::load(&mut buf.as_slice()).unwrap();
    assert_eq!(loaded, t.log);

    // Saving the loaded copy is byte-identical.
    let mut buf2 = Vec::new();
    loaded.save(&mut buf2).unwrap();
    assert_eq!(buf, buf2);
}

#[test]
fn trace_file_round_trip_on_disk() {
    let mut t = TraceBuilder::new();
    let x = t.var("X");
    t.event(0, EventKind::Unknown, &[Command::WriteMemory(x)]);
    t.event(1, EventKind::Unknown, &[Command::WriteMemory(x)]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.bin");
    std::fs::write(&path, t.serialize()).unwrap();

    let analysis = RaceAnalysis::load_path(&path, &AnalysisConfig::default()).unwrap();
    assert_eq!(analysis.races().len(), 1);
}

#[test]
fn unload_handler_races_are_tagged_end_to_end() {
    let mut t = TraceBuilder::new();
    let x = t.var("state");
    let unload = t.scopes.intern("fire:unload");
    t.event(0, EventKind::Unknown, &[Command::WriteMemory(x)]);
    t.event(
        1,
        EventKind::UserInterface,
        &[
            Command::EnterScope(unload),
            Command::WriteMemory(x),
            Command::ExitScope,
        ],
    );
    let analysis = t.analyze();
    assert!(analysis.variable_tags(x).has(RaceTag::RaceWithUnload));
}
