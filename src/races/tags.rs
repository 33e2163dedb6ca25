//! Heuristic per-variable race tags.
//!
//! Tags triage detected races into likely-benign and suspicious groups:
//! same-value writes, event-handler attachment races, lazy initialization,
//! unload-handler races, and cookie/className noise. The predicates mirror
//! observable browser behavior (scope names like `fire:click`, value
//! annotations on reads and writes) and operate on the finished
//! [`RaceDetector`] output.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::action_log::{ActionLog, Command, EventId};
use crate::fix::call_trace::CallTraces;
use crate::races::detect::{AccessKind, RaceDetector, RaceId, VarData};
use crate::strings::{StringTable, ValueId, VarId};

/// One triage tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RaceTag {
    /// All writes store the same annotated value and all races are WW.
    WriteSameValue,
    /// All uncovered races are WW and the value is never read afterwards.
    OnlyLocalWrite,
    /// Races only touch event-handler reads; handlers were attached but
    /// the racing reads happen before any handler fires.
    NoEventAttached,
    /// Like [`RaceTag::NoEventAttached`] but some read sits directly at an
    /// event fire, i.e. the handler attachment itself races the dispatch.
    LateEventAttach,
    /// Single write in a read-then-write-if-unset pattern.
    MaybeLazyInit,
    /// Every uncovered race has an unload-handler endpoint.
    RaceWithUnload,
    /// The variable is a cookie or className property.
    CookieOrClassname,
}

impl RaceTag {
    const ALL: [Self; 7] = [
        Self::WriteSameValue,
        Self::OnlyLocalWrite,
        Self::NoEventAttached,
        Self::LateEventAttach,
        Self::MaybeLazyInit,
        Self::RaceWithUnload,
        Self::CookieOrClassname,
    ];

    /// Canonical upper-snake name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::WriteSameValue => "WRITE_SAME_VALUE",
            Self::OnlyLocalWrite => "ONLY_LOCAL_WRITE",
            Self::NoEventAttached => "NO_EVENT_ATTACHED",
            Self::LateEventAttach => "LATE_EVENT_ATTACH",
            Self::MaybeLazyInit => "MAYBE_LAZY_INIT",
            Self::RaceWithUnload => "RACE_WITH_UNLOAD",
            Self::CookieOrClassname => "COOKIE_OR_CLASSNAME",
        }
    }

    const fn bit(self) -> u64 {
        1u64 << self as u64
    }
}

/// A set of [`RaceTag`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RaceTagSet(u64);

impl RaceTagSet {
    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns the set with `tag` added.
    #[must_use]
    pub const fn with(self, tag: RaceTag) -> Self {
        Self(self.0 | tag.bit())
    }

    /// Returns the set with `tag` removed.
    #[must_use]
    pub const fn without(self, tag: RaceTag) -> Self {
        Self(self.0 & !tag.bit())
    }

    /// The union of two sets.
    #[must_use]
    pub const fn merged(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True if `tag` is in the set.
    #[must_use]
    pub const fn has(self, tag: RaceTag) -> bool {
        self.0 & tag.bit() != 0
    }

    /// True for the empty set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The tags in the set, in declaration order.
    #[must_use]
    pub fn tags(self) -> Vec<RaceTag> {
        RaceTag::ALL.into_iter().filter(|t| self.has(*t)).collect()
    }
}

impl fmt::Display for RaceTagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for tag in self.tags() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}", tag.name())?;
            first = false;
        }
        Ok(())
    }
}

/// Per-variable summary produced for report consumers.
#[derive(Debug, Clone, Serialize)]
pub struct VarSummary {
    /// The variable's tags.
    pub tags: RaceTagSet,
    /// Whether the variable may be read before initialization.
    pub has_undefined_init_race: bool,
}

// "fire:unload" minus its final letter; both spellings occur in traces.
const UNLOAD_SCOPE_PREFIX: &str = "fire:unloa";
const DELETE_DOCUMENT_SCOPE: &str = "delete_document";
const FIRE_SCOPE_PREFIX: &str = "fire:";
const READYSTATECHANGE_SCOPE_PREFIX: &str = "fire:readystatechange";

/// How many leading commands of an event are scanned for the
/// network-response fire scope.
const NETWORK_SCOPE_SCAN_LIMIT: usize = 32;

/// The classification engine over one finished detection.
pub struct RaceTags<'a> {
    detector: &'a RaceDetector,
    log: &'a ActionLog,
    vars: &'a StringTable,
    scopes: &'a StringTable,
    values: &'a StringTable,
    call_traces: &'a CallTraces,
}

impl<'a> RaceTags<'a> {
    /// Creates the engine over borrowed analysis state.
    #[must_use]
    pub fn new(
        detector: &'a RaceDetector,
        log: &'a ActionLog,
        vars: &'a StringTable,
        scopes: &'a StringTable,
        values: &'a StringTable,
        call_traces: &'a CallTraces,
    ) -> Self {
        Self {
            detector,
            log,
            vars,
            scopes,
            values,
            call_traces,
        }
    }

    /// Computes the full tag set for a variable. Unknown variables get the
    /// empty set.
    #[must_use]
    pub fn variable_tags(&self, var_id: VarId) -> RaceTagSet {
        let Some(var) = self.detector.var(var_id) else {
            return RaceTagSet::empty();
        };
        let mut tags = RaceTagSet::empty();
        if self.is_only_local_writes(var) && !self.var_is_user_visible(var_id) {
            tags = tags.with(RaceTag::OnlyLocalWrite);
        }
        if self.has_only_same_value_writes(var) {
            tags = tags.with(RaceTag::WriteSameValue);
        }
        tags = tags.merged(self.event_race_classes(var));
        if self.is_lazy_init(var) {
            tags = tags.with(RaceTag::MaybeLazyInit);
        }
        if self.has_only_unload_races(var) {
            tags = tags.with(RaceTag::RaceWithUnload);
        }
        if self.is_cookie(var_id) || self.is_classname(var_id) {
            tags = tags.with(RaceTag::CookieOrClassname);
        }
        tags
    }

    /// Tags plus the initialization-race verdict in one record.
    #[must_use]
    pub fn var_summary(&self, var_id: VarId) -> VarSummary {
        VarSummary {
            tags: self.variable_tags(var_id),
            has_undefined_init_race: self.has_undefined_initialization_race(var_id),
        }
    }

    /// Whether a read of the variable can observe its uninitialized value.
    ///
    /// True when some read at or after the first write observes a
    /// non-primitive value and no write is connected to it through
    /// happens-before or chained races.
    #[must_use]
    pub fn has_undefined_initialization_race(&self, var_id: VarId) -> bool {
        let Some(var) = self.detector.var(var_id) else {
            return false;
        };
        let Some(first_write) = var.write_at(0) else {
            return false;
        };
        for access in &var.accesses {
            if !access.is_read {
                continue;
            }
            if access.event < first_write.event {
                return false;
            }
            if self.is_value_type_read_or_null(access.event, access.cmd) {
                continue;
            }
            if self
                .detector
                .has_path_via_races(first_write.event, access.event, access.cmd)
                .is_some()
            {
                continue;
            }
            let any_write_connected = var.accesses.iter().filter(|a| !a.is_read).any(|w| {
                self.detector
                    .has_path_via_races(w.event, access.event, access.cmd)
                    .is_some()
            });
            if !any_write_connected {
                return true;
            }
        }
        false
    }

    /// Whether an uncovered race on the variable involves a network
    /// response handler. With `ww_only`, the race must be write-write with
    /// differing (or unknown) values.
    #[must_use]
    pub fn has_network_response_race(&self, var_id: VarId, ww_only: bool) -> bool {
        let Some(var) = self.detector.var(var_id) else {
            return false;
        };
        for &race_id in &var.root_races {
            if !self.is_network_response_race(race_id) {
                continue;
            }
            if !ww_only {
                return true;
            }
            let race = &self.detector.races()[race_id];
            if race.access1 == AccessKind::Write && race.access2 == AccessKind::Write {
                let v1 = self.value_of_access(race.event1, race.cmd1);
                let v2 = self.value_of_access(race.event2, race.cmd2);
                return v1.is_none() || v1 != v2;
            }
        }
        false
    }

    /// True when either endpoint of the race is a network-response event.
    #[must_use]
    pub fn is_network_response_race(&self, race_id: RaceId) -> bool {
        let Some(race) = self.detector.race(race_id) else {
            return false;
        };
        self.is_network_response_event(race.event1) || self.is_network_response_event(race.event2)
    }

    /// The distinct annotated values observed for a variable, sorted and
    /// space-joined.
    #[must_use]
    pub fn var_value_set(&self, var_id: VarId) -> String {
        let Some(var) = self.detector.var(var_id) else {
            return String::new();
        };
        let mut values = BTreeSet::new();
        for access in &var.accesses {
            if let Some(v) = self.value_of_access(access.event, access.cmd) {
                if let Some(s) = self.values.get(v) {
                    values.insert(s);
                }
            }
        }
        values.into_iter().collect::<Vec<_>>().join(" ")
    }

    /// Rough rank of how likely racing reads observe a partially written
    /// state: for every uncovered race, counts the writes preceding each
    /// reading endpoint inside its event.
    #[must_use]
    pub fn exception_risk_rank(&self, var_id: VarId) -> f64 {
        let Some(var) = self.detector.var(var_id) else {
            return 0.0;
        };
        let mut rank = 0.0;
        for &race_id in &var.all_races {
            let race = &self.detector.races()[race_id];
            if race.covered_by.is_some() {
                continue;
            }
            if race.access1 != AccessKind::Write {
                rank += self.num_writes_before_command(race.event1, race.cmd1) as f64;
            }
            if race.access2 != AccessKind::Write {
                rank += self.num_writes_before_command(race.event2, race.cmd2) as f64;
            }
        }
        rank
    }

    /// True when some race on the variable has two root-cause endpoints
    /// (each event is its own cause), i.e. the race is not explained by a
    /// continuation chain.
    #[must_use]
    pub fn var_has_non_obvious_races(&self, var_id: VarId) -> bool {
        let Some(var) = self.detector.var(var_id) else {
            return false;
        };
        var.all_races.iter().any(|&race_id| {
            let race = &self.detector.races()[race_id];
            self.call_traces.event_created_by(race.event1) == race.event1
                && self.call_traces.event_created_by(race.event2) == race.event2
        })
    }

    /// True when the variable behaves like a fork-join counter: all races
    /// are read/update steps of +-1 and the final write stores `"0"`.
    #[must_use]
    pub fn is_counter_var(&self, var_id: VarId) -> bool {
        let Some(var) = self.detector.var(var_id) else {
            return false;
        };
        if var.all_races.is_empty() || var.num_writes() == 0 {
            return false;
        }
        for &race_id in &var.all_races {
            let race = &self.detector.races()[race_id];
            if race.access1 == AccessKind::Write || race.access2 == AccessKind::Write {
                return false;
            }
            if race.access1 == AccessKind::Update && !self.is_counter_step_update(var, race.event1)
            {
                return false;
            }
            if race.access2 == AccessKind::Update && !self.is_counter_step_update(var, race.event2)
            {
                return false;
            }
        }
        // Counters that never drain back to zero are just monotone ids.
        let Some(last_write) = var.write_at(var.num_writes() - 1) else {
            return false;
        };
        self.value_string_of_access(last_write.event, last_write.cmd) == Some("0")
    }

    // === Tag predicates ===

    fn event_race_classes(&self, var: &VarData) -> RaceTagSet {
        let mut attach_races_dispatch = false;
        let mut handler_read_events = BTreeSet::new();
        for access in &var.accesses {
            if !access.is_read {
                continue;
            }
            let Some(reads_until_fire) = self.num_read_cmds_until_event_fire(access.event, access.cmd)
            else {
                continue;
            };
            if reads_until_fire == 0 {
                attach_races_dispatch = true;
            }
            handler_read_events.insert(access.event);
        }
        if handler_read_events.is_empty() {
            return RaceTagSet::empty();
        }
        for &race_id in &var.all_races {
            let race = &self.detector.races()[race_id];
            // Unload handlers read everything; they say nothing about
            // handler attachment.
            if self.is_unload_event(race.event1) || self.is_unload_event(race.event2) {
                continue;
            }
            if !handler_read_events.contains(&race.event1)
                && !handler_read_events.contains(&race.event2)
            {
                return RaceTagSet::empty();
            }
        }
        RaceTagSet::empty().with(if attach_races_dispatch {
            RaceTag::LateEventAttach
        } else {
            RaceTag::NoEventAttached
        })
    }

    fn has_only_same_value_writes(&self, var: &VarData) -> bool {
        let mut write_value: Option<ValueId> = None;
        for access in &var.accesses {
            if access.is_read {
                continue;
            }
            match self.value_of_access(access.event, access.cmd) {
                Some(value) => {
                    if write_value.is_none() {
                        write_value = Some(value);
                    }
                    if write_value != Some(value) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        // The races themselves are only checked for being write-write; the
        // two racing values are not compared pairwise.
        var.all_races.iter().all(|&race_id| {
            let race = &self.detector.races()[race_id];
            race.access1 == AccessKind::Write && race.access2 == AccessKind::Write
        })
    }

    fn is_only_local_writes(&self, var: &VarData) -> bool {
        var.root_races.iter().all(|&race_id| {
            let race = &self.detector.races()[race_id];
            race.access1 == AccessKind::Write
                && race.access2 == AccessKind::Write
                && !self.has_read_in_event_after(var, race.event1)
                && !self.has_read_in_event_after(var, race.event2)
        })
    }

    fn has_read_in_event_after(&self, var: &VarData, event: EventId) -> bool {
        var.accesses
            .iter()
            .find(|a| a.event > event)
            .is_some_and(|a| a.is_read)
    }

    /// Counts consecutive reads after `cmd` until an event-fire scope is
    /// entered. Any other command breaks the pattern (`None`).
    fn num_read_cmds_until_event_fire(&self, event: EventId, cmd: usize) -> Option<usize> {
        let commands = &self.log.event(event).commands;
        let mut num_reads = 0;
        for command in commands.iter().skip(cmd + 1) {
            match command {
                Command::EnterScope(scope)
                    if self
                        .scopes
                        .get(*scope)
                        .is_some_and(|s| s.starts_with(FIRE_SCOPE_PREFIX)) =>
                {
                    return Some(num_reads);
                }
                Command::ReadMemory(_) => num_reads += 1,
                _ => return None,
            }
        }
        None
    }

    fn is_lazy_init(&self, var: &VarData) -> bool {
        if var.num_writes() != 1 || var.num_reads() == 0 {
            return false;
        }
        let (Some(write), Some(read)) = (var.write_at(0), var.read_at(0)) else {
            return false;
        };
        write.event == read.event && write.cmd > read.cmd
    }

    fn has_only_unload_races(&self, var: &VarData) -> bool {
        !var.root_races.is_empty()
            && var.root_races.iter().all(|&race_id| {
                let race = &self.detector.races()[race_id];
                self.is_unload_event(race.event1) || self.is_unload_event(race.event2)
            })
    }

    /// An unload event's first entered scope is an unload fire or a
    /// document teardown.
    fn is_unload_event(&self, event: EventId) -> bool {
        for command in &self.log.event(event).commands {
            if let Command::EnterScope(scope) = command {
                return self.scopes.get(*scope).is_some_and(|s| {
                    s.starts_with(UNLOAD_SCOPE_PREFIX) || s == DELETE_DOCUMENT_SCOPE
                });
            }
        }
        false
    }

    fn is_network_response_event(&self, event: EventId) -> bool {
        for command in self
            .log
            .event(event)
            .commands
            .iter()
            .take(NETWORK_SCOPE_SCAN_LIMIT)
        {
            if let Command::EnterScope(scope) = command {
                return self
                    .scopes
                    .get(*scope)
                    .is_some_and(|s| s.starts_with(READYSTATECHANGE_SCOPE_PREFIX));
            }
        }
        false
    }

    fn is_counter_step_update(&self, var: &VarData, event: EventId) -> bool {
        let (Some(read_cmd), Some(write_cmd)) = (
            var.read_cmd_in_event(event),
            var.write_cmd_in_event(event),
        ) else {
            return false;
        };
        if read_cmd > write_cmd {
            return false;
        }
        let (Some(read_value), Some(write_value)) = (
            self.value_string_of_access(event, read_cmd),
            self.value_string_of_access(event, write_cmd),
        ) else {
            return false;
        };
        let (Ok(read_int), Ok(write_int)) = (read_value.parse::<i64>(), write_value.parse::<i64>())
        else {
            return false;
        };
        (read_int - write_int).abs() == 1
    }

    /// True when the read surely observed a primitive (integer, boolean)
    /// or an absent value. An unannotated read is not "surely primitive".
    fn is_value_type_read_or_null(&self, event: EventId, cmd: usize) -> bool {
        let Some(value) = self.value_string_of_access(event, cmd) else {
            return false;
        };
        value.parse::<i64>().is_ok()
            || matches!(value, "undefined" | "NULL" | "true" | "false")
    }

    fn is_cookie(&self, var_id: VarId) -> bool {
        self.vars
            .get(var_id)
            .is_some_and(|name| name.contains(".cookie"))
    }

    fn is_classname(&self, var_id: VarId) -> bool {
        self.vars
            .get(var_id)
            .is_some_and(|name| name.contains(".className"))
    }

    /// The value id annotating the access at `(event, cmd)`, if the next
    /// command is a value annotation.
    fn value_of_access(&self, event: EventId, cmd: usize) -> Option<ValueId> {
        match self.log.event(event).commands.get(cmd + 1) {
            Some(Command::MemoryValue(value)) => Some(*value),
            _ => None,
        }
    }

    fn value_string_of_access(&self, event: EventId, cmd: usize) -> Option<&str> {
        self.value_of_access(event, cmd)
            .and_then(|v| self.values.get(v))
    }

    fn num_writes_before_command(&self, event: EventId, cmd: usize) -> usize {
        let commands = &self.log.event(event).commands;
        commands
            .iter()
            .take(cmd.min(commands.len()))
            .filter(|c| c.is_write())
            .count()
    }

    /// DOM attribute variables whose field the user can observe directly.
    fn var_is_user_visible(&self, var_id: VarId) -> bool {
        let Some(name) = self.vars.get(var_id) else {
            return false;
        };
        let (Some(p1), Some(p2)) = (name.find("[0x"), name.find("].")) else {
            return false;
        };
        let class_name = &name[..p1];
        let field_name = &name[p2 + 2..];
        class_name == "DOMNode"
            && matches!(
                field_name,
                "innerHTML"
                    | "id"
                    | "className"
                    | "style"
                    | "dir"
                    | "accesskey"
                    | "src"
                    | "alt"
                    | "ismap"
                    | "usemap"
                    | "href"
                    | "seamless"
                    | "srcdoc"
                    | "width"
                    | "height"
                    | "sandbox"
                    | "readonly"
                    | "disabled"
                    | "type"
                    | "value"
            )
    }
}
