//! The recorded trace: event actions, their commands, and causal arcs.
//!
//! An [`ActionLog`] is the unit of input for the whole analysis. It is built
//! incrementally by a recording producer (via the `start_event_action` /
//! `log_*` builder API) or loaded from the binary trace format, and then
//! frozen for reading.
//!
//! # Builder invariants (enforced at log time)
//!
//! - A [`Command::MemoryValue`] is only accepted immediately after a read or
//!   write; it annotates that access with the value observed.
//! - Within one event action, the same read or write of a location is
//!   recorded at most once.
//! - An enter-scope followed immediately by an exit-scope is elided.
//!
//! # Binary format
//!
//! All integers are little-endian `i32`. The action-log section is:
//! header `{num_events, num_arcs}`, then `num_arcs x {tail, head, duration}`,
//! then for each event `{id, kind, num_commands}` followed by
//! `num_commands x {cmd_type, location}`. The surrounding file layout
//! (string tables first) is described on [`crate::analysis::RaceAnalysis`].

use std::collections::HashSet;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::io_util::{read_i32, write_i32};
use crate::strings::{ScopeId, ValueId, VarId};

/// Index of an event action within the trace. Dense, starting at 0.
pub type EventId = usize;

/// The kind of an event action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventKind {
    /// Kind was not recorded.
    #[default]
    Unknown,
    /// A timer callback.
    Timer,
    /// A user-interface event handler.
    UserInterface,
    /// A network continuation.
    Network,
    /// A continuation of a previous event action.
    Continuation,
}

impl EventKind {
    fn from_code(code: i32) -> Result<Self> {
        Ok(match code {
            0 => Self::Unknown,
            1 => Self::Timer,
            2 => Self::UserInterface,
            3 => Self::Network,
            4 => Self::Continuation,
            other => return Err(Error::malformed(format!("unknown event kind {other}"))),
        })
    }

    const fn code(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::Timer => 1,
            Self::UserInterface => 2,
            Self::Network => 3,
            Self::Continuation => 4,
        }
    }
}

/// One command within an event action.
///
/// Commands are positionally addressed within their event; analyses refer
/// to a command as an `(event, command index)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Enter a named scope.
    EnterScope(ScopeId),
    /// Exit the innermost open scope.
    ExitScope,
    /// Read of a memory location.
    ReadMemory(VarId),
    /// Write of a memory location.
    WriteMemory(VarId),
    /// The current event triggered the given later event action.
    TriggerArc(EventId),
    /// Value annotation for the immediately preceding read or write.
    MemoryValue(ValueId),
}

impl Command {
    /// The interned variable id for a read or write, if this is one.
    #[must_use]
    pub const fn memory_location(&self) -> Option<VarId> {
        match self {
            Self::ReadMemory(v) | Self::WriteMemory(v) => Some(*v),
            _ => None,
        }
    }

    /// True for [`Command::ReadMemory`].
    #[must_use]
    pub const fn is_read(&self) -> bool {
        matches!(self, Self::ReadMemory(_))
    }

    /// True for [`Command::WriteMemory`].
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::WriteMemory(_))
    }

    fn to_wire(self) -> (i32, i32) {
        match self {
            Self::EnterScope(s) => (0, s as i32),
            Self::ExitScope => (1, -1),
            Self::ReadMemory(v) => (2, v as i32),
            Self::WriteMemory(v) => (3, v as i32),
            Self::TriggerArc(e) => (4, e as i32),
            Self::MemoryValue(v) => (5, v as i32),
        }
    }

    fn from_wire(cmd_type: i32, location: i32) -> Result<Self> {
        Ok(match cmd_type {
            0 => Self::EnterScope(location as ScopeId),
            1 => Self::ExitScope,
            2 => Self::ReadMemory(location as VarId),
            3 => Self::WriteMemory(location as VarId),
            4 => Self::TriggerArc(location as EventId),
            5 => Self::MemoryValue(location as ValueId),
            other => return Err(Error::malformed(format!("unknown command type {other}"))),
        })
    }
}

/// A directed happens-before arc between two event actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceArc {
    /// The earlier event action.
    pub tail: EventId,
    /// The later event action.
    pub head: EventId,
    /// Duration in milliseconds for timed arcs; negative when unknown.
    pub duration: i32,
}

impl TraceArc {
    /// True when the arc carries a known duration.
    #[must_use]
    pub const fn is_timed(&self) -> bool {
        self.duration >= 0
    }
}

/// One atomic event action: a kind plus an ordered command sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventAction {
    /// The recorded kind of the event action.
    pub kind: EventKind,
    /// The ordered command sequence.
    pub commands: Vec<Command>,
}

/// The full recorded trace.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    events: Vec<EventAction>,
    arcs: Vec<TraceArc>,

    // Builder state.
    current: Option<EventId>,
    seen_accesses: HashSet<Command>,
}

static EMPTY_EVENT: EventAction = EventAction {
    kind: EventKind::Unknown,
    commands: Vec::new(),
};

impl ActionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All arcs, in recording order.
    #[must_use]
    pub fn arcs(&self) -> &[TraceArc] {
        &self.arcs
    }

    /// The largest event id seen, or `None` for an empty log.
    #[must_use]
    pub fn max_event_id(&self) -> Option<EventId> {
        self.events.len().checked_sub(1)
    }

    /// Number of event-id slots (max id + 1).
    #[must_use]
    pub fn num_events(&self) -> usize {
        self.events.len()
    }

    /// The event action with the given id. Unknown ids yield an empty event.
    #[must_use]
    pub fn event(&self, id: EventId) -> &EventAction {
        self.events.get(id).unwrap_or(&EMPTY_EVENT)
    }

    /// Mutable access to an event action, extending the log if needed.
    pub fn event_mut(&mut self, id: EventId) -> &mut EventAction {
        if id >= self.events.len() {
            self.events.resize(id + 1, EventAction::default());
        }
        &mut self.events[id]
    }

    /// Records an arc. No duplicate or validity check is performed here;
    /// the graph build warns and skips backward arcs.
    pub fn add_arc(&mut self, tail: EventId, head: EventId, duration: i32) {
        self.arcs.push(TraceArc {
            tail,
            head,
            duration,
        });
    }

    // === Builder API ===

    /// Opens an event action. Subsequent `log_*` calls append to it.
    pub fn start_event_action(&mut self, id: EventId) {
        self.event_mut(id);
        self.current = Some(id);
        self.seen_accesses.clear();
    }

    /// Closes the current event action. Returns false if none was open.
    pub fn end_event_action(&mut self) -> bool {
        let was_open = self.current.is_some();
        self.current = None;
        self.seen_accesses.clear();
        was_open
    }

    /// Sets the kind of the current event action. False if none is open.
    pub fn set_event_kind(&mut self, kind: EventKind) -> bool {
        match self.current {
            Some(id) => {
                self.event_mut(id).kind = kind;
                true
            }
            None => false,
        }
    }

    /// Enters a scope in the current event action.
    pub fn enter_scope(&mut self, scope: ScopeId) -> bool {
        self.log_command(Command::EnterScope(scope))
    }

    /// Exits the innermost scope of the current event action.
    pub fn exit_scope(&mut self) -> bool {
        self.log_command(Command::ExitScope)
    }

    /// Whether a command of this shape would actually be written now.
    ///
    /// A value annotation is only accepted directly after a read or write.
    #[must_use]
    pub fn will_log(&self, command: Command) -> bool {
        let Some(id) = self.current else { return false };
        if matches!(command, Command::MemoryValue(_)) {
            return matches!(
                self.event(id).commands.last(),
                Some(Command::ReadMemory(_) | Command::WriteMemory(_))
            );
        }
        true
    }

    /// Appends a command to the current event action.
    ///
    /// Returns false when no event action is open. Duplicate accesses and
    /// unplaceable value annotations are silently dropped; an immediate
    /// enter/exit scope pair is elided.
    pub fn log_command(&mut self, command: Command) -> bool {
        let Some(id) = self.current else { return false };
        if !self.will_log(command) {
            return true;
        }
        if matches!(command, Command::ReadMemory(_) | Command::WriteMemory(_))
            && !self.seen_accesses.insert(command)
        {
            return true;
        }
        let commands = &mut self.events[id].commands;
        if matches!(command, Command::ExitScope)
            && matches!(commands.last(), Some(Command::EnterScope(_)))
        {
            commands.pop();
            return true;
        }
        commands.push(command);
        true
    }

    // === Binary format ===

    /// Writes the action-log section.
    pub fn save(&self, w: &mut impl Write) -> Result<()> {
        write_i32(w, self.events.len() as i32)?;
        write_i32(w, self.arcs.len() as i32)?;
        for arc in &self.arcs {
            write_i32(w, arc.tail as i32)?;
            write_i32(w, arc.head as i32)?;
            write_i32(w, arc.duration)?;
        }
        for (id, event) in self.events.iter().enumerate() {
            write_i32(w, id as i32)?;
            write_i32(w, event.kind.code())?;
            write_i32(w, event.commands.len() as i32)?;
            for cmd in &event.commands {
                let (cmd_type, location) = cmd.to_wire();
                write_i32(w, cmd_type)?;
                write_i32(w, location)?;
            }
        }
        Ok(())
    }

    /// Reads an action-log section written by [`ActionLog::save`].
    pub fn load(r: &mut impl Read) -> Result<Self> {
        let num_events = read_i32(r, "action log header")?;
        let num_arcs = read_i32(r, "action log header")?;
        if num_events < 0 || num_arcs < 0 {
            return Err(Error::malformed(format!(
                "negative counts in action log header ({num_events} events, {num_arcs} arcs)"
            )));
        }
        let mut log = Self::new();
        for _ in 0..num_arcs {
            let tail = read_i32(r, "arc")?;
            let head = read_i32(r, "arc")?;
            let duration = read_i32(r, "arc")?;
            if tail < 0 || head < 0 {
                return Err(Error::malformed(format!("negative arc {tail} -> {head}")));
            }
            log.add_arc(tail as EventId, head as EventId, duration);
        }
        for _ in 0..num_events {
            let id = read_i32(r, "event header")?;
            let kind = EventKind::from_code(read_i32(r, "event header")?)?;
            let num_commands = read_i32(r, "event header")?;
            if id < 0 || num_commands < 0 {
                return Err(Error::malformed(format!(
                    "bad event header (id {id}, {num_commands} commands)"
                )));
            }
            let event = log.event_mut(id as EventId);
            event.kind = kind;
            event.commands.reserve(num_commands as usize);
            for _ in 0..num_commands {
                let cmd_type = read_i32(r, "command")?;
                let location = read_i32(r, "command")?;
                event.commands.push(Command::from_wire(cmd_type, location)?);
            }
        }
        // Arc endpoints may extend past the last recorded event.
        let max_arc_id = log
            .arcs
            .iter()
            .map(|a| a.tail.max(a.head))
            .max()
            .unwrap_or(0);
        if !log.arcs.is_empty() {
            log.event_mut(max_arc_id);
        }
        Ok(log)
    }
}

impl PartialEq for ActionLog {
    fn eq(&self, other: &Self) -> bool {
        self.events == other.events && self.arcs == other.arcs
    }
}
