//! The text schedule format consumed by the external replayer.
//!
//! One record per line:
//!
//! - `<change>`: replay behavior may diverge from here on
//! - `<relax>`: strict replay may be loosened from here on
//! - `N;PAYLOAD`: event `N` with an opaque payload carried over from the
//!   input schedule
//!
//! Lines matching none of the above are ignored on load.

use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use thiserror::Error;

use crate::action_log::EventId;

/// Marker sentinels and events making up a planned schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEntry {
    /// The `<change>` sentinel.
    Change,
    /// The `<relax>` sentinel.
    Relax,
    /// A scheduled event action.
    Event(EventId),
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Change => write!(f, "<change>"),
            Self::Relax => write!(f, "<relax>"),
            Self::Event(id) => write!(f, "{id}"),
        }
    }
}

/// Schedule file I/O failure.
#[derive(Debug, Error)]
pub enum ScheduleFileError {
    /// Underlying I/O failure.
    #[error("schedule file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

const CHANGE_SENTINEL: &str = "<change>";
const RELAX_SENTINEL: &str = "<relax>";

/// Per-event payloads recovered from a schedule file.
///
/// The planner never interprets payloads; it carries them through so the
/// replayer receives the event parameters it recorded.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    payloads: Vec<String>,
}

impl Schedule {
    /// Creates an empty payload store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The payload for an event; empty when unknown.
    #[must_use]
    pub fn payload(&self, event: EventId) -> &str {
        self.payloads.get(event).map_or("", String::as_str)
    }

    /// Sets the payload for an event.
    pub fn set_payload(&mut self, event: EventId, payload: impl Into<String>) {
        if event >= self.payloads.len() {
            self.payloads.resize(event + 1, String::new());
        }
        self.payloads[event] = payload.into();
    }

    /// Reads payloads from a schedule. Sentinels and unparseable lines are
    /// skipped.
    pub fn load(r: impl Read) -> Result<Self, ScheduleFileError> {
        let mut schedule = Self::new();
        for line in BufReader::new(r).lines() {
            let line = line?;
            let Some((id, payload)) = line.split_once(';') else {
                continue;
            };
            let Ok(id) = id.trim().parse::<EventId>() else {
                continue;
            };
            schedule.set_payload(id, payload);
        }
        Ok(schedule)
    }

    /// Reads payloads from a schedule file.
    pub fn load_path(path: impl AsRef<Path>) -> Result<Self, ScheduleFileError> {
        Self::load(std::fs::File::open(path)?)
    }

    /// Writes a planned schedule, carrying each event's payload.
    ///
    /// Events without a known payload are dropped: the replayer cannot
    /// dispatch an event it has no parameters for.
    pub fn save(
        &self,
        w: &mut impl Write,
        entries: &[ScheduleEntry],
    ) -> Result<(), ScheduleFileError> {
        for entry in entries {
            match entry {
                ScheduleEntry::Change => writeln!(w, "{CHANGE_SENTINEL}")?,
                ScheduleEntry::Relax => writeln!(w, "{RELAX_SENTINEL}")?,
                ScheduleEntry::Event(id) => {
                    let payload = self.payload(*id);
                    if !payload.is_empty() {
                        writeln!(w, "{id};{payload}")?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Writes a planned schedule to a file.
    pub fn save_path(
        &self,
        path: impl AsRef<Path>,
        entries: &[ScheduleEntry],
    ) -> Result<(), ScheduleFileError> {
        let mut file = std::fs::File::create(path)?;
        self.save(&mut file, entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_parses_event_lines_and_ignores_noise() {
        let input = "0;load http://a\n<change>\n1;click #b\ngarbage line\n<relax>\n7;fin\n";
        let schedule = Schedule::load(input.as_bytes()).unwrap();
        assert_eq!(schedule.payload(0), "load http://a");
        assert_eq!(schedule.payload(1), "click #b");
        assert_eq!(schedule.payload(7), "fin");
        assert_eq!(schedule.payload(2), "");
        assert_eq!(schedule.payload(99), "");
    }

    #[test]
    fn payload_may_contain_semicolons() {
        let schedule = Schedule::load("3;a;b;c\n".as_bytes()).unwrap();
        assert_eq!(schedule.payload(3), "a;b;c");
    }

    #[test]
    fn save_round_trips_payloads_and_sentinels() {
        let mut schedule = Schedule::new();
        schedule.set_payload(0, "alpha");
        schedule.set_payload(2, "gamma");
        let entries = [
            ScheduleEntry::Change,
            ScheduleEntry::Event(0),
            ScheduleEntry::Event(1), // no payload: dropped
            ScheduleEntry::Relax,
            ScheduleEntry::Event(2),
        ];
        let mut out = Vec::new();
        schedule.save(&mut out, &entries).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "<change>\n0;alpha\n<relax>\n2;gamma\n");

        let reloaded = Schedule::load(text.as_bytes()).unwrap();
        assert_eq!(reloaded.payload(0), "alpha");
        assert_eq!(reloaded.payload(2), "gamma");
        assert_eq!(reloaded.payload(1), "");
    }

    #[test]
    fn entry_display_matches_format() {
        assert_eq!(ScheduleEntry::Change.to_string(), "<change>");
        assert_eq!(ScheduleEntry::Relax.to_string(), "<relax>");
        assert_eq!(ScheduleEntry::Event(12).to_string(), "12");
    }
}
