//! Streaming race detection at trace-collection time.
//!
//! [`OnlineDetector`] receives `begin_event_action` / `denote_after` /
//! `record_operation` / `end_event_action` calls from the producer and
//! reports races as they appear, FastTrack-style: per variable it keeps a
//! last-write epoch, a last-read epoch, and a read vector once concurrent
//! readers exist. Event actions are assigned chains lazily against a
//! running maximum clock, keeping vector clocks short.
//!
//! # Contract
//!
//! Contract violations (operations outside an event action, non-increasing
//! event ids, adding a happens-before arc after the current event already
//! performed operations) indicate a buggy producer and panic.

pub mod clock;

pub use clock::ChainClock;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::action_log::EventId;

/// Read or write, as reported by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operation {
    /// A memory read.
    Read,
    /// A memory write.
    Write,
}

/// A race between two event actions, reported by the online detector.
///
/// `event1` is `None` when the earlier endpoint's event could not be
/// recovered from its epoch (it predates detector state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OnlineRace {
    /// Operation of the earlier endpoint.
    pub op1: Operation,
    /// The earlier event action, if known.
    pub event1: Option<EventId>,
    /// Operation of the later endpoint.
    pub op2: Operation,
    /// The later event action.
    pub event2: EventId,
}

/// FastTrack-style read/write state for one variable.
#[derive(Debug, Clone, Default)]
struct VarState {
    last_write: (usize, u32),
    last_read: (usize, u32),
    /// Populated once two concurrent readers exist; indexed by chain.
    read_vector: Vec<u32>,
}

/// The streaming detector.
#[derive(Debug, Default)]
pub struct OnlineDetector {
    current: Option<EventId>,
    last_event: Option<EventId>,
    current_had_operations: bool,
    max_clock: ChainClock,
    clocks: BTreeMap<EventId, ChainClock>,
    vars: HashMap<String, VarState>,
    event_by_epoch: HashMap<(usize, u32), EventId>,
}

impl OnlineDetector {
    /// Creates an empty detector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The event action currently open, if any.
    #[must_use]
    pub fn current_event_action(&self) -> Option<EventId> {
        self.current
    }

    /// Opens an event action. Ids must be strictly increasing.
    ///
    /// # Panics
    ///
    /// When an event action is already open or `id` does not increase.
    pub fn begin_event_action(&mut self, id: EventId) {
        assert!(
            self.current.is_none(),
            "cannot begin a nested event action (current {:?}, new {id})",
            self.current
        );
        if let Some(last) = self.last_event {
            assert!(
                last < id,
                "event action ids must increase (was {last}, new {id})"
            );
        }
        self.current = Some(id);
        self.last_event = Some(id);
        self.current_had_operations = false;
    }

    /// Closes the current event action.
    ///
    /// # Panics
    ///
    /// When no event action is open.
    pub fn end_event_action(&mut self) {
        assert!(self.current.is_some(), "not in an event action");
        self.current = None;
    }

    /// Records that the current event action happens after `previous`.
    ///
    /// # Panics
    ///
    /// When no event action is open, or the current event already
    /// performed operations (its clock is already materialized, so a late
    /// arc would silently miss races).
    pub fn denote_current_event_after(&mut self, previous: EventId) {
        let current = self.current.expect("not in an event action");
        assert!(
            !self.current_had_operations,
            "happens-before must not change after operations in event {current}"
        );
        self.add_arc(previous, current);
    }

    /// The client confirms a reported race is actually synchronized; the
    /// implied arc joins future clocks transitively.
    pub fn record_race_is_sync(&mut self, race: &OnlineRace) {
        if let Some(event1) = race.event1 {
            self.add_arc(event1, race.event2);
        }
    }

    fn add_arc(&mut self, from: EventId, to: EventId) {
        assert!(from < to, "arc must point forward ({from} -> {to})");
        let from_clock = self.clocks.entry(from).or_default().clone();
        self.clocks.entry(to).or_default().join(&from_clock);
    }

    /// Records a read or write of `variable` in the current event action,
    /// returning any races discovered against earlier epochs.
    ///
    /// # Panics
    ///
    /// When no event action is open.
    pub fn record_operation(&mut self, op: Operation, variable: &str) -> Vec<OnlineRace> {
        let current = self.current.expect("not in an event action");
        if !self.current_had_operations {
            self.assign_chain(current);
            self.current_had_operations = true;
        }
        let clock = self.clocks.get(&current).expect("chain assigned").clone();
        let current_chain = clock.chain().expect("chain assigned");
        let current_ts = clock.timestamp();

        let mut races = Vec::new();
        let state = self.vars.entry(variable.to_owned()).or_default();

        // Any operation races an unordered previous write.
        let (write_chain, write_ts) = state.last_write;
        if !clock.is_after_epoch(write_chain, write_ts) {
            races.push(OnlineRace {
                op1: Operation::Write,
                event1: self.event_by_epoch.get(&(write_chain, write_ts)).copied(),
                op2: op,
                event2: current,
            });
        }

        match op {
            Operation::Write => {
                if state.read_vector.is_empty() {
                    let (read_chain, read_ts) = state.last_read;
                    if !clock.is_after_epoch(read_chain, read_ts) {
                        races.push(OnlineRace {
                            op1: Operation::Read,
                            event1: self.event_by_epoch.get(&(read_chain, read_ts)).copied(),
                            op2: Operation::Write,
                            event2: current,
                        });
                    }
                } else {
                    for (chain, &ts) in state.read_vector.iter().enumerate() {
                        if !clock.is_after_epoch(chain, ts) {
                            races.push(OnlineRace {
                                op1: Operation::Read,
                                event1: self.event_by_epoch.get(&(chain, ts)).copied(),
                                op2: Operation::Write,
                                event2: current,
                            });
                        }
                    }
                }
                state.read_vector.clear();
                state.last_read = (0, 0);
                state.last_write = (current_chain, current_ts);
            }
            Operation::Read => {
                if state.read_vector.is_empty() {
                    if state.last_read.1 == 0 {
                        state.last_read = (current_chain, current_ts);
                    } else {
                        // A second concurrent-or-not reader: inflate the
                        // epoch into a read vector holding both.
                        let (prev_chain, prev_ts) = state.last_read;
                        set_epoch(&mut state.read_vector, prev_chain, prev_ts);
                        set_epoch(&mut state.read_vector, current_chain, current_ts);
                    }
                } else {
                    set_epoch(&mut state.read_vector, current_chain, current_ts);
                }
            }
        }
        races
    }

    /// Assigns the event the lowest chain whose component in its clock
    /// matches the running maximum, then ticks both.
    fn assign_chain(&mut self, event: EventId) {
        let clock = self.clocks.entry(event).or_default();
        if clock.chain().is_some() {
            return;
        }
        for chain in 0..=self.max_clock.num_components() {
            if clock.component(chain) == self.max_clock.component(chain) {
                clock.set_chain(chain);
                clock.tick(chain);
                self.max_clock.tick(chain);
                self.event_by_epoch
                    .insert((chain, clock.timestamp()), event);
                return;
            }
        }
        unreachable!("a free chain always exists at index num_components()");
    }
}

fn set_epoch(vector: &mut Vec<u32>, chain: usize, timestamp: u32) {
    if vector.len() <= chain {
        vector.resize(chain + 1, 0);
    }
    vector[chain] = timestamp;
}
