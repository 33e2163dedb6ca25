//! Offline happens-before race analysis for recorded event-driven traces.
//!
//! eventrace consumes a binary trace of **event actions** (atomic handler
//! invocations with their memory reads/writes, scope enters/exits, and
//! value annotations) plus causal arcs between them, and answers:
//!
//! - which pairs of memory accesses are unordered by happens-before
//!   ([`races::RaceDetector`])
//! - which races would disappear if another race were synchronized
//!   (cover and multi-cover analysis)
//! - which races look benign ([`races::RaceTags`] classification)
//! - what a serial schedule reversing a chosen race set looks like
//!   ([`reorder::ReorderPlanner`])
//!
//! Reachability over the happens-before DAG is answered by one of three
//! interchangeable engines (chain-decomposition vector clocks, bit-vector
//! closure, plain BFS) behind [`graph::HappensBefore`].
//!
//! The [`online`] module hosts the separate streaming detector used at
//! trace-collection time.
//!
//! # Entry points
//!
//! [`analysis::RaceAnalysis::load`] runs the whole pipeline on a trace;
//! [`analysis::AnalysisCache`] memoizes built analyses for serving layers.

pub mod action_log;
pub mod analysis;
pub mod config;
pub mod error;
pub mod fix;
pub mod graph;
mod io_util;
pub mod online;
pub mod races;
pub mod reorder;
pub mod strings;

pub use action_log::{ActionLog, Command, EventAction, EventId, EventKind, TraceArc};
pub use analysis::{AnalysisCache, RaceAnalysis};
pub use config::{AnalysisConfig, Connectivity, TimeBudget};
pub use error::{Error, ErrorKind, Result};
pub use graph::{BitClocks, ChainClocks, DirectedGraph, HappensBefore, HbEngine};
pub use races::{AccessKind, Race, RaceDetector, RaceId, RaceTag, RaceTagSet, RaceTags};
pub use reorder::{PlannerOptions, Preserve, ReorderPlanner, Reverse, Schedule, ScheduleEntry};
pub use strings::{ScopeId, StringTable, ValueId, VarId};
