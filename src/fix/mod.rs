//! Deterministic transformations applied to the happens-before graph
//! before race detection.
//!
//! - [`GraphFixer`]: the ordered fixing passes (dead-event elimination,
//!   independent exploration rewiring, script/resource serialization,
//!   per-target ordering)
//! - [`TimerGraph`]: arcs inferred from timer durations
//! - [`CallTraces`]: cause-event and enclosing-scope indexes
//! - [`GraphInfo`]: arc durations and the dropped-node set, kept so a
//!   derived graph can be diffed against the input graph

pub mod call_trace;
pub mod graph_fix;
pub mod graph_info;
pub mod timer_graph;

pub use call_trace::CallTraces;
pub use graph_fix::GraphFixer;
pub use graph_info::GraphInfo;
pub use timer_graph::TimerGraph;
