//! Offline race detection, cover analysis, and classification.
//!
//! [`RaceDetector`] builds per-variable access streams from the log and
//! enumerates every unordered access pair under the configured
//! happens-before engine. [`RaceGraph`] relates races to each other for the
//! cover and multi-cover analyses, and [`RaceTags`] derives per-variable
//! triage tags from the finished detection.

pub mod detect;
pub mod race_graph;
pub mod tags;

pub use detect::{AccessKind, DetectionStats, Race, RaceDetector, RaceId, VarAccess, VarData};
pub use race_graph::RaceGraph;
pub use tags::{RaceTag, RaceTagSet, RaceTags};
