//! Happens-before graph storage and reachability engines.
//!
//! [`DirectedGraph`] is the sparse DAG every analysis runs on. Three
//! interchangeable engines answer the single reachability predicate
//! [`HappensBefore::ordered`]:
//!
//! - [`ChainClocks`]: greedy chain cover + vector clocks of chain width
//! - [`BitClocks`]: bit-vector transitive closure of node width
//! - plain BFS on the graph itself (no precomputation)
//!
//! The engine is selected by [`crate::config::Connectivity`].

pub mod bitclocks;
pub mod chains;
pub mod directed;
pub mod hb;

pub use bitclocks::BitClocks;
pub use chains::ChainClocks;
pub use directed::{BfsIter, DirectedGraph};
pub use hb::{HappensBefore, HbEngine};
