//! The happens-before predicate and engine selection.

use crate::action_log::EventId;
use crate::config::Connectivity;
use crate::graph::bitclocks::BitClocks;
use crate::graph::chains::ChainClocks;
use crate::graph::directed::DirectedGraph;

/// The single predicate every reachability engine exposes.
///
/// `ordered(a, b)` means "a happens before or equals b". All engines must
/// agree on live (non-deleted) nodes; disagreement is a bug.
pub trait HappensBefore {
    /// True iff `a` happens-before-or-equals `b`.
    fn ordered(&self, a: EventId, b: EventId) -> bool;
}

impl HappensBefore for DirectedGraph {
    fn ordered(&self, a: EventId, b: EventId) -> bool {
        DirectedGraph::ordered(self, a, b)
    }
}

/// A reachability engine built from a frozen graph.
///
/// The BFS variant keeps its own copy of the graph so the engine stays
/// valid independently of later graph edits by the caller.
#[derive(Debug)]
pub enum HbEngine {
    /// Chain decomposition + vector clocks.
    Chains(ChainClocks),
    /// Bit-vector transitive closure.
    Bits(BitClocks),
    /// Exhaustive BFS on a graph snapshot.
    Bfs(DirectedGraph),
}

impl HbEngine {
    /// Builds the engine selected by `connectivity`.
    #[must_use]
    pub fn build(graph: &DirectedGraph, connectivity: Connectivity) -> Self {
        match connectivity {
            Connectivity::ChainDecomposition => Self::Chains(ChainClocks::build(graph)),
            Connectivity::BitClocks => Self::Bits(BitClocks::build(graph)),
            Connectivity::Bfs => Self::Bfs(graph.clone()),
        }
    }

    /// The chain count, when the chain engine is in use.
    #[must_use]
    pub fn num_chains(&self) -> Option<usize> {
        match self {
            Self::Chains(c) => Some(c.num_chains()),
            _ => None,
        }
    }
}

impl HappensBefore for HbEngine {
    fn ordered(&self, a: EventId, b: EventId) -> bool {
        match self {
            Self::Chains(c) => c.ordered(a, b),
            Self::Bits(b2) => b2.ordered(a, b),
            Self::Bfs(g) => g.ordered(a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> DirectedGraph {
        let mut g = DirectedGraph::new();
        g.add_nodes_up_to(3);
        for (a, b) in [(0, 1), (0, 2), (1, 3), (2, 3)] {
            g.add_arc(a, b);
        }
        g
    }

    #[test]
    fn all_engines_agree_on_the_diamond() {
        let g = diamond();
        let engines = [
            HbEngine::build(&g, Connectivity::ChainDecomposition),
            HbEngine::build(&g, Connectivity::BitClocks),
            HbEngine::build(&g, Connectivity::Bfs),
        ];
        for a in 0..4 {
            for b in 0..4 {
                let expected = g.ordered(a, b);
                for engine in &engines {
                    assert_eq!(engine.ordered(a, b), expected, "({a}, {b})");
                }
            }
        }
    }

    #[test]
    fn num_chains_reported_only_for_chain_engine() {
        let g = diamond();
        assert!(HbEngine::build(&g, Connectivity::ChainDecomposition)
            .num_chains()
            .is_some());
        assert!(HbEngine::build(&g, Connectivity::Bfs).num_chains().is_none());
    }

    #[test]
    fn bfs_engine_is_a_snapshot() {
        let mut g = diamond();
        let engine = HbEngine::build(&g, Connectivity::Bfs);
        g.add_arc(1, 2);
        // The snapshot does not see the new arc.
        assert!(!engine.ordered(1, 2));
        assert!(g.ordered(1, 2));
    }
}
