//! Chain decomposition with per-chain vector clocks.
//!
//! A greedy forward pass covers the DAG with chains (maximal walks), then
//! every node gets a vector clock of width `num_chains`. Reachability
//! between two live nodes reduces to one epoch comparison, making this the
//! default engine: clock width is the number of chains, which is far
//! smaller than the number of nodes on real traces.

use tracing::debug;

use crate::action_log::EventId;
use crate::graph::directed::DirectedGraph;
use crate::graph::hb::HappensBefore;

/// A chain never grows past this many nodes, so a 16-bit clock component
/// cannot overflow.
const MAX_CHAIN_LEN: usize = 32_766;

/// Chain cover plus vector clocks over chains.
#[derive(Debug, Clone, Default)]
pub struct ChainClocks {
    /// Chain id per node; `None` for deleted nodes.
    node_chain: Vec<Option<u32>>,
    num_chains: usize,
    /// Clock per node, width `num_chains`, empty for deleted nodes.
    clocks: Vec<Vec<u16>>,
}

impl ChainClocks {
    /// Builds the chain cover and vector clocks for a frozen graph.
    #[must_use]
    pub fn build(graph: &DirectedGraph) -> Self {
        let mut this = Self {
            node_chain: vec![None; graph.num_nodes()],
            num_chains: 0,
            clocks: Vec::new(),
        };
        for node in 0..graph.num_nodes() {
            if this.node_chain[node].is_none() && !graph.is_deleted(node) {
                let chain = this.num_chains as u32;
                this.walk_chain(graph, node, chain);
                this.num_chains += 1;
            }
        }
        debug!(num_chains = this.num_chains, "chain cover computed");
        this.compute_clocks(graph);
        this
    }

    /// Number of chains in the cover.
    #[must_use]
    pub const fn num_chains(&self) -> usize {
        self.num_chains
    }

    /// Walks a new chain starting at `start`, preferring the first
    /// unassigned successor and falling back to any successor. The chain
    /// ends at a dead end or at [`MAX_CHAIN_LEN`] nodes.
    fn walk_chain(&mut self, graph: &DirectedGraph, start: EventId, chain: u32) {
        let mut node = start;
        let mut len = 0usize;
        loop {
            if self.node_chain[node].is_none() {
                self.node_chain[node] = Some(chain);
            }
            let successors = graph.successors(node);
            let next = successors
                .iter()
                .copied()
                .find(|&s| self.node_chain[s].is_none())
                .or_else(|| successors.first().copied());
            let Some(next) = next else { break };
            node = next;
            len += 1;
            if len == MAX_CHAIN_LEN {
                break;
            }
        }
    }

    /// Computes `clock[v] = join of clock[u] over predecessors u`, then
    /// ticks `v`'s own chain component. Node-id order makes every
    /// predecessor's clock final before it is joined.
    fn compute_clocks(&mut self, graph: &DirectedGraph) {
        self.clocks = vec![Vec::new(); graph.num_nodes()];
        for node in 0..graph.num_nodes() {
            let Some(chain) = self.node_chain[node] else {
                continue;
            };
            let mut clock = vec![0u16; self.num_chains];
            for &pred in graph.predecessors(node) {
                join_max(&mut clock, &self.clocks[pred]);
            }
            clock[chain as usize] += 1;
            self.clocks[node] = clock;
        }
    }
}

/// Componentwise max join. Trivially data-parallel; correctness does not
/// depend on vectorization.
fn join_max(out: &mut [u16], other: &[u16]) {
    for (o, &v) in out.iter_mut().zip(other) {
        if v > *o {
            *o = v;
        }
    }
}

impl HappensBefore for ChainClocks {
    fn ordered(&self, a: EventId, b: EventId) -> bool {
        if a == b {
            return true;
        }
        // Arcs only point forward, so a later node never precedes an
        // earlier one.
        if b < a {
            return false;
        }
        let (Some(ca), Some(clock_a), Some(clock_b)) = (
            self.node_chain.get(a).copied().flatten(),
            self.clocks.get(a),
            self.clocks.get(b),
        ) else {
            return false;
        };
        let ca = ca as usize;
        let epoch_a = clock_a.get(ca).copied().unwrap_or(0);
        let epoch_b = clock_b.get(ca).copied().unwrap_or(0);
        epoch_a <= epoch_b
    }
}
