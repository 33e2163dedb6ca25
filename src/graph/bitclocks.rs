//! Bit-vector transitive closure.
//!
//! Every node carries a bitset of width `num_nodes`; bit `j` of node `v` is
//! set iff `j` reaches `v`. The closure is computed in node-id order with a
//! word-wise OR join, so memory is `O(N^2 / 8)` and queries are one bit
//! probe. Useful as a cross-check against [`super::ChainClocks`] and for
//! graphs with pathological chain covers.

use crate::action_log::EventId;
use crate::graph::directed::DirectedGraph;
use crate::graph::hb::HappensBefore;

const WORD_BITS: usize = u64::BITS as usize;

/// Transitively closed one-bit vector clocks.
#[derive(Debug, Clone, Default)]
pub struct BitClocks {
    words_per_node: usize,
    bits: Vec<u64>,
    num_nodes: usize,
}

impl BitClocks {
    /// Computes the closure for a frozen graph.
    #[must_use]
    pub fn build(graph: &DirectedGraph) -> Self {
        let num_nodes = graph.num_nodes();
        let words_per_node = num_nodes.div_ceil(WORD_BITS);
        let mut bits = vec![0u64; num_nodes * words_per_node];
        for node in 0..num_nodes {
            // Join predecessors. Id order guarantees their rows are final.
            for &pred in graph.predecessors(node) {
                let (pred_row, node_row) = if pred < node {
                    let (a, b) = bits.split_at_mut(node * words_per_node);
                    (
                        &a[pred * words_per_node..(pred + 1) * words_per_node],
                        &mut b[..words_per_node],
                    )
                } else {
                    continue;
                };
                for (dst, &src) in node_row.iter_mut().zip(pred_row) {
                    *dst |= src;
                }
            }
            bits[node * words_per_node + node / WORD_BITS] |= 1u64 << (node % WORD_BITS);
        }
        Self {
            words_per_node,
            bits,
            num_nodes,
        }
    }

    fn bit(&self, node: EventId, bit: EventId) -> bool {
        let word = self.bits[node * self.words_per_node + bit / WORD_BITS];
        (word >> (bit % WORD_BITS)) & 1 != 0
    }
}

impl HappensBefore for BitClocks {
    fn ordered(&self, a: EventId, b: EventId) -> bool {
        if a >= self.num_nodes || b >= self.num_nodes {
            return false;
        }
        if a == b {
            return true;
        }
        self.bit(b, a)
    }
}
