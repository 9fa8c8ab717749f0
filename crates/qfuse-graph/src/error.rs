//! Error types for graph construction and mutation.

use crate::graph::{NodeId, ValueId};
use crate::types::ElemType;

/// Errors reported by graph primitives and validation.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A value id does not refer to a registered value.
    #[error("value {id} is not registered in the graph")]
    UnknownValue {
        /// The offending id.
        id: ValueId,
    },

    /// A node id does not refer to a live node.
    #[error("node {id} does not exist or was removed")]
    UnknownNode {
        /// The offending id.
        id: NodeId,
    },

    /// An output value is already produced by another node.
    #[error("value '{value}' is already produced by node '{existing}' (while wiring '{adding}')")]
    DuplicateProducer {
        /// Name of the contested value.
        value: String,
        /// Name of the node already producing it.
        existing: String,
        /// Name of the node being wired.
        adding: String,
    },

    /// A node removal would leave a consumed value without a producer.
    #[error("cannot remove node '{node}': output '{value}' is still in use ({count} use(s))")]
    ConsumersRemain {
        /// Name of the node being removed.
        node: String,
        /// Name of the output value still in use.
        value: String,
        /// Remaining uses, counting a graph output as one use.
        count: usize,
    },

    /// An operand index is outside a node's input or output list.
    #[error("node '{node}' has no operand at index {index} (arity {arity})")]
    OperandIndexOutOfRange {
        /// Name of the node.
        node: String,
        /// The requested index.
        index: usize,
        /// The actual operand count.
        arity: usize,
    },

    /// The graph is not a DAG.
    #[error("graph contains a cycle ({visited} of {total} nodes reachable)")]
    Cycle {
        /// Nodes reachable before the walk stalled.
        visited: usize,
        /// Live nodes in the graph.
        total: usize,
    },

    /// A graph output is neither produced by a node nor externally supplied.
    #[error("graph output '{value}' has no producer")]
    MissingProducer {
        /// Name of the dangling output value.
        value: String,
    },

    /// Producer/consumer bookkeeping does not mirror the node operand lists.
    #[error("inconsistent link at value '{value}': {detail}")]
    InconsistentLink {
        /// Name of the affected value.
        value: String,
        /// What went out of sync.
        detail: &'static str,
    },

    /// An initializer's buffer type disagrees with its declared element type.
    #[error("initializer '{value}' is declared {expected} but holds {found} data")]
    TypeMismatch {
        /// Name of the initializer value.
        value: String,
        /// Declared element type.
        expected: ElemType,
        /// Element type of the stored buffer.
        found: ElemType,
    },
}
