#![warn(missing_docs)]
//! Tensor computation graph for quantization-aware rewriting.
//!
//! A DAG of operator nodes over named tensor values, with two-sided
//! producer/consumer bookkeeping, stable node identity across removal,
//! deterministic topological ordering, and a structural validator.
//! Rewriting passes live in the companion `qfuse-opt` crate.

mod builder;
mod display;
mod error;
mod graph;
pub mod ops;
mod types;

pub use builder::GraphBuilder;
pub use display::dump_graph;
pub use error::GraphError;
pub use graph::{Graph, Node, NodeId, Value, ValueId, ValueKind};
pub use types::{AttrValue, Dimension, ElemType, TensorData, TensorShape};
