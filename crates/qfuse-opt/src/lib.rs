//! Graph optimization passes for quantized-operator fusion.
//!
//! Provides a [`GraphPass`] trait, a [`PassManager`] with fixed-point
//! iteration, and the built-in QDQ fusion pass that rewrites
//! QuantizeLinear/DequantizeLinear fake-quantization regions into
//! native quantized operators.

pub mod qdq;
pub mod quant;
pub mod rules;

pub use qdq::QdqFusion;
pub use quant::{QuantParams, extract_quant_params};
pub use rules::{FusionKind, FusionRegistry, FusionRule};

use std::fmt::{self, Debug};

use qfuse_graph::{ElemType, Graph, GraphError};

/// Why a candidate node was left alone.
///
/// These are expected control-flow outcomes of matching, not errors:
/// a sweep reports them per node and moves on. The node and its
/// surroundings are untouched in every case.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchFailure {
    /// No fusion rule is registered for the node's operator.
    NoRule,
    /// The nodes around the candidate do not form the expected shape.
    PatternMismatch(&'static str),
    /// A scale or zero-point operand cannot be read at rewrite time.
    NotConstant(&'static str),
    /// A zero-point or scale operand has a type the fuser does not handle.
    UnsupportedType(ElemType),
}

impl fmt::Display for MatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRule => f.write_str("no fusion rule for operator"),
            Self::PatternMismatch(reason) => write!(f, "pattern mismatch: {reason}"),
            Self::NotConstant(what) => write!(f, "not a compile-time constant: {what}"),
            Self::UnsupportedType(ty) => write!(f, "unsupported parameter type {ty}"),
        }
    }
}

/// Hard failure while rewriting a matched region.
///
/// Raised when the graph contradicts what the matcher established,
/// which means a bug rather than an unfusable model. The rewriter
/// checks before mutating, so the graph is left as it was.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Rewrite-time consistency check failed at a node.
    #[error("inconsistent rewrite at node '{node}': {source}")]
    Rewrite {
        /// Name of the node being rewritten.
        node: String,
        /// The underlying graph inconsistency.
        source: GraphError,
    },
    /// A graph query failed before any rewrite began.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// An optimization pass that transforms a graph.
pub trait GraphPass: Debug {
    /// Human-readable name of the pass.
    fn name(&self) -> &str;

    /// Runs the pass on a graph. Returns `true` if anything was modified.
    fn run(&self, graph: &mut Graph) -> Result<bool, TransformError>;
}

/// Maximum number of fixed-point iterations before giving up.
const MAX_ITERATIONS: usize = 10;

/// Runs passes in sequence with fixed-point iteration.
pub struct PassManager {
    passes: Vec<Box<dyn GraphPass>>,
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PassManager {
    /// Creates an empty pass manager with no passes.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Creates a pass manager with the built-in passes.
    pub fn with_default_passes() -> Self {
        let mut pm = Self::new();
        pm.add_pass(Box::new(QdqFusion::new()));
        pm
    }

    /// Adds a pass to the pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn GraphPass>) {
        self.passes.push(pass);
    }

    /// Runs all passes until a fixed point is reached or the iteration
    /// limit. Returns `true` if any pass modified the graph.
    pub fn run(&self, graph: &mut Graph) -> Result<bool, TransformError> {
        let mut changed_any = false;
        for iteration in 0..MAX_ITERATIONS {
            let mut changed = false;
            for pass in &self.passes {
                if pass.run(graph)? {
                    log::debug!("pass '{}' modified the graph (iteration {iteration})", pass.name());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            changed_any = true;
        }
        Ok(changed_any)
    }
}

/// Convenience function: runs the built-in passes to fixpoint.
pub fn optimize(graph: &mut Graph) -> Result<bool, TransformError> {
    PassManager::with_default_passes().run(graph)
}
