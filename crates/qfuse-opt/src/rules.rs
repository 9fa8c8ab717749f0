//! The table of operators that participate in QDQ fusion.

use std::collections::BTreeMap;

use qfuse_graph::{AttrValue, ops};

/// How a matched region is rewritten.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FusionKind {
    /// The target is replaced by a quantized counterpart operator.
    Replace {
        /// Operator type of the replacement node.
        fused_op: &'static str,
        /// Domain the replacement node lives in.
        fused_domain: &'static str,
    },
    /// The target computes directly on quantized data. The node is kept
    /// and the Q/DQ nodes around it are removed.
    Transparent,
}

/// Describes how one float operator participates in QDQ fusion.
#[derive(Clone, Debug)]
pub struct FusionRule {
    /// Operator type this rule matches.
    pub op_type: &'static str,
    /// Domain the matched operator must live in.
    pub domain: &'static str,
    /// Rewrite strategy for a successful match.
    pub kind: FusionKind,
    /// Input indices that must be fed by a DequantizeLinear node.
    ///
    /// The replacement node built for a `Replace` rule reads only the
    /// quantized operand triples, so a `Replace` rule must cover every
    /// index up to `input_arity`. Partially covered `Replace` rules
    /// never match.
    pub quantized_inputs: &'static [usize],
    /// Exact number of inputs the matched node must have.
    pub input_arity: usize,
    /// Computes the replacement node's attributes from the target's.
    pub map_attributes: fn(&BTreeMap<String, AttrValue>) -> BTreeMap<String, AttrValue>,
}

/// Carries the target's attributes over unchanged.
///
/// Right for every built-in rule: QLinearConv takes the same
/// convolution attributes as Conv, and the remaining fused operators
/// take none.
pub fn copy_attributes(attrs: &BTreeMap<String, AttrValue>) -> BTreeMap<String, AttrValue> {
    attrs.clone()
}

/// The set of fusion rules consulted during a sweep.
#[derive(Debug)]
pub struct FusionRegistry {
    rules: Vec<FusionRule>,
}

impl Default for FusionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FusionRegistry {
    /// Creates a registry with no rules.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Creates the built-in rule set.
    ///
    /// Conv and MatMul fuse to their standard QLinear counterparts.
    /// Add and Mul fuse to contrib-domain QLinear operators. MaxPool,
    /// Reshape, and Transpose move the same bytes whether the tensor is
    /// float or quantized, so they are kept in place and only their
    /// surrounding Q/DQ nodes are removed. Conv is matched at arity 2
    /// only; a Conv with a bias operand would need the bias requantized
    /// to i32 and is left alone.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(FusionRule {
            op_type: ops::CONV,
            domain: ops::ONNX_DOMAIN,
            kind: FusionKind::Replace {
                fused_op: ops::Q_LINEAR_CONV,
                fused_domain: ops::ONNX_DOMAIN,
            },
            quantized_inputs: &[0, 1],
            input_arity: 2,
            map_attributes: copy_attributes,
        });
        registry.register(FusionRule {
            op_type: ops::MAT_MUL,
            domain: ops::ONNX_DOMAIN,
            kind: FusionKind::Replace {
                fused_op: ops::Q_LINEAR_MAT_MUL,
                fused_domain: ops::ONNX_DOMAIN,
            },
            quantized_inputs: &[0, 1],
            input_arity: 2,
            map_attributes: copy_attributes,
        });
        registry.register(FusionRule {
            op_type: ops::ADD,
            domain: ops::ONNX_DOMAIN,
            kind: FusionKind::Replace {
                fused_op: ops::Q_LINEAR_ADD,
                fused_domain: ops::CONTRIB_DOMAIN,
            },
            quantized_inputs: &[0, 1],
            input_arity: 2,
            map_attributes: copy_attributes,
        });
        registry.register(FusionRule {
            op_type: ops::MUL,
            domain: ops::ONNX_DOMAIN,
            kind: FusionKind::Replace {
                fused_op: ops::Q_LINEAR_MUL,
                fused_domain: ops::CONTRIB_DOMAIN,
            },
            quantized_inputs: &[0, 1],
            input_arity: 2,
            map_attributes: copy_attributes,
        });
        registry.register(FusionRule {
            op_type: ops::MAX_POOL,
            domain: ops::ONNX_DOMAIN,
            kind: FusionKind::Transparent,
            quantized_inputs: &[0],
            input_arity: 1,
            map_attributes: copy_attributes,
        });
        registry.register(FusionRule {
            op_type: ops::RESHAPE,
            domain: ops::ONNX_DOMAIN,
            kind: FusionKind::Transparent,
            quantized_inputs: &[0],
            input_arity: 2,
            map_attributes: copy_attributes,
        });
        registry.register(FusionRule {
            op_type: ops::TRANSPOSE,
            domain: ops::ONNX_DOMAIN,
            kind: FusionKind::Transparent,
            quantized_inputs: &[0],
            input_arity: 1,
            map_attributes: copy_attributes,
        });
        registry
    }

    /// Adds a rule to the registry.
    pub fn register(&mut self, rule: FusionRule) {
        self.rules.push(rule);
    }

    /// Finds the rule for an operator, if one is registered.
    pub fn find(&self, op_type: &str, domain: &str) -> Option<&FusionRule> {
        self.rules
            .iter()
            .find(|rule| rule.op_type == op_type && rule.domain == domain)
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the registry has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
