//! The QDQ fusion pass.
//!
//! Detects fake-quantization regions where DequantizeLinear nodes feed
//! a float operator whose output is immediately re-quantized, and
//! rewrites each region into a native quantized operator. Operators
//! that move bytes without arithmetic (MaxPool, Reshape, Transpose)
//! are kept in place and only the Q/DQ nodes around them are removed.

use qfuse_graph::{Graph, GraphError, NodeId, ValueId, ops};

use crate::quant::{QuantParams, extract_quant_params};
use crate::rules::{FusionKind, FusionRegistry, FusionRule};
use crate::{GraphPass, MatchFailure, TransformError};

/// One quantized operand of a matched target node.
#[derive(Clone, Copy, Debug)]
struct QuantizedOperand {
    /// Quantized tensor the fused node will read.
    tensor: ValueId,
    /// Scale operand of the feeding DequantizeLinear.
    scale: ValueId,
    /// Zero-point operand of the feeding DequantizeLinear.
    zero_point: ValueId,
    /// Decoded parameters of the operand's encoding.
    params: QuantParams,
    /// The DequantizeLinear node to remove.
    dq: NodeId,
}

/// A fully verified fusion opportunity, ready to rewrite.
struct FusionMatch<'a> {
    rule: &'a FusionRule,
    target: NodeId,
    operands: Vec<QuantizedOperand>,
    out_q: NodeId,
    out_scale: ValueId,
    out_zero_point: ValueId,
    out_params: QuantParams,
    /// Output value of the output quantizer. The rewritten region
    /// produces this exact value, so downstream consumers and graph
    /// outputs keep their wiring.
    fused_output: ValueId,
}

/// Checks that a target input is fed by a removable DequantizeLinear
/// and resolves the quantized tensor the fused node will read instead.
fn match_quantized_input(
    graph: &Graph,
    value: ValueId,
) -> Result<QuantizedOperand, MatchFailure> {
    let Some((dq_id, dq)) = graph.producer_node(value) else {
        return Err(MatchFailure::PatternMismatch(
            "input is not produced by DequantizeLinear",
        ));
    };
    if dq.op_type != ops::DEQUANTIZE_LINEAR || dq.domain != ops::ONNX_DOMAIN {
        return Err(MatchFailure::PatternMismatch(
            "input is not produced by DequantizeLinear",
        ));
    }
    if dq.outputs.len() != 1 {
        return Err(MatchFailure::PatternMismatch(
            "DequantizeLinear has multiple outputs",
        ));
    }
    if graph.consumer_count(value) != 1 {
        return Err(MatchFailure::PatternMismatch(
            "dequantized value has other consumers",
        ));
    }
    if graph.is_graph_output(value) {
        return Err(MatchFailure::PatternMismatch(
            "dequantized value is a graph output",
        ));
    }
    let params = extract_quant_params(graph, dq_id)?;

    let data = dq.inputs[0];
    match graph.producer_node(data) {
        Some((q_id, q))
            if q.op_type == ops::QUANTIZE_LINEAR && q.domain == ops::ONNX_DOMAIN =>
        {
            // Q -> DQ round trip. The pair collapses only if both halves
            // agree exactly and nothing else observes the intermediate.
            if q.outputs.len() != 1 {
                return Err(MatchFailure::PatternMismatch(
                    "QuantizeLinear has multiple outputs",
                ));
            }
            if extract_quant_params(graph, q_id)? != params {
                return Err(MatchFailure::PatternMismatch(
                    "quantize and dequantize parameters differ",
                ));
            }
            if graph.consumer_count(data) != 1 {
                return Err(MatchFailure::PatternMismatch(
                    "quantized value has other consumers",
                ));
            }
            if graph.is_graph_output(data) {
                return Err(MatchFailure::PatternMismatch(
                    "quantized value is a graph output",
                ));
            }
        }
        _ => {
            // Already-quantized data: a weight initializer, a quantized
            // graph input, or the output of a previously fused node.
            // The storage type must be the one the parameters describe.
            if graph.value(data).ty != params.ty {
                return Err(MatchFailure::PatternMismatch(
                    "data element type does not match the zero point",
                ));
            }
        }
    }

    Ok(QuantizedOperand {
        tensor: data,
        scale: dq.inputs[1],
        zero_point: dq.inputs[2],
        params,
        dq: dq_id,
    })
}

/// Tries to match the fusion pattern rooted at one node.
fn match_node<'a>(
    graph: &Graph,
    registry: &'a FusionRegistry,
    id: NodeId,
) -> Result<FusionMatch<'a>, MatchFailure> {
    let Some(node) = graph.node(id) else {
        return Err(MatchFailure::PatternMismatch("node is no longer in the graph"));
    };
    let Some(rule) = registry.find(&node.op_type, &node.domain) else {
        return Err(MatchFailure::NoRule);
    };
    if node.inputs.len() != rule.input_arity {
        return Err(MatchFailure::PatternMismatch("unexpected input count"));
    }
    // A replacement node is assembled from the quantized operand
    // triples alone, so a Replace rule must quantize every input.
    if matches!(rule.kind, FusionKind::Replace { .. })
        && !(0..rule.input_arity).all(|index| rule.quantized_inputs.contains(&index))
    {
        return Err(MatchFailure::PatternMismatch(
            "rule leaves an input of the replaced node unquantized",
        ));
    }
    if node.outputs.len() != 1 {
        return Err(MatchFailure::PatternMismatch("target has multiple outputs"));
    }

    let mut operands = Vec::with_capacity(rule.quantized_inputs.len());
    for &index in rule.quantized_inputs {
        let Some(&input) = node.inputs.get(index) else {
            return Err(MatchFailure::PatternMismatch(
                "rule references an input the node does not have",
            ));
        };
        operands.push(match_quantized_input(graph, input)?);
    }

    let target_out = node.outputs[0];
    if graph.is_graph_output(target_out) {
        return Err(MatchFailure::PatternMismatch("target output is a graph output"));
    }
    let Some((q_id, q)) = graph.sole_consumer(target_out) else {
        return Err(MatchFailure::PatternMismatch(
            "target output is not consumed exactly once",
        ));
    };
    if q.op_type != ops::QUANTIZE_LINEAR || q.domain != ops::ONNX_DOMAIN {
        return Err(MatchFailure::PatternMismatch("target output is not re-quantized"));
    }
    if q.outputs.len() != 1 {
        return Err(MatchFailure::PatternMismatch(
            "QuantizeLinear has multiple outputs",
        ));
    }
    let out_params = extract_quant_params(graph, q_id)?;

    // A transparent operator moves bytes unchanged, so stripping its
    // Q/DQ nodes is only sound when input and output encodings agree.
    if rule.kind == FusionKind::Transparent {
        for operand in &operands {
            if operand.params != out_params {
                return Err(MatchFailure::PatternMismatch(
                    "input and output quantization parameters differ",
                ));
            }
        }
    }

    Ok(FusionMatch {
        rule,
        target: id,
        operands,
        out_q: q_id,
        out_scale: q.inputs[1],
        out_zero_point: q.inputs[2],
        out_params,
        fused_output: q.outputs[0],
    })
}

fn rewrite_error(node: &str, source: GraphError) -> TransformError {
    TransformError::Rewrite { node: node.to_owned(), source }
}

/// Re-checks the wiring the matcher relied on. Rewrites mutate only
/// after this passes, so a failure leaves the graph untouched.
fn check_match_wiring(graph: &Graph, fusion: &FusionMatch<'_>, name: &str) -> Result<(), TransformError> {
    if graph.producer(fusion.fused_output) != Some(fusion.out_q) {
        return Err(rewrite_error(
            name,
            GraphError::InconsistentLink {
                value: graph.value(fusion.fused_output).name.clone(),
                detail: "fused output is not produced by the output quantizer",
            },
        ));
    }
    let Some(target) = graph.node(fusion.target) else {
        return Err(TransformError::Graph(GraphError::UnknownNode { id: fusion.target }));
    };
    let Some(&target_out) = target.outputs.first() else {
        return Err(rewrite_error(
            name,
            GraphError::OperandIndexOutOfRange { node: target.name.clone(), index: 0, arity: 0 },
        ));
    };
    if graph.consumers(target_out) != &[fusion.out_q] {
        return Err(rewrite_error(
            name,
            GraphError::InconsistentLink {
                value: graph.value(target_out).name.clone(),
                detail: "target output is observed outside the matched quantizer",
            },
        ));
    }
    for operand in &fusion.operands {
        let Some(dq) = graph.node(operand.dq) else {
            return Err(TransformError::Graph(GraphError::UnknownNode { id: operand.dq }));
        };
        let Some(&dq_out) = dq.outputs.first() else {
            return Err(rewrite_error(
                name,
                GraphError::OperandIndexOutOfRange { node: dq.name.clone(), index: 0, arity: 0 },
            ));
        };
        if graph.consumers(dq_out) != &[fusion.target] {
            return Err(rewrite_error(
                name,
                GraphError::InconsistentLink {
                    value: graph.value(dq_out).name.clone(),
                    detail: "dequantized value is observed outside the fused region",
                },
            ));
        }
    }
    Ok(())
}

/// Replaces the target and its Q/DQ region with one quantized node.
fn rewrite_replace(
    graph: &mut Graph,
    fusion: FusionMatch<'_>,
    fused_op: &str,
    fused_domain: &str,
) -> Result<(), TransformError> {
    let (name, attributes) = {
        let Some(node) = graph.node(fusion.target) else {
            return Err(TransformError::Graph(GraphError::UnknownNode { id: fusion.target }));
        };
        (node.name.clone(), (fusion.rule.map_attributes)(&node.attributes))
    };
    check_match_wiring(graph, &fusion, &name)?;

    let mut inputs = Vec::with_capacity(fusion.operands.len() * 3 + 2);
    for operand in &fusion.operands {
        inputs.extend([operand.tensor, operand.scale, operand.zero_point]);
    }
    inputs.extend([fusion.out_scale, fusion.out_zero_point]);

    graph
        .detach_node(fusion.target)
        .map_err(|source| rewrite_error(&name, source))?;
    graph
        .detach_node(fusion.out_q)
        .map_err(|source| rewrite_error(&name, source))?;
    for operand in &fusion.operands {
        graph
            .detach_node(operand.dq)
            .map_err(|source| rewrite_error(&name, source))?;
    }
    graph
        .add_node(
            format!("{name}_quant"),
            fused_op,
            fused_domain,
            inputs,
            vec![fusion.fused_output],
            attributes,
        )
        .map_err(|source| rewrite_error(&name, source))?;

    log::debug!("fused '{name}' into {fused_op} ({} output)", fusion.out_params.ty);
    Ok(())
}

/// Keeps the target and strips the Q/DQ nodes around it, rewiring the
/// target to read and produce quantized tensors directly.
fn rewrite_transparent(graph: &mut Graph, fusion: FusionMatch<'_>) -> Result<(), TransformError> {
    let name = match graph.node(fusion.target) {
        Some(node) => node.name.clone(),
        None => {
            return Err(TransformError::Graph(GraphError::UnknownNode { id: fusion.target }));
        }
    };
    check_match_wiring(graph, &fusion, &name)?;

    for (&index, operand) in fusion.rule.quantized_inputs.iter().zip(&fusion.operands) {
        graph
            .replace_input(fusion.target, index, operand.tensor)
            .map_err(|source| rewrite_error(&name, source))?;
        graph
            .detach_node(operand.dq)
            .map_err(|source| rewrite_error(&name, source))?;
    }
    graph
        .detach_node(fusion.out_q)
        .map_err(|source| rewrite_error(&name, source))?;
    graph
        .replace_output(fusion.target, 0, fusion.fused_output)
        .map_err(|source| rewrite_error(&name, source))?;

    log::debug!("removed fake quantization around '{name}'");
    Ok(())
}

fn rewrite(graph: &mut Graph, fusion: FusionMatch<'_>) -> Result<(), TransformError> {
    match fusion.rule.kind {
        FusionKind::Replace { fused_op, fused_domain } => {
            rewrite_replace(graph, fusion, fused_op, fused_domain)
        }
        FusionKind::Transparent => rewrite_transparent(graph, fusion),
    }
}

/// Fuses fake-quantization regions into native quantized operators.
///
/// One run performs a single sweep over the graph in topological
/// order; because earlier rewrites are visible to later candidates,
/// chains such as Conv -> MaxPool -> Reshape collapse in one sweep.
#[derive(Debug)]
pub struct QdqFusion {
    registry: FusionRegistry,
}

impl QdqFusion {
    /// Creates the pass with the built-in fusion rules.
    pub fn new() -> Self {
        Self { registry: FusionRegistry::builtin() }
    }

    /// Creates the pass with a caller-provided rule set.
    pub fn with_registry(registry: FusionRegistry) -> Self {
        Self { registry }
    }
}

impl Default for QdqFusion {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphPass for QdqFusion {
    fn name(&self) -> &str {
        "qdq-fusion"
    }

    fn run(&self, graph: &mut Graph) -> Result<bool, TransformError> {
        let order = graph.topological_order()?;
        let mut fused = 0usize;
        for id in order {
            // Earlier rewrites in this sweep may have removed the node.
            if graph.node(id).is_none() {
                continue;
            }
            match match_node(graph, &self.registry, id) {
                Ok(m) => {
                    rewrite(graph, m)?;
                    fused += 1;
                }
                Err(MatchFailure::NoRule) => {}
                Err(failure) => {
                    if let Some(node) = graph.node(id) {
                        log::debug!("not fusing '{}': {failure}", node.name);
                    }
                }
            }
        }
        if fused > 0 {
            log::debug!("fused {fused} fake-quantization region(s)");
        }
        Ok(fused > 0)
    }
}
