//! Extraction of quantization parameters from node operands.

use qfuse_graph::{ElemType, Graph, NodeId};

use crate::MatchFailure;

/// Scale, zero point, and storage type attached to one quantized tensor.
///
/// Two tensors share a quantization encoding exactly when their
/// `QuantParams` compare equal. Scales are compared as exact `f32`
/// values; a pair that differs in the last bit encodes different
/// real-number grids and must not be treated as interchangeable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuantParams {
    /// Real-valued step between adjacent quantized levels.
    pub scale: f32,
    /// Quantized value that represents real zero.
    pub zero_point: i32,
    /// Storage type of the quantized tensor.
    pub ty: ElemType,
}

/// Reads the scale and zero-point operands of a QuantizeLinear or
/// DequantizeLinear node.
///
/// Both operands must be scalar initializers: the scale a single `f32`,
/// the zero point a single `u8` or `i8`. Anything else (a missing
/// operand, a node-produced operand, a per-axis vector, a wide integer
/// zero point) reports a [`MatchFailure`] so the caller can leave the
/// surrounding pattern unfused.
pub fn extract_quant_params(graph: &Graph, id: NodeId) -> Result<QuantParams, MatchFailure> {
    let Some(node) = graph.node(id) else {
        return Err(MatchFailure::PatternMismatch("node is no longer in the graph"));
    };
    if node.inputs.len() != 3 {
        return Err(MatchFailure::NotConstant("scale and zero point operands required"));
    }

    let Some(scale_data) = graph.value(node.inputs[1]).initializer() else {
        return Err(MatchFailure::NotConstant("scale is not an initializer"));
    };
    if scale_data.elem_type() != ElemType::F32 {
        return Err(MatchFailure::UnsupportedType(scale_data.elem_type()));
    }
    let Some(scale) = scale_data.scalar_f32() else {
        return Err(MatchFailure::NotConstant("scale is not a scalar"));
    };

    let Some(zp_data) = graph.value(node.inputs[2]).initializer() else {
        return Err(MatchFailure::NotConstant("zero point is not an initializer"));
    };
    let ty = zp_data.elem_type();
    if !ty.is_quantized() {
        return Err(MatchFailure::UnsupportedType(ty));
    }
    let Some(zero_point) = zp_data.scalar_i32() else {
        return Err(MatchFailure::NotConstant("zero point is not a scalar"));
    };

    Ok(QuantParams { scale, zero_point, ty })
}
