//! Convenience builder for assembling graphs.
//!
//! Wraps the [`Graph`] primitives with shorthand for the shapes of
//! construction that come up constantly when writing models by hand:
//! fixed-shape inputs, scalar initializers, and quantize/dequantize
//! nodes with their parameter operands created inline.

use std::collections::BTreeMap;

use crate::error::GraphError;
use crate::graph::{Graph, NodeId, ValueId};
use crate::ops;
use crate::types::{AttrValue, ElemType, TensorData, TensorShape};

/// Builds a [`Graph`] incrementally.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: Graph,
}

fn zero_point_data(zero_point: i32, ty: ElemType) -> TensorData {
    match ty {
        ElemType::U8 => TensorData::U8(vec![zero_point as u8]),
        ElemType::I8 => TensorData::I8(vec![zero_point as i8]),
        ElemType::I32 => TensorData::I32(vec![zero_point]),
        ElemType::I64 => TensorData::I64(vec![i64::from(zero_point)]),
        ElemType::F32 => TensorData::F32(vec![zero_point as f32]),
    }
}

impl GraphBuilder {
    /// Creates a builder over an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a graph input with a fixed shape.
    pub fn input(&mut self, name: &str, ty: ElemType, dims: &[i64]) -> ValueId {
        self.graph.add_input(name, ty, TensorShape::fixed(dims))
    }

    /// Registers an `f32` graph input with a fixed shape.
    pub fn float_input(&mut self, name: &str, dims: &[i64]) -> ValueId {
        self.input(name, ElemType::F32, dims)
    }

    /// Registers an internal value with a fixed shape.
    pub fn value(&mut self, name: &str, ty: ElemType, dims: &[i64]) -> ValueId {
        self.graph.add_value(name, ty, TensorShape::fixed(dims))
    }

    /// Registers an initializer with a fixed shape.
    pub fn initializer(&mut self, name: &str, dims: &[i64], data: TensorData) -> ValueId {
        self.graph
            .add_initializer(name, TensorShape::fixed(dims), data)
    }

    /// Registers a rank-0 `f32` initializer.
    pub fn scalar_f32(&mut self, name: &str, value: f32) -> ValueId {
        self.initializer(name, &[], TensorData::F32(vec![value]))
    }

    /// Registers a rank-0 zero-point initializer of the given type.
    pub fn zero_point(&mut self, name: &str, zero_point: i32, ty: ElemType) -> ValueId {
        self.initializer(name, &[], zero_point_data(zero_point, ty))
    }

    /// Marks a value as a graph output.
    pub fn output(&mut self, value: ValueId) -> Result<(), GraphError> {
        self.graph.mark_output(value)
    }

    /// Adds a standard-domain node with no attributes.
    pub fn node(
        &mut self,
        name: &str,
        op_type: &str,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<NodeId, GraphError> {
        self.graph.add_node(
            name,
            op_type,
            ops::ONNX_DOMAIN,
            inputs.to_vec(),
            outputs.to_vec(),
            BTreeMap::new(),
        )
    }

    /// Adds a standard-domain node with attributes.
    pub fn node_with_attrs(
        &mut self,
        name: &str,
        op_type: &str,
        inputs: &[ValueId],
        outputs: &[ValueId],
        attributes: BTreeMap<String, AttrValue>,
    ) -> Result<NodeId, GraphError> {
        self.graph.add_node(
            name,
            op_type,
            ops::ONNX_DOMAIN,
            inputs.to_vec(),
            outputs.to_vec(),
            attributes,
        )
    }

    /// Adds a QuantizeLinear node over `data`, creating the scale and
    /// zero-point initializers inline. Returns the quantized output.
    pub fn quantize_linear(
        &mut self,
        name: &str,
        data: ValueId,
        scale: f32,
        zero_point: i32,
        ty: ElemType,
    ) -> Result<ValueId, GraphError> {
        let scale_v = self.scalar_f32(&format!("{name}_scale"), scale);
        let zp_v = self.zero_point(&format!("{name}_zp"), zero_point, ty);
        let shape = self.graph.value(data).shape.clone();
        let out = self.graph.add_value(format!("{name}_out"), ty, shape);
        self.graph.add_node(
            name,
            ops::QUANTIZE_LINEAR,
            ops::ONNX_DOMAIN,
            vec![data, scale_v, zp_v],
            vec![out],
            BTreeMap::new(),
        )?;
        Ok(out)
    }

    /// Adds a DequantizeLinear node over `data`, creating the scale and
    /// zero-point initializers inline. Returns the float output.
    pub fn dequantize_linear(
        &mut self,
        name: &str,
        data: ValueId,
        scale: f32,
        zero_point: i32,
        ty: ElemType,
    ) -> Result<ValueId, GraphError> {
        let scale_v = self.scalar_f32(&format!("{name}_scale"), scale);
        let zp_v = self.zero_point(&format!("{name}_zp"), zero_point, ty);
        let shape = self.graph.value(data).shape.clone();
        let out = self
            .graph
            .add_value(format!("{name}_out"), ElemType::F32, shape);
        self.graph.add_node(
            name,
            ops::DEQUANTIZE_LINEAR,
            ops::ONNX_DOMAIN,
            vec![data, scale_v, zp_v],
            vec![out],
            BTreeMap::new(),
        )?;
        Ok(out)
    }

    /// Adds a QuantizeLinear/DequantizeLinear pair with identical
    /// parameters over `data`. Returns the dequantized float output.
    pub fn qdq_pair(
        &mut self,
        name: &str,
        data: ValueId,
        scale: f32,
        zero_point: i32,
        ty: ElemType,
    ) -> Result<ValueId, GraphError> {
        let q = self.quantize_linear(&format!("{name}_q"), data, scale, zero_point, ty)?;
        self.dequantize_linear(&format!("{name}_dq"), q, scale, zero_point, ty)
    }

    /// A read-only view of the graph under construction.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Finishes construction and returns the graph.
    pub fn finish(self) -> Graph {
        self.graph
    }
}
