use qfuse_graph::{ElemType, Graph, GraphBuilder, TensorData, ValueId, ops};
use qfuse_opt::{GraphPass, QdqFusion};

/// Run one QDQ fusion sweep and validate the resulting graph.
#[allow(dead_code)]
pub fn fuse(graph: &mut Graph) -> bool {
    let changed = QdqFusion::new().run(graph).expect("fusion pass failed");
    graph.validate().expect("fused graph failed validation");
    changed
}

/// Count (QuantizeLinear, DequantizeLinear) nodes.
#[allow(dead_code)]
pub fn qdq_counts(graph: &Graph) -> (usize, usize) {
    (
        graph.count_ops(ops::QUANTIZE_LINEAR),
        graph.count_ops(ops::DEQUANTIZE_LINEAR),
    )
}

/// Build the layout fake-quantization training tools emit around a
/// convolution: the activation goes through a Q/DQ pair, the weight is
/// a quantized initializer behind a DequantizeLinear, and the float
/// output is re-quantized into the graph output.
#[allow(dead_code)]
pub fn conv_qdq_model(x_dims: &[i64], w_dims: &[i64], y_dims: &[i64]) -> (Graph, ValueId) {
    let mut b = GraphBuilder::new();
    let x = b.float_input("input", x_dims);
    let x_dq = b
        .qdq_pair("input", x, 0.004, 129, ElemType::U8)
        .expect("graph construction failed");
    let w_len = w_dims.iter().product::<i64>() as usize;
    let w = b.initializer("weight", w_dims, TensorData::U8(vec![118; w_len]));
    let w_dq = b
        .dequantize_linear("weight", w, 0.003, 118, ElemType::U8)
        .expect("graph construction failed");
    let y = b.value("conv_out", ElemType::F32, y_dims);
    b.node("conv", ops::CONV, &[x_dq, w_dq], &[y])
        .expect("graph construction failed");
    let y_q = b
        .quantize_linear("output", y, 0.0039, 135, ElemType::U8)
        .expect("graph construction failed");
    b.output(y_q).expect("graph construction failed");
    (b.finish(), y_q)
}

/// Build a fake-quantized elementwise binary operator over two
/// activations. Both inputs keep their own quantization parameters.
#[allow(dead_code)]
pub fn binary_qdq_model(op: &str) -> (Graph, ValueId) {
    let mut b = GraphBuilder::new();
    let a = b.float_input("a", &[1, 8, 8]);
    let a_dq = b
        .qdq_pair("a", a, 0.004, 129, ElemType::U8)
        .expect("graph construction failed");
    let c = b.float_input("b", &[1, 8, 8]);
    let c_dq = b
        .qdq_pair("b", c, 0.005, 127, ElemType::U8)
        .expect("graph construction failed");
    let y = b.value("result", ElemType::F32, &[1, 8, 8]);
    b.node("binop", op, &[a_dq, c_dq], &[y])
        .expect("graph construction failed");
    let y_q = b
        .quantize_linear("output", y, 0.0039, 135, ElemType::U8)
        .expect("graph construction failed");
    b.output(y_q).expect("graph construction failed");
    (b.finish(), y_q)
}
