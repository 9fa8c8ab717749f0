mod common;

use std::collections::BTreeMap;

use qfuse_graph::{AttrValue, ElemType, Graph, GraphBuilder, TensorData, ValueId, ops};

fn assert_conv_fused(graph: &Graph, y_q: ValueId) {
    assert_eq!(graph.count_ops(ops::Q_LINEAR_CONV), 1);
    assert_eq!(graph.count_ops(ops::CONV), 0);
    assert_eq!(common::qdq_counts(graph), (1, 0));
    assert_eq!(graph.outputs(), &[y_q]);

    let (_, fused) = graph.producer_node(y_q).unwrap();
    assert_eq!(fused.op_type, ops::Q_LINEAR_CONV);
    assert_eq!(fused.domain, ops::ONNX_DOMAIN);
    assert_eq!(fused.inputs.len(), 8);
}

#[test]
fn qlinearconv_1d() {
    let (mut graph, y_q) = common::conv_qdq_model(&[1, 12, 37], &[32, 12, 5], &[1, 32, 33]);
    assert!(common::fuse(&mut graph));
    assert_conv_fused(&graph, y_q);
}

#[test]
fn qlinearconv_2d() {
    let (mut graph, y_q) =
        common::conv_qdq_model(&[1, 23, 13, 13], &[30, 23, 3, 3], &[1, 30, 11, 11]);
    assert!(common::fuse(&mut graph));
    assert_conv_fused(&graph, y_q);

    // Operand order: activation triple, weight triple, output pair.
    let (_, fused) = graph.producer_node(y_q).unwrap();
    let (_, input_q) = graph.producer_node(fused.inputs[0]).unwrap();
    assert_eq!(input_q.op_type, ops::QUANTIZE_LINEAR);
    assert!(graph.value(fused.inputs[3]).initializer().is_some());
}

#[test]
fn qlinearconv_3d() {
    let (mut graph, y_q) =
        common::conv_qdq_model(&[1, 22, 11, 13, 15], &[30, 22, 5, 3, 3], &[1, 30, 7, 11, 13]);
    assert!(common::fuse(&mut graph));
    assert_conv_fused(&graph, y_q);
}

#[test]
fn qlinearmatmul_with_quantized_weight() {
    let mut b = GraphBuilder::new();
    let a = b.float_input("a", &[4, 16]);
    let a_dq = b.qdq_pair("a", a, 0.004, 129, ElemType::U8).unwrap();
    let w = b.initializer("w", &[16, 8], TensorData::U8(vec![118; 128]));
    let w_dq = b.dequantize_linear("w", w, 0.003, 118, ElemType::U8).unwrap();
    let y = b.value("y", ElemType::F32, &[4, 8]);
    b.node("matmul", ops::MAT_MUL, &[a_dq, w_dq], &[y]).unwrap();
    let y_q = b.quantize_linear("output", y, 0.0039, 135, ElemType::U8).unwrap();
    b.output(y_q).unwrap();
    let mut graph = b.finish();

    assert!(common::fuse(&mut graph));
    assert_eq!(graph.count_ops(ops::Q_LINEAR_MAT_MUL), 1);
    assert_eq!(graph.count_ops(ops::MAT_MUL), 0);
    assert_eq!(common::qdq_counts(&graph), (1, 0));

    let (_, fused) = graph.producer_node(y_q).unwrap();
    assert_eq!(fused.domain, ops::ONNX_DOMAIN);
    assert_eq!(fused.inputs.len(), 8);
}

#[test]
fn qlinearmatmul_between_two_activations() {
    let (mut graph, y_q) = common::binary_qdq_model(ops::MAT_MUL);
    assert!(common::fuse(&mut graph));

    assert_eq!(graph.count_ops(ops::Q_LINEAR_MAT_MUL), 1);
    assert_eq!(graph.count_ops(ops::MAT_MUL), 0);
    // Both input-side quantizers keep supplying the integer operands.
    assert_eq!(common::qdq_counts(&graph), (2, 0));

    let (_, fused) = graph.producer_node(y_q).unwrap();
    assert_eq!(fused.domain, ops::ONNX_DOMAIN);
}

#[test]
fn qlinearmatmul_with_signed_storage() {
    let mut b = GraphBuilder::new();
    let a = b.float_input("a", &[4, 16]);
    let a_dq = b.qdq_pair("a", a, 0.004, -3, ElemType::I8).unwrap();
    let w = b.initializer("w", &[16, 8], TensorData::I8(vec![-18; 128]));
    let w_dq = b.dequantize_linear("w", w, 0.003, 0, ElemType::I8).unwrap();
    let y = b.value("y", ElemType::F32, &[4, 8]);
    b.node("matmul", ops::MAT_MUL, &[a_dq, w_dq], &[y]).unwrap();
    let y_q = b.quantize_linear("output", y, 0.0039, 5, ElemType::I8).unwrap();
    b.output(y_q).unwrap();
    let mut graph = b.finish();

    assert!(common::fuse(&mut graph));
    assert_eq!(graph.count_ops(ops::Q_LINEAR_MAT_MUL), 1);
    assert_eq!(graph.count_ops(ops::MAT_MUL), 0);
    assert_eq!(common::qdq_counts(&graph), (1, 0));

    // Signed storage survives the rewrite end to end.
    let (_, fused) = graph.producer_node(y_q).unwrap();
    assert_eq!(fused.inputs.len(), 8);
    assert_eq!(graph.value(fused.inputs[0]).ty, ElemType::I8);
    assert_eq!(
        graph.value(fused.inputs[2]).initializer(),
        Some(&TensorData::I8(vec![-3]))
    );
    assert_eq!(graph.value(y_q).ty, ElemType::I8);
}

#[test]
fn qlinearadd_in_contrib_domain() {
    let (mut graph, y_q) = common::binary_qdq_model(ops::ADD);
    assert!(common::fuse(&mut graph));

    assert_eq!(graph.count_ops(ops::Q_LINEAR_ADD), 1);
    assert_eq!(graph.count_ops(ops::ADD), 0);
    // Both input-side quantizers survive to feed the fused node.
    assert_eq!(common::qdq_counts(&graph), (2, 0));

    let (_, fused) = graph.producer_node(y_q).unwrap();
    assert_eq!(fused.domain, ops::CONTRIB_DOMAIN);
    assert_eq!(fused.inputs.len(), 8);
}

#[test]
fn qlinearmul_in_contrib_domain() {
    let (mut graph, y_q) = common::binary_qdq_model(ops::MUL);
    assert!(common::fuse(&mut graph));

    assert_eq!(graph.count_ops(ops::Q_LINEAR_MUL), 1);
    assert_eq!(graph.count_ops(ops::MUL), 0);
    assert_eq!(common::qdq_counts(&graph), (2, 0));

    let (_, fused) = graph.producer_node(y_q).unwrap();
    assert_eq!(fused.domain, ops::CONTRIB_DOMAIN);
}

#[test]
fn transpose_is_stripped_in_place() {
    let mut b = GraphBuilder::new();
    let x = b.float_input("x", &[2, 3, 4]);
    let x_dq = b.qdq_pair("x", x, 0.004, 129, ElemType::U8).unwrap();
    let y = b.value("y", ElemType::F32, &[4, 3, 2]);
    let mut attrs = BTreeMap::new();
    attrs.insert("perm".to_string(), AttrValue::Ints(vec![2, 1, 0]));
    b.node_with_attrs("transpose", ops::TRANSPOSE, &[x_dq], &[y], attrs).unwrap();
    let y_q = b.quantize_linear("output", y, 0.004, 129, ElemType::U8).unwrap();
    b.output(y_q).unwrap();
    let mut graph = b.finish();

    assert!(common::fuse(&mut graph));
    assert_eq!(graph.count_ops(ops::TRANSPOSE), 1);
    assert_eq!(common::qdq_counts(&graph), (1, 0));

    let (_, transpose) = graph.producer_node(y_q).unwrap();
    assert_eq!(transpose.op_type, ops::TRANSPOSE);
    assert!(transpose.attributes.contains_key("perm"));
}

#[test]
fn conv_maxpool_reshape_chain_collapses_in_one_sweep() {
    let mut b = GraphBuilder::new();
    let x = b.float_input("input", &[1, 23, 13, 13]);
    let x_dq = b.qdq_pair("input", x, 0.004, 129, ElemType::U8).unwrap();
    let w = b.initializer("weight", &[30, 23, 3, 3], TensorData::U8(vec![118; 6210]));
    let w_dq = b.dequantize_linear("weight", w, 0.003, 118, ElemType::U8).unwrap();
    let y = b.value("conv_out", ElemType::F32, &[1, 30, 11, 11]);
    b.node("conv", ops::CONV, &[x_dq, w_dq], &[y]).unwrap();
    let y_q = b.quantize_linear("conv_q", y, 0.0039, 135, ElemType::U8).unwrap();
    let y_dq = b.dequantize_linear("conv_dq", y_q, 0.0039, 135, ElemType::U8).unwrap();

    let p = b.value("pool_out", ElemType::F32, &[1, 30, 9, 9]);
    let mut pool_attrs = BTreeMap::new();
    pool_attrs.insert("kernel_shape".to_string(), AttrValue::Ints(vec![3, 3]));
    b.node_with_attrs("pool", ops::MAX_POOL, &[y_dq], &[p], pool_attrs).unwrap();
    let p_q = b.quantize_linear("pool_q", p, 0.0039, 135, ElemType::U8).unwrap();
    let p_dq = b.dequantize_linear("pool_dq", p_q, 0.0039, 135, ElemType::U8).unwrap();

    let shape = b.initializer("shape", &[2], TensorData::I64(vec![1, 2430]));
    let r = b.value("reshape_out", ElemType::F32, &[1, 2430]);
    b.node("reshape", ops::RESHAPE, &[p_dq, shape], &[r]).unwrap();
    let r_q = b.quantize_linear("output", r, 0.0039, 135, ElemType::U8).unwrap();
    b.output(r_q).unwrap();
    let mut graph = b.finish();

    assert!(common::fuse(&mut graph));
    assert_eq!(graph.count_ops(ops::Q_LINEAR_CONV), 1);
    assert_eq!(graph.count_ops(ops::MAX_POOL), 1);
    assert_eq!(graph.count_ops(ops::RESHAPE), 1);
    assert_eq!(common::qdq_counts(&graph), (1, 0));
    assert_eq!(graph.outputs(), &[r_q]);

    // The surviving operators pass the quantized tensor straight through.
    let (_, reshape) = graph.producer_node(r_q).unwrap();
    assert_eq!(reshape.op_type, ops::RESHAPE);
    let (_, pool) = graph.producer_node(reshape.inputs[0]).unwrap();
    assert_eq!(pool.op_type, ops::MAX_POOL);
    let (_, conv) = graph.producer_node(pool.inputs[0]).unwrap();
    assert_eq!(conv.op_type, ops::Q_LINEAR_CONV);
}
