#![no_main]

use libfuzzer_sys::fuzz_target;
use qfuse_graph::{ElemType, Graph, GraphBuilder, TensorData, ops};
use qfuse_opt::{GraphPass, QdqFusion};

fn scale_for(byte: u8) -> f32 {
    (byte as f32 + 1.0) / 256.0
}

/// Builds a well-formed model whose mix of fake-quantized and plain
/// float stages is driven by the input bytes.
fn build_graph(data: &[u8]) -> Graph {
    let mut b = GraphBuilder::new();
    let mut cursor = b.float_input("x", &[1, 4, 8, 8]);
    let mut bytes = data.iter().copied();
    let mut i = 0usize;
    while let (Some(op), Some(p)) = (bytes.next(), bytes.next()) {
        if i >= 64 {
            break;
        }
        match op % 4 {
            0 => {
                let dq = b
                    .qdq_pair(&format!("s{i}"), cursor, scale_for(p), p as i32, ElemType::U8)
                    .unwrap();
                let y = b.value(&format!("pool{i}_out"), ElemType::F32, &[1, 4, 8, 8]);
                b.node(&format!("pool{i}"), ops::MAX_POOL, &[dq], &[y]).unwrap();
                cursor = y;
            }
            1 => {
                let dq = b
                    .qdq_pair(&format!("s{i}"), cursor, scale_for(p), p as i32, ElemType::U8)
                    .unwrap();
                let w = b.initializer(&format!("w{i}"), &[4, 4, 1, 1], TensorData::U8(vec![p; 16]));
                let w_dq = b
                    .dequantize_linear(&format!("w{i}"), w, scale_for(p.wrapping_add(7)), 128, ElemType::U8)
                    .unwrap();
                let y = b.value(&format!("conv{i}_out"), ElemType::F32, &[1, 4, 8, 8]);
                b.node(&format!("conv{i}"), ops::CONV, &[dq, w_dq], &[y]).unwrap();
                cursor = y;
            }
            2 => {
                let lhs = b
                    .qdq_pair(&format!("l{i}"), cursor, scale_for(p), p as i32, ElemType::U8)
                    .unwrap();
                let rhs_in = b.float_input(&format!("in{i}"), &[1, 4, 8, 8]);
                let rhs = b
                    .qdq_pair(&format!("r{i}"), rhs_in, scale_for(p.wrapping_mul(3)), 128, ElemType::U8)
                    .unwrap();
                let y = b.value(&format!("add{i}_out"), ElemType::F32, &[1, 4, 8, 8]);
                b.node(&format!("add{i}"), ops::ADD, &[lhs, rhs], &[y]).unwrap();
                cursor = y;
            }
            _ => {
                let y = b.value(&format!("relu{i}_out"), ElemType::F32, &[1, 4, 8, 8]);
                b.node(&format!("relu{i}"), "Relu", &[cursor], &[y]).unwrap();
                cursor = y;
            }
        }
        i += 1;
    }
    let out = b.quantize_linear("out", cursor, 0.02, 128, ElemType::U8).unwrap();
    b.output(out).unwrap();
    b.finish()
}

fuzz_target!(|data: &[u8]| {
    let mut graph = build_graph(data);
    graph.validate().unwrap();

    // Fusion must never hard-fail or corrupt a well-formed graph, and a
    // second sweep must find nothing left to do.
    let pass = QdqFusion::new();
    pass.run(&mut graph).unwrap();
    graph.validate().unwrap();
    assert!(!pass.run(&mut graph).unwrap());
});
