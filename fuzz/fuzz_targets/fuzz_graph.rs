#![no_main]

use std::collections::BTreeMap;

use libfuzzer_sys::fuzz_target;
use qfuse_graph::{ElemType, Graph, NodeId, TensorShape, ValueId, dump_graph};

// Mutation primitives must never panic in any call order. Failed calls
// report an error and leave the graph queryable.
fuzz_target!(|data: &[u8]| {
    let mut graph = Graph::new();
    let mut values = 0u32;
    let mut nodes = 0u32;
    let mut bytes = data.iter().copied();

    while let (Some(op), Some(a), Some(c)) = (bytes.next(), bytes.next(), bytes.next()) {
        match op % 7 {
            0 => {
                let ty = if a % 2 == 0 { ElemType::F32 } else { ElemType::U8 };
                graph.add_value(format!("v{values}"), ty, TensorShape::scalar());
                values += 1;
            }
            1 => {
                graph.add_input(format!("in{values}"), ElemType::F32, TensorShape::fixed(&[c as i64]));
                values += 1;
            }
            2 if values > 0 => {
                let inputs = vec![ValueId(a as u32 % values)];
                let outputs = vec![ValueId(c as u32 % values)];
                if graph
                    .add_node(format!("n{nodes}"), "Op", "", inputs, outputs, BTreeMap::new())
                    .is_ok()
                {
                    nodes += 1;
                }
            }
            3 if values > 0 => {
                let _ = graph.mark_output(ValueId(a as u32 % values));
            }
            4 if nodes > 0 => {
                let _ = graph.remove_node(NodeId(a as u32 % nodes));
            }
            5 if nodes > 0 => {
                let _ = graph.detach_node(NodeId(a as u32 % nodes));
            }
            6 if nodes > 0 && values > 0 => {
                let _ = graph.replace_input(
                    NodeId(a as u32 % nodes),
                    c as usize % 3,
                    ValueId(c as u32 % values),
                );
            }
            _ => {}
        }
    }

    let _ = graph.validate();
    let _ = graph.topological_order();
    let _ = dump_graph(&graph);
});
