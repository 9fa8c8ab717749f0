//! Display implementations and text dump for debugging.

use std::fmt;

use crate::graph::{Graph, NodeId, ValueId, ValueKind};
use crate::types::{AttrValue, Dimension, ElemType, TensorShape};

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32 => write!(f, "f32"),
            Self::U8 => write!(f, "u8"),
            Self::I8 => write!(f, "i8"),
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Symbolic(name) => write!(f, "{name}"),
        }
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "]")
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Ints(vs) => {
                write!(f, "[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Self::Float(v) => write!(f, "{v}"),
            Self::Floats(vs) => {
                write!(f, "[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::Tensor(data) => {
                write!(f, "tensor<{}>({} elem)", data.elem_type(), data.len())
            }
        }
    }
}

fn id_list(ids: &[ValueId]) -> String {
    let parts: Vec<String> = ids.iter().map(|id| format!("{id}")).collect();
    parts.join(", ")
}

/// Produces a human-readable text dump of a [`Graph`] for debugging.
///
/// Nodes are listed in topological order when the graph is acyclic,
/// and in id order otherwise so a broken graph can still be inspected.
pub fn dump_graph(graph: &Graph) -> String {
    let mut out = String::new();

    out.push_str("Values:\n");
    for (id, value) in graph.values() {
        let kind = match &value.kind {
            ValueKind::Input => " (input)",
            ValueKind::Initializer(_) => " (initializer)",
            ValueKind::Internal => "",
        };
        out.push_str(&format!(
            "  {id} {}{} '{}'{kind}\n",
            value.ty, value.shape, value.name
        ));
    }

    let order = graph
        .topological_order()
        .unwrap_or_else(|_| graph.node_ids().collect());

    out.push_str("Nodes:\n");
    for id in order {
        let Some(node) = graph.node(id) else { continue };
        let op = if node.domain.is_empty() {
            node.op_type.clone()
        } else {
            format!("{}.{}", node.domain, node.op_type)
        };
        out.push_str(&format!(
            "  {id} {op}({}) -> {}  [{}]\n",
            id_list(&node.inputs),
            id_list(&node.outputs),
            node.name
        ));
        for (key, attr) in &node.attributes {
            out.push_str(&format!("      {key} = {attr}\n"));
        }
    }

    out.push_str(&format!("Inputs: {}\n", id_list(graph.inputs())));
    out.push_str(&format!("Outputs: {}\n", id_list(graph.outputs())));

    out
}
