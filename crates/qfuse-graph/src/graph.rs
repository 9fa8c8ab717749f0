//! The tensor computation graph.
//!
//! A DAG of operator nodes over named tensor values. Every edge is kept
//! two-sided: each value records its producing node and its consuming
//! nodes, and each node records its input and output values. All
//! mutation goes through [`Graph`] primitives so the two sides never
//! drift apart.
//!
//! Node slots are tombstoned on removal, so a [`NodeId`] stays stable
//! for the lifetime of the graph and never gets reused. Values are
//! never deleted; a value with no producer and no consumers is a dead
//! record.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::GraphError;
use crate::types::{AttrValue, ElemType, TensorData, TensorShape};

/// A unique identifier for a node in the graph.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeId(pub u32);

/// A unique identifier for a tensor value in the graph.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ValueId(pub u32);

/// How a value receives its contents.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    /// Supplied by the caller at execution time.
    Input,
    /// A compile-time constant embedded in the graph.
    Initializer(TensorData),
    /// Produced by a node (or dead, if nothing produces it).
    Internal,
}

/// A tensor value flowing between nodes.
#[derive(Clone, Debug)]
pub struct Value {
    /// Human-readable name.
    pub name: String,
    /// Element type.
    pub ty: ElemType,
    /// Shape (may contain symbolic dimensions).
    pub shape: TensorShape,
    /// Where the contents come from.
    pub kind: ValueKind,
    pub(crate) producer: Option<NodeId>,
    pub(crate) consumers: Vec<NodeId>,
}

impl Value {
    /// The node producing this value, if any.
    pub fn producer(&self) -> Option<NodeId> {
        self.producer
    }

    /// Nodes consuming this value. A node consuming it through two
    /// operand slots appears twice.
    pub fn consumers(&self) -> &[NodeId] {
        &self.consumers
    }

    /// The constant contents, if this value is an initializer.
    pub fn initializer(&self) -> Option<&TensorData> {
        match &self.kind {
            ValueKind::Initializer(data) => Some(data),
            _ => None,
        }
    }
}

/// An operator node in the graph.
#[derive(Clone, Debug)]
pub struct Node {
    /// Human-readable name.
    pub name: String,
    /// Operator type, e.g. `"Conv"` or `"QuantizeLinear"`.
    pub op_type: String,
    /// Operator set domain. The standard domain is the empty string.
    pub domain: String,
    /// Input values (ordered).
    pub inputs: Vec<ValueId>,
    /// Output values (ordered).
    pub outputs: Vec<ValueId>,
    /// Attributes, keyed by name.
    pub attributes: BTreeMap<String, AttrValue>,
}

/// A computation graph: operator nodes over tensor values.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    values: Vec<Value>,
    inputs: Vec<ValueId>,
    outputs: Vec<ValueId>,
}

impl Graph {
    /// Creates a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    fn push_value(
        &mut self,
        name: impl Into<String>,
        ty: ElemType,
        shape: TensorShape,
        kind: ValueKind,
    ) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(Value {
            name: name.into(),
            ty,
            shape,
            kind,
            producer: None,
            consumers: Vec::new(),
        });
        id
    }

    /// Registers an internal value and returns its id.
    pub fn add_value(
        &mut self,
        name: impl Into<String>,
        ty: ElemType,
        shape: TensorShape,
    ) -> ValueId {
        self.push_value(name, ty, shape, ValueKind::Internal)
    }

    /// Registers a graph input value and returns its id.
    pub fn add_input(
        &mut self,
        name: impl Into<String>,
        ty: ElemType,
        shape: TensorShape,
    ) -> ValueId {
        let id = self.push_value(name, ty, shape, ValueKind::Input);
        self.inputs.push(id);
        id
    }

    /// Registers an initializer value holding `data` and returns its id.
    ///
    /// The element type is taken from the data buffer.
    pub fn add_initializer(
        &mut self,
        name: impl Into<String>,
        shape: TensorShape,
        data: TensorData,
    ) -> ValueId {
        let ty = data.elem_type();
        self.push_value(name, ty, shape, ValueKind::Initializer(data))
    }

    /// Marks a value as a graph output.
    pub fn mark_output(&mut self, value: ValueId) -> Result<(), GraphError> {
        if value.0 as usize >= self.values.len() {
            return Err(GraphError::UnknownValue { id: value });
        }
        self.outputs.push(value);
        Ok(())
    }

    /// Adds a node and wires it to its operand values.
    ///
    /// Fails without modifying the graph if any operand id is
    /// unregistered or any output value already has a producer.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        op_type: impl Into<String>,
        domain: impl Into<String>,
        inputs: Vec<ValueId>,
        outputs: Vec<ValueId>,
        attributes: BTreeMap<String, AttrValue>,
    ) -> Result<NodeId, GraphError> {
        let name = name.into();

        for &v in inputs.iter().chain(outputs.iter()) {
            if v.0 as usize >= self.values.len() {
                return Err(GraphError::UnknownValue { id: v });
            }
        }
        for (i, &out) in outputs.iter().enumerate() {
            if let Some(existing) = self.values[out.0 as usize].producer {
                return Err(GraphError::DuplicateProducer {
                    value: self.values[out.0 as usize].name.clone(),
                    existing: self.node_name(existing),
                    adding: name,
                });
            }
            if outputs[..i].contains(&out) {
                return Err(GraphError::DuplicateProducer {
                    value: self.values[out.0 as usize].name.clone(),
                    existing: name.clone(),
                    adding: name,
                });
            }
        }

        let id = NodeId(self.nodes.len() as u32);
        for &v in &inputs {
            self.values[v.0 as usize].consumers.push(id);
        }
        for &out in &outputs {
            self.values[out.0 as usize].producer = Some(id);
        }
        self.nodes.push(Some(Node {
            name,
            op_type: op_type.into(),
            domain: domain.into(),
            inputs,
            outputs,
            attributes,
        }));
        Ok(id)
    }

    /// Removes a node whose outputs are no longer in use.
    ///
    /// Fails with [`GraphError::ConsumersRemain`] if any output value
    /// still has consumers or is a graph output.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        {
            let node = self.node(id).ok_or(GraphError::UnknownNode { id })?;
            for &out in &node.outputs {
                let value = &self.values[out.0 as usize];
                let uses = value.consumers.len() + usize::from(self.outputs.contains(&out));
                if uses > 0 {
                    return Err(GraphError::ConsumersRemain {
                        node: node.name.clone(),
                        value: value.name.clone(),
                        count: uses,
                    });
                }
            }
        }
        self.detach_node(id)
    }

    /// Unconditionally unwires a node from every value it touches and
    /// tombstones its slot.
    ///
    /// Output values lose their producer even if they still have
    /// consumers; the caller is responsible for restoring
    /// well-formedness before handing the graph on.
    pub fn detach_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .ok_or(GraphError::UnknownNode { id })?;

        for &v in &node.inputs {
            let consumers = &mut self.values[v.0 as usize].consumers;
            if let Some(pos) = consumers.iter().position(|&c| c == id) {
                consumers.remove(pos);
            }
        }
        for &out in &node.outputs {
            self.values[out.0 as usize].producer = None;
        }
        Ok(())
    }

    /// Rewires one input slot of a node to a different value.
    pub fn replace_input(
        &mut self,
        node_id: NodeId,
        index: usize,
        value: ValueId,
    ) -> Result<(), GraphError> {
        if value.0 as usize >= self.values.len() {
            return Err(GraphError::UnknownValue { id: value });
        }
        let node = self
            .nodes
            .get_mut(node_id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(GraphError::UnknownNode { id: node_id })?;
        let arity = node.inputs.len();
        if index >= arity {
            return Err(GraphError::OperandIndexOutOfRange {
                node: node.name.clone(),
                index,
                arity,
            });
        }
        let old = node.inputs[index];
        node.inputs[index] = value;

        let consumers = &mut self.values[old.0 as usize].consumers;
        if let Some(pos) = consumers.iter().position(|&c| c == node_id) {
            consumers.remove(pos);
        }
        self.values[value.0 as usize].consumers.push(node_id);
        Ok(())
    }

    /// Rewires one output slot of a node to a different value.
    ///
    /// The new value must not already have a producer. The old value
    /// keeps its consumers and becomes producer-less.
    pub fn replace_output(
        &mut self,
        node_id: NodeId,
        index: usize,
        value: ValueId,
    ) -> Result<(), GraphError> {
        if value.0 as usize >= self.values.len() {
            return Err(GraphError::UnknownValue { id: value });
        }
        let node = self.node(node_id).ok_or(GraphError::UnknownNode { id: node_id })?;
        if index >= node.outputs.len() {
            return Err(GraphError::OperandIndexOutOfRange {
                node: node.name.clone(),
                index,
                arity: node.outputs.len(),
            });
        }
        let old = node.outputs[index];
        if old == value {
            return Ok(());
        }
        if let Some(existing) = self.values[value.0 as usize].producer {
            return Err(GraphError::DuplicateProducer {
                value: self.values[value.0 as usize].name.clone(),
                existing: self.node_name(existing),
                adding: node.name.clone(),
            });
        }

        if let Some(node) = self.nodes[node_id.0 as usize].as_mut() {
            node.outputs[index] = value;
        }
        self.values[old.0 as usize].producer = None;
        self.values[value.0 as usize].producer = Some(node_id);
        Ok(())
    }

    /// Looks up a live node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn node_name(&self, id: NodeId) -> String {
        match self.node(id) {
            Some(node) => node.name.clone(),
            None => format!("{id}"),
        }
    }

    /// Looks up a value.
    ///
    /// # Panics
    ///
    /// Panics if the id was not issued by this graph. Values are never
    /// deleted, so any issued id stays valid.
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.0 as usize]
    }

    /// The node producing a value, if any.
    pub fn producer(&self, value: ValueId) -> Option<NodeId> {
        self.value(value).producer
    }

    /// The producing node together with its id, if the value has one.
    pub fn producer_node(&self, value: ValueId) -> Option<(NodeId, &Node)> {
        let id = self.value(value).producer?;
        self.node(id).map(|node| (id, node))
    }

    /// Nodes consuming a value, with multiplicity.
    pub fn consumers(&self, value: ValueId) -> &[NodeId] {
        &self.value(value).consumers
    }

    /// Number of consuming operand slots. Does not count graph outputs.
    pub fn consumer_count(&self, value: ValueId) -> usize {
        self.value(value).consumers.len()
    }

    /// The single consuming node, if the value feeds exactly one
    /// operand slot of one live node.
    pub fn sole_consumer(&self, value: ValueId) -> Option<(NodeId, &Node)> {
        let consumers = self.consumers(value);
        if consumers.len() != 1 {
            return None;
        }
        let id = consumers[0];
        self.node(id).map(|node| (id, node))
    }

    /// Whether a value is listed as a graph output.
    pub fn is_graph_output(&self, value: ValueId) -> bool {
        self.outputs.contains(&value)
    }

    /// Graph input values, in registration order.
    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    /// Graph output values, in registration order.
    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    /// Ids of all live nodes, in id order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| NodeId(i as u32)))
    }

    /// All live nodes with their ids, in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|node| (NodeId(i as u32), node)))
    }

    /// All values with their ids, in id order.
    pub fn values(&self) -> impl Iterator<Item = (ValueId, &Value)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, value)| (ValueId(i as u32), value))
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    /// Number of registered values, dead records included.
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Number of live nodes with the given operator type, any domain.
    pub fn count_ops(&self, op_type: &str) -> usize {
        self.nodes().filter(|(_, node)| node.op_type == op_type).count()
    }

    /// Returns live node ids in topological order.
    ///
    /// The ordering is deterministic: among ready nodes, the smallest
    /// [`NodeId`] is emitted first.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut live = 0usize;
        for (id, node) in self.nodes() {
            live += 1;
            for &input in &node.inputs {
                if let Some(p) = self.values[input.0 as usize].producer
                    && self.node(p).is_some()
                {
                    in_degree[id.0 as usize] += 1;
                }
            }
        }

        let mut ready: BTreeSet<NodeId> = self
            .node_ids()
            .filter(|id| in_degree[id.0 as usize] == 0)
            .collect();
        let mut order = Vec::with_capacity(live);

        while let Some(&id) = ready.iter().next() {
            ready.remove(&id);
            order.push(id);

            let Some(node) = self.node(id) else { continue };
            for &out in &node.outputs {
                for &c in &self.values[out.0 as usize].consumers {
                    let ci = c.0 as usize;
                    if self.node(c).is_none() || in_degree[ci] == 0 {
                        continue;
                    }
                    in_degree[ci] -= 1;
                    if in_degree[ci] == 0 {
                        ready.insert(c);
                    }
                }
            }
        }

        if order.len() != live {
            return Err(GraphError::Cycle {
                visited: order.len(),
                total: live,
            });
        }
        Ok(order)
    }

    /// Checks the graph's structural invariants.
    ///
    /// Verifies that every operand reference resolves, producer and
    /// consumer links mirror the node operand lists exactly, inputs and
    /// initializers have no producer, initializer buffers match their
    /// declared type, every graph output is resolvable, and the graph
    /// is acyclic. Returns the first violation found.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (id, node) in self.nodes() {
            for &v in node.inputs.iter().chain(node.outputs.iter()) {
                if v.0 as usize >= self.values.len() {
                    return Err(GraphError::UnknownValue { id: v });
                }
            }
            for &out in &node.outputs {
                if self.values[out.0 as usize].producer != Some(id) {
                    return Err(GraphError::InconsistentLink {
                        value: self.values[out.0 as usize].name.clone(),
                        detail: "output value does not link back to its producing node",
                    });
                }
            }
        }

        let mut seen: Vec<Vec<NodeId>> = vec![Vec::new(); self.values.len()];
        for (id, node) in self.nodes() {
            for &v in &node.inputs {
                seen[v.0 as usize].push(id);
            }
        }

        for (i, value) in self.values.iter().enumerate() {
            if let Some(p) = value.producer {
                let Some(node) = self.node(p) else {
                    return Err(GraphError::InconsistentLink {
                        value: value.name.clone(),
                        detail: "producer is not a live node",
                    });
                };
                if !node.outputs.contains(&ValueId(i as u32)) {
                    return Err(GraphError::InconsistentLink {
                        value: value.name.clone(),
                        detail: "producer does not list the value as an output",
                    });
                }
                if !matches!(value.kind, ValueKind::Internal) {
                    return Err(GraphError::InconsistentLink {
                        value: value.name.clone(),
                        detail: "inputs and initializers must not have a producer",
                    });
                }
            }
            if let ValueKind::Initializer(data) = &value.kind
                && data.elem_type() != value.ty
            {
                return Err(GraphError::TypeMismatch {
                    value: value.name.clone(),
                    expected: value.ty,
                    found: data.elem_type(),
                });
            }

            let mut stored = value.consumers.clone();
            stored.sort();
            let mut actual = std::mem::take(&mut seen[i]);
            actual.sort();
            if stored != actual {
                return Err(GraphError::InconsistentLink {
                    value: value.name.clone(),
                    detail: "consumer list does not mirror node inputs",
                });
            }

            if !value.consumers.is_empty()
                && value.producer.is_none()
                && matches!(value.kind, ValueKind::Internal)
            {
                return Err(GraphError::MissingProducer {
                    value: value.name.clone(),
                });
            }
        }

        for &v in self.inputs.iter().chain(self.outputs.iter()) {
            if v.0 as usize >= self.values.len() {
                return Err(GraphError::UnknownValue { id: v });
            }
        }
        for &out in &self.outputs {
            let value = &self.values[out.0 as usize];
            if value.producer.is_none() && matches!(value.kind, ValueKind::Internal) {
                return Err(GraphError::MissingProducer {
                    value: value.name.clone(),
                });
            }
        }

        self.topological_order().map(|_| ())
    }
}
