use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::{Node, NodeBehavior, SocketBuilder, SocketSlot};
use crate::registry::NodeRegistry;
use crate::socket::{Connection, Socket, SocketDefinition, SocketRole};
use crate::value::{SocketValue, TypeMask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SocketId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeRejection {
    ProducerNotOutput,
    ConsumerNotInput,
    TypeMismatch,
    ControlMismatch,
    VariableMismatch,
}

impl fmt::Display for EdgeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EdgeRejection::ProducerNotOutput => "producer is not an output",
            EdgeRejection::ConsumerNotInput => "consumer is not an input",
            EdgeRejection::TypeMismatch => "type masks do not overlap",
            EdgeRejection::ControlMismatch => "control flags differ",
            EdgeRejection::VariableMismatch => "variable flags differ",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("node {0:?} does not exist")]
    MissingNode(NodeId),
    #[error("socket {0:?} does not exist")]
    MissingSocket(SocketId),
    #[error("socket {0:?} cannot feed itself")]
    SelfLoop(SocketId),
    #[error("{consumer:?} rejects {producer:?}: {reason}")]
    Rejected {
        producer: SocketId,
        consumer: SocketId,
        reason: EdgeRejection,
    },
    #[error("node {0:?} already has an input flow socket")]
    InputFlowExists(NodeId),
    #[error("unknown node type {0}")]
    UnknownNodeType(String),
}

/// Which way [`Graph::propagate_values`] moves values across edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Push each output's value into every consumer.
    Downstream,
    /// Pull each input's value from its producers.
    Upstream,
}

/// Node arena plus the two edge relations keyed by socket.
///
/// `upstream` maps a consuming socket to its producers and `downstream` maps a
/// producing socket to its consumers; both are kept in lock-step and are
/// ordered by connection time.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: BTreeMap<NodeId, Node>,
    sockets: BTreeMap<SocketId, Socket>,
    upstream: BTreeMap<SocketId, Vec<SocketId>>,
    downstream: BTreeMap<SocketId, Vec<SocketId>>,
    next_node_id: u64,
    next_socket_id: u64,
    pub(crate) next_epoch: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, behavior: Box<dyn NodeBehavior>) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        let mut builder = SocketBuilder::default();
        behavior.construct(&mut builder);
        self.nodes.insert(id, Node::new(id, name.into(), behavior));

        for (slot, index, definition) in builder.pending {
            if let Err(err) = self.attach_socket(id, slot, index, definition) {
                tracing::warn!("node {:?}: socket skipped during construct: {}", id, err);
            }
        }
        tracing::debug!("added node {:?}", id);
        id
    }

    pub fn add_node_from(
        &mut self,
        registry: &NodeRegistry,
        type_name: &str,
        name: impl Into<String>,
    ) -> Result<NodeId, GraphError> {
        let behavior = registry
            .create(type_name)
            .ok_or_else(|| GraphError::UnknownNodeType(type_name.to_string()))?;
        Ok(self.add_node(name, behavior))
    }

    /// Severs every edge touching the node, then releases it and its sockets.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let sockets: Vec<SocketId> = self.nodes.get(&node_id)?.sockets().collect();
        for socket in &sockets {
            self.disconnect_socket(*socket);
            self.sockets.remove(socket);
        }
        tracing::debug!("removed node {:?}", node_id);
        self.nodes.remove(&node_id)
    }

    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|node| node.name == name)
            .map(|node| node.id)
    }

    pub fn set_position(&mut self, node_id: NodeId, position: [f32; 2]) -> bool {
        match self.nodes.get_mut(&node_id) {
            Some(node) => {
                node.position = position;
                true
            }
            None => false,
        }
    }

    pub fn socket(&self, socket_id: SocketId) -> Option<&Socket> {
        self.sockets.get(&socket_id)
    }

    pub fn socket_mut(&mut self, socket_id: SocketId) -> Option<&mut Socket> {
        self.sockets.get_mut(&socket_id)
    }

    pub fn input(&self, node_id: NodeId, index: usize) -> Option<SocketId> {
        self.nodes.get(&node_id)?.inputs.get(index).copied()
    }

    pub fn output(&self, node_id: NodeId, index: usize) -> Option<SocketId> {
        self.nodes.get(&node_id)?.outputs.get(index).copied()
    }

    pub fn find_input(&self, node_id: NodeId, name: &str) -> Option<SocketId> {
        let node = self.nodes.get(&node_id)?;
        self.find_named(&node.inputs, name)
            .or_else(|| node.input_flow.filter(|id| self.has_name(*id, name)))
    }

    pub fn find_output(&self, node_id: NodeId, name: &str) -> Option<SocketId> {
        let node = self.nodes.get(&node_id)?;
        self.find_named(&node.outputs, name)
            .or_else(|| self.find_named(&node.output_flows, name))
    }

    fn find_named(&self, sockets: &[SocketId], name: &str) -> Option<SocketId> {
        sockets.iter().copied().find(|id| self.has_name(*id, name))
    }

    fn has_name(&self, socket_id: SocketId, name: &str) -> bool {
        self.sockets
            .get(&socket_id)
            .map(|socket| socket.name == name)
            .unwrap_or(false)
    }

    pub fn add_input(
        &mut self,
        node_id: NodeId,
        definition: SocketDefinition,
    ) -> Result<SocketId, GraphError> {
        self.attach_socket(node_id, SocketSlot::Input, None, definition)
    }

    pub fn add_output(
        &mut self,
        node_id: NodeId,
        definition: SocketDefinition,
    ) -> Result<SocketId, GraphError> {
        self.attach_socket(node_id, SocketSlot::Output, None, definition)
    }

    pub fn add_variable(
        &mut self,
        node_id: NodeId,
        definition: SocketDefinition,
    ) -> Result<SocketId, GraphError> {
        self.attach_socket(node_id, SocketSlot::Variable, None, definition)
    }

    pub fn add_input_flow(&mut self, node_id: NodeId, name: &str) -> Result<SocketId, GraphError> {
        self.attach_socket(
            node_id,
            SocketSlot::InputFlow,
            None,
            SocketDefinition::flow(name),
        )
    }

    pub fn add_output_flow(&mut self, node_id: NodeId, name: &str) -> Result<SocketId, GraphError> {
        self.attach_socket(
            node_id,
            SocketSlot::OutputFlow,
            None,
            SocketDefinition::flow(name),
        )
    }

    /// Inserts at `index`, clamped to the end of the input list.
    pub fn insert_input(
        &mut self,
        node_id: NodeId,
        index: usize,
        definition: SocketDefinition,
    ) -> Result<SocketId, GraphError> {
        self.attach_socket(node_id, SocketSlot::Input, Some(index), definition)
    }

    pub fn insert_output(
        &mut self,
        node_id: NodeId,
        index: usize,
        definition: SocketDefinition,
    ) -> Result<SocketId, GraphError> {
        self.attach_socket(node_id, SocketSlot::Output, Some(index), definition)
    }

    pub fn insert_output_flow(
        &mut self,
        node_id: NodeId,
        index: usize,
        name: &str,
    ) -> Result<SocketId, GraphError> {
        self.attach_socket(
            node_id,
            SocketSlot::OutputFlow,
            Some(index),
            SocketDefinition::flow(name),
        )
    }

    fn attach_socket(
        &mut self,
        node_id: NodeId,
        slot: SocketSlot,
        index: Option<usize>,
        definition: SocketDefinition,
    ) -> Result<SocketId, GraphError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::MissingNode(node_id))?;
        if slot == SocketSlot::InputFlow && node.input_flow.is_some() {
            return Err(GraphError::InputFlowExists(node_id));
        }

        let id = SocketId(self.next_socket_id);
        self.next_socket_id += 1;
        let local_id = node.allocate_local_id();

        let (role, list) = match slot {
            SocketSlot::Input => (SocketRole::input(), Some(&mut node.inputs)),
            SocketSlot::Variable => (SocketRole::variable(), Some(&mut node.inputs)),
            SocketSlot::Output => (SocketRole::output(), Some(&mut node.outputs)),
            SocketSlot::OutputFlow => (SocketRole::output_flow(), Some(&mut node.output_flows)),
            SocketSlot::InputFlow => (SocketRole::input_flow(), None),
        };
        match list {
            Some(list) => {
                let at = index.unwrap_or(list.len()).min(list.len());
                list.insert(at, id);
            }
            None => node.input_flow = Some(id),
        }

        self.sockets
            .insert(id, Socket::new(id, local_id, node_id, definition, role));
        Ok(id)
    }

    /// Detaches the socket from its node after pruning its edges.
    pub fn remove_socket(&mut self, socket_id: SocketId) -> bool {
        let Some(socket) = self.sockets.get(&socket_id) else {
            return false;
        };
        let node_id = socket.node;
        self.disconnect_socket(socket_id);
        self.sockets.remove(&socket_id);
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.inputs.retain(|id| *id != socket_id);
            node.outputs.retain(|id| *id != socket_id);
            node.output_flows.retain(|id| *id != socket_id);
            if node.input_flow == Some(socket_id) {
                node.input_flow = None;
            }
        }
        true
    }

    /// Changes the accepted kinds. Existing edges are left alone until
    /// [`Graph::validate_connections`] is called.
    pub fn set_socket_type(&mut self, socket_id: SocketId, type_mask: TypeMask) -> bool {
        match self.sockets.get_mut(&socket_id) {
            Some(socket) => {
                socket.type_mask = type_mask;
                true
            }
            None => false,
        }
    }

    pub fn set_default_value(&mut self, socket_id: SocketId, value: SocketValue) -> bool {
        match self.sockets.get_mut(&socket_id) {
            Some(socket) => {
                socket.default_value = value;
                true
            }
            None => false,
        }
    }

    pub fn value(&self, socket_id: SocketId) -> Option<&SocketValue> {
        self.sockets.get(&socket_id).map(Socket::value)
    }

    pub fn store_value(&mut self, socket_id: SocketId, value: SocketValue) -> bool {
        match self.sockets.get_mut(&socket_id) {
            Some(socket) => {
                socket.store_value(value);
                true
            }
            None => false,
        }
    }

    pub fn try_connect(&mut self, producer: SocketId, consumer: SocketId) -> Result<(), GraphError> {
        if producer == consumer {
            return Err(GraphError::SelfLoop(producer));
        }
        let from = self
            .sockets
            .get(&producer)
            .ok_or(GraphError::MissingSocket(producer))?;
        let to = self
            .sockets
            .get(&consumer)
            .ok_or(GraphError::MissingSocket(consumer))?;

        if !to.accept_edge(from) {
            return Err(GraphError::Rejected {
                producer,
                consumer,
                reason: rejection_reason(from, to),
            });
        }

        let producers = self.upstream.entry(consumer).or_default();
        if producers.contains(&producer) {
            return Ok(());
        }
        producers.push(producer);
        self.downstream.entry(producer).or_default().push(consumer);
        tracing::debug!("connected {:?} -> {:?}", producer, consumer);
        Ok(())
    }

    /// Boolean form of [`Graph::try_connect`]; a rejected edge leaves both
    /// relations untouched.
    pub fn connect(&mut self, producer: SocketId, consumer: SocketId) -> bool {
        match self.try_connect(producer, consumer) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!("connect rejected: {}", err);
                false
            }
        }
    }

    pub fn disconnect(&mut self, producer: SocketId, consumer: SocketId) -> bool {
        let removed = remove_from(&mut self.upstream, consumer, producer);
        remove_from(&mut self.downstream, producer, consumer);
        removed
    }

    /// Removes every edge touching the socket; returns how many were cut.
    pub fn disconnect_socket(&mut self, socket_id: SocketId) -> usize {
        let connections = self.socket_connections(socket_id);
        for connection in &connections {
            self.disconnect(connection.producer, connection.consumer);
        }
        connections.len()
    }

    pub fn producers(&self, socket_id: SocketId) -> &[SocketId] {
        self.upstream
            .get(&socket_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn consumers(&self, socket_id: SocketId) -> &[SocketId] {
        self.downstream
            .get(&socket_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_connected(&self, producer: SocketId, consumer: SocketId) -> bool {
        self.producers(consumer).contains(&producer)
    }

    /// Every edge where the socket is either endpoint.
    pub fn socket_connections(&self, socket_id: SocketId) -> Vec<Connection> {
        let mut connections: Vec<Connection> = self
            .producers(socket_id)
            .iter()
            .map(|producer| Connection::new(*producer, socket_id))
            .collect();
        connections.extend(
            self.consumers(socket_id)
                .iter()
                .map(|consumer| Connection::new(socket_id, *consumer)),
        );
        connections
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.upstream
            .iter()
            .flat_map(|(consumer, producers)| {
                producers
                    .iter()
                    .map(move |producer| Connection::new(*producer, *consumer))
            })
            .collect()
    }

    /// Re-checks every edge on the socket. Returns false if any edge no longer
    /// passes `accept_edge`; with `disconnect` set those edges are also removed.
    pub fn validate_connections(&mut self, socket_id: SocketId, disconnect: bool) -> bool {
        let mut valid = true;
        for connection in self.socket_connections(socket_id) {
            if self.edge_accepted(connection) {
                continue;
            }
            valid = false;
            tracing::warn!(
                "invalid edge {:?} -> {:?}",
                connection.producer,
                connection.consumer
            );
            if disconnect {
                self.disconnect(connection.producer, connection.consumer);
            }
        }
        valid
    }

    pub fn validate_all_connections(&mut self, disconnect: bool) -> bool {
        let sockets: Vec<SocketId> = self.upstream.keys().copied().collect();
        let mut valid = true;
        for socket in sockets {
            valid &= self.validate_connections(socket, disconnect);
        }
        valid
    }

    fn edge_accepted(&self, connection: Connection) -> bool {
        match (
            self.sockets.get(&connection.producer),
            self.sockets.get(&connection.consumer),
        ) {
            (Some(producer), Some(consumer)) => consumer.accept_edge(producer),
            _ => false,
        }
    }

    /// Snapshot of every edge touching any socket of the node.
    pub fn node_connections(&self, node_id: NodeId) -> Vec<Connection> {
        let Some(node) = self.nodes.get(&node_id) else {
            return Vec::new();
        };
        let mut connections: Vec<Connection> = node
            .sockets()
            .flat_map(|socket| self.socket_connections(socket))
            .collect();
        connections.sort();
        connections.dedup();
        connections
    }

    /// Reconnects a snapshot taken by [`Graph::node_connections`]. Edges whose
    /// endpoints are gone or no longer compatible are skipped.
    pub fn restore_connections(&mut self, connections: &[Connection]) -> usize {
        connections
            .iter()
            .filter(|connection| self.connect(connection.producer, connection.consumer))
            .count()
    }

    pub fn upstream_nodes(&self, node_id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(&node_id) else {
            return Vec::new();
        };
        let mut nodes = Vec::new();
        for socket in node.sockets() {
            for producer in self.producers(socket) {
                if let Some(owner) = self.sockets.get(producer).map(|s| s.node) {
                    if !nodes.contains(&owner) {
                        nodes.push(owner);
                    }
                }
            }
        }
        nodes
    }

    pub fn downstream_nodes(&self, node_id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(&node_id) else {
            return Vec::new();
        };
        let mut nodes = Vec::new();
        for socket in node.sockets() {
            for consumer in self.consumers(socket) {
                if let Some(owner) = self.sockets.get(consumer).map(|s| s.node) {
                    if !nodes.contains(&owner) {
                        nodes.push(owner);
                    }
                }
            }
        }
        nodes
    }

    /// Moves values across the node's edges. Pulling upstream, the last
    /// connected producer of an input wins. Pushing downstream overwrites the
    /// consumer, so the producer that pushes last wins.
    pub fn propagate_values(&mut self, node_id: NodeId, direction: Propagation) {
        let Some(node) = self.nodes.get(&node_id) else {
            return;
        };
        let sockets: Vec<SocketId> = node.sockets().collect();

        let mut transfers = Vec::new();
        for socket_id in sockets {
            let Some(socket) = self.sockets.get(&socket_id) else {
                continue;
            };
            if socket.role.control {
                continue;
            }
            match direction {
                Propagation::Downstream if socket.role.output => {
                    for consumer in self.consumers(socket_id) {
                        transfers.push((*consumer, socket.value().clone()));
                    }
                }
                Propagation::Upstream if socket.role.input => {
                    for producer in self.producers(socket_id) {
                        if let Some(value) = self.value(*producer) {
                            transfers.push((socket_id, value.clone()));
                        }
                    }
                }
                _ => {}
            }
        }

        for (target, value) in transfers {
            if let Some(socket) = self.sockets.get_mut(&target) {
                socket.store_value(value);
            }
        }
    }

    /// Forgets which epoch each node last ran in and drops stored values.
    pub fn reset_execution_state(&mut self) {
        for node in self.nodes.values_mut() {
            node.last_execution_context = None;
            node.selected_exit = None;
        }
        for socket in self.sockets.values_mut() {
            socket.clear_value();
        }
    }
}

fn rejection_reason(producer: &Socket, consumer: &Socket) -> EdgeRejection {
    if !producer.role.output {
        EdgeRejection::ProducerNotOutput
    } else if !consumer.role.input {
        EdgeRejection::ConsumerNotInput
    } else if !consumer.type_mask.intersects(producer.type_mask) {
        EdgeRejection::TypeMismatch
    } else if consumer.role.control != producer.role.control {
        EdgeRejection::ControlMismatch
    } else {
        EdgeRejection::VariableMismatch
    }
}

fn remove_from(map: &mut BTreeMap<SocketId, Vec<SocketId>>, key: SocketId, value: SocketId) -> bool {
    let Some(list) = map.get_mut(&key) else {
        return false;
    };
    let before = list.len();
    list.retain(|id| *id != value);
    let removed = list.len() != before;
    if list.is_empty() {
        map.remove(&key);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::NodeContext;
    use crate::node::Flow;

    #[derive(Debug)]
    struct Passthrough {
        input_type: TypeMask,
        output_type: TypeMask,
    }

    impl NodeBehavior for Passthrough {
        fn type_name(&self) -> &'static str {
            "Passthrough"
        }

        fn construct(&self, sockets: &mut SocketBuilder) {
            sockets
                .add_input(SocketDefinition::new("in", self.input_type))
                .add_output(SocketDefinition::new("out", self.output_type));
        }

        fn execute(&mut self, _ctx: &mut NodeContext<'_>, _param: &SocketValue) -> Flow {
            Flow::Complete
        }
    }

    fn passthrough(graph: &mut Graph, name: &str, input: TypeMask, output: TypeMask) -> NodeId {
        graph.add_node(
            name,
            Box::new(Passthrough {
                input_type: input,
                output_type: output,
            }),
        )
    }

    #[test]
    fn construct_populates_sockets() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::FLOAT);
        let node = graph.node(a).expect("node");
        assert_eq!(node.inputs.len(), 1);
        assert_eq!(node.outputs.len(), 1);
        let input = graph.socket(node.inputs[0]).expect("socket");
        let output = graph.socket(node.outputs[0]).expect("socket");
        assert_ne!(input.local_id, output.local_id);
        assert!(input.is_input() && !input.is_output());
    }

    #[test]
    fn connect_records_both_relations() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::FLOAT);
        let b = passthrough(&mut graph, "b", TypeMask::FLOAT, TypeMask::FLOAT);
        let out = graph.output(a, 0).unwrap();
        let input = graph.input(b, 0).unwrap();

        assert!(graph.connect(out, input));
        assert_eq!(graph.producers(input), &[out]);
        assert_eq!(graph.consumers(out), &[input]);

        assert!(graph.connect(out, input));
        assert_eq!(graph.producers(input).len(), 1);
    }

    #[test]
    fn connect_rejects_incompatible_edges_without_side_effects() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::STRING);
        let b = passthrough(&mut graph, "b", TypeMask::FLOAT, TypeMask::FLOAT);
        let out = graph.output(a, 0).unwrap();
        let input = graph.input(b, 0).unwrap();

        assert_eq!(
            graph.try_connect(out, input),
            Err(GraphError::Rejected {
                producer: out,
                consumer: input,
                reason: EdgeRejection::TypeMismatch,
            })
        );
        assert!(!graph.connect(input, out));
        assert!(graph.connections().is_empty());
        assert!(graph.producers(input).is_empty());
        assert!(graph.consumers(out).is_empty());
    }

    #[test]
    fn role_flags_must_match() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::ANY, TypeMask::ANY);
        let b = passthrough(&mut graph, "b", TypeMask::ANY, TypeMask::ANY);
        let flow_out = graph.add_output_flow(a, "then").unwrap();
        let variable = graph
            .add_variable(a, SocketDefinition::new("v", TypeMask::ANY))
            .unwrap();
        let data_in = graph.input(b, 0).unwrap();
        let flow_in = graph.add_input_flow(b, "exec").unwrap();

        assert!(!graph.connect(flow_out, data_in));
        assert!(!graph.connect(variable, data_in));
        assert!(graph.connect(flow_out, flow_in));
        assert!(matches!(
            graph.add_input_flow(b, "again"),
            Err(GraphError::InputFlowExists(_))
        ));
    }

    #[test]
    fn self_loop_rejected_but_node_cycles_allowed() {
        let mut graph = Graph::new();
        let v = passthrough(&mut graph, "v", TypeMask::ANY, TypeMask::ANY);
        let variable = graph
            .add_variable(v, SocketDefinition::new("x", TypeMask::FLOAT))
            .unwrap();
        assert_eq!(
            graph.try_connect(variable, variable),
            Err(GraphError::SelfLoop(variable))
        );

        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::FLOAT);
        let b = passthrough(&mut graph, "b", TypeMask::FLOAT, TypeMask::FLOAT);
        assert!(graph.connect(graph.output(a, 0).unwrap(), graph.input(b, 0).unwrap()));
        assert!(graph.connect(graph.output(b, 0).unwrap(), graph.input(a, 0).unwrap()));
    }

    #[test]
    fn disconnect_is_noop_when_absent() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::FLOAT);
        let b = passthrough(&mut graph, "b", TypeMask::FLOAT, TypeMask::FLOAT);
        let out = graph.output(a, 0).unwrap();
        let input = graph.input(b, 0).unwrap();
        assert!(!graph.disconnect(out, input));
        graph.connect(out, input);
        assert!(graph.disconnect(out, input));
        assert!(graph.connections().is_empty());
    }

    #[test]
    fn remove_node_prunes_edges() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::FLOAT);
        let b = passthrough(&mut graph, "b", TypeMask::FLOAT, TypeMask::FLOAT);
        let c = passthrough(&mut graph, "c", TypeMask::FLOAT, TypeMask::FLOAT);
        let a_out = graph.output(a, 0).unwrap();
        let b_in = graph.input(b, 0).unwrap();
        let b_out = graph.output(b, 0).unwrap();
        let c_in = graph.input(c, 0).unwrap();
        graph.connect(a_out, b_in);
        graph.connect(b_out, c_in);

        assert!(graph.remove_node(b).is_some());
        assert!(graph.connections().is_empty());
        assert!(graph.consumers(a_out).is_empty());
        assert!(graph.socket(b_in).is_none());
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn snapshot_and_restore_round_trip() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::FLOAT);
        let b = passthrough(&mut graph, "b", TypeMask::FLOAT, TypeMask::FLOAT);
        let c = passthrough(&mut graph, "c", TypeMask::FLOAT, TypeMask::FLOAT);
        graph.connect(graph.output(a, 0).unwrap(), graph.input(b, 0).unwrap());
        graph.connect(graph.output(b, 0).unwrap(), graph.input(c, 0).unwrap());

        let snapshot = graph.node_connections(b);
        assert_eq!(snapshot.len(), 2);
        for socket in graph.node(b).unwrap().sockets().collect::<Vec<_>>() {
            graph.disconnect_socket(socket);
        }
        assert!(graph.connections().is_empty());

        assert_eq!(graph.restore_connections(&snapshot), 2);
        assert_eq!(graph.node_connections(b), snapshot);
    }

    #[test]
    fn validate_connections_detects_and_optionally_prunes() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::FLOAT);
        let b = passthrough(&mut graph, "b", TypeMask::FLOAT, TypeMask::FLOAT);
        let out = graph.output(a, 0).unwrap();
        let input = graph.input(b, 0).unwrap();
        graph.connect(out, input);
        assert!(graph.validate_connections(input, true));

        graph.set_socket_type(input, TypeMask::STRING);
        assert!(!graph.validate_connections(input, false));
        assert!(graph.is_connected(out, input));
        assert!(!graph.validate_connections(input, true));
        assert!(!graph.is_connected(out, input));
        assert!(graph.validate_connections(input, true));
    }

    #[test]
    fn propagate_moves_values_both_ways() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::FLOAT);
        let b = passthrough(&mut graph, "b", TypeMask::FLOAT, TypeMask::FLOAT);
        let out = graph.output(a, 0).unwrap();
        let input = graph.input(b, 0).unwrap();
        graph.connect(out, input);

        graph.store_value(out, SocketValue::Float(4.0));
        graph.propagate_values(a, Propagation::Downstream);
        assert_eq!(graph.value(input), Some(&SocketValue::Float(4.0)));

        graph.store_value(out, SocketValue::Float(9.0));
        graph.propagate_values(b, Propagation::Upstream);
        assert_eq!(graph.value(input), Some(&SocketValue::Float(9.0)));
    }

    #[test]
    fn last_connected_producer_wins() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::FLOAT);
        let b = passthrough(&mut graph, "b", TypeMask::FLOAT, TypeMask::FLOAT);
        let c = passthrough(&mut graph, "c", TypeMask::FLOAT, TypeMask::FLOAT);
        let input = graph.input(c, 0).unwrap();
        let a_out = graph.output(a, 0).unwrap();
        let b_out = graph.output(b, 0).unwrap();
        graph.connect(a_out, input);
        graph.connect(b_out, input);
        graph.store_value(a_out, SocketValue::Float(1.0));
        graph.store_value(b_out, SocketValue::Float(2.0));

        graph.propagate_values(c, Propagation::Upstream);
        assert_eq!(graph.value(input), Some(&SocketValue::Float(2.0)));
    }

    #[test]
    fn insert_and_remove_sockets() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::FLOAT);
        let first = graph.input(a, 0).unwrap();
        let inserted = graph
            .insert_input(a, 0, SocketDefinition::new("front", TypeMask::INT))
            .unwrap();
        assert_eq!(graph.input(a, 0), Some(inserted));
        assert_eq!(graph.input(a, 1), Some(first));
        assert_eq!(graph.find_input(a, "front"), Some(inserted));

        assert!(graph.remove_socket(inserted));
        assert_eq!(graph.node(a).unwrap().inputs, vec![first]);
        assert!(!graph.remove_socket(inserted));
    }

    #[test]
    fn last_pushed_producer_wins_downstream() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::FLOAT);
        let b = passthrough(&mut graph, "b", TypeMask::FLOAT, TypeMask::FLOAT);
        let c = passthrough(&mut graph, "c", TypeMask::FLOAT, TypeMask::FLOAT);
        let input = graph.input(c, 0).unwrap();
        let a_out = graph.output(a, 0).unwrap();
        let b_out = graph.output(b, 0).unwrap();
        graph.connect(a_out, input);
        graph.connect(b_out, input);
        graph.store_value(a_out, SocketValue::Float(1.0));
        graph.store_value(b_out, SocketValue::Float(2.0));

        graph.propagate_values(b, Propagation::Downstream);
        graph.propagate_values(a, Propagation::Downstream);
        assert_eq!(graph.value(input), Some(&SocketValue::Float(1.0)));
    }

    #[test]
    fn neighbours_are_listed_once() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::FLOAT);
        let b = passthrough(&mut graph, "b", TypeMask::FLOAT, TypeMask::FLOAT);
        let c = passthrough(&mut graph, "c", TypeMask::FLOAT, TypeMask::FLOAT);
        let extra = graph
            .add_input(b, SocketDefinition::new("extra", TypeMask::FLOAT))
            .unwrap();
        let a_out = graph.output(a, 0).unwrap();
        graph.connect(a_out, graph.input(b, 0).unwrap());
        graph.connect(a_out, extra);
        graph.connect(a_out, graph.input(c, 0).unwrap());

        assert_eq!(graph.downstream_nodes(a), vec![b, c]);
        assert_eq!(graph.upstream_nodes(b), vec![a]);
        assert!(graph.downstream_nodes(c).is_empty());
    }

    #[test]
    fn validate_all_connections_sweeps_every_input() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::FLOAT);
        let b = passthrough(&mut graph, "b", TypeMask::FLOAT, TypeMask::FLOAT);
        let c = passthrough(&mut graph, "c", TypeMask::FLOAT, TypeMask::FLOAT);
        let a_out = graph.output(a, 0).unwrap();
        let b_in = graph.input(b, 0).unwrap();
        let c_in = graph.input(c, 0).unwrap();
        graph.connect(a_out, b_in);
        graph.connect(a_out, c_in);
        assert!(graph.validate_all_connections(false));

        graph.set_socket_type(c_in, TypeMask::STRING);
        assert!(!graph.validate_all_connections(true));
        assert!(graph.is_connected(a_out, b_in));
        assert!(!graph.is_connected(a_out, c_in));
        assert!(graph.validate_all_connections(false));
    }

    #[test]
    fn reset_execution_state_clears_values_and_epochs() {
        let mut graph = Graph::new();
        let a = passthrough(&mut graph, "a", TypeMask::FLOAT, TypeMask::FLOAT);
        let out = graph.output(a, 0).unwrap();
        graph.store_value(out, SocketValue::Float(3.0));
        graph.node_mut(a).unwrap().last_execution_context = Some(4);

        graph.reset_execution_state();
        assert_eq!(graph.value(out), Some(&SocketValue::None));
        assert_eq!(graph.node(a).unwrap().last_execution_context, None);
    }
}
