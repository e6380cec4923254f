use std::any::Any;
use std::fmt;

use crate::eval::NodeContext;
use crate::graph::{NodeId, SocketId};
use crate::socket::SocketDefinition;
use crate::value::SocketValue;

/// Signal returned by [`NodeBehavior::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Normal completion, do not loop.
    Complete,
    /// Run this node again in a fresh execution epoch.
    Loop,
    /// Continue only through the output-flow socket at this index.
    Exit(usize),
}

pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Computation attached to a graph node.
///
/// `construct` runs exactly once, right after the node is added, and is the
/// only place a behaviour declares its sockets. `execute` reads inputs through
/// the context, stores outputs, and reports how control continues. Inputs
/// without a producer or default read as [`SocketValue::None`]; a behaviour is
/// expected to fall back to something sensible rather than fail.
pub trait NodeBehavior: AsAny + fmt::Debug {
    fn type_name(&self) -> &'static str;

    fn construct(&self, sockets: &mut SocketBuilder);

    fn execute(&mut self, ctx: &mut NodeContext<'_>, param: &SocketValue) -> Flow;

    fn prepare(&mut self, _param: &SocketValue) {}

    /// Nodes returning true drive their own upstream dependencies from inside
    /// `execute` via [`NodeContext::force_execute_upstream_only`].
    fn will_force_execute(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SocketSlot {
    Input,
    Output,
    InputFlow,
    OutputFlow,
    Variable,
}

/// Socket declarations collected while a behaviour constructs its node.
#[derive(Debug, Default)]
pub struct SocketBuilder {
    pub(crate) pending: Vec<(SocketSlot, Option<usize>, SocketDefinition)>,
}

impl SocketBuilder {
    pub fn add_input(&mut self, definition: SocketDefinition) -> &mut Self {
        self.pending.push((SocketSlot::Input, None, definition));
        self
    }

    pub fn add_output(&mut self, definition: SocketDefinition) -> &mut Self {
        self.pending.push((SocketSlot::Output, None, definition));
        self
    }

    pub fn add_input_flow(&mut self, name: &str) -> &mut Self {
        self.pending
            .push((SocketSlot::InputFlow, None, SocketDefinition::flow(name)));
        self
    }

    pub fn add_output_flow(&mut self, name: &str) -> &mut Self {
        self.pending
            .push((SocketSlot::OutputFlow, None, SocketDefinition::flow(name)));
        self
    }

    pub fn add_variable(&mut self, definition: SocketDefinition) -> &mut Self {
        self.pending.push((SocketSlot::Variable, None, definition));
        self
    }

    pub fn insert_input(&mut self, index: usize, definition: SocketDefinition) -> &mut Self {
        self.pending
            .push((SocketSlot::Input, Some(index), definition));
        self
    }

    pub fn insert_output(&mut self, index: usize, definition: SocketDefinition) -> &mut Self {
        self.pending
            .push((SocketSlot::Output, Some(index), definition));
        self
    }
}

#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub type_name: &'static str,
    pub inputs: Vec<SocketId>,
    pub outputs: Vec<SocketId>,
    pub input_flow: Option<SocketId>,
    pub output_flows: Vec<SocketId>,
    /// Editor placement only.
    pub position: [f32; 2],
    pub(crate) last_execution_context: Option<u64>,
    pub(crate) selected_exit: Option<usize>,
    pub(crate) behavior: Option<Box<dyn NodeBehavior>>,
    pub(crate) next_local_id: u32,
}

impl Node {
    pub(crate) fn new(id: NodeId, name: String, behavior: Box<dyn NodeBehavior>) -> Self {
        Self {
            id,
            name,
            type_name: behavior.type_name(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            input_flow: None,
            output_flows: Vec::new(),
            position: [0.0, 0.0],
            last_execution_context: None,
            selected_exit: None,
            behavior: Some(behavior),
            next_local_id: 0,
        }
    }

    /// Every socket owned by this node, data sockets first.
    pub fn sockets(&self) -> impl Iterator<Item = SocketId> + '_ {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .chain(self.input_flow.iter())
            .chain(self.output_flows.iter())
            .copied()
    }

    pub fn last_execution_context(&self) -> Option<u64> {
        self.last_execution_context
    }

    /// True for nodes that take part in control flow.
    pub fn is_flow_node(&self) -> bool {
        self.input_flow.is_some()
    }

    pub fn behavior(&self) -> Option<&dyn NodeBehavior> {
        self.behavior.as_deref()
    }

    pub fn behavior_as<T: NodeBehavior + 'static>(&self) -> Option<&T> {
        self.behavior
            .as_deref()
            .and_then(|behavior| behavior.as_any().downcast_ref::<T>())
    }

    pub(crate) fn allocate_local_id(&mut self) -> u32 {
        let id = self.next_local_id;
        self.next_local_id += 1;
        id
    }
}
