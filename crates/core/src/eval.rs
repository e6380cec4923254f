//! Execution walks over a [`Graph`].
//!
//! Three strategies share one de-duplication rule: a node remembers the epoch
//! it last ran in and is skipped when asked to run again in the same epoch.
//! A node returning [`Flow::Loop`] advances the epoch and runs again, which
//! lets everything it depends on run once more in the new pass.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

use crate::graph::{Graph, GraphError, NodeId, Propagation, SocketId};
use crate::node::{Flow, Node};
use crate::project::ExecutionSettings;
use crate::value::SocketValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Pull: producers run before their consumers.
    Upstream,
    /// Push: a node runs, then everything it feeds.
    Downstream,
    /// Control flow pushes, data is pulled on demand.
    Hybrid,
}

#[derive(Debug, Clone, Default)]
pub struct EvalNodeReport {
    pub node: Option<NodeId>,
    pub runs: u32,
    pub duration_ms: f32,
}

#[derive(Debug, Clone, Default)]
pub struct EvalReport {
    /// Every execution in order, repeats included.
    pub executed: Vec<NodeId>,
    pub node_reports: BTreeMap<NodeId, EvalNodeReport>,
    pub loop_passes: u32,
    pub loop_limit_hits: Vec<NodeId>,
    pub final_epoch: u64,
}

impl EvalReport {
    pub fn runs(&self, node: NodeId) -> u32 {
        self.node_reports
            .get(&node)
            .map(|report| report.runs)
            .unwrap_or(0)
    }
}

/// Mutable execution epoch shared by one traversal.
#[derive(Debug)]
pub struct ExecutionContext {
    pub epoch: u64,
    mode: ExecutionMode,
    max_loop_passes: u32,
    report: EvalReport,
}

impl ExecutionContext {
    pub fn new(epoch: u64, mode: ExecutionMode, settings: &ExecutionSettings) -> Self {
        Self {
            epoch,
            mode,
            max_loop_passes: settings.max_loop_passes.max(1),
            report: EvalReport::default(),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn report(&self) -> &EvalReport {
        &self.report
    }

    fn record(&mut self, node: NodeId, elapsed: Duration) {
        self.report.executed.push(node);
        let entry = self.report.node_reports.entry(node).or_default();
        entry.node = Some(node);
        entry.runs += 1;
        entry.duration_ms += elapsed.as_secs_f32() * 1000.0;
    }
}

/// What a behaviour sees of the graph while it executes.
pub struct NodeContext<'a> {
    graph: &'a mut Graph,
    node: NodeId,
    exec: &'a mut ExecutionContext,
    param: &'a SocketValue,
}

impl<'a> NodeContext<'a> {
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn epoch(&self) -> u64 {
        self.exec.epoch
    }

    pub fn graph(&self) -> &Graph {
        &*self.graph
    }

    pub fn input_count(&self) -> usize {
        self.graph
            .node(self.node)
            .map(|node| node.inputs.len())
            .unwrap_or(0)
    }

    pub fn output_count(&self) -> usize {
        self.graph
            .node(self.node)
            .map(|node| node.outputs.len())
            .unwrap_or(0)
    }

    /// Value of the input at `index`; [`SocketValue::None`] when absent.
    pub fn input(&self, index: usize) -> SocketValue {
        self.graph
            .input(self.node, index)
            .and_then(|socket| self.graph.value(socket))
            .cloned()
            .unwrap_or_default()
    }

    pub fn input_named(&self, name: &str) -> SocketValue {
        self.graph
            .find_input(self.node, name)
            .and_then(|socket| self.graph.value(socket))
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_output(&mut self, index: usize, value: impl Into<SocketValue>) -> bool {
        match self.graph.output(self.node, index) {
            Some(socket) => self.graph.store_value(socket, value.into()),
            None => false,
        }
    }

    pub fn set_output_named(&mut self, name: &str, value: impl Into<SocketValue>) -> bool {
        match self.graph.find_output(self.node, name) {
            Some(socket) => self.graph.store_value(socket, value.into()),
            None => false,
        }
    }

    /// Picks the output-flow socket control continues through.
    pub fn select_exit(&mut self, index: usize) {
        if let Some(node) = self.graph.node_mut(self.node) {
            node.selected_exit = Some(index);
        }
    }

    /// Runs every producer feeding this node's inputs and pulls their values.
    /// Meant for nodes overriding `will_force_execute`.
    pub fn force_execute_upstream_only(&mut self) {
        let eager_flow = self.exec.mode == ExecutionMode::Hybrid;
        self.graph
            .pull_inputs(self.node, self.exec, self.param, eager_flow, None);
    }

    /// Like [`NodeContext::force_execute_upstream_only`] for a single input.
    pub fn force_execute_input(&mut self, index: usize) -> SocketValue {
        let eager_flow = self.exec.mode == ExecutionMode::Hybrid;
        if let Some(socket) = self.graph.input(self.node, index) {
            self.graph
                .pull_inputs(self.node, self.exec, self.param, eager_flow, Some(socket));
        }
        self.input(index)
    }
}

/// Read-only walk used by inspection tooling.
pub trait GraphVisitor {
    fn visit(&mut self, node: &Node, depth: usize);

    fn depth_push(&mut self) {}

    fn depth_pop(&mut self) {}
}

impl Graph {
    /// Calls every behaviour's `prepare` hook before a traversal.
    pub fn prepare(&mut self, param: &SocketValue) {
        let ids: Vec<NodeId> = self.nodes().map(|node| node.id).collect();
        for id in ids {
            if let Some(behavior) = self.node_mut(id).and_then(|node| node.behavior.as_mut()) {
                behavior.prepare(param);
            }
        }
    }

    /// Starts a traversal in an epoch no node has seen yet.
    pub fn begin_execution(
        &mut self,
        mode: ExecutionMode,
        settings: &ExecutionSettings,
    ) -> ExecutionContext {
        ExecutionContext::new(self.next_epoch, mode, settings)
    }

    pub fn finish_execution(&mut self, ctx: ExecutionContext) -> EvalReport {
        self.next_epoch = self.next_epoch.max(ctx.epoch + 1);
        let mut report = ctx.report;
        report.final_epoch = ctx.epoch;
        report
    }

    /// Prepare, execute from `node_id` with the chosen strategy, and report.
    pub fn run(
        &mut self,
        node_id: NodeId,
        mode: ExecutionMode,
        param: &SocketValue,
        settings: &ExecutionSettings,
    ) -> Result<EvalReport, GraphError> {
        if self.node(node_id).is_none() {
            return Err(GraphError::MissingNode(node_id));
        }
        self.prepare(param);
        let mut ctx = self.begin_execution(mode, settings);
        let start = Instant::now();
        let flow = match mode {
            ExecutionMode::Upstream => self.execute_upstream(node_id, &mut ctx, param),
            ExecutionMode::Downstream => self.execute_downstream(node_id, &mut ctx, param),
            ExecutionMode::Hybrid => self.execute_hybrid(node_id, &mut ctx, param),
        };
        let report = self.finish_execution(ctx);
        tracing::info!(
            "{:?} run from {:?}: {} executions, {} loop passes, {:.2} ms, {:?}",
            mode,
            node_id,
            report.executed.len(),
            report.loop_passes,
            start.elapsed().as_secs_f32() * 1000.0,
            flow
        );
        Ok(report)
    }

    /// Runs every upstream producer first, then the node itself.
    pub fn execute_upstream(
        &mut self,
        node_id: NodeId,
        ctx: &mut ExecutionContext,
        param: &SocketValue,
    ) -> Flow {
        self.upstream_walk(node_id, ctx, param, false)
    }

    /// Runs the node, pushes its outputs, then continues into its consumers.
    pub fn execute_downstream(
        &mut self,
        node_id: NodeId,
        ctx: &mut ExecutionContext,
        param: &SocketValue,
    ) -> Flow {
        if !self.enter(node_id, ctx) {
            return Flow::Complete;
        }
        let mut passes = 0;
        loop {
            let flow = self.run_node(node_id, ctx, param);
            self.propagate_values(node_id, Propagation::Downstream);

            let mut next = self.data_consumers(node_id);
            for node in self.flow_targets(node_id, flow) {
                if !next.contains(&node) {
                    next.push(node);
                }
            }
            for node in next {
                self.execute_downstream(node, ctx, param);
            }

            if flow != Flow::Loop {
                return flow;
            }
            if !self.advance_loop(node_id, ctx, &mut passes) {
                return Flow::Complete;
            }
        }
    }

    /// Control moves downstream through flow sockets; every data input is
    /// fetched by an upstream walk right before the node runs. Producers that
    /// are themselves flow nodes are never re-run by such a fetch.
    pub fn execute_hybrid(
        &mut self,
        node_id: NodeId,
        ctx: &mut ExecutionContext,
        param: &SocketValue,
    ) -> Flow {
        if !self.enter(node_id, ctx) {
            return Flow::Complete;
        }
        let mut passes = 0;
        loop {
            if !self.forces_execution(node_id) {
                self.pull_inputs(node_id, ctx, param, true, None);
            }
            let flow = self.run_node(node_id, ctx, param);
            self.propagate_values(node_id, Propagation::Downstream);

            for node in self.flow_targets(node_id, flow) {
                self.execute_hybrid(node, ctx, param);
            }

            if flow != Flow::Loop {
                return flow;
            }
            if !self.advance_loop(node_id, ctx, &mut passes) {
                return Flow::Complete;
            }
        }
    }

    pub fn visit_upstream(&self, node_id: NodeId, visitor: &mut dyn GraphVisitor) {
        let mut seen = BTreeSet::new();
        self.visit_recursive(node_id, 0, visitor, &mut seen);
    }

    fn visit_recursive(
        &self,
        node_id: NodeId,
        depth: usize,
        visitor: &mut dyn GraphVisitor,
        seen: &mut BTreeSet<NodeId>,
    ) {
        let Some(node) = self.node(node_id) else {
            return;
        };
        if !seen.insert(node_id) {
            return;
        }
        visitor.visit(node, depth);
        for producer in self.data_producers(node_id) {
            visitor.depth_push();
            self.visit_recursive(producer, depth + 1, visitor, seen);
            visitor.depth_pop();
        }
    }

    fn upstream_walk(
        &mut self,
        node_id: NodeId,
        ctx: &mut ExecutionContext,
        param: &SocketValue,
        eager_flow: bool,
    ) -> Flow {
        if !self.enter(node_id, ctx) {
            return Flow::Complete;
        }
        let mut passes = 0;
        loop {
            if !self.forces_execution(node_id) {
                self.pull_inputs(node_id, ctx, param, eager_flow, None);
            }
            let flow = self.run_node(node_id, ctx, param);
            self.propagate_values(node_id, Propagation::Downstream);
            if flow != Flow::Loop {
                return flow;
            }
            if !self.advance_loop(node_id, ctx, &mut passes) {
                return Flow::Complete;
            }
        }
    }

    /// Executes the producers of the node's data inputs (or of `only`), then
    /// pulls their values in. With `eager_flow` set, producers owning an input
    /// flow socket keep whatever value they last stored.
    pub(crate) fn pull_inputs(
        &mut self,
        node_id: NodeId,
        ctx: &mut ExecutionContext,
        param: &SocketValue,
        eager_flow: bool,
        only: Option<SocketId>,
    ) {
        let inputs: Vec<SocketId> = match only {
            Some(socket) => vec![socket],
            None => self.data_inputs(node_id),
        };
        for input in &inputs {
            let producers: Vec<NodeId> = self
                .producers(*input)
                .iter()
                .filter_map(|producer| self.socket(*producer).map(|socket| socket.node))
                .collect();
            for producer in producers {
                if eager_flow && self.node(producer).is_some_and(Node::is_flow_node) {
                    continue;
                }
                self.upstream_walk(producer, ctx, param, eager_flow);
            }
        }
        match only {
            Some(socket) => self.pull_single(socket),
            None => self.propagate_values(node_id, Propagation::Upstream),
        }
    }

    fn pull_single(&mut self, socket: SocketId) {
        let value = self
            .producers(socket)
            .iter()
            .filter_map(|producer| self.value(*producer))
            .last()
            .cloned();
        if let Some(value) = value {
            self.store_value(socket, value);
        }
    }

    fn enter(&mut self, node_id: NodeId, ctx: &ExecutionContext) -> bool {
        let Some(node) = self.node_mut(node_id) else {
            return false;
        };
        if node.last_execution_context == Some(ctx.epoch) {
            return false;
        }
        node.last_execution_context = Some(ctx.epoch);
        true
    }

    fn advance_loop(&mut self, node_id: NodeId, ctx: &mut ExecutionContext, passes: &mut u32) -> bool {
        *passes += 1;
        if *passes >= ctx.max_loop_passes {
            tracing::warn!(
                "node {:?} hit the loop limit of {} passes",
                node_id,
                ctx.max_loop_passes
            );
            ctx.report.loop_limit_hits.push(node_id);
            return false;
        }
        ctx.epoch += 1;
        ctx.report.loop_passes += 1;
        if let Some(node) = self.node_mut(node_id) {
            node.last_execution_context = Some(ctx.epoch);
        }
        true
    }

    fn forces_execution(&self, node_id: NodeId) -> bool {
        self.node(node_id)
            .and_then(Node::behavior)
            .map(|behavior| behavior.will_force_execute())
            .unwrap_or(false)
    }

    fn run_node(&mut self, node_id: NodeId, ctx: &mut ExecutionContext, param: &SocketValue) -> Flow {
        let Some(node) = self.node_mut(node_id) else {
            return Flow::Complete;
        };
        // Already running further up the stack.
        let Some(mut behavior) = node.behavior.take() else {
            return Flow::Complete;
        };
        node.selected_exit = None;

        let start = Instant::now();
        let flow = {
            let mut node_ctx = NodeContext {
                graph: &mut *self,
                node: node_id,
                exec: &mut *ctx,
                param,
            };
            behavior.execute(&mut node_ctx, param)
        };
        let elapsed = start.elapsed();
        tracing::debug!(
            "executed {:?} ({}) in epoch {} -> {:?}",
            node_id,
            behavior.type_name(),
            ctx.epoch,
            flow
        );

        if let Some(node) = self.node_mut(node_id) {
            node.behavior = Some(behavior);
        }
        ctx.record(node_id, elapsed);
        flow
    }

    fn data_inputs(&self, node_id: NodeId) -> Vec<SocketId> {
        let Some(node) = self.node(node_id) else {
            return Vec::new();
        };
        node.sockets()
            .filter(|id| {
                self.socket(*id)
                    .is_some_and(|socket| socket.role.input && !socket.role.control)
            })
            .collect()
    }

    fn data_producers(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        for input in self.data_inputs(node_id) {
            for producer in self.producers(input) {
                if let Some(owner) = self.socket(*producer).map(|socket| socket.node) {
                    if !nodes.contains(&owner) {
                        nodes.push(owner);
                    }
                }
            }
        }
        nodes
    }

    fn data_consumers(&self, node_id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.node(node_id) else {
            return Vec::new();
        };
        let mut nodes = Vec::new();
        for socket_id in node.sockets() {
            let is_data_output = self
                .socket(socket_id)
                .is_some_and(|socket| socket.role.output && !socket.role.control);
            if !is_data_output {
                continue;
            }
            for consumer in self.consumers(socket_id) {
                if let Some(owner) = self.socket(*consumer).map(|socket| socket.node) {
                    if !nodes.contains(&owner) {
                        nodes.push(owner);
                    }
                }
            }
        }
        nodes
    }

    /// Nodes reached through the exits the flow signal (or the node's
    /// selected exit) chose; with neither, through every exit.
    fn flow_targets(&self, node_id: NodeId, flow: Flow) -> Vec<NodeId> {
        let Some(node) = self.node(node_id) else {
            return Vec::new();
        };
        let exits: Vec<SocketId> = match flow {
            Flow::Exit(index) => node.output_flows.get(index).copied().into_iter().collect(),
            _ => match node.selected_exit {
                Some(index) => node.output_flows.get(index).copied().into_iter().collect(),
                None => node.output_flows.clone(),
            },
        };

        let mut nodes = Vec::new();
        for exit in exits {
            for consumer in self.consumers(exit) {
                if let Some(owner) = self.socket(*consumer).map(|socket| socket.node) {
                    if !nodes.contains(&owner) {
                        nodes.push(owner);
                    }
                }
            }
        }
        nodes
    }
}
