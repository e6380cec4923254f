use crate::eval::NodeContext;
use crate::node::{Flow, NodeBehavior, SocketBuilder};
use crate::registry::NodeRegistry;
use crate::socket::SocketDefinition;
use crate::value::{SocketValue, TypeMask};

const SCALAR: TypeMask = TypeMask(TypeMask::FLOAT.0 | TypeMask::INT.0);

pub fn register_builtins(registry: &mut NodeRegistry) {
    registry.register("Constant", || Box::new(Constant::new(0.0f32)));
    registry.register("Add", || Box::new(Arithmetic::add()));
    registry.register("Multiply", || Box::new(Arithmetic::multiply()));
    registry.register("Compare", || Box::new(Compare::new(CompareOp::Less)));
    registry.register("Branch", || Box::new(Branch));
    registry.register("Repeat", || Box::new(Repeat::new(1)));
    registry.register("Sequence", || Box::new(Sequence::new(2)));
    registry.register("Collect", || Box::new(Collect::default()));
}

/// Publishes a fixed value.
#[derive(Debug, Clone)]
pub struct Constant {
    pub value: SocketValue,
}

impl Constant {
    pub fn new(value: impl Into<SocketValue>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl NodeBehavior for Constant {
    fn type_name(&self) -> &'static str {
        "Constant"
    }

    fn construct(&self, sockets: &mut SocketBuilder) {
        let mask = match self.value.kind() {
            TypeMask::NONE => TypeMask::ANY,
            kind => kind,
        };
        sockets.add_output(SocketDefinition::new("value", mask));
    }

    fn execute(&mut self, ctx: &mut NodeContext<'_>, _param: &SocketValue) -> Flow {
        ctx.set_output(0, self.value.clone());
        Flow::Complete
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Multiply,
}

/// Two scalar inputs, one result. Stays integral while both inputs are ints.
#[derive(Debug, Clone)]
pub struct Arithmetic {
    op: ArithmeticOp,
}

impl Arithmetic {
    pub fn add() -> Self {
        Self {
            op: ArithmeticOp::Add,
        }
    }

    pub fn multiply() -> Self {
        Self {
            op: ArithmeticOp::Multiply,
        }
    }

    fn apply(&self, a: &SocketValue, b: &SocketValue) -> SocketValue {
        if let (SocketValue::Int(a), SocketValue::Int(b)) = (a, b) {
            return match self.op {
                ArithmeticOp::Add => SocketValue::Int(a.wrapping_add(*b)),
                ArithmeticOp::Multiply => SocketValue::Int(a.wrapping_mul(*b)),
            };
        }
        let identity = match self.op {
            ArithmeticOp::Add => 0.0,
            ArithmeticOp::Multiply => 1.0,
        };
        let a = a.as_f32().unwrap_or(identity);
        let b = b.as_f32().unwrap_or(identity);
        match self.op {
            ArithmeticOp::Add => SocketValue::Float(a + b),
            ArithmeticOp::Multiply => SocketValue::Float(a * b),
        }
    }
}

impl NodeBehavior for Arithmetic {
    fn type_name(&self) -> &'static str {
        match self.op {
            ArithmeticOp::Add => "Add",
            ArithmeticOp::Multiply => "Multiply",
        }
    }

    fn construct(&self, sockets: &mut SocketBuilder) {
        sockets
            .add_input(SocketDefinition::new("a", TypeMask::NUMBER))
            .add_input(SocketDefinition::new("b", TypeMask::NUMBER))
            .add_output(SocketDefinition::new("result", SCALAR));
    }

    fn execute(&mut self, ctx: &mut NodeContext<'_>, _param: &SocketValue) -> Flow {
        let result = self.apply(&ctx.input(0), &ctx.input(1));
        ctx.set_output(0, result);
        Flow::Complete
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    LessEqual,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone)]
pub struct Compare {
    pub op: CompareOp,
}

impl Compare {
    pub fn new(op: CompareOp) -> Self {
        Self { op }
    }
}

impl NodeBehavior for Compare {
    fn type_name(&self) -> &'static str {
        "Compare"
    }

    fn construct(&self, sockets: &mut SocketBuilder) {
        sockets
            .add_input(SocketDefinition::new("a", TypeMask::NUMBER))
            .add_input(SocketDefinition::new("b", TypeMask::NUMBER))
            .add_output(SocketDefinition::new("result", TypeMask::BOOL));
    }

    fn execute(&mut self, ctx: &mut NodeContext<'_>, _param: &SocketValue) -> Flow {
        let a = ctx.input(0).as_f32().unwrap_or(0.0);
        let b = ctx.input(1).as_f32().unwrap_or(0.0);
        let result = match self.op {
            CompareOp::Less => a < b,
            CompareOp::LessEqual => a <= b,
            CompareOp::Equal => a == b,
            CompareOp::NotEqual => a != b,
            CompareOp::Greater => a > b,
            CompareOp::GreaterEqual => a >= b,
        };
        ctx.set_output(0, result);
        Flow::Complete
    }
}

/// Continues through `true` or `false`.
#[derive(Debug, Clone, Copy)]
pub struct Branch;

impl NodeBehavior for Branch {
    fn type_name(&self) -> &'static str {
        "Branch"
    }

    fn construct(&self, sockets: &mut SocketBuilder) {
        sockets
            .add_input_flow("in")
            .add_input(SocketDefinition::new("condition", TypeMask::NUMBER).with_default(false))
            .add_output_flow("true")
            .add_output_flow("false");
    }

    fn execute(&mut self, ctx: &mut NodeContext<'_>, _param: &SocketValue) -> Flow {
        if ctx.input(0).as_bool().unwrap_or(false) {
            Flow::Exit(0)
        } else {
            Flow::Exit(1)
        }
    }
}

/// Runs its `body` exit `count` times, publishing the pass index, then
/// leaves through `done`.
#[derive(Debug, Clone)]
pub struct Repeat {
    count: i64,
    index: i64,
}

impl Repeat {
    pub fn new(count: i64) -> Self {
        Self { count, index: 0 }
    }
}

impl NodeBehavior for Repeat {
    fn type_name(&self) -> &'static str {
        "Repeat"
    }

    fn construct(&self, sockets: &mut SocketBuilder) {
        sockets
            .add_input_flow("in")
            .add_input(SocketDefinition::new("count", TypeMask::INT).with_default(self.count))
            .add_output(SocketDefinition::new("index", TypeMask::INT))
            .add_output_flow("body")
            .add_output_flow("done");
    }

    fn prepare(&mut self, _param: &SocketValue) {
        self.index = 0;
    }

    fn execute(&mut self, ctx: &mut NodeContext<'_>, _param: &SocketValue) -> Flow {
        let count = ctx.input(0).as_i64().unwrap_or(self.count);
        if self.index < count {
            ctx.set_output(0, self.index);
            self.index += 1;
            ctx.select_exit(0);
            Flow::Loop
        } else {
            self.index = 0;
            Flow::Exit(1)
        }
    }
}

/// Fires every exit in order.
#[derive(Debug, Clone)]
pub struct Sequence {
    exits: usize,
}

impl Sequence {
    pub fn new(exits: usize) -> Self {
        Self { exits }
    }
}

impl NodeBehavior for Sequence {
    fn type_name(&self) -> &'static str {
        "Sequence"
    }

    fn construct(&self, sockets: &mut SocketBuilder) {
        sockets.add_input_flow("in");
        for i in 0..self.exits {
            sockets.add_output_flow(&format!("then {i}"));
        }
    }

    fn execute(&mut self, _ctx: &mut NodeContext<'_>, _param: &SocketValue) -> Flow {
        Flow::Complete
    }
}

/// Sink keeping every value it was executed with.
#[derive(Debug, Clone, Default)]
pub struct Collect {
    pub values: Vec<SocketValue>,
}

impl NodeBehavior for Collect {
    fn type_name(&self) -> &'static str {
        "Collect"
    }

    fn construct(&self, sockets: &mut SocketBuilder) {
        sockets
            .add_input_flow("in")
            .add_input(SocketDefinition::new("value", TypeMask::ANY))
            .add_output_flow("next");
    }

    fn prepare(&mut self, _param: &SocketValue) {
        self.values.clear();
    }

    fn execute(&mut self, ctx: &mut NodeContext<'_>, _param: &SocketValue) -> Flow {
        self.values.push(ctx.input(0));
        Flow::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::ExecutionMode;
    use crate::graph::{Graph, NodeId};
    use crate::project::ExecutionSettings;

    fn wire(graph: &mut Graph, from: NodeId, output: usize, to: NodeId, input: usize) {
        let producer = graph.output(from, output).unwrap();
        let consumer = graph.input(to, input).unwrap();
        assert!(graph.connect(producer, consumer));
    }

    fn flow(graph: &mut Graph, from: NodeId, exit: usize, to: NodeId) {
        let producer = graph.node(from).unwrap().output_flows[exit];
        let consumer = graph.node(to).unwrap().input_flow.unwrap();
        assert!(graph.connect(producer, consumer));
    }

    fn collected(graph: &Graph, node: NodeId) -> Vec<SocketValue> {
        graph
            .node(node)
            .and_then(|n| n.behavior_as::<Collect>())
            .map(|c| c.values.clone())
            .unwrap_or_default()
    }

    #[test]
    fn arithmetic_chain_evaluates_upstream() {
        let mut graph = Graph::new();
        let two = graph.add_node("two", Box::new(Constant::new(2i64)));
        let three = graph.add_node("three", Box::new(Constant::new(3i64)));
        let half = graph.add_node("half", Box::new(Constant::new(0.5f32)));
        let add = graph.add_node("add", Box::new(Arithmetic::add()));
        let mul = graph.add_node("mul", Box::new(Arithmetic::multiply()));
        wire(&mut graph, two, 0, add, 0);
        wire(&mut graph, three, 0, add, 1);
        wire(&mut graph, add, 0, mul, 0);
        wire(&mut graph, half, 0, mul, 1);

        let report = graph
            .run(
                mul,
                ExecutionMode::Upstream,
                &SocketValue::None,
                &ExecutionSettings::default(),
            )
            .unwrap();
        assert_eq!(report.executed.len(), 5);
        assert_eq!(graph.value(graph.output(add, 0).unwrap()), Some(&SocketValue::Int(5)));
        assert_eq!(
            graph.value(graph.output(mul, 0).unwrap()),
            Some(&SocketValue::Float(2.5))
        );
    }

    #[test]
    fn unconnected_inputs_use_identity() {
        let mut graph = Graph::new();
        let mul = graph.add_node("mul", Box::new(Arithmetic::multiply()));
        let four = graph.add_node("four", Box::new(Constant::new(4.0f32)));
        wire(&mut graph, four, 0, mul, 1);
        graph
            .run(
                mul,
                ExecutionMode::Upstream,
                &SocketValue::None,
                &ExecutionSettings::default(),
            )
            .unwrap();
        assert_eq!(
            graph.value(graph.output(mul, 0).unwrap()),
            Some(&SocketValue::Float(4.0))
        );
    }

    #[test]
    fn branch_follows_comparison() {
        let mut graph = Graph::new();
        let start = graph.add_node("start", Box::new(Sequence::new(1)));
        let one = graph.add_node("one", Box::new(Constant::new(1.0f32)));
        let two = graph.add_node("two", Box::new(Constant::new(2.0f32)));
        let less = graph.add_node("less", Box::new(Compare::new(CompareOp::Less)));
        let branch = graph.add_node("branch", Box::new(Branch));
        let yes = graph.add_node("yes", Box::new(Collect::default()));
        let no = graph.add_node("no", Box::new(Collect::default()));
        wire(&mut graph, one, 0, less, 0);
        wire(&mut graph, two, 0, less, 1);
        wire(&mut graph, less, 0, branch, 0);
        wire(&mut graph, one, 0, yes, 0);
        wire(&mut graph, two, 0, no, 0);
        flow(&mut graph, start, 0, branch);
        flow(&mut graph, branch, 0, yes);
        flow(&mut graph, branch, 1, no);

        graph
            .run(
                start,
                ExecutionMode::Hybrid,
                &SocketValue::None,
                &ExecutionSettings::default(),
            )
            .unwrap();
        assert_eq!(collected(&graph, yes), vec![SocketValue::Float(1.0)]);
        assert!(collected(&graph, no).is_empty());
    }

    #[test]
    fn repeat_runs_body_once_per_pass() {
        let mut graph = Graph::new();
        let repeat = graph.add_node("repeat", Box::new(Repeat::new(3)));
        let body = graph.add_node("body", Box::new(Collect::default()));
        let done = graph.add_node("done", Box::new(Collect::default()));
        wire(&mut graph, repeat, 0, body, 0);
        flow(&mut graph, repeat, 0, body);
        flow(&mut graph, repeat, 1, done);

        let report = graph
            .run(
                repeat,
                ExecutionMode::Hybrid,
                &SocketValue::None,
                &ExecutionSettings::default(),
            )
            .unwrap();
        assert_eq!(
            collected(&graph, body),
            vec![SocketValue::Int(0), SocketValue::Int(1), SocketValue::Int(2)]
        );
        assert_eq!(collected(&graph, done).len(), 1);
        assert_eq!(report.runs(repeat), 4);
        assert_eq!(report.loop_passes, 3);
    }

    #[test]
    fn sequence_fires_exits_in_order() {
        let mut graph = Graph::new();
        let seq = graph.add_node("seq", Box::new(Sequence::new(2)));
        let first = graph.add_node("first", Box::new(Collect::default()));
        let second = graph.add_node("second", Box::new(Collect::default()));
        flow(&mut graph, seq, 0, first);
        flow(&mut graph, seq, 1, second);

        let report = graph
            .run(
                seq,
                ExecutionMode::Hybrid,
                &SocketValue::None,
                &ExecutionSettings::default(),
            )
            .unwrap();
        assert_eq!(report.executed, vec![seq, first, second]);
    }
}
