use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use sculpt_core::{
    Constant, ExecutionMode, ExecutionSettings, Graph, NodeId, NodeRegistry, SocketId,
    SocketValue,
};
use serde::Deserialize;

/// Graph description loaded from JSON for headless runs.
#[derive(Debug, Deserialize)]
pub struct GraphPlan {
    #[serde(default)]
    pub nodes: Vec<PlanNode>,
    #[serde(default)]
    pub links: Vec<PlanLink>,
    pub entry: String,
    #[serde(default)]
    pub mode: PlanMode,
}

#[derive(Debug, Deserialize)]
pub struct PlanNode {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// Only read for `Constant` nodes.
    #[serde(default)]
    pub value: Option<SocketValue>,
    /// Default values keyed by input socket name.
    #[serde(default)]
    pub defaults: BTreeMap<String, SocketValue>,
}

#[derive(Debug, Deserialize)]
pub struct PlanLink {
    pub from: PlanEndpoint,
    pub to: PlanEndpoint,
}

#[derive(Debug, Deserialize)]
pub struct PlanEndpoint {
    pub node: String,
    pub socket: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Upstream,
    Downstream,
    #[default]
    Hybrid,
}

impl From<PlanMode> for ExecutionMode {
    fn from(mode: PlanMode) -> Self {
        match mode {
            PlanMode::Upstream => ExecutionMode::Upstream,
            PlanMode::Downstream => ExecutionMode::Downstream,
            PlanMode::Hybrid => ExecutionMode::Hybrid,
        }
    }
}

pub fn load_plan(path: &Path) -> Result<GraphPlan, String> {
    let data = std::fs::read(path).map_err(|err| err.to_string())?;
    serde_json::from_slice(&data).map_err(|err| err.to_string())
}

/// Counts three passes and sums the index into an accumulator.
pub fn default_plan() -> GraphPlan {
    let node = |name: &str, type_name: &str| PlanNode {
        name: name.to_string(),
        type_name: type_name.to_string(),
        value: None,
        defaults: BTreeMap::new(),
    };
    let link = |from: (&str, &str), to: (&str, &str)| PlanLink {
        from: PlanEndpoint {
            node: from.0.to_string(),
            socket: from.1.to_string(),
        },
        to: PlanEndpoint {
            node: to.0.to_string(),
            socket: to.1.to_string(),
        },
    };

    let mut repeat = node("repeat", "Repeat");
    repeat
        .defaults
        .insert("count".to_string(), SocketValue::Int(3));
    let mut scale = node("scale", "Constant");
    scale.value = Some(SocketValue::Float(0.5));

    GraphPlan {
        nodes: vec![
            repeat,
            scale,
            node("scaled", "Multiply"),
            node("log", "Collect"),
            node("done", "Collect"),
        ],
        links: vec![
            link(("repeat", "index"), ("scaled", "a")),
            link(("scale", "value"), ("scaled", "b")),
            link(("scaled", "result"), ("log", "value")),
            link(("repeat", "body"), ("log", "in")),
            link(("repeat", "done"), ("done", "in")),
        ],
        entry: "repeat".to_string(),
        mode: PlanMode::Hybrid,
    }
}

pub struct BuiltPlan {
    pub graph: Graph,
    pub names: HashMap<String, NodeId>,
    pub entry: NodeId,
}

pub fn build_graph(plan: &GraphPlan, registry: &NodeRegistry) -> Result<BuiltPlan, String> {
    let mut graph = Graph::new();
    let mut names = HashMap::new();

    for node in &plan.nodes {
        let node_id = match (&node.value, node.type_name.as_str()) {
            (Some(value), "Constant") => {
                graph.add_node(node.name.clone(), Box::new(Constant::new(value.clone())))
            }
            _ => graph
                .add_node_from(registry, &node.type_name, node.name.clone())
                .map_err(|err| format!("node {}: {err}", node.name))?,
        };
        for (socket, value) in &node.defaults {
            let socket_id = graph
                .find_input(node_id, socket)
                .ok_or_else(|| format!("node {} has no input {}", node.name, socket))?;
            graph.set_default_value(socket_id, value.clone());
        }
        if names.insert(node.name.clone(), node_id).is_some() {
            return Err(format!("duplicate node name {}", node.name));
        }
    }

    for link in &plan.links {
        let producer = endpoint(&graph, &names, &link.from, true)?;
        let consumer = endpoint(&graph, &names, &link.to, false)?;
        graph.try_connect(producer, consumer).map_err(|err| {
            format!(
                "link {}.{} -> {}.{}: {err}",
                link.from.node, link.from.socket, link.to.node, link.to.socket
            )
        })?;
    }

    let entry = *names
        .get(&plan.entry)
        .ok_or_else(|| format!("entry node {} not found", plan.entry))?;
    Ok(BuiltPlan {
        graph,
        names,
        entry,
    })
}

fn endpoint(
    graph: &Graph,
    names: &HashMap<String, NodeId>,
    endpoint: &PlanEndpoint,
    output: bool,
) -> Result<SocketId, String> {
    let node = names
        .get(&endpoint.node)
        .ok_or_else(|| format!("unknown node {}", endpoint.node))?;
    let socket = if output {
        graph.find_output(*node, &endpoint.socket)
    } else {
        graph.find_input(*node, &endpoint.socket)
    };
    socket.ok_or_else(|| {
        let side = if output { "output" } else { "input" };
        format!("unknown {side} socket {}.{}", endpoint.node, endpoint.socket)
    })
}

pub fn run_plan(
    plan: &GraphPlan,
    registry: &NodeRegistry,
    settings: &ExecutionSettings,
) -> Result<(), String> {
    let BuiltPlan {
        mut graph,
        names,
        entry,
    } = build_graph(plan, registry)?;

    let report = graph
        .run(entry, plan.mode.into(), &SocketValue::None, settings)
        .map_err(|err| err.to_string())?;

    let mut ordered: Vec<(&String, &NodeId)> = names.iter().collect();
    ordered.sort_by_key(|(_, id)| **id);
    for (name, id) in ordered {
        let Some(node) = graph.node(*id) else {
            continue;
        };
        let outputs: Vec<String> = node
            .outputs
            .iter()
            .filter_map(|socket| graph.socket(*socket))
            .map(|socket| format!("{}={}", socket.name, socket.value()))
            .collect();
        let collected = node
            .behavior_as::<sculpt_core::Collect>()
            .map(|collect| {
                let values: Vec<String> = collect.values.iter().map(|v| v.to_string()).collect();
                format!(" collected [{}]", values.join(", "))
            })
            .unwrap_or_default();
        println!(
            "{name} ({}) runs={} {}{}",
            node.type_name,
            report.runs(*id),
            outputs.join(" "),
            collected
        );
    }
    println!(
        "executions={} loop_passes={} final_epoch={}",
        report.executed.len(),
        report.loop_passes,
        report.final_epoch
    );
    if !report.loop_limit_hits.is_empty() {
        tracing::warn!("loop limit reached by {:?}", report.loop_limit_hits);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plan_builds_and_runs() {
        let registry = NodeRegistry::with_builtins();
        let BuiltPlan {
            mut graph,
            names,
            entry,
        } = build_graph(&default_plan(), &registry).unwrap();

        let report = graph
            .run(
                entry,
                ExecutionMode::Hybrid,
                &SocketValue::None,
                &ExecutionSettings::default(),
            )
            .unwrap();
        let log = graph
            .node(names["log"])
            .and_then(|node| node.behavior_as::<sculpt_core::Collect>())
            .map(|collect| collect.values.clone())
            .unwrap();
        assert_eq!(
            log,
            vec![
                SocketValue::Float(0.0),
                SocketValue::Float(0.5),
                SocketValue::Float(1.0)
            ]
        );
        assert_eq!(report.runs(names["done"]), 1);
    }

    #[test]
    fn plan_errors_name_the_culprit() {
        let registry = NodeRegistry::with_builtins();
        let mut plan = default_plan();
        plan.links.push(PlanLink {
            from: PlanEndpoint {
                node: "repeat".to_string(),
                socket: "missing".to_string(),
            },
            to: PlanEndpoint {
                node: "log".to_string(),
                socket: "value".to_string(),
            },
        });
        let err = build_graph(&plan, &registry).err().unwrap();
        assert!(err.contains("repeat.missing"));
    }

    #[test]
    fn plan_json_parses() {
        let json = r#"{
            "nodes": [
                { "name": "k", "type": "Constant", "value": { "kind": "int", "value": 4 } },
                { "name": "sink", "type": "Collect" }
            ],
            "links": [ { "from": { "node": "k", "socket": "value" }, "to": { "node": "sink", "socket": "value" } } ],
            "entry": "sink",
            "mode": "upstream"
        }"#;
        let plan: GraphPlan = serde_json::from_str(json).unwrap();
        let built = build_graph(&plan, &NodeRegistry::with_builtins()).unwrap();
        assert_eq!(built.graph.node_count(), 2);
        assert!(matches!(plan.mode, PlanMode::Upstream));
    }
}
