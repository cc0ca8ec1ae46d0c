//! The flow graph: nodes are program locations (sources, variables,
//! parameters, carriers, sinks); edges are dataflow transitions. See spec
//! §3.2 for the `FlowNode`/`FlowEdge`/`FlowMap` invariants.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::symbol::SourceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowNodeType {
    Source,
    Variable,
    Function,
    Param,
    Carrier,
    Sink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEdgeType {
    Assignment,
    Call,
    DataFlow,
    Parameter,
}

/// A single node in the flow graph.
///
/// `id` is stable and globally unique: `<file>:<line>:<column>[:<suffix>]`.
/// Use `FlowNode::make_id` to build one consistently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: FlowNodeType,
    pub language: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub name: String,
    pub snippet: String,
    pub source_type: Option<SourceType>,
    pub source_key: Option<String>,
}

impl FlowNode {
    pub fn make_id(file: &str, line: u32, column: u32, suffix: Option<&str>) -> String {
        match suffix {
            Some(suffix) => format!("{file}:{line}:{column}:{suffix}"),
            None => format!("{file}:{line}:{column}"),
        }
    }

    pub fn source(
        file: &str,
        line: u32,
        column: u32,
        language: &str,
        name: &str,
        snippet: &str,
        source_type: SourceType,
        source_key: Option<String>,
    ) -> Self {
        Self {
            id: Self::make_id(file, line, column, Some("source")),
            node_type: FlowNodeType::Source,
            language: language.to_string(),
            file: file.to_string(),
            line,
            column,
            name: name.to_string(),
            snippet: snippet.to_string(),
            source_type: Some(source_type),
            source_key,
        }
    }

    pub fn variable(file: &str, line: u32, column: u32, language: &str, name: &str, snippet: &str) -> Self {
        Self {
            id: Self::make_id(file, line, column, Some("var")),
            node_type: FlowNodeType::Variable,
            language: language.to_string(),
            file: file.to_string(),
            line,
            column,
            name: name.to_string(),
            snippet: snippet.to_string(),
            source_type: None,
            source_key: None,
        }
    }

    pub fn sink(file: &str, line: u32, column: u32, language: &str, name: &str, snippet: &str) -> Self {
        Self {
            id: Self::make_id(file, line, column, Some("sink")),
            node_type: FlowNodeType::Sink,
            language: language.to_string(),
            file: file.to_string(),
            line,
            column,
            name: name.to_string(),
            snippet: snippet.to_string(),
            source_type: None,
            source_key: None,
        }
    }

    pub fn param(file: &str, line: u32, column: u32, language: &str, name: &str) -> Self {
        Self {
            id: Self::make_id(file, line, column, Some(&format!("param:{name}"))),
            node_type: FlowNodeType::Param,
            language: language.to_string(),
            file: file.to_string(),
            line,
            column,
            name: name.to_string(),
            snippet: String::new(),
            source_type: None,
            source_key: None,
        }
    }
}

/// A directed edge between two `FlowNode` ids.
///
/// Invariant: both endpoints must exist in the enclosing `FlowMap`'s node
/// set; `FlowMap::add_edge` enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEdge {
    pub from_id: String,
    pub to_id: String,
    #[serde(rename = "type")]
    pub edge_type: FlowEdgeType,
    pub description: String,
}

/// A step in a `TaintChain`, recording how taint propagated to a given node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaintStepType {
    Source,
    Assignment,
    Parameter,
    Intermediate,
    Sink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaintStep {
    pub step_type: TaintStepType,
    pub expression: String,
    pub file: String,
    pub line: u32,
    pub description: String,
}

/// Immutable-prefix chain of taint-propagation steps. Cloning is cheap: each
/// branch point clones the `Vec` up to that point, matching spec §4.6's
/// "immutable prefixes cloned on branch" requirement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaintChain {
    pub steps: Vec<TaintStep>,
}

impl TaintChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new chain with `step` appended, leaving `self` untouched.
    pub fn with_step(&self, step: TaintStep) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }
}

/// Owns an ordered list of nodes/edges plus a hash index by id, for a single
/// tracing invocation. Monotonically grows; never mutated after being
/// returned to the caller (spec §3.3).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FlowMap {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
    #[serde(skip)]
    node_index: HashMap<String, usize>,
}

impl FlowMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `node` if its id is new. Returns `false` if the id already
    /// existed (deduplication is by id, not structural equality) — this is
    /// the "ID stability" invariant from spec §8.
    pub fn add_node(&mut self, node: FlowNode) -> bool {
        if self.node_index.contains_key(&node.id) {
            return false;
        }
        self.node_index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    /// Add an edge. Both endpoints must already be present; otherwise this
    /// is a no-op (keeps the edge-integrity invariant, spec §8, unconditional).
    pub fn add_edge(&mut self, edge: FlowEdge) -> bool {
        if !self.has_node(&edge.from_id) || !self.has_node(&edge.to_id) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    /// Merge another (worker-local) flow map into this one, deduplicating by
    /// node id as edges/nodes are folded in. Used by the tracer's
    /// parallel-worker merge step (spec §5).
    pub fn merge(&mut self, other: FlowMap) {
        for node in other.nodes {
            self.add_node(node);
        }
        for edge in other.edges {
            self.add_edge(edge);
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_node(id_suffix: &str) -> FlowNode {
        FlowNode::variable("a.php", 1, 0, "php", "x", "$x")
            .with_suffix(id_suffix)
    }

    impl FlowNode {
        fn with_suffix(mut self, suffix: &str) -> Self {
            self.id = format!("{}:{}", self.id, suffix);
            self
        }
    }

    #[test]
    fn duplicate_id_insert_is_noop() {
        let mut map = FlowMap::new();
        assert!(map.add_node(sample_node("1")));
        assert!(!map.add_node(sample_node("1")));
        assert_eq!(map.node_count(), 1);
    }

    #[test]
    fn edge_requires_both_endpoints_present() {
        let mut map = FlowMap::new();
        let n1 = sample_node("1");
        let n2 = sample_node("2");
        let edge = FlowEdge {
            from_id: n1.id.clone(),
            to_id: n2.id.clone(),
            edge_type: FlowEdgeType::Assignment,
            description: "x = y".into(),
        };

        // Neither endpoint exists yet.
        assert!(!map.add_edge(edge.clone()));
        map.add_node(n1);
        // Only one endpoint exists.
        assert!(!map.add_edge(edge.clone()));
        map.add_node(n2);
        assert!(map.add_edge(edge));
        assert_eq!(map.edge_count(), 1);
    }

    #[test]
    fn merge_deduplicates_by_id() {
        let mut a = FlowMap::new();
        a.add_node(sample_node("1"));

        let mut b = FlowMap::new();
        b.add_node(sample_node("1"));
        b.add_node(sample_node("2"));

        a.merge(b);
        assert_eq!(a.node_count(), 2);
    }

    #[test]
    fn taint_chain_branches_do_not_share_mutation() {
        let base = TaintChain::new().with_step(TaintStep {
            step_type: TaintStepType::Source,
            expression: "$_GET".into(),
            file: "a.php".into(),
            line: 1,
            description: "source".into(),
        });

        let branch_a = base.with_step(TaintStep {
            step_type: TaintStepType::Assignment,
            expression: "$x".into(),
            file: "a.php".into(),
            line: 2,
            description: "assign x".into(),
        });
        let branch_b = base.with_step(TaintStep {
            step_type: TaintStepType::Assignment,
            expression: "$y".into(),
            file: "a.php".into(),
            line: 3,
            description: "assign y".into(),
        });

        assert_eq!(base.steps.len(), 1);
        assert_eq!(branch_a.steps.len(), 2);
        assert_eq!(branch_b.steps.len(), 2);
        assert_ne!(branch_a.steps[1].expression, branch_b.steps[1].expression);
    }
}
