//! DOT output driver (spec §6): one node per `FlowNode`, type-colored;
//! edges typed with color by edge kind. Built by hand-written string
//! formatting rather than a graph-writer crate, matching how this codebase
//! hand-writes its other text-based output.

use super::Report;
use crate::flow::{FlowEdgeType, FlowNodeType};

fn node_color(node_type: FlowNodeType) -> &'static str {
    match node_type {
        FlowNodeType::Source => "crimson",
        FlowNodeType::Variable => "lightblue",
        FlowNodeType::Function => "lightgray",
        FlowNodeType::Param => "khaki",
        FlowNodeType::Carrier => "orange",
        FlowNodeType::Sink => "firebrick",
    }
}

fn edge_color(edge_type: FlowEdgeType) -> &'static str {
    match edge_type {
        FlowEdgeType::Assignment => "black",
        FlowEdgeType::Call => "blue",
        FlowEdgeType::DataFlow => "darkgreen",
        FlowEdgeType::Parameter => "purple",
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn render(report: &Report) -> String {
    let mut out = String::from("digraph taint {\n  rankdir=LR;\n");

    for node in &report.nodes {
        let label = format!("{}\\n{}:{}", node.name, node.file, node.line);
        out.push_str(&format!(
            "  \"{}\" [label=\"{}\", style=filled, fillcolor={}];\n",
            escape(&node.id),
            escape(&label),
            node_color(node.node_type)
        ));
    }

    for edge in &report.edges {
        out.push_str(&format!(
            "  \"{}\" -> \"{}\" [color={}, label=\"{}\"];\n",
            escape(&edge.from_id),
            escape(&edge.to_id),
            edge_color(edge.edge_type),
            escape(&edge.description)
        ));
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowNode;
    use crate::tracer::pipeline::Stats;

    #[test]
    fn renders_a_single_node_as_valid_dot_fragment() {
        let node = FlowNode::variable("a.php", 1, 0, "php", "x", "$x");
        let report = Report::new(Stats::default(), vec![node], vec![]);
        let dot = render(&report);
        assert!(dot.starts_with("digraph taint {"));
        assert!(dot.contains("fillcolor=lightblue"));
    }
}
