//! Mermaid output driver (spec §6): a flowchart with per-type node shapes
//! and edge arrows.

use super::Report;
use crate::flow::{FlowEdgeType, FlowNodeType};

fn mermaid_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

fn shape(node_type: FlowNodeType, label: &str) -> String {
    match node_type {
        FlowNodeType::Source => format!("(({label}))"),
        FlowNodeType::Sink => format!(">{label}]"),
        FlowNodeType::Carrier => format!("{{{{{label}}}}}"),
        FlowNodeType::Param => format!("[/{label}/]"),
        FlowNodeType::Function => format!("[{label}]"),
        FlowNodeType::Variable => format!("({label})"),
    }
}

fn arrow(edge_type: FlowEdgeType) -> &'static str {
    match edge_type {
        FlowEdgeType::Assignment => "-->",
        FlowEdgeType::Call => "-.->",
        FlowEdgeType::DataFlow => "==>",
        FlowEdgeType::Parameter => "-->",
    }
}

pub fn render(report: &Report) -> String {
    let mut out = String::from("flowchart LR\n");

    for node in &report.nodes {
        let label = format!("{}\\n{}:{}", node.name, node.file, node.line);
        out.push_str(&format!("  {}{}\n", mermaid_id(&node.id), shape(node.node_type, &label)));
    }

    for edge in &report.edges {
        out.push_str(&format!(
            "  {} {}|{}| {}\n",
            mermaid_id(&edge.from_id),
            arrow(edge.edge_type),
            edge.description.replace('|', "/"),
            mermaid_id(&edge.to_id)
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowNode;
    use crate::tracer::pipeline::Stats;

    #[test]
    fn renders_source_node_with_stadium_shape() {
        let node = FlowNode::source("a.php", 1, 0, "php", "$_GET", "$_GET['id']", crate::symbol::SourceType::HttpGet, None);
        let report = Report::new(Stats::default(), vec![node], vec![]);
        let out = render(&report);
        assert!(out.starts_with("flowchart LR"));
        assert!(out.contains("(("));
    }
}
