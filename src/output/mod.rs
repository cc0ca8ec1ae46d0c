//! Output drivers (C10, spec §6): thin serializers over a finished
//! `FlowMap` plus run statistics. None of these touch the tracer itself —
//! they only read `Report`.

pub mod dot;
pub mod html;
pub mod json;
pub mod mermaid;

use std::collections::HashMap;
use std::str::FromStr;

use serde::Serialize;

use crate::flow::{FlowEdge, FlowNode, FlowNodeType};
use crate::tracer::pipeline::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Dot,
    Mermaid,
    Html,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "dot" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            "html" => Ok(Self::Html),
            other => Err(format!("unknown output format '{other}' (expected json|dot|mermaid|html)")),
        }
    }
}

/// Per-language node counts, broken out by kind so "how many sources did we
/// find in PHP" (spec §8 scenario 1's `by_language.php.sources`) doesn't
/// require re-deriving it from the flat node list.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LanguageStats {
    pub sources: usize,
    pub nodes: usize,
}

/// Everything an output driver needs, assembled once after a trace run.
#[derive(Debug, Serialize)]
pub struct Report {
    pub stats: Stats,
    pub sources: Vec<FlowNode>,
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
    pub by_language: HashMap<String, LanguageStats>,
}

impl Report {
    pub fn new(stats: Stats, nodes: Vec<FlowNode>, edges: Vec<FlowEdge>) -> Self {
        let sources = nodes.iter().filter(|n| n.node_type == FlowNodeType::Source).cloned().collect();
        let mut by_language: HashMap<String, LanguageStats> = HashMap::new();
        for node in &nodes {
            let entry = by_language.entry(node.language.clone()).or_default();
            entry.nodes += 1;
            if node.node_type == FlowNodeType::Source {
                entry.sources += 1;
            }
        }
        Self {
            stats,
            sources,
            nodes,
            edges,
            by_language,
        }
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => json::render(self),
            OutputFormat::Dot => dot::render(self),
            OutputFormat::Mermaid => mermaid::render(self),
            OutputFormat::Html => html::render(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_language_counts_sources_separately_from_other_node_kinds() {
        let nodes = vec![
            FlowNode::source("a.php", 1, 0, "php", "$_GET", "$_GET['id']", crate::symbol::SourceType::HttpGet, None),
            FlowNode::variable("a.php", 2, 0, "php", "$x", "$x = $_GET['id']"),
            FlowNode::sink("a.php", 3, 0, "php", "echo", "echo $x"),
        ];
        let report = Report::new(Stats::default(), nodes, Vec::new());

        let php = report.by_language.get("php").expect("php entry should exist");
        assert_eq!(php.sources, 1);
        assert_eq!(php.nodes, 3);
    }

    #[test]
    fn parses_every_known_format_name() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("dot".parse::<OutputFormat>().unwrap(), OutputFormat::Dot);
        assert_eq!("mermaid".parse::<OutputFormat>().unwrap(), OutputFormat::Mermaid);
        assert_eq!("html".parse::<OutputFormat>().unwrap(), OutputFormat::Html);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
