//! HTML output driver (spec §6): a static dashboard embedding the Mermaid
//! diagram and the JSON payload, no client-side fetch required.

use super::{json, mermaid, Report};

const TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>tainttrace report</title>
<script src="https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.min.js"></script>
<style>
body { font-family: system-ui, sans-serif; margin: 2rem; }
pre { background: #f5f5f5; padding: 1rem; overflow: auto; }
.mermaid { border: 1px solid #ddd; padding: 1rem; }
</style>
</head>
<body>
<h1>tainttrace report</h1>
<p>{SOURCE_COUNT} source(s), {NODE_COUNT} node(s), {EDGE_COUNT} edge(s).</p>
<div class="mermaid">
{MERMAID}
</div>
<h2>Raw data</h2>
<pre id="report-json">{JSON}</pre>
<script>mermaid.initialize({ startOnLoad: true });</script>
</body>
</html>
"#;

pub fn render(report: &Report) -> String {
    TEMPLATE
        .replace("{SOURCE_COUNT}", &report.sources.len().to_string())
        .replace("{NODE_COUNT}", &report.nodes.len().to_string())
        .replace("{EDGE_COUNT}", &report.edges.len().to_string())
        .replace("{MERMAID}", &mermaid::render(report))
        .replace("{JSON}", &html_escape(&json::render(report)))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::pipeline::Stats;

    #[test]
    fn embeds_mermaid_and_json_payload() {
        let report = Report::new(Stats::default(), vec![], vec![]);
        let out = render(&report);
        assert!(out.contains("flowchart LR"));
        assert!(out.contains("<pre id=\"report-json\">"));
        assert!(out.starts_with("<!doctype html>"));
    }
}
