//! End-to-end scenarios exercising the tracer, carrier discovery, the path
//! expander, and the parse cache together against small synthetic codebases.

use std::fs;

use tempfile::tempdir;

use tainttrace::cache::{CachedParse, ParseCache};
use tainttrace::carriers::discover_carriers;
use tainttrace::config::TraceOptions;
use tainttrace::expander::PruneReason;
use tainttrace::flow::FlowNodeType;
use tainttrace::parsing::pool::ParserPool;
use tainttrace::tracer::memory::MemoryMonitor;
use tainttrace::Tracer;

/// Scenario 1 (spec §8): a superglobal read directly assigned to a local,
/// then echoed, produces a source node, a variable node, and an `echo` sink
/// node joined by assignment/call edges.
#[test]
fn php_superglobal_flows_through_assignment_to_echo() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("index.php"), "<?php $x = $_GET['id']; echo $x;").unwrap();

    let tracer = Tracer::new(TraceOptions::default());
    let run = tracer.run(dir.path()).unwrap();

    assert_eq!(run.stats.files_parsed, 1);
    assert!(!run.partial);

    let has_source = run.map.nodes.iter().any(|n| n.node_type == FlowNodeType::Source);
    let has_variable = run.map.nodes.iter().any(|n| n.node_type == FlowNodeType::Variable && n.name == "$x");
    let has_sink = run.map.nodes.iter().any(|n| n.node_type == FlowNodeType::Sink && n.name == "echo");
    assert!(has_source, "expected a source node for $_GET");
    assert!(has_variable, "expected a variable node for $x");
    assert!(has_sink, "expected an echo sink node");

    let has_assignment_edge = run
        .map
        .edges
        .iter()
        .any(|e| matches!(e.edge_type, tainttrace::flow::FlowEdgeType::Assignment));
    let has_call_edge = run.map.edges.iter().any(|e| matches!(e.edge_type, tainttrace::flow::FlowEdgeType::Call));
    assert!(has_assignment_edge);
    assert!(has_call_edge);
}

/// Scenario 2 (spec §8): a MyBB-style controller populates a catch-all
/// property from two superglobals across two `foreach` loops; carrier
/// discovery merges both flows into one carrier with both source types.
#[test]
fn mybb_style_foreach_carrier_merges_get_and_post() {
    let source = r#"<?php
class MyBBController {
    public $input;
    function __construct() {
        foreach ($_GET as $k => $v) {
            $this->input[$k] = $v;
        }
        foreach ($_POST as $k => $v) {
            $this->input[$k] = $v;
        }
    }
}
"#;
    let files = vec![("controller.php".to_string(), source.to_string())];
    let map = discover_carriers(std::path::Path::new("."), &files, "2026-07-27T00:00:00Z").unwrap();

    assert_eq!(map.carriers.len(), 1);
    let carrier = &map.carriers[0];
    assert_eq!(carrier.class_name, "MyBBController");
    assert_eq!(carrier.property_name.as_deref(), Some("input"));
    assert_eq!(carrier.source_types.len(), 2);
    assert_eq!(map.statistics.total_taint_flows, 2);
    assert_eq!(carrier.confidence, 1.0, "a direct array-key foreach population is an unambiguous flow");
}

/// Scenario 3 (spec §8): a Go handler reads a query parameter into a local,
/// passes it to a helper in another file, and `follow_imports` makes the
/// tracer cross that file boundary.
#[test]
fn go_cross_file_propagation_follows_imports() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("handler.go"),
        r#"package main

func Handle(r *Request) {
    name := r.URL.Query().Get("name")
    render(name)
}
"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("render.go"),
        r#"package main

func render(name string) {
    fmt.Fprint(w, name)
}
"#,
    )
    .unwrap();

    let mut options = TraceOptions::default();
    options.follow_imports = true;
    let tracer = Tracer::new(options);
    let run = tracer.run(dir.path()).unwrap();

    assert_eq!(run.stats.files_parsed, 2);
    assert!(run.stats.cross_file_flows >= 1, "expected at least one cross-file flow");

    let has_param_edge = run
        .map
        .edges
        .iter()
        .any(|e| matches!(e.edge_type, tainttrace::flow::FlowEdgeType::Parameter));
    assert!(has_param_edge, "expected a parameter edge into render's `name` argument");
}

/// Scenario 4 (spec §8): backward tracing from a view variable finds the
/// `$_POST` read that reached it through a controller's assignment chain.
#[test]
fn php_backward_trace_locates_post_source() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("controller.php"),
        "<?php $title = $_POST['title']; $view = $title;",
    )
    .unwrap();

    let tracer = Tracer::new(TraceOptions::default());
    let result = tracer.run_backward(dir.path(), "$view").unwrap();

    assert!(!result.sources.is_empty(), "expected at least one source reaching $view");
    assert!(result
        .sources
        .iter()
        .any(|s| s.source_type == tainttrace::symbol::SourceType::HttpPost));
    assert!(!result.paths.is_empty());
}

/// Scenario 5 (spec §8): a parse cache capped at two entries evicts the
/// least-recently-used tree once a third distinct file is inserted, and its
/// dropped `Tree` is reclaimed without any explicit close call.
#[test]
fn parse_cache_evicts_lru_entry_under_a_two_entry_cap() {
    let pool = ParserPool::new();
    let cache: ParseCache<String> = ParseCache::new(2, usize::MAX);

    let sources = [
        ("a.php", "<?php $a = 1;"),
        ("b.php", "<?php $b = 2;"),
        ("c.php", "<?php $c = 3;"),
    ];

    for (name, source) in &sources {
        let mut parser = pool.checkout("php").unwrap();
        let tree = parser.parse(source, None).unwrap();
        drop(parser);
        cache.put(name.to_string(), CachedParse::new(tree, source.as_bytes().to_vec()));
    }

    assert_eq!(cache.size(), 2);
    assert!(!cache.contains(&"a.php".to_string()), "the LRU entry should have been evicted");
    assert!(cache.contains(&"b.php".to_string()));
    assert!(cache.contains(&"c.php".to_string()));
}

/// Scenario 6 (spec §8): a memory monitor capped below any plausible RSS
/// trips on its first sample, signalling the tracer to stop early.
#[test]
fn memory_monitor_trips_under_a_zero_cap() {
    let monitor = MemoryMonitor::new(0);
    let mut tripped = false;
    for _ in 0..21 {
        if monitor.tick() {
            tripped = true;
            break;
        }
    }
    assert!(tripped, "a zero-byte cap should trip within one sample interval");
}

/// The path expander (C9, spec §4.7) walks the call graph starting at a
/// named function; a cycle in the callee chain is pruned rather than
/// followed forever, and the cycle's entry point still yields one complete
/// path up to the point the cycle closes.
#[test]
fn expander_prunes_a_call_cycle_and_still_yields_a_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.php");
    fs::write(
        &path,
        "<?php function a() { b(); } function b() { a(); }",
    )
    .unwrap();

    let tracer = Tracer::new(TraceOptions::default());
    let result = tracer.run_paths(dir.path(), &path.to_string_lossy(), "a", 10).unwrap();

    assert!(!result.paths.is_empty(), "expected at least one path before the cycle closes");
    assert!(
        result.pruned.iter().any(|(_, reason)| matches!(reason, PruneReason::Cycle)),
        "expected the a -> b -> a cycle to be pruned"
    );
}
