//! Backward flow tracing (spec §4.6.1): given a target expression, find the
//! source(s) that could have reached it.
//!
//! Assignments come from `FileRecord.assignments` when non-empty (the file
//! had detected sources, so phase 2 already extracted them); otherwise this
//! module re-parses the file on demand, extracts assignments, and lets the
//! tree drop immediately — matching the forward pipeline's "close the tree
//! the moment extraction is done" discipline without paying that cost for
//! every file up front.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::parsing::catalog::catalog;
use crate::parsing::{analyzer_for_language, pool::ParserPool};
use crate::symbol::{Assignment, SourceType};
use crate::tracer::pipeline::FileRecord;
use crate::types::FileId;

#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source_type: SourceType,
    pub expression: String,
    pub file: String,
    pub line: u32,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct BackwardStep {
    pub expression: String,
    pub file: String,
    pub line: u32,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct BackwardPath {
    pub steps: Vec<BackwardStep>,
}

#[derive(Debug)]
pub struct BackwardTraceResult {
    pub target: String,
    pub paths: Vec<BackwardPath>,
    pub sources: Vec<SourceInfo>,
    pub analyzed_files: usize,
    pub duration: Duration,
}

fn strip_sigil(expr: &str) -> &str {
    expr.trim_start_matches('$')
}

/// Load this file's assignment list, reusing the pipeline's cache when
/// present and falling back to an on-demand parse otherwise.
fn load_assignments(record: &FileRecord, pool: &ParserPool) -> Vec<Assignment> {
    if !record.assignments.is_empty() || record.skipped {
        return record.assignments.clone();
    }

    let Ok(source) = std::fs::read_to_string(&record.path) else { return Vec::new() };
    let Some(analyzer) = analyzer_for_language(record.language) else { return Vec::new() };
    let Some(mut parser) = pool.checkout(record.language) else { return Vec::new() };
    let Some(tree) = parser.parse(&source, None) else { return Vec::new() };
    drop(parser);
    // `tree`/`source` drop at the end of this function; nothing retains the AST.
    analyzer.extract_assignments(tree.root_node(), &source, "global")
}

/// DFS from `expr` over `assignments`, stopping at the first source found
/// (spec §4.6.1: early termination once a source is found per file).
fn search(
    record: &FileRecord,
    assignments: &[Assignment],
    expr: &str,
    depth: usize,
    max_depth: usize,
    visited: &mut HashSet<String>,
) -> Option<(BackwardPath, SourceInfo)> {
    if depth >= max_depth {
        return None;
    }
    let key = format!("{}:{}", record.path.display(), expr);
    if !visited.insert(key) {
        return None;
    }

    let var = strip_sigil(expr);
    for assignment in assignments.iter().filter(|a| a.target == var) {
        let step = BackwardStep {
            expression: assignment.target.clone(),
            file: record.path.to_string_lossy().to_string(),
            line: assignment.line,
            description: format!("{} = {}", assignment.target, assignment.source),
        };

        if let Some((source_type, confidence)) = catalog().identify_source(&assignment.source) {
            let source = SourceInfo {
                source_type,
                expression: assignment.source.clone(),
                file: record.path.to_string_lossy().to_string(),
                line: assignment.line,
                confidence,
            };
            return Some((BackwardPath { steps: vec![step] }, source));
        }

        if let Some((mut inner_path, source)) = search(record, assignments, &assignment.source, depth + 1, max_depth, visited) {
            inner_path.steps.push(step);
            return Some((inner_path, source));
        }
    }

    None
}

fn dedup_sources(sources: Vec<SourceInfo>) -> Vec<SourceInfo> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|s| seen.insert((s.source_type, s.expression.clone())))
        .collect()
}

/// Trace a single target expression backward across every analyzed file.
pub fn trace_backward(records: &HashMap<FileId, FileRecord>, target: &str, max_depth: usize) -> BackwardTraceResult {
    let started = std::time::Instant::now();
    let pool = ParserPool::new();
    let mut paths = Vec::new();
    let mut sources = Vec::new();
    let mut analyzed_files = 0usize;

    for record in records.values() {
        if record.skipped {
            continue;
        }
        analyzed_files += 1;
        let assignments = load_assignments(record, &pool);
        let mut visited = HashSet::new();
        if let Some((path, source)) = search(record, &assignments, target, 0, max_depth, &mut visited) {
            paths.push(path);
            sources.push(source);
        }
    }

    BackwardTraceResult {
        target: target.to_string(),
        paths,
        sources: dedup_sources(sources),
        analyzed_files,
        duration: started.elapsed(),
    }
}

/// Trace several targets backward in one sweep, reading and extracting each
/// file's assignments only once regardless of how many targets are passed.
pub fn trace_backward_batch(
    records: &HashMap<FileId, FileRecord>,
    targets: &[String],
    max_depth: usize,
) -> Vec<BackwardTraceResult> {
    let started = std::time::Instant::now();
    let pool = ParserPool::new();

    let mut per_file = HashMap::with_capacity(records.len());
    for (id, record) in records {
        if record.skipped {
            continue;
        }
        per_file.insert(*id, load_assignments(record, &pool));
    }

    targets
        .iter()
        .map(|target| {
            let mut paths = Vec::new();
            let mut sources = Vec::new();
            let mut analyzed_files = 0usize;

            for (id, record) in records {
                if record.skipped {
                    continue;
                }
                analyzed_files += 1;
                let assignments = &per_file[id];
                let mut visited = HashSet::new();
                if let Some((path, source)) = search(record, assignments, target, 0, max_depth, &mut visited) {
                    paths.push(path);
                    sources.push(source);
                }
            }

            BackwardTraceResult {
                target: target.clone(),
                paths,
                sources: dedup_sources(sources),
                analyzed_files,
                duration: started.elapsed(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraceOptions;
    use crate::tracer::discover::DiscoveredFile;
    use crate::tracer::pipeline::parse_and_merge;
    use crate::types::FileIdAllocator;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_source_one_hop_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.php");
        fs::write(&path, "<?php $x = $_GET['id']; echo $x;").unwrap();

        let discovered = vec![DiscoveredFile { path, language: "php" }];
        let options = TraceOptions::default();
        let allocator = FileIdAllocator::new();
        let (records, _global, _stats) = parse_and_merge(&discovered, &options, &allocator);

        let result = trace_backward(&records, "$x", 10);
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].source_type, SourceType::HttpGet);
    }

    #[test]
    fn unreachable_target_yields_no_sources() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.php");
        fs::write(&path, "<?php $x = $_GET['id']; echo $x;").unwrap();

        let discovered = vec![DiscoveredFile { path, language: "php" }];
        let options = TraceOptions::default();
        let allocator = FileIdAllocator::new();
        let (records, _global, _stats) = parse_and_merge(&discovered, &options, &allocator);

        let result = trace_backward(&records, "$never_assigned", 10);
        assert!(result.sources.is_empty());
    }

    #[test]
    fn batch_trace_covers_every_target() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.php");
        fs::write(&path, "<?php $x = $_GET['id']; $y = $_POST['name'];").unwrap();

        let discovered = vec![DiscoveredFile { path, language: "php" }];
        let options = TraceOptions::default();
        let allocator = FileIdAllocator::new();
        let (records, _global, _stats) = parse_and_merge(&discovered, &options, &allocator);

        let results = trace_backward_batch(&records, &["$x".to_string(), "$y".to_string()], 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].sources.len(), 1);
        assert_eq!(results[1].sources.len(), 1);
    }
}
