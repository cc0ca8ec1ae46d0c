//! Execution path expansion (C9, spec §4.7): bounded DFS over the
//! caller/callee graph already captured by `tracer::pipeline`'s per-file
//! call lists, reusing `GlobalSymbolTable::resolve_short_name` for callee
//! resolution the same way `tracer::forward` does.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::symbol::GlobalSymbolTable;
use crate::tracer::pipeline::FileRecord;
use crate::types::FileId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneReason {
    MaxDepth,
    Cycle,
    MaxPaths,
    Budget,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStep {
    pub file: String,
    pub name: String,
    pub line: u32,
}

impl ExecutionStep {
    fn key(&self) -> String {
        format!("{}:{}:{}", self.file, self.name, self.line)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionPath {
    pub steps: Vec<ExecutionStep>,
}

#[derive(Debug, Default, Serialize)]
pub struct ExpansionResult {
    pub paths: Vec<ExecutionPath>,
    pub pruned: Vec<(String, PruneReason)>,
}

/// Expand every call path starting at `start_function` in `start_file`, up
/// to `max_depth` deep and `max_paths` leaves. The search gives up
/// altogether once it has explored `10 * max_paths` nodes, regardless of
/// how many complete paths that produced (spec §4.7's global exploration
/// budget, guarding against a call graph that is wide but shallow).
pub fn expand(
    records: &HashMap<FileId, FileRecord>,
    global: &GlobalSymbolTable,
    start_file: &str,
    start_function: &str,
    max_depth: usize,
    max_paths: usize,
) -> ExpansionResult {
    let mut result = ExpansionResult::default();
    let Some(record) = records.values().find(|r| r.path.to_string_lossy() == start_file) else {
        return result;
    };
    let Some(start_line) = function_line(record, start_function) else {
        return result;
    };

    let root_step = ExecutionStep {
        file: start_file.to_string(),
        name: start_function.to_string(),
        line: start_line,
    };

    let budget = max_paths.saturating_mul(10).max(1);
    let mut explored = 0usize;
    let mut stack = vec![root_step];

    dfs(records, global, record, start_function, &mut stack, 0, max_depth, max_paths, budget, &mut explored, &mut result);
    result
}

fn function_line(record: &FileRecord, name: &str) -> Option<u32> {
    record
        .symbol_table
        .functions
        .get(name)
        .map(|f| f.line)
        .or_else(|| {
            record
                .symbol_table
                .classes
                .values()
                .find_map(|c| c.methods.get(name))
                .map(|f| f.line)
        })
}

#[allow(clippy::too_many_arguments)]
fn dfs(
    records: &HashMap<FileId, FileRecord>,
    global: &GlobalSymbolTable,
    record: &FileRecord,
    function_name: &str,
    stack: &mut Vec<ExecutionStep>,
    depth: usize,
    max_depth: usize,
    max_paths: usize,
    budget: usize,
    explored: &mut usize,
    result: &mut ExpansionResult,
) {
    *explored += 1;
    let current_key = stack.last().map(ExecutionStep::key).unwrap_or_default();

    if *explored > budget {
        result.pruned.push((current_key, PruneReason::Budget));
        return;
    }
    if result.paths.len() >= max_paths {
        result.pruned.push((current_key, PruneReason::MaxPaths));
        return;
    }
    if depth >= max_depth {
        result.paths.push(ExecutionPath { steps: stack.clone() });
        result.pruned.push((current_key, PruneReason::MaxDepth));
        return;
    }

    // Callee attribution is file-level, not per-function: `record.calls` is
    // extracted once per file (pipeline phase 2) rather than scoped to the
    // enclosing function, so every call in the file is a candidate outgoing
    // edge from any function in it. Over-approximates recall-biased, like
    // the rest of the call-graph heuristics in this crate.
    let mut any_callee = false;
    for call in &record.calls {
        let Some(qualified) = global.resolve_short_name(&call.function_name) else { continue };
        let Some(callee_record) = records.values().find(|r| r.path.to_string_lossy() == qualified.file_path.as_ref()) else {
            continue;
        };
        let Some(callee_line) = function_line(callee_record, &call.function_name) else { continue };

        let step = ExecutionStep {
            file: callee_record.path.to_string_lossy().to_string(),
            name: call.function_name.clone(),
            line: callee_line,
        };
        let key = step.key();

        if stack.iter().any(|s| s.key() == key) {
            result.pruned.push((key, PruneReason::Cycle));
            continue;
        }

        any_callee = true;
        stack.push(step);
        dfs(
            records,
            global,
            callee_record,
            &call.function_name,
            stack,
            depth + 1,
            max_depth,
            max_paths,
            budget,
            explored,
            result,
        );
        stack.pop();

        if result.paths.len() >= max_paths || *explored > budget {
            break;
        }
    }

    if !any_callee {
        result.paths.push(ExecutionPath { steps: stack.clone() });
    }
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
    fn leaf_function_with_no_calls_yields_one_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.php");
        fs::write(&path, "<?php function handle($id) { echo $id; }").unwrap();

        let discovered = vec![DiscoveredFile { path: path.clone(), language: "php" }];
        let options = TraceOptions::default();
        let allocator = FileIdAllocator::new();
        let (records, global, _stats) = parse_and_merge(&discovered, &options, &allocator);

        let result = expand(&records, &global, &path.to_string_lossy(), "handle", 10, 5);
        assert_eq!(result.paths.len(), 1);
        assert_eq!(result.paths[0].steps.len(), 1);
    }

    #[test]
    fn unknown_start_function_yields_no_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.php");
        fs::write(&path, "<?php function handle($id) { echo $id; }").unwrap();

        let discovered = vec![DiscoveredFile { path: path.clone(), language: "php" }];
        let options = TraceOptions::default();
        let allocator = FileIdAllocator::new();
        let (records, global, _stats) = parse_and_merge(&discovered, &options, &allocator);

        let result = expand(&records, &global, &path.to_string_lossy(), "nope", 10, 5);
        assert!(result.paths.is_empty());
    }
}
