//! Orchestrates the tracer pipeline end to end (spec §4.6): discovery,
//! parse + merge, forward flow tracing, memory back-off, then body release.

pub mod backward;
pub mod discover;
pub mod forward;
pub mod memory;
pub mod pipeline;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::config::TraceOptions;
use crate::error::TraceResult;
use crate::expander::{self, ExpansionResult};
use crate::flow::FlowMap;
use crate::types::{FileId, FileIdAllocator};

use backward::BackwardTraceResult;
use forward::ArgChainKey;
use memory::MemoryMonitor;
use pipeline::{FileRecord, Stats};

/// The full output of one `Tracer::run` invocation.
pub struct TraceRun {
    pub map: FlowMap,
    pub stats: Stats,
    pub duration: Duration,
    /// Set when memory pressure (A4) forced the run to stop early; the
    /// caller still receives everything collected up to that point.
    pub partial: bool,
}

pub struct Tracer {
    options: TraceOptions,
}

impl Tracer {
    pub fn new(options: TraceOptions) -> Self {
        Self { options }
    }

    /// Run discovery, parsing, and forward flow tracing over `root`.
    pub fn run(&self, root: &Path) -> TraceResult<TraceRun> {
        let started = std::time::Instant::now();
        let monitor = MemoryMonitor::new(self.options.max_memory_mb);

        let discovered = discover::discover(root, &self.options)?;
        let allocator = FileIdAllocator::new();
        let (records, global, mut stats) = pipeline::parse_and_merge(&discovered, &self.options, &allocator);

        let mut partial = false;
        for _ in 0..records.len() {
            if monitor.tick() {
                partial = true;
                break;
            }
        }

        let forward = forward::trace_forward(&records, &global, &self.options);
        stats.cross_file_flows = forward.cross_file_flows;

        let mut records = records;
        splice_arg_chains(&mut records, &forward.arg_chains);
        pipeline::release_bodies(&mut records);

        Ok(TraceRun {
            map: forward.map,
            stats,
            duration: started.elapsed(),
            partial,
        })
    }

    /// Discover + parse `root`, then trace a single expression backward.
    pub fn run_backward(&self, root: &Path, target: &str) -> TraceResult<BackwardTraceResult> {
        let discovered = discover::discover(root, &self.options)?;
        let allocator = FileIdAllocator::new();
        let (records, _global, _stats) = pipeline::parse_and_merge(&discovered, &self.options, &allocator);
        Ok(backward::trace_backward(&records, target, self.options.max_depth))
    }

    /// Discover + parse `root`, then trace every target backward in one
    /// sweep (each file's assignments are read once regardless of target count).
    pub fn run_backward_batch(&self, root: &Path, targets: &[String]) -> TraceResult<Vec<BackwardTraceResult>> {
        let discovered = discover::discover(root, &self.options)?;
        let allocator = FileIdAllocator::new();
        let (records, _global, _stats) = pipeline::parse_and_merge(&discovered, &self.options, &allocator);
        Ok(backward::trace_backward_batch(&records, targets, self.options.max_depth))
    }

    /// Discover + parse `root`, then expand every call path reachable from
    /// `start_function` in `start_file` (C9, spec §4.7).
    pub fn run_paths(&self, root: &Path, start_file: &str, start_function: &str, max_paths: usize) -> TraceResult<ExpansionResult> {
        let discovered = discover::discover(root, &self.options)?;
        let allocator = FileIdAllocator::new();
        let (records, global, _stats) = pipeline::parse_and_merge(&discovered, &self.options, &allocator);
        Ok(expander::expand(&records, &global, start_file, start_function, self.options.max_depth, max_paths))
    }
}

/// Splice the `TaintChain` expressions the forward walk built for each
/// tainted call argument back onto the `CallArg` it describes. Done as a
/// pass after tracing finishes, since the walk itself only ever holds an
/// immutable `&FileRecord` (spec §4.6 step 5 builds chains during the
/// recursion; this is where they land on the data model).
fn splice_arg_chains(records: &mut HashMap<FileId, FileRecord>, arg_chains: &HashMap<ArgChainKey, Vec<String>>) {
    if arg_chains.is_empty() {
        return;
    }
    for record in records.values_mut() {
        let path = record.path.to_string_lossy().into_owned();
        for call in record.calls.iter_mut() {
            for arg in call.arguments.iter_mut() {
                let key = (path.clone(), call.line, call.column, arg.index);
                if let Some(expressions) = arg_chains.get(&key) {
                    arg.taint_chain = Some(expressions.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn run_traces_a_simple_php_source_to_sink() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index.php"), "<?php $id = $_GET['id']; echo $id;").unwrap();

        let tracer = Tracer::new(TraceOptions::default());
        let run = tracer.run(dir.path()).unwrap();

        assert_eq!(run.stats.files_parsed, 1);
        assert!(run.map.node_count() >= 2);
        assert!(!run.partial);
    }

    #[test]
    fn splice_arg_chains_sets_the_matching_call_arg() {
        use crate::symbol::{CallArg, CallSite, SymbolTable};
        use crate::types::FileId;
        use std::path::PathBuf;

        let mut call = CallSite::new("echo", 1, 10, "global");
        call.arguments.push(CallArg {
            index: 0,
            value: "$x".into(),
            is_tainted: true,
            taint_source: Some("$x".into()),
            taint_chain: None,
        });
        call.finalize();

        let record = FileRecord {
            id: FileId::new(1).unwrap(),
            path: PathBuf::from("index.php"),
            language: "php",
            symbol_table: SymbolTable::new("index.php", "php"),
            sources: Vec::new(),
            assignments: Vec::new(),
            calls: vec![call],
            needs_reparse: true,
            skipped: false,
        };
        let mut records = HashMap::new();
        records.insert(FileId::new(1).unwrap(), record);

        let mut arg_chains: HashMap<ArgChainKey, Vec<String>> = HashMap::new();
        arg_chains.insert(("index.php".to_string(), 1, 10, 0), vec!["$_GET".into(), "$x".into(), "echo".into()]);

        splice_arg_chains(&mut records, &arg_chains);

        let spliced = &records.values().next().unwrap().calls[0].arguments[0].taint_chain;
        assert_eq!(spliced.as_deref(), Some(["$_GET".to_string(), "$x".to_string(), "echo".to_string()].as_slice()));
    }

    #[test]
    fn run_paths_expands_a_leaf_function_into_one_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.php");
        fs::write(&path, "<?php function handle($id) { echo $id; }").unwrap();

        let tracer = Tracer::new(TraceOptions::default());
        let result = tracer.run_paths(dir.path(), &path.to_string_lossy(), "handle", 5).unwrap();

        assert_eq!(result.paths.len(), 1);
        assert_eq!(result.paths[0].steps[0].name, "handle");
    }

    #[test]
    fn run_backward_locates_the_get_source() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index.php"), "<?php $id = $_GET['id']; echo $id;").unwrap();

        let tracer = Tracer::new(TraceOptions::default());
        let result = tracer.run_backward(dir.path(), "$id").unwrap();

        assert_eq!(result.sources.len(), 1);
    }
}
