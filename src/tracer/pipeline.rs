//! Parse + symbol-table merge (C8 phases 2-3, spec §4.6).

use std::collections::HashMap;
use std::path::PathBuf;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::cache::{CachedParse, ParseCache};
use crate::config::TraceOptions;
use crate::flow::FlowNode;
use crate::parsing::analyzer::LanguageAnalyzer;
use crate::parsing::{analyzer_for_language, pool::ParserPool};
use crate::symbol::{Assignment, CallSite, GlobalSymbolTable, SymbolTable};
use crate::tracer::discover::DiscoveredFile;
use crate::types::{FileId, FileIdAllocator};

/// Per-file extraction result kept after the tree is closed. `body_source`
/// fields inside `symbol_table`'s functions/methods are cleared by
/// `release_bodies` once flow tracing no longer needs them (phase 7).
pub struct FileRecord {
    pub id: FileId,
    pub path: PathBuf,
    pub language: &'static str,
    pub symbol_table: SymbolTable,
    pub sources: Vec<FlowNode>,
    pub assignments: Vec<Assignment>,
    pub calls: Vec<CallSite>,
    /// Set once the tree backing this record's extraction has been dropped;
    /// any later operation needing the AST again must reparse from source.
    pub needs_reparse: bool,
    pub skipped: bool,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub files_discovered: usize,
    pub files_parsed: usize,
    pub files_skipped: usize,
    pub sources_found: usize,
    pub cross_file_flows: usize,
}

/// Parse every discovered file in parallel (one checked-out parser per
/// worker), then merge per-file symbol tables into one global table
/// sequentially (spec §5: single-writer discipline on shared tracer state).
pub fn parse_and_merge(
    files: &[DiscoveredFile],
    options: &TraceOptions,
    allocator: &FileIdAllocator,
) -> (HashMap<FileId, FileRecord>, GlobalSymbolTable, Stats) {
    let pool = ParserPool::new();
    let cache: ParseCache<String> = ParseCache::new(options.cache_max_entries, options.cache_max_memory_bytes);

    let records: Vec<(FileId, FileRecord)> = files
        .par_iter()
        .filter_map(|discovered| {
            let id = allocator.allocate()?;
            Some((id, parse_one(&pool, &cache, discovered, options.max_file_size_bytes)))
        })
        .collect();

    let mut stats = Stats {
        files_discovered: files.len(),
        ..Default::default()
    };
    let mut global = GlobalSymbolTable::new();
    let mut by_id = HashMap::with_capacity(records.len());

    for (id, mut record) in records {
        if record.skipped {
            stats.files_skipped += 1;
        } else {
            stats.files_parsed += 1;
            stats.sources_found += record.sources.len();
            global.merge_file(id, record.symbol_table.clone());
        }
        record.id = id;
        by_id.insert(id, record);
    }

    (by_id, global, stats)
}

/// Extraction proper (symbol table, sources, assignments, calls), shared by
/// the cache-hit and cache-miss paths below so both read the same tree the
/// same way.
///
/// Assignments and calls are extracted unconditionally: the path expander
/// (C9) walks the call graph starting from an arbitrary function, which may
/// live in a file with no taint source at all, so gating extraction on
/// `sources` being non-empty would silently starve it of call edges.
fn extract(
    analyzer: &dyn LanguageAnalyzer,
    root: Node<'_>,
    source: &str,
    file_path: &str,
) -> (SymbolTable, Vec<FlowNode>, Vec<Assignment>, Vec<CallSite>) {
    let symbol_table = analyzer
        .build_symbol_table(file_path, source, root)
        .unwrap_or_else(|_| SymbolTable::new(file_path, analyzer.language_name()));
    let sources = analyzer.find_input_sources(root, source, file_path);
    let assignments = analyzer.extract_assignments(root, source, "global");
    let calls = analyzer.extract_calls(root, source, "global");

    (symbol_table, sources, assignments, calls)
}

/// Parse one file through the shared `ParseCache` (C1): spec §2's control
/// flow is "the parser pool yields a tree stored in the cache", so a cache
/// hit skips the parser pool entirely and a miss parses once, extracts, and
/// `Put`s the resulting `CachedParse` before the tree is ever dropped.
fn parse_one(pool: &ParserPool, cache: &ParseCache<String>, discovered: &DiscoveredFile, max_file_size_bytes: u64) -> FileRecord {
    let empty = || FileRecord {
        id: FileId::new(1).unwrap(),
        path: discovered.path.clone(),
        language: discovered.language,
        symbol_table: SymbolTable::new(discovered.path.to_string_lossy(), discovered.language),
        sources: Vec::new(),
        assignments: Vec::new(),
        calls: Vec::new(),
        needs_reparse: true,
        skipped: true,
    };

    let Ok(metadata) = std::fs::metadata(&discovered.path) else { return empty() };
    if metadata.len() > max_file_size_bytes {
        return empty();
    }
    let Some(analyzer) = analyzer_for_language(discovered.language) else { return empty() };
    let file_path = discovered.path.to_string_lossy().to_string();

    if let Some(extracted) = cache.get_with(&file_path, |cached| extract(analyzer.as_ref(), cached.root_node(), cached.source_str(), &file_path)) {
        let (symbol_table, sources, assignments, calls) = extracted;
        return FileRecord {
            id: FileId::new(1).unwrap(),
            path: discovered.path.clone(),
            language: discovered.language,
            symbol_table,
            sources,
            assignments,
            calls,
            needs_reparse: true,
            skipped: false,
        };
    }
    cache.record_miss();

    let Ok(source) = std::fs::read_to_string(&discovered.path) else { return empty() };
    let Some(mut parser) = pool.checkout(discovered.language) else { return empty() };
    let Some(tree) = parser.parse(&source, None) else { return empty() };
    drop(parser);

    let root = tree.root_node();
    let (symbol_table, sources, assignments, calls) = extract(analyzer.as_ref(), root, &source, &file_path);

    // The cache takes ownership of `tree`; any later access to this file's
    // AST within the same run is served from the cache instead of
    // re-invoking the parser pool.
    cache.put(file_path, CachedParse::new(tree, source.into_bytes()));

    FileRecord {
        id: FileId::new(1).unwrap(),
        path: discovered.path.clone(),
        language: discovered.language,
        symbol_table,
        sources,
        assignments,
        calls,
        needs_reparse: true,
        skipped: false,
    }
}

/// Phase 7: drop `body_source` from every function/method once flow tracing
/// no longer needs it.
pub fn release_bodies(records: &mut HashMap<FileId, FileRecord>) {
    for record in records.values_mut() {
        for function in record.symbol_table.functions.values_mut() {
            function.release_body();
        }
        for class in record.symbol_table.classes.values_mut() {
            for method in class.methods.values_mut() {
                method.release_body();
            }
            if let Some(ctor) = class.constructor.as_mut() {
                ctor.release_body();
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
    fn parses_file_and_caches_assignments_when_source_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.php");
        fs::write(&path, "<?php $x = $_GET['id']; echo $x;").unwrap();

        let discovered = vec![DiscoveredFile {
            path,
            language: "php",
        }];
        let options = TraceOptions::default();
        let allocator = FileIdAllocator::new();
        let (records, global, stats) = parse_and_merge(&discovered, &options, &allocator);

        assert_eq!(stats.files_parsed, 1);
        assert_eq!(records.len(), 1);
        let record = records.values().next().unwrap();
        assert_eq!(record.sources.len(), 1);
        assert_eq!(record.assignments.len(), 1);
        assert_eq!(global.files.len(), 1);
    }

    #[test]
    fn oversized_file_is_skipped_not_errored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.php");
        fs::write(&path, "<?php ".to_string() + &"x".repeat(64)).unwrap();

        let discovered = vec![DiscoveredFile {
            path,
            language: "php",
        }];
        let mut options = TraceOptions::default();
        options.max_file_size_bytes = 8;
        let allocator = FileIdAllocator::new();
        let (_records, _global, stats) = parse_and_merge(&discovered, &options, &allocator);

        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.files_parsed, 0);
    }

    #[test]
    fn reparsing_the_same_file_identity_hits_the_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.php");
        fs::write(&path, "<?php $x = $_GET['id']; echo $x;").unwrap();

        let pool = ParserPool::new();
        let cache: ParseCache<String> = ParseCache::new(10, usize::MAX);
        let discovered = DiscoveredFile {
            path,
            language: "php",
        };

        let first = parse_one(&pool, &cache, &discovered, TraceOptions::default().max_file_size_bytes);
        let stats_after_miss = cache.stats();
        assert_eq!(stats_after_miss.hits, 0);
        assert_eq!(stats_after_miss.misses, 1);

        let second = parse_one(&pool, &cache, &discovered, TraceOptions::default().max_file_size_bytes);
        let stats_after_hit = cache.stats();
        assert_eq!(stats_after_hit.hits, 1);
        assert_eq!(stats_after_hit.misses, 1);

        assert_eq!(first.sources.len(), second.sources.len());
        assert_eq!(first.assignments.len(), second.assignments.len());
    }
}
