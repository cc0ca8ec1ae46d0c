//! Framework-carrier discovery (C7, spec §4.5): finds which class
//! properties/methods in a PHP codebase effectively return user input.
//!
//! Three stages, each grounded in its own submodule: the superglobal finder
//! (§4.5.1), the taint propagator (§4.5.2, phases 1-4), and this module's
//! `CarrierMap` assembly (§4.5.3).

pub mod propagator;
pub mod superglobal;

use std::collections::HashMap;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::TraceResult;
use crate::parsing::analyzer::LanguageAnalyzer;
use crate::parsing::php::PhpAnalyzer;
use crate::parsing::pool::ParserPool;
use crate::symbol::{InputCarrier, SourceType};

use propagator::{analyze_method_info, emit_taint_flows, ClassInfo};
use superglobal::find_superglobal_usages;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CarrierStatistics {
    pub total_superglobal_usages: usize,
    pub unique_carriers: usize,
    pub total_taint_flows: usize,
    pub classes_analyzed: usize,
    pub by_source_type: HashMap<String, usize>,
    pub by_class_name: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierMap {
    pub codebase_path: String,
    /// RFC 3339 timestamp; stamped by the caller (see spec §9 / module docs
    /// on `Date.now`-equivalents being supplied externally, not derived
    /// in-process) rather than sourced from a clock inside this module.
    pub discovered_at: String,
    pub framework: Option<String>,
    pub carriers: Vec<InputCarrier>,
    pub statistics: CarrierStatistics,
}

impl CarrierMap {
    pub fn save(&self, path: &Path) -> TraceResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::TraceError::general(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> TraceResult<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| crate::error::TraceError::general(e.to_string()))
    }
}

/// Phase 1 (spec §4.5.2): parse every class in `files`, pre-analyze each
/// method's body into its three booleans (plus derived helper fields), then
/// drop the body source. Runs across files in parallel — each worker owns
/// its own checked-out parser (spec §5 parser-pool concurrency model).
fn build_class_infos(files: &[(String, String)]) -> HashMap<String, ClassInfo> {
    let pool = ParserPool::new();
    let analyzer = PhpAnalyzer;

    let per_file: Vec<HashMap<String, ClassInfo>> = files
        .par_iter()
        .map(|(path, source)| {
            let mut parser = match pool.checkout("php") {
                Some(p) => p,
                None => return HashMap::new(),
            };
            let Some(tree) = parser.parse(source, None) else { return HashMap::new() };
            drop(parser);

            let mut out = HashMap::new();
            for class in analyzer.extract_classes(tree.root_node(), source) {
                let mut info = ClassInfo {
                    name: class.name.clone(),
                    file: path.clone(),
                    properties: class.properties.keys().cloned().collect(),
                    methods: HashMap::new(),
                    constructor: class.constructor.as_ref().map(|_| "__construct".to_string()),
                    parent_class: class.extends.clone(),
                };
                let mut methods: Vec<_> = class.methods.values().collect();
                if let Some(ctor) = &class.constructor {
                    methods.push(ctor);
                }
                for method in methods {
                    let short_name = method.name.rsplit('.').next().unwrap_or(&method.name);
                    let first_param = method.parameters.first().map(|p| p.name.clone());
                    let method_info = analyze_method_info(
                        short_name,
                        matches!(method.visibility, crate::symbol::Visibility::Public),
                        first_param,
                        &method.body_source,
                    );
                    info.methods.insert(short_name.to_string(), method_info);
                }
                out.insert(class.name, info);
            }
            out
        })
        .collect();

    let mut classes = HashMap::new();
    for file_classes in per_file {
        classes.extend(file_classes);
    }
    classes
}

/// Discover carriers across an already-read set of `(file_path, source)`
/// pairs. Discovery (walking the filesystem, honoring skip directories) is
/// the caller's responsibility, matching the tracer's own phase split
/// (spec §4.6 phase 1 vs. this component's phases 1-4).
pub fn discover_carriers(codebase_path: &Path, files: &[(String, String)], discovered_at: &str) -> TraceResult<CarrierMap> {
    let classes = build_class_infos(files);

    let pool = ParserPool::new();
    let mut usages = Vec::new();
    for (path, source) in files {
        let Some(mut parser) = pool.checkout("php") else { continue };
        let Some(tree) = parser.parse(source, None) else { continue };
        drop(parser);
        usages.extend(find_superglobal_usages(tree.root_node(), source, path));
    }

    let flows: Vec<_> = usages
        .iter()
        .flat_map(|usage| emit_taint_flows(usage, &classes))
        .collect();

    let carriers = propagator::aggregate_carriers(&flows, &classes);

    let mut by_source_type: HashMap<String, usize> = HashMap::new();
    for carrier in &carriers {
        for source_type in &carrier.source_types {
            *by_source_type.entry(source_type_key(*source_type)).or_insert(0) += 1;
        }
        // A carrier's source types are unioned from its flows at aggregation
        // time; when none are recorded yet, fall back to a conservative
        // `user_input` count so statistics never silently omit a carrier.
        if carrier.source_types.is_empty() {
            *by_source_type.entry(source_type_key(SourceType::UserInput)).or_insert(0) += 1;
        }
    }
    let mut by_class_name: HashMap<String, usize> = HashMap::new();
    for carrier in &carriers {
        *by_class_name.entry(carrier.class_name.clone()).or_insert(0) += 1;
    }

    let file_names: Vec<String> = files.iter().map(|(p, _)| p.clone()).collect();
    let framework = crate::parsing::catalog::catalog().identify_framework(&file_names).map(str::to_string);

    let statistics = CarrierStatistics {
        total_superglobal_usages: usages.len(),
        unique_carriers: carriers.len(),
        total_taint_flows: flows.len(),
        classes_analyzed: classes.len(),
        by_source_type,
        by_class_name,
    };

    Ok(CarrierMap {
        codebase_path: codebase_path.display().to_string(),
        discovered_at: discovered_at.to_string(),
        framework,
        carriers,
        statistics,
    })
}

fn source_type_key(source_type: SourceType) -> String {
    source_type.as_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn discovers_direct_assignment_carrier_end_to_end() {
        let source = r#"<?php
class MyBB {
    public $input;
    function __construct() {
        $this->input = $_GET['action'];
    }
}
"#;
        let files = vec![("mybb.php".to_string(), source.to_string())];
        let map = discover_carriers(&PathBuf::from("."), &files, "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(map.carriers.len(), 1);
        assert_eq!(map.carriers[0].property_name.as_deref(), Some("input"));
        assert_eq!(map.statistics.classes_analyzed, 1);
        assert_eq!(map.statistics.total_superglobal_usages, 1);
    }

    #[test]
    fn carrier_map_round_trips_through_json() {
        let source = r#"<?php
class A {
    function __construct() {
        $this->id = $_GET['id'];
    }
}
"#;
        let files = vec![("a.php".to_string(), source.to_string())];
        let map = discover_carriers(&PathBuf::from("."), &files, "2026-01-01T00:00:00Z").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carriers.json");
        map.save(&path).unwrap();
        let loaded = CarrierMap::load(&path).unwrap();
        assert_eq!(loaded.carriers.len(), map.carriers.len());
        assert_eq!(loaded.codebase_path, map.codebase_path);
    }
}
