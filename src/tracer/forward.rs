//! Forward flow tracing (C8 phase 5, spec §4.6 step 5).
//!
//! Seeds the flow map with every detected source, then walks each file's
//! cached assignments/calls looking for the taint-detection predicate (spec
//! §4.3: the assignment/call already carries `is_tainted`/`taint_source`,
//! computed once during extraction) to grow variable, parameter, and sink
//! nodes outward, recursing up to `max_depth`.

use std::collections::{HashMap, HashSet};

use crate::config::TraceOptions;
use crate::flow::{FlowEdge, FlowEdgeType, FlowMap, FlowNode, TaintChain, TaintStep, TaintStepType};
use crate::symbol::GlobalSymbolTable;
use crate::tracer::pipeline::FileRecord;
use crate::types::FileId;

/// Key identifying one `CallArg` inside a `CallSite`, used to splice a
/// recursion-built taint chain back onto the extracted argument it describes
/// (spec §4.6 step 5).
pub type ArgChainKey = (String, u32, u32, usize);

/// Result of a forward trace over every seed source in `records`.
pub struct ForwardResult {
    pub map: FlowMap,
    pub cross_file_flows: usize,
    /// The immutable-prefix `TaintChain` that reached each node id, built as
    /// the walk recurses (spec §4.6 step 5: "cloned on branch").
    pub chains: HashMap<String, TaintChain>,
    /// Flattened `TaintChain` expressions destined for a specific tainted
    /// call argument, keyed by `(file_path, call.line, call.column, arg.index)`.
    /// `Tracer::run` splices these back onto `CallArg::taint_chain` once
    /// tracing finishes, since `FileRecord` is borrowed immutably throughout
    /// the walk itself.
    pub arg_chains: HashMap<ArgChainKey, Vec<String>>,
}

fn strip_sigil(expr: &str) -> &str {
    expr.trim_start_matches('$')
}

pub fn trace_forward(
    records: &HashMap<FileId, FileRecord>,
    global: &GlobalSymbolTable,
    options: &TraceOptions,
) -> ForwardResult {
    let mut map = FlowMap::new();
    let mut cross_file_flows = 0usize;
    let mut chains: HashMap<String, TaintChain> = HashMap::new();
    let mut arg_chains: HashMap<ArgChainKey, Vec<String>> = HashMap::new();

    for record in records.values() {
        if record.skipped {
            continue;
        }
        for source in &record.sources {
            if !map.add_node(source.clone()) {
                continue;
            }
            let seed_chain = TaintChain::new().with_step(TaintStep {
                step_type: TaintStepType::Source,
                expression: source.name.clone(),
                file: record.path.to_string_lossy().into_owned(),
                line: source.line,
                description: format!("source {}", source.name),
            });
            chains.insert(source.id.clone(), seed_chain.clone());

            let mut visited = HashSet::new();
            visited.insert(format!("{}:{}", record.path.display(), source.name));
            walk(
                record,
                records,
                global,
                options,
                &source.id,
                &source.name,
                &seed_chain,
                0,
                &mut map,
                &mut cross_file_flows,
                &mut visited,
                &mut chains,
                &mut arg_chains,
            );
        }
    }

    ForwardResult { map, cross_file_flows, chains, arg_chains }
}

/// Recurse from `from_id` (a node already in `map`) carrying taint under the
/// name `var_name`, within `record`. `visited` prevents cycles on reassignment
/// chains (`$x = $x` patterns).
#[allow(clippy::too_many_arguments)]
fn walk(
    record: &FileRecord,
    all_records: &HashMap<FileId, FileRecord>,
    global: &GlobalSymbolTable,
    options: &TraceOptions,
    from_id: &str,
    var_name: &str,
    chain: &TaintChain,
    depth: usize,
    map: &mut FlowMap,
    cross_file_flows: &mut usize,
    visited: &mut HashSet<String>,
    chains: &mut HashMap<String, TaintChain>,
    arg_chains: &mut HashMap<ArgChainKey, Vec<String>>,
) {
    if depth >= options.max_depth {
        return;
    }

    for assignment in &record.assignments {
        if !assignment.is_tainted {
            continue;
        }
        let Some(taint_source) = assignment.taint_source.as_deref() else { continue };
        if taint_source != var_name && !assignment.source.contains(var_name) {
            continue;
        }
        let key = format!("{}:{}", record.path.display(), assignment.target);
        if !visited.insert(key) {
            continue;
        }

        let var_node = FlowNode::variable(
            &record.path.to_string_lossy(),
            assignment.line,
            assignment.column,
            record.language,
            &assignment.target,
            &format!("{} {} {}", assignment.target, assignment.operator, assignment.source),
        );
        let var_id = var_node.id.clone();
        if map.add_node(var_node) {
            map.add_edge(FlowEdge {
                from_id: from_id.to_string(),
                to_id: var_id.clone(),
                edge_type: FlowEdgeType::Assignment,
                description: format!("{} = {}", assignment.target, assignment.source),
            });
        }

        let var_chain = chain.with_step(TaintStep {
            step_type: TaintStepType::Assignment,
            expression: assignment.target.clone(),
            file: record.path.to_string_lossy().into_owned(),
            line: assignment.line,
            description: format!("{} = {}", assignment.target, assignment.source),
        });
        chains.insert(var_id.clone(), var_chain.clone());

        walk(
            record,
            all_records,
            global,
            options,
            &var_id,
            &assignment.target,
            &var_chain,
            depth + 1,
            map,
            cross_file_flows,
            visited,
            chains,
            arg_chains,
        );
    }

    for call in &record.calls {
        // An argument carries `var_name`'s taint either because extraction
        // already flagged it directly (a literal source expression passed
        // inline) or because its text is exactly the variable we're
        // following from an earlier assignment in this walk.
        let tainted_here = call.arguments.iter().any(|arg| {
            arg.value == var_name || strip_sigil(&arg.value) == strip_sigil(var_name) || (arg.is_tainted && arg.value.contains(var_name))
        });
        if !tainted_here {
            continue;
        }

        let sink_node = FlowNode::sink(
            &record.path.to_string_lossy(),
            call.line,
            call.column,
            record.language,
            &call.function_name,
            &format!("{}(...)", call.function_name),
        );
        let sink_id = sink_node.id.clone();
        if map.add_node(sink_node) {
            map.add_edge(FlowEdge {
                from_id: from_id.to_string(),
                to_id: sink_id.clone(),
                edge_type: FlowEdgeType::Call,
                description: format!("call to {}", call.function_name),
            });
        }

        let sink_chain = chain.with_step(TaintStep {
            step_type: TaintStepType::Sink,
            expression: call.function_name.clone(),
            file: record.path.to_string_lossy().into_owned(),
            line: call.line,
            description: format!("call to {}", call.function_name),
        });
        chains.insert(sink_id.clone(), sink_chain.clone());

        let chain_expressions: Vec<String> = sink_chain.steps.iter().map(|s| s.expression.clone()).collect();
        for arg in &call.arguments {
            let matches = arg.value == var_name || strip_sigil(&arg.value) == strip_sigil(var_name) || (arg.is_tainted && arg.value.contains(var_name));
            if matches {
                arg_chains.insert(
                    (record.path.to_string_lossy().into_owned(), call.line, call.column, arg.index),
                    chain_expressions.clone(),
                );
            }
        }

        if !options.follow_imports {
            continue;
        }
        let Some(qualified) = global.resolve_short_name(&call.function_name) else { continue };
        let Some(callee_record) = all_records.values().find(|r| r.path.to_string_lossy() == qualified.file_path.as_ref()) else {
            continue;
        };

        let parameters = callee_record
            .symbol_table
            .functions
            .get(call.function_name.as_str())
            .map(|f| f.parameters.clone())
            .or_else(|| {
                callee_record
                    .symbol_table
                    .classes
                    .values()
                    .find_map(|c| c.methods.get(call.function_name.as_str()))
                    .map(|m| m.parameters.clone())
            });
        let Some(parameters) = parameters else { continue };

        let is_cross_file = callee_record.path != record.path;
        if is_cross_file {
            *cross_file_flows += 1;
        }

        for arg in call.arguments.iter().filter(|a| a.is_tainted) {
            let Some(param) = parameters.get(arg.index) else { continue };
            let param_node = FlowNode::param(
                &callee_record.path.to_string_lossy(),
                0,
                0,
                callee_record.language,
                &param.name,
            );
            let param_id = param_node.id.clone();
            if map.add_node(param_node) {
                map.add_edge(FlowEdge {
                    from_id: sink_id.clone(),
                    to_id: param_id.clone(),
                    edge_type: FlowEdgeType::Parameter,
                    description: format!("argument {} binds parameter {}", arg.index, param.name),
                });
            }

            let param_chain = sink_chain.with_step(TaintStep {
                step_type: TaintStepType::Parameter,
                expression: param.name.clone(),
                file: callee_record.path.to_string_lossy().into_owned(),
                line: 0,
                description: format!("argument {} binds parameter {}", arg.index, param.name),
            });
            chains.insert(param_id.clone(), param_chain.clone());

            let mut callee_visited = HashSet::new();
            callee_visited.insert(format!("{}:{}", callee_record.path.display(), param.name));
            walk(
                callee_record,
                all_records,
                global,
                options,
                &param_id,
                &param.name,
                &param_chain,
                depth + 1,
                map,
                cross_file_flows,
                &mut callee_visited,
                chains,
                arg_chains,
            );
        }
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
    fn traces_source_through_assignment_to_sink() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.php");
        fs::write(&path, "<?php $x = $_GET['id']; echo $x;").unwrap();

        let discovered = vec![DiscoveredFile { path, language: "php" }];
        let options = TraceOptions::default();
        let allocator = FileIdAllocator::new();
        let (records, global, _stats) = parse_and_merge(&discovered, &options, &allocator);

        let result = trace_forward(&records, &global, &options);
        assert!(result.map.node_count() >= 2);
        assert!(result
            .map
            .nodes
            .iter()
            .any(|n| matches!(n.node_type, crate::flow::FlowNodeType::Variable)));

        let sink_id = result
            .map
            .nodes
            .iter()
            .find(|n| matches!(n.node_type, crate::flow::FlowNodeType::Sink))
            .map(|n| n.id.clone())
            .unwrap();
        let sink_chain = result.chains.get(&sink_id).expect("sink should have a recorded taint chain");
        assert_eq!(sink_chain.steps.len(), 3);
        assert_eq!(sink_chain.steps[0].step_type, crate::flow::TaintStepType::Source);
        assert_eq!(sink_chain.steps[1].step_type, crate::flow::TaintStepType::Assignment);
        assert_eq!(sink_chain.steps[2].step_type, crate::flow::TaintStepType::Sink);
        assert!(!result.arg_chains.is_empty(), "expected the echo argument to carry a spliced chain");
    }

    #[test]
    fn depth_zero_stops_before_any_assignment_edge() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.php");
        fs::write(&path, "<?php $x = $_GET['id']; echo $x;").unwrap();

        let discovered = vec![DiscoveredFile { path, language: "php" }];
        let mut options = TraceOptions::default();
        options.max_depth = 0;
        let allocator = FileIdAllocator::new();
        let (records, global, _stats) = parse_and_merge(&discovered, &options, &allocator);

        let result = trace_forward(&records, &global, &options);
        assert_eq!(result.map.edge_count(), 0);
    }
}
