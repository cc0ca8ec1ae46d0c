//! Go analyzer: bespoke structural extraction (spec §4.3). Go has no
//! classes, so `extract_classes` is always empty and `extract_functions`
//! covers both free functions and methods (receiver types are folded into
//! the flattened `Type.Method` name the same way PHP/Python/JS flatten
//! `Class.method`).

use tree_sitter::Node;

use crate::error::TraceResult;
use crate::flow::{FlowMap, FlowNode};
use crate::parsing::analyzer::{
    safe_truncate_str, truncate_for_display, AnalysisState, LanguageAnalyzer, MethodFlowSummary,
    NodeTrackingState,
};
use crate::parsing::catalog::catalog;
use crate::symbol::{
    Assignment, CallArg, CallSite, ClassDef, FunctionDef, ParameterDef, SymbolTable, TargetType,
    Visibility,
};
use crate::types::Range;

pub struct GoAnalyzer;

fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

fn visit_preorder<'a>(node: Node<'a>, state: &mut NodeTrackingState, f: &mut impl FnMut(Node<'a>)) {
    if !state.enter() {
        return;
    }
    f(node);
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit_preorder(child, state, f);
    }
    state.exit();
}

fn field_text<'a>(node: Node<'_>, field: &str, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| node_text(n, source))
}

fn receiver_type_name(node: Node<'_>, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    for param in receiver.children(&mut cursor) {
        if let Some(type_node) = param.child_by_field_name("type") {
            let text = node_text(type_node, source).trim_start_matches('*');
            return Some(text.to_string());
        }
    }
    None
}

fn enclosing_scope_name(node: Node<'_>, source: &str) -> String {
    let mut current = Some(node);
    while let Some(n) = current {
        if n.kind() == "function_declaration" || n.kind() == "method_declaration" {
            if let Some(name) = field_text(n, "name", source) {
                return name.to_string();
            }
        }
        current = n.parent();
    }
    "package".to_string()
}

impl GoAnalyzer {
    fn function_def_from(&self, node: Node<'_>, source: &str) -> FunctionDef {
        let name = field_text(node, "name", source).unwrap_or("").to_string();
        let range = Range::from_node(&node);
        let body = node.child_by_field_name("body");
        let body_range = body.map(|b| Range::from_node(&b)).unwrap_or(range);

        let mut parameters = Vec::new();
        if let Some(params) = node.child_by_field_name("parameters") {
            let mut cursor = params.walk();
            let mut index = 0;
            for child in params.children(&mut cursor) {
                if child.kind() != "parameter_declaration" && child.kind() != "variadic_parameter_declaration" {
                    continue;
                }
                let name_field = field_text(child, "name", source).unwrap_or("").to_string();
                parameters.push(ParameterDef {
                    index,
                    name: name_field,
                    type_hint: field_text(child, "type", source).map(str::to_string),
                    default_value: None,
                    is_variadic: child.kind() == "variadic_parameter_declaration",
                    is_reference: false,
                });
                index += 1;
            }
        }

        FunctionDef {
            name,
            line: range.start_line,
            end_line: range.end_line,
            visibility: if node_text(node, source).contains(" func ")
                || field_text(node, "name", source).is_some_and(|n| n.chars().next().is_some_and(|c| c.is_uppercase()))
            {
                Visibility::Public
            } else {
                Visibility::Module
            },
            parameters,
            return_type: field_text(node, "result", source).map(str::to_string),
            body_start: body_range.start_byte,
            body_end: body_range.end_byte,
            body_source: body.map(|b| node_text(b, source).to_string()).unwrap_or_default(),
            is_static: false,
            is_async: false,
            is_exported: field_text(node, "name", source).is_some_and(|n| n.chars().next().is_some_and(|c| c.is_uppercase())),
            is_variadic: false,
        }
    }
}

impl LanguageAnalyzer for GoAnalyzer {
    fn language_name(&self) -> &'static str {
        "go"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn build_symbol_table(&self, file_path: &str, source: &str, root: Node<'_>) -> TraceResult<SymbolTable> {
        let mut table = SymbolTable::new(file_path, self.language_name());
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            if child.kind() == "import_declaration" {
                table.imports.push(crate::symbol::Import {
                    path: node_text(child, source).to_string(),
                    file_id: crate::types::FileId::new(1).unwrap(),
                    alias: None,
                    is_glob: false,
                });
            }
        }
        for func in self.extract_functions(root, source) {
            table.functions.insert(func.name.clone(), func);
        }
        Ok(table)
    }

    /// Go has no classes; method sets on named types are reported through
    /// `extract_functions`'s `Type.Method` flattening instead.
    fn extract_classes(&self, _root: Node<'_>, _source: &str) -> Vec<ClassDef> {
        Vec::new()
    }

    fn extract_functions(&self, root: Node<'_>, source: &str) -> Vec<FunctionDef> {
        let mut functions = Vec::new();
        let mut state = NodeTrackingState::new();
        visit_preorder(root, &mut state, &mut |n| match n.kind() {
            "function_declaration" => functions.push(self.function_def_from(n, source)),
            "method_declaration" => {
                let mut def = self.function_def_from(n, source);
                if let Some(receiver) = receiver_type_name(n, source) {
                    def.name = format!("{receiver}.{}", def.name);
                }
                functions.push(def);
            }
            _ => {}
        });
        functions
    }

    fn extract_assignments(&self, root: Node<'_>, source: &str, scope: &str) -> Vec<Assignment> {
        let mut assignments = Vec::new();
        let mut state = NodeTrackingState::new();
        visit_preorder(root, &mut state, &mut |n| {
            let (lefts, rights, operator) = match n.kind() {
                "short_var_declaration" => (
                    n.child_by_field_name("left"),
                    n.child_by_field_name("right"),
                    ":=",
                ),
                "assignment_statement" => (
                    n.child_by_field_name("left"),
                    n.child_by_field_name("right"),
                    "=",
                ),
                _ => return,
            };
            let (Some(left), Some(right)) = (lefts, rights) else { return };
            let range = Range::from_node(&n);
            let target_type = match left.kind() {
                "selector_expression" => TargetType::Property,
                "index_expression" => TargetType::ArrayElement,
                _ => TargetType::Variable,
            };
            let rhs = node_text(right, source);
            let node_scope = enclosing_scope_name(n, source);
            let node_scope = if node_scope == "package" { scope.to_string() } else { node_scope };

            let mut assignment = Assignment::clean(
                node_text(left, source),
                rhs,
                range.start_line,
                range.start_column,
                node_scope,
                target_type,
                operator,
            );
            if self.looks_tainted(rhs) {
                assignment = assignment.tainted(safe_truncate_str(rhs, 64));
            }
            assignments.push(assignment);
        });
        assignments
    }

    fn extract_calls(&self, root: Node<'_>, source: &str, scope: &str) -> Vec<CallSite> {
        let mut calls = Vec::new();
        let mut state = NodeTrackingState::new();
        visit_preorder(root, &mut state, &mut |n| {
            if n.kind() != "call_expression" {
                return;
            }
            let Some(function) = n.child_by_field_name("function") else { return };
            let (class_name, method_name) = if function.kind() == "selector_expression" {
                (
                    field_text(function, "operand", source).map(str::to_string),
                    field_text(function, "field", source).map(str::to_string),
                )
            } else {
                (None, None)
            };

            let range = Range::from_node(&n);
            let node_scope = enclosing_scope_name(n, source);
            let node_scope = if node_scope == "package" { scope.to_string() } else { node_scope };
            let mut call = CallSite::new(node_text(function, source), range.start_line, range.start_column, node_scope);
            call.class_name = class_name;
            call.method_name = method_name;

            if let Some(args) = n.child_by_field_name("arguments") {
                let mut arg_cursor = args.walk();
                let mut index = 0;
                for arg in args.children(&mut arg_cursor) {
                    if matches!(arg.kind(), "(" | ")" | ",") {
                        continue;
                    }
                    let value = node_text(arg, source).to_string();
                    let is_tainted = self.looks_tainted(&value);
                    call.arguments.push(CallArg {
                        index,
                        taint_source: is_tainted.then(|| safe_truncate_str(&value, 64).to_string()),
                        value,
                        is_tainted,
                        taint_chain: None,
                    });
                    index += 1;
                }
            }
            call.finalize();
            calls.push(call);
        });
        calls
    }

    fn find_input_sources(&self, root: Node<'_>, source: &str, file: &str) -> Vec<FlowNode> {
        let mut sources = Vec::new();
        let mut state = NodeTrackingState::new();
        let candidates = ["os.Args", "os.Getenv", "r.URL.Query", "r.FormValue", "r.Header", "r.Cookie", "r.Body"];
        visit_preorder(root, &mut state, &mut |n| {
            if !matches!(n.kind(), "selector_expression" | "call_expression") {
                return;
            }
            let text = node_text(n, source);
            for primitive in candidates {
                if !text.starts_with(primitive) {
                    continue;
                }
                let Some(source_type) = catalog().global_source_type("go", primitive) else { continue };
                let range = Range::from_node(&n);
                sources.push(FlowNode::source(
                    file,
                    range.start_line,
                    range.start_column,
                    self.language_name(),
                    primitive,
                    &truncate_for_display(text, 80),
                    source_type,
                    None,
                ));
                break;
            }
        });
        sources
    }

    fn detect_frameworks(&self, _symbol_table: &SymbolTable, source: &str) -> Vec<String> {
        let mut frameworks = Vec::new();
        if source.contains("gin-gonic/gin") {
            frameworks.push("Gin".to_string());
        }
        if source.contains("net/http") {
            frameworks.push("net/http".to_string());
        }
        frameworks
    }

    fn analyze_method_body(
        &self,
        method: &FunctionDef,
        _source: &str,
        _state: &AnalysisState<'_>,
    ) -> MethodFlowSummary {
        let mut summary = MethodFlowSummary::default();
        for line in method.body_source.lines() {
            let (target, rhs, operator) = if let Some(idx) = line.find(":=") {
                (line[..idx].trim(), line[idx + 2..].trim(), ":=")
            } else if let Some(idx) = line.find(" = ") {
                (line[..idx].trim(), line[idx + 3..].trim(), "=")
            } else {
                continue;
            };
            if target.is_empty() || rhs.is_empty() {
                continue;
            }
            let is_tainted = self.looks_tainted(rhs);
            if is_tainted {
                summary.tainted_vars.insert(target.to_string());
            }
            summary.assignments.push(Assignment::clean(
                target,
                rhs,
                method.line,
                0,
                method.name.clone(),
                TargetType::Variable,
                operator,
            ));
        }
        summary
    }

    fn trace_expression(&self, expression: &str, state: &AnalysisState<'_>) -> FlowMap {
        let mut map = FlowMap::new();
        if let Some(source_type) = catalog().global_source_type("go", expression) {
            map.add_node(FlowNode::source(
                state.current_file,
                0,
                0,
                self.language_name(),
                expression,
                expression,
                source_type,
                None,
            ));
        }
        map
    }

    fn resolve_imports(&self, symbol_table: &SymbolTable, base_path: &str) -> Vec<String> {
        symbol_table
            .imports
            .iter()
            .filter_map(|import| {
                let path = import.path.split('"').nth(1)?;
                Some(format!("{base_path}/{path}"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::pool::ParserPool;

    fn parse(source: &str) -> tree_sitter::Tree {
        let pool = ParserPool::new();
        let mut parser = pool.checkout("go").unwrap();
        parser.parse(source, None).unwrap()
    }

    #[test]
    fn extract_functions_folds_receiver_into_name() {
        let source = "package main\nfunc (s *Server) Render(name string) { }\n";
        let tree = parse(source);
        let analyzer = GoAnalyzer;
        let functions = analyzer.extract_functions(tree.root_node(), source);
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "Server.Render");
    }

    #[test]
    fn extract_assignments_finds_short_var_declaration() {
        let source = "package main\nfunc handler() {\n\tname := r.URL.Query().Get(\"n\")\n\trender(name)\n}\n";
        let tree = parse(source);
        let analyzer = GoAnalyzer;
        let assignments = analyzer.extract_assignments(tree.root_node(), source, "handler");
        assert!(!assignments.is_empty());
        assert!(assignments[0].is_tainted);
    }
}
