//! PHP analyzer: bespoke structural extraction (spec §4.3), grounded on the
//! teacher's `parsing::php::behavior::PhpBehavior` for the overall shape of
//! a per-language capability implementation (module separator, visibility
//! mapping) even though the underlying grammar and task differ.

use tree_sitter::Node;

use crate::error::TraceResult;
use crate::flow::{FlowMap, FlowNode};
use crate::parsing::analyzer::{
    safe_truncate_str, truncate_for_display, AnalysisState, LanguageAnalyzer, MethodFlowSummary,
    NodeTrackingState,
};
use crate::parsing::catalog::catalog;
use crate::symbol::{
    Assignment, CallArg, CallSite, ClassDef, FunctionDef, Import, ParameterDef, PropertyDef,
    SymbolTable, TargetType, Visibility,
};
use crate::types::Range;

pub struct PhpAnalyzer;

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

fn field_name_text<'a>(node: Node<'_>, field: &str, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| node_text(n, source))
}

fn target_type_for(node: Node<'_>) -> TargetType {
    match node.kind() {
        "member_access_expression" => TargetType::Property,
        "subscript_expression" => TargetType::ArrayElement,
        _ => TargetType::Variable,
    }
}

fn scope_for(node: Node<'_>, source: &str) -> String {
    let mut current = Some(node);
    while let Some(n) = current {
        match n.kind() {
            "method_declaration" | "function_definition" => {
                if let Some(name) = field_name_text(n, "name", source) {
                    return name.to_string();
                }
            }
            _ => {}
        }
        current = n.parent();
    }
    "global".to_string()
}

fn enclosing_class_name(node: Node<'_>, source: &str) -> Option<String> {
    let mut current = Some(node);
    while let Some(n) = current {
        if n.kind() == "class_declaration" {
            return field_name_text(n, "name", source).map(str::to_string);
        }
        current = n.parent();
    }
    None
}

impl PhpAnalyzer {
    fn extract_parameters(&self, params_node: Option<Node<'_>>, source: &str) -> Vec<ParameterDef> {
        let Some(params_node) = params_node else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cursor = params_node.walk();
        let mut index = 0;
        for child in params_node.children(&mut cursor) {
            if child.kind() != "simple_parameter" && child.kind() != "variadic_parameter" {
                continue;
            }
            let name = field_name_text(child, "name", source).unwrap_or("").to_string();
            let type_hint = field_name_text(child, "type", source).map(str::to_string);
            let default_value = field_name_text(child, "default_value", source).map(str::to_string);
            out.push(ParameterDef {
                index,
                name,
                type_hint,
                default_value,
                is_variadic: child.kind() == "variadic_parameter",
                is_reference: node_text(child, source).trim_start().starts_with('&'),
            });
            index += 1;
        }
        out
    }

    fn function_def_from(&self, node: Node<'_>, source: &str) -> FunctionDef {
        let name = field_name_text(node, "name", source).unwrap_or("").to_string();
        let body = node.child_by_field_name("body");
        let range = Range::from_node(&node);
        let body_range = body.map(|b| Range::from_node(&b)).unwrap_or(range);

        FunctionDef {
            name,
            line: range.start_line,
            end_line: range.end_line,
            visibility: visibility_of(node, source),
            parameters: self.extract_parameters(node.child_by_field_name("parameters"), source),
            return_type: field_name_text(node, "return_type", source).map(str::to_string),
            body_start: body_range.start_byte,
            body_end: body_range.end_byte,
            body_source: body.map(|b| node_text(b, source).to_string()).unwrap_or_default(),
            is_static: has_modifier(node, source, "static"),
            is_async: false,
            is_exported: matches!(visibility_of(node, source), Visibility::Public),
            is_variadic: false,
        }
    }
}

fn has_modifier(node: Node<'_>, source: &str, modifier: &str) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "member_modifier" || child.kind() == "visibility_modifier" {
            if node_text(child, source) == modifier {
                return true;
            }
        }
    }
    false
}

fn visibility_of(node: Node<'_>, source: &str) -> Visibility {
    if has_modifier(node, source, "private") {
        Visibility::Private
    } else if has_modifier(node, source, "protected") {
        Visibility::Module
    } else {
        Visibility::Public
    }
}

impl LanguageAnalyzer for PhpAnalyzer {
    fn language_name(&self) -> &'static str {
        "php"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["php", "phtml", "php5", "php7"]
    }

    fn build_symbol_table(&self, file_path: &str, source: &str, root: Node<'_>) -> TraceResult<SymbolTable> {
        let mut table = SymbolTable::new(file_path, self.language_name());
        let mut state = NodeTrackingState::new();

        let mut namespace = None;
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            match child.kind() {
                "namespace_definition" => {
                    namespace = field_name_text(child, "name", source).map(str::to_string);
                }
                "namespace_use_declaration" => {
                    table.imports.push(Import {
                        path: node_text(child, source).to_string(),
                        file_id: crate::types::FileId::new(1).unwrap(),
                        alias: None,
                        is_glob: false,
                    });
                }
                _ => {}
            }
        }
        table.namespace = namespace;

        for class in self.extract_classes(root, source) {
            table.classes.insert(class.name.clone(), class);
        }
        for func in self.extract_functions(root, source) {
            if !func.name.contains('.') {
                table.functions.insert(func.name.clone(), func);
            }
        }

        table.framework = self
            .detect_frameworks(&table, source)
            .into_iter()
            .next();

        visit_preorder(root, &mut state, &mut |n| {
            if n.kind() == "ERROR" {
                tracing::debug!(%file_path, "php parse contains an ERROR node; extraction continues best-effort");
            }
        });

        Ok(table)
    }

    fn extract_classes(&self, root: Node<'_>, source: &str) -> Vec<ClassDef> {
        let mut classes = Vec::new();
        let mut state = NodeTrackingState::new();
        visit_preorder(root, &mut state, &mut |n| {
            if n.kind() != "class_declaration" {
                return;
            }
            let name = field_name_text(n, "name", source).unwrap_or("").to_string();
            let mut class = ClassDef::new(name.clone());

            class.extends = n
                .child_by_field_name("base_clause")
                .map(|b| node_text(b, source).trim_start_matches("extends").trim().to_string());

            if let Some(interfaces) = n.child_by_field_name("class_interface_clause") {
                class.implements = node_text(interfaces, source)
                    .trim_start_matches("implements")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }

            if let Some(body) = n.child_by_field_name("body") {
                let mut body_cursor = body.walk();
                for member in body.children(&mut body_cursor) {
                    match member.kind() {
                        "method_declaration" => {
                            let method_name =
                                field_name_text(member, "name", source).unwrap_or("").to_string();
                            let mut method = self.function_def_from(member, source);
                            method.name = format!("{name}.{method_name}");
                            if method_name == "__construct" {
                                class.constructor = Some(method);
                            } else {
                                class.methods.insert(method_name, method);
                            }
                        }
                        "property_declaration" => {
                            let visibility = visibility_of(member, source);
                            let is_static = has_modifier(member, source, "static");
                            let mut prop_cursor = member.walk();
                            for element in member.children(&mut prop_cursor) {
                                if element.kind() != "property_element" {
                                    continue;
                                }
                                let prop_name = field_name_text(element, "name", source)
                                    .unwrap_or("")
                                    .trim_start_matches('$')
                                    .to_string();
                                class.properties.insert(prop_name.clone(), PropertyDef {
                                    name: prop_name,
                                    visibility,
                                    type_hint: field_name_text(member, "type", source).map(str::to_string),
                                    is_static,
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }
            classes.push(class);
        });
        classes
    }

    fn extract_functions(&self, root: Node<'_>, source: &str) -> Vec<FunctionDef> {
        let mut functions = Vec::new();
        let mut state = NodeTrackingState::new();
        visit_preorder(root, &mut state, &mut |n| match n.kind() {
            "function_definition" => functions.push(self.function_def_from(n, source)),
            "method_declaration" => {
                if let Some(class_name) = enclosing_class_name(n, source) {
                    let method_name = field_name_text(n, "name", source).unwrap_or("").to_string();
                    let mut def = self.function_def_from(n, source);
                    def.name = format!("{class_name}.{method_name}");
                    functions.push(def);
                }
            }
            _ => {}
        });
        functions
    }

    fn extract_assignments(&self, root: Node<'_>, source: &str, scope: &str) -> Vec<Assignment> {
        let mut assignments = Vec::new();
        let mut state = NodeTrackingState::new();
        visit_preorder(root, &mut state, &mut |n| {
            if n.kind() != "assignment_expression" {
                return;
            }
            let Some(left) = n.child_by_field_name("left") else { return };
            let Some(right) = n.child_by_field_name("right") else { return };
            let range = Range::from_node(&n);
            let target = node_text(left, source).to_string();
            let rhs = node_text(right, source);
            let node_scope = scope_for(n, source);
            let node_scope = if node_scope == "global" { scope.to_string() } else { node_scope };

            let mut assignment = Assignment::clean(
                target,
                rhs,
                range.start_line,
                range.start_column,
                node_scope,
                target_type_for(left),
                "=",
            );
            if self.looks_tainted(rhs) {
                if let Some((_, _)) = catalog().identify_source(rhs) {
                    assignment = assignment.tainted(safe_truncate_str(rhs, 64));
                }
            }
            assignments.push(assignment);
        });
        assignments
    }

    fn extract_calls(&self, root: Node<'_>, source: &str, scope: &str) -> Vec<CallSite> {
        let mut calls = Vec::new();
        let mut state = NodeTrackingState::new();
        visit_preorder(root, &mut state, &mut |n| {
            let (function_name, class_name, method_name, is_static, is_constructor, args_node) =
                match n.kind() {
                    "function_call_expression" => {
                        let name = n
                            .child_by_field_name("function")
                            .map(|f| node_text(f, source).to_string())
                            .unwrap_or_default();
                        (name, None, None, false, false, n.child_by_field_name("arguments"))
                    }
                    "member_call_expression" => {
                        let method = field_name_text(n, "name", source).unwrap_or("").to_string();
                        (method.clone(), None, Some(method), false, false, n.child_by_field_name("arguments"))
                    }
                    "scoped_call_expression" => {
                        let class = field_name_text(n, "scope", source).map(str::to_string);
                        let method = field_name_text(n, "name", source).unwrap_or("").to_string();
                        (method.clone(), class, Some(method), true, false, n.child_by_field_name("arguments"))
                    }
                    "object_creation_expression" => {
                        let class = field_name_text(n, "class", source).map(str::to_string);
                        (
                            class.clone().unwrap_or_default(),
                            class,
                            None,
                            false,
                            true,
                            n.child_by_field_name("arguments"),
                        )
                    }
                    "echo_statement" => ("echo".to_string(), None, None, false, false, Some(n)),
                    _ => return,
                };

            let range = Range::from_node(&n);
            let node_scope = scope_for(n, source);
            let node_scope = if node_scope == "global" { scope.to_string() } else { node_scope };
            let mut call = CallSite::new(function_name, range.start_line, range.start_column, node_scope);
            call.class_name = class_name;
            call.method_name = method_name;
            call.is_static = is_static;
            call.is_constructor = is_constructor;

            if let Some(args) = args_node {
                let mut arg_cursor = args.walk();
                let mut index = 0;
                for arg in args.children(&mut arg_cursor) {
                    if matches!(arg.kind(), "(" | ")" | "," | "echo" | ";") {
                        continue;
                    }
                    let value = node_text(arg, source).to_string();
                    let is_tainted = self.looks_tainted(&value);
                    let taint_source = if is_tainted {
                        catalog().identify_source(&value).map(|_| safe_truncate_str(&value, 64).to_string())
                    } else {
                        None
                    };
                    call.arguments.push(CallArg {
                        index,
                        value,
                        is_tainted,
                        taint_source,
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
        visit_preorder(root, &mut state, &mut |n| {
            if n.kind() != "variable_name" {
                return;
            }
            let name = node_text(n, source);
            let Some(source_type) = catalog().php_superglobal_type(name) else { return };
            let range = Range::from_node(&n);

            let source_key = n.parent().filter(|p| p.kind() == "subscript_expression").and_then(|p| {
                p.child_by_field_name("index").map(|idx| {
                    node_text(idx, source).trim_matches(|c| c == '\'' || c == '"').to_string()
                })
            });

            let snippet = n
                .parent()
                .map(|p| truncate_for_display(node_text(p, source), 80))
                .unwrap_or_else(|| name.to_string());

            sources.push(FlowNode::source(
                file,
                range.start_line,
                range.start_column,
                self.language_name(),
                name,
                &snippet,
                source_type,
                source_key,
            ));
        });
        sources
    }

    fn detect_frameworks(&self, _symbol_table: &SymbolTable, source: &str) -> Vec<String> {
        let mut frameworks = Vec::new();
        if source.contains("Illuminate\\") || source.contains("extends Model") {
            frameworks.push("Laravel".to_string());
        }
        if source.contains("Symfony\\") {
            frameworks.push("Symfony".to_string());
        }
        if source.contains("wpdb") || source.contains("add_action(") {
            frameworks.push("WordPress".to_string());
        }
        frameworks
    }

    fn analyze_method_body(
        &self,
        method: &FunctionDef,
        _source: &str,
        state: &AnalysisState<'_>,
    ) -> MethodFlowSummary {
        let body = &method.body_source;
        let mut summary = MethodFlowSummary::default();

        for cap in assignment_line_re().captures_iter(body) {
            let target = cap[1].to_string();
            let rhs = cap[2].trim().to_string();
            let is_tainted = self.looks_tainted(&rhs);
            let mut assignment = Assignment::clean(
                target.clone(),
                rhs.clone(),
                method.line,
                0,
                method.name.clone(),
                TargetType::Variable,
                "=",
            );
            if is_tainted {
                assignment = assignment.tainted(safe_truncate_str(&rhs, 64));
                summary.tainted_vars.insert(target.clone());
            }
            if target.starts_with("this->") {
                summary.modifies_properties.push(target.trim_start_matches("this->").to_string());
                summary.params_to_properties.push((rhs.clone(), target));
            }
            summary.assignments.push(assignment);
        }

        for cap in return_line_re().captures_iter(body) {
            let expr = cap[1].trim().to_string();
            summary.returns_input = summary.returns_input || self.looks_tainted(&expr);
            summary.returns.push(expr);
        }

        let _ = state.current_class;
        summary
    }

    fn trace_expression(&self, expression: &str, state: &AnalysisState<'_>) -> FlowMap {
        let mut map = FlowMap::new();
        if let Some((source_type, _confidence)) = catalog().identify_source(expression) {
            let node = FlowNode::source(
                state.current_file,
                0,
                0,
                self.language_name(),
                expression,
                &truncate_for_display(expression, 80),
                source_type,
                None,
            );
            map.add_node(node);
        }
        map
    }

    fn resolve_imports(&self, symbol_table: &SymbolTable, base_path: &str) -> Vec<String> {
        symbol_table
            .imports
            .iter()
            .map(|import| {
                let relative = import
                    .path
                    .trim_start_matches("use ")
                    .trim_end_matches(';')
                    .replace('\\', "/");
                format!("{base_path}/{relative}.php")
            })
            .collect()
    }
}

// Regexes used only by the textual `analyze_method_body` heuristic; compiled
// once and reused across calls.
fn assignment_line_re() -> &'static regex::Regex {
    static CELL: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    CELL.get_or_init(|| regex::Regex::new(r"\$(\w[\w>-]*)\s*=\s*([^;]+);").unwrap())
}

fn return_line_re() -> &'static regex::Regex {
    static CELL: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    CELL.get_or_init(|| regex::Regex::new(r"return\s+([^;]+);").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::pool::ParserPool;

    fn parse(source: &str) -> tree_sitter::Tree {
        let pool = ParserPool::new();
        let mut parser = pool.checkout("php").unwrap();
        parser.parse(source, None).unwrap()
    }

    #[test]
    fn find_input_sources_detects_get_superglobal() {
        let source = "<?php $x = $_GET['id']; echo $x;";
        let tree = parse(source);
        let analyzer = PhpAnalyzer;
        let sources = analyzer.find_input_sources(tree.root_node(), source, "app.php");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].source_key.as_deref(), Some("id"));
    }

    #[test]
    fn extract_assignments_marks_get_rhs_as_tainted() {
        let source = "<?php $x = $_GET['id'];";
        let tree = parse(source);
        let analyzer = PhpAnalyzer;
        let assignments = analyzer.extract_assignments(tree.root_node(), source, "global");
        assert_eq!(assignments.len(), 1);
        assert!(assignments[0].is_tainted);
    }

    #[test]
    fn extract_classes_collects_constructor_and_methods() {
        let source = "<?php class MyBB { public $input; function __construct() { } function getVal() { } }";
        let tree = parse(source);
        let analyzer = PhpAnalyzer;
        let classes = analyzer.extract_classes(tree.root_node(), source);
        assert_eq!(classes.len(), 1);
        assert!(classes[0].constructor.is_some());
        assert!(classes[0].methods.contains_key("getVal"));
        assert!(classes[0].properties.contains_key("input"));
    }
}
