//! JavaScript/TypeScript analyzer: a single implementation parameterized by
//! `Dialect` serves `.js`/`.jsx` (via the JavaScript grammar) and
//! `.ts`/`.tsx` (via the two TypeScript grammars) — all four share the same
//! node-kind vocabulary for the constructs this spec cares about.

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

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    JavaScript,
    TypeScript,
    Tsx,
}

pub struct JavaScriptAnalyzer {
    dialect: Dialect,
}

impl JavaScriptAnalyzer {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }
}

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

fn enclosing_scope_name(node: Node<'_>, source: &str) -> String {
    let mut current = Some(node);
    while let Some(n) = current {
        if matches!(n.kind(), "function_declaration" | "method_definition" | "arrow_function" | "function_expression") {
            if let Some(name) = field_text(n, "name", source) {
                return name.to_string();
            }
            return "<anonymous>".to_string();
        }
        current = n.parent();
    }
    "module".to_string()
}

fn enclosing_class(node: Node<'_>, source: &str) -> Option<String> {
    let mut current = Some(node);
    while let Some(n) = current {
        if n.kind() == "class_declaration" {
            return field_text(n, "name", source).map(str::to_string);
        }
        current = n.parent();
    }
    None
}

impl JavaScriptAnalyzer {
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
                match child.kind() {
                    "identifier" | "required_parameter" | "optional_parameter" => {
                        let name_node = child.child_by_field_name("pattern").unwrap_or(child);
                        parameters.push(ParameterDef {
                            index,
                            name: node_text(name_node, source).to_string(),
                            type_hint: field_text(child, "type", source).map(str::to_string),
                            default_value: field_text(child, "value", source).map(str::to_string),
                            is_variadic: false,
                            is_reference: false,
                        });
                        index += 1;
                    }
                    "rest_pattern" => {
                        parameters.push(ParameterDef {
                            index,
                            name: node_text(child, source).trim_start_matches("...").to_string(),
                            type_hint: None,
                            default_value: None,
                            is_variadic: true,
                            is_reference: false,
                        });
                        index += 1;
                    }
                    _ => {}
                }
            }
        }

        FunctionDef {
            name,
            line: range.start_line,
            end_line: range.end_line,
            visibility: Visibility::Public,
            parameters,
            return_type: field_text(node, "return_type", source).map(str::to_string),
            body_start: body_range.start_byte,
            body_end: body_range.end_byte,
            body_source: body.map(|b| node_text(b, source).to_string()).unwrap_or_default(),
            is_static: node_text(node, source).trim_start().starts_with("static"),
            is_async: node_text(node, source).trim_start().starts_with("async"),
            is_exported: true,
            is_variadic: false,
        }
    }
}

impl LanguageAnalyzer for JavaScriptAnalyzer {
    fn language_name(&self) -> &'static str {
        match self.dialect {
            Dialect::JavaScript => "javascript",
            Dialect::TypeScript => "typescript",
            Dialect::Tsx => "tsx",
        }
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        match self.dialect {
            Dialect::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Dialect::TypeScript => &["ts"],
            Dialect::Tsx => &["tsx"],
        }
    }

    fn build_symbol_table(&self, file_path: &str, source: &str, root: Node<'_>) -> TraceResult<SymbolTable> {
        let mut table = SymbolTable::new(file_path, self.language_name());
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            if child.kind() == "import_statement" {
                table.imports.push(crate::symbol::Import {
                    path: node_text(child, source).to_string(),
                    file_id: crate::types::FileId::new(1).unwrap(),
                    alias: None,
                    is_glob: node_text(child, source).contains("* as"),
                });
            }
        }
        for class in self.extract_classes(root, source) {
            table.classes.insert(class.name.clone(), class);
        }
        for func in self.extract_functions(root, source) {
            if !func.name.contains('.') {
                table.functions.insert(func.name.clone(), func);
            }
        }
        table.framework = self.detect_frameworks(&table, source).into_iter().next();
        Ok(table)
    }

    fn extract_classes(&self, root: Node<'_>, source: &str) -> Vec<ClassDef> {
        let mut classes = Vec::new();
        let mut state = NodeTrackingState::new();
        visit_preorder(root, &mut state, &mut |n| {
            if n.kind() != "class_declaration" {
                return;
            }
            let name = field_text(n, "name", source).unwrap_or("").to_string();
            let mut class = ClassDef::new(name.clone());
            if let Some(heritage) = n.child_by_field_name("superclass") {
                class.extends = Some(node_text(heritage, source).to_string());
            }

            if let Some(body) = n.child_by_field_name("body") {
                let mut body_cursor = body.walk();
                for member in body.children(&mut body_cursor) {
                    if member.kind() != "method_definition" {
                        continue;
                    }
                    let method_name = field_text(member, "name", source).unwrap_or("").to_string();
                    let mut method = self.function_def_from(member, source);
                    method.name = format!("{name}.{method_name}");
                    if method_name == "constructor" {
                        class.constructor = Some(method);
                    } else {
                        class.methods.insert(method_name, method);
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
            "function_declaration" => functions.push(self.function_def_from(n, source)),
            "method_definition" => {
                if let Some(class_name) = enclosing_class(n, source) {
                    let method_name = field_text(n, "name", source).unwrap_or("").to_string();
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
            let (left, right) = match n.kind() {
                "assignment_expression" => (n.child_by_field_name("left"), n.child_by_field_name("right")),
                "variable_declarator" => (n.child_by_field_name("name"), n.child_by_field_name("value")),
                _ => return,
            };
            let (Some(left), Some(right)) = (left, right) else { return };
            let range = Range::from_node(&n);
            let target_type = match left.kind() {
                "member_expression" => TargetType::Property,
                "subscript_expression" => TargetType::ArrayElement,
                _ => TargetType::Variable,
            };
            let rhs = node_text(right, source);
            let node_scope = enclosing_scope_name(n, source);
            let node_scope = if node_scope == "module" { scope.to_string() } else { node_scope };

            let mut assignment = Assignment::clean(
                node_text(left, source),
                rhs,
                range.start_line,
                range.start_column,
                node_scope,
                target_type,
                "=",
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
            let (function_text, class_name, method_name, is_constructor, args) = match n.kind() {
                "call_expression" => {
                    let Some(function) = n.child_by_field_name("function") else { return };
                    let (class_name, method_name) = if function.kind() == "member_expression" {
                        (
                            field_text(function, "object", source).map(str::to_string),
                            field_text(function, "property", source).map(str::to_string),
                        )
                    } else {
                        (None, None)
                    };
                    (node_text(function, source).to_string(), class_name, method_name, false, n.child_by_field_name("arguments"))
                }
                "new_expression" => {
                    let constructor = field_text(n, "constructor", source).unwrap_or("").to_string();
                    (constructor.clone(), Some(constructor), None, true, n.child_by_field_name("arguments"))
                }
                _ => return,
            };

            let range = Range::from_node(&n);
            let node_scope = enclosing_scope_name(n, source);
            let node_scope = if node_scope == "module" { scope.to_string() } else { node_scope };
            let mut call = CallSite::new(function_text, range.start_line, range.start_column, node_scope);
            call.class_name = class_name;
            call.method_name = method_name;
            call.is_constructor = is_constructor;

            if let Some(args) = args {
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
        let candidates: &[(&str, fn(&str) -> Option<crate::symbol::SourceType>)] = &[
            ("document.cookie", |s| catalog().dom_source_type(s)),
            ("location.search", |s| catalog().dom_source_type(s)),
            ("process.env", |s| catalog().node_source_type(s)),
            ("process.argv", |s| catalog().node_source_type(s)),
            ("req.query", |s| catalog().node_source_type(s)),
            ("req.body", |s| catalog().node_source_type(s)),
            ("req.cookies", |s| catalog().node_source_type(s)),
            ("req.headers", |s| catalog().node_source_type(s)),
            ("req.params", |s| catalog().node_source_type(s)),
        ];
        visit_preorder(root, &mut state, &mut |n| {
            if !matches!(n.kind(), "member_expression" | "subscript_expression") {
                return;
            }
            let text = node_text(n, source);
            for (primitive, lookup) in candidates {
                if !text.starts_with(primitive) {
                    continue;
                }
                let Some(source_type) = lookup(primitive) else { continue };
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
        if source.contains("require('express')") || source.contains("from 'express'") {
            frameworks.push("Express".to_string());
        }
        if source.contains("from 'react'") || source.contains("require('react')") {
            frameworks.push("React".to_string());
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
            let Some(eq) = line.find('=') else { continue };
            if line[..eq].ends_with(['=', '!', '<', '>']) || line[eq + 1..].starts_with('=') {
                continue;
            }
            let mut target = line[..eq].trim();
            for prefix in ["const ", "let ", "var "] {
                target = target.strip_prefix(prefix).unwrap_or(target);
            }
            let target = target.trim().to_string();
            let rhs = line[eq + 1..].trim().trim_end_matches(';').to_string();
            if target.is_empty() || rhs.is_empty() {
                continue;
            }
            let is_tainted = self.looks_tainted(&rhs);
            if is_tainted {
                summary.tainted_vars.insert(target.clone());
            }
            if target.starts_with("this.") {
                summary.modifies_properties.push(target.trim_start_matches("this.").to_string());
            }
            summary.assignments.push(Assignment::clean(
                target,
                rhs,
                method.line,
                0,
                method.name.clone(),
                TargetType::Variable,
                "=",
            ));
        }
        summary
    }

    fn trace_expression(&self, expression: &str, state: &AnalysisState<'_>) -> FlowMap {
        let mut map = FlowMap::new();
        let source_type = catalog()
            .node_source_type(expression)
            .or_else(|| catalog().dom_source_type(expression));
        if let Some(source_type) = source_type {
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
                let path = import.path.split(['\'', '"']).nth(1)?;
                if !path.starts_with('.') {
                    return None;
                }
                Some(format!("{base_path}/{path}.js"))
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
        let mut parser = pool.checkout("javascript").unwrap();
        parser.parse(source, None).unwrap()
    }

    #[test]
    fn extract_calls_finds_function_call() {
        let source = "render(name);";
        let tree = parse(source);
        let analyzer = JavaScriptAnalyzer::new(Dialect::JavaScript);
        let calls = analyzer.extract_calls(tree.root_node(), source, "module");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function_name, "render");
    }

    #[test]
    fn find_input_sources_detects_req_query() {
        let source = "const id = req.query.id;";
        let tree = parse(source);
        let analyzer = JavaScriptAnalyzer::new(Dialect::JavaScript);
        let sources = analyzer.find_input_sources(tree.root_node(), source, "app.js");
        assert_eq!(sources.len(), 1);
    }
}
