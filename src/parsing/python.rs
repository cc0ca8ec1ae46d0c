//! Python analyzer: bespoke structural extraction (spec §4.3). Grounded on
//! the same recursive-descent-over-named-fields shape as `php.rs`; Python's
//! grammar differs mainly in using `assignment`/`call` node kinds and
//! indentation-based blocks instead of braces.

use tree_sitter::Node;

use crate::error::TraceResult;
use crate::flow::{FlowMap, FlowNode};
use crate::parsing::analyzer::{
    safe_truncate_str, truncate_for_display, AnalysisState, LanguageAnalyzer, MethodFlowSummary,
    NodeTrackingState,
};
use crate::parsing::catalog::catalog;
use crate::symbol::{
    Assignment, CallArg, CallSite, ClassDef, FunctionDef, ParameterDef, PropertyDef, SymbolTable,
    TargetType, Visibility,
};
use crate::types::Range;

pub struct PythonAnalyzer;

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
        if n.kind() == "function_definition" {
            if let Some(name) = field_text(n, "name", source) {
                return name.to_string();
            }
        }
        current = n.parent();
    }
    "module".to_string()
}

fn enclosing_class(node: Node<'_>, source: &str) -> Option<String> {
    let mut current = Some(node);
    while let Some(n) = current {
        if n.kind() == "class_definition" {
            return field_text(n, "name", source).map(str::to_string);
        }
        current = n.parent();
    }
    None
}

impl PythonAnalyzer {
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
                    "identifier" | "typed_parameter" | "default_parameter" | "typed_default_parameter" => {
                        let name_node = child
                            .child_by_field_name("name")
                            .unwrap_or(child);
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
                    "list_splat_pattern" | "dictionary_splat_pattern" => {
                        parameters.push(ParameterDef {
                            index,
                            name: node_text(child, source).to_string(),
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
            is_static: false,
            is_async: node_text(node, source).trim_start().starts_with("async"),
            is_exported: true,
            is_variadic: false,
        }
    }
}

impl LanguageAnalyzer for PythonAnalyzer {
    fn language_name(&self) -> &'static str {
        "python"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn build_symbol_table(&self, file_path: &str, source: &str, root: Node<'_>) -> TraceResult<SymbolTable> {
        let mut table = SymbolTable::new(file_path, self.language_name());

        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            if child.kind() == "import_statement" || child.kind() == "import_from_statement" {
                table.imports.push(crate::symbol::Import {
                    path: node_text(child, source).to_string(),
                    file_id: crate::types::FileId::new(1).unwrap(),
                    alias: None,
                    is_glob: false,
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
            if n.kind() != "class_definition" {
                return;
            }
            let name = field_text(n, "name", source).unwrap_or("").to_string();
            let mut class = ClassDef::new(name.clone());

            if let Some(superclasses) = n.child_by_field_name("superclasses") {
                let text = node_text(superclasses, source);
                class.implements = text
                    .trim_start_matches('(')
                    .trim_end_matches(')')
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }

            if let Some(body) = n.child_by_field_name("body") {
                let mut body_cursor = body.walk();
                for member in body.children(&mut body_cursor) {
                    if member.kind() != "function_definition" {
                        continue;
                    }
                    let method_name = field_text(member, "name", source).unwrap_or("").to_string();
                    let mut method = self.function_def_from(member, source);
                    method.name = format!("{name}.{method_name}");
                    if method_name == "__init__" {
                        class.constructor = Some(method);
                    } else {
                        class.methods.insert(method_name, method);
                    }
                }
            }
            // Python has no field declaration syntax; `self.x = ...` inside
            // `__init__` is how properties are discovered, left to the
            // carrier-discovery pass rather than duplicated here.
            let _ = PropertyDef {
                name: String::new(),
                visibility: Visibility::Public,
                type_hint: None,
                is_static: false,
            };
            classes.push(class);
        });
        classes
    }

    fn extract_functions(&self, root: Node<'_>, source: &str) -> Vec<FunctionDef> {
        let mut functions = Vec::new();
        let mut state = NodeTrackingState::new();
        visit_preorder(root, &mut state, &mut |n| {
            if n.kind() != "function_definition" {
                return;
            }
            if let Some(class_name) = enclosing_class(n, source) {
                let method_name = field_text(n, "name", source).unwrap_or("").to_string();
                let mut def = self.function_def_from(n, source);
                def.name = format!("{class_name}.{method_name}");
                functions.push(def);
            } else {
                functions.push(self.function_def_from(n, source));
            }
        });
        functions
    }

    fn extract_assignments(&self, root: Node<'_>, source: &str, scope: &str) -> Vec<Assignment> {
        let mut assignments = Vec::new();
        let mut state = NodeTrackingState::new();
        visit_preorder(root, &mut state, &mut |n| {
            if n.kind() != "assignment" {
                return;
            }
            let Some(left) = n.child_by_field_name("left") else { return };
            let Some(right) = n.child_by_field_name("right") else { return };
            let range = Range::from_node(&n);
            let target_type = match left.kind() {
                "attribute" => TargetType::Property,
                "subscript" => TargetType::ArrayElement,
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
            if n.kind() != "call" {
                return;
            }
            let Some(function) = n.child_by_field_name("function") else { return };
            let function_text = node_text(function, source);
            let (class_name, method_name) = if function.kind() == "attribute" {
                let object = field_text(function, "object", source).map(str::to_string);
                let attr = field_text(function, "attribute", source).map(str::to_string);
                (object, attr)
            } else {
                (None, None)
            };

            let range = Range::from_node(&n);
            let node_scope = enclosing_scope_name(n, source);
            let node_scope = if node_scope == "module" { scope.to_string() } else { node_scope };
            let mut call = CallSite::new(function_text, range.start_line, range.start_column, node_scope);
            call.class_name = class_name;
            call.method_name = method_name;
            call.is_constructor = function_text.chars().next().is_some_and(|c| c.is_uppercase());

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
                        taint_source: is_tainted
                            .then(|| safe_truncate_str(&value, 64).to_string()),
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
        visit_preorder(root, &mut state, &mut |n| {
            if n.kind() != "attribute" && n.kind() != "subscript" {
                return;
            }
            let text = node_text(n, source);
            for (primitive, source_type) in [
                ("os.environ", catalog().global_source_type("python", "os.environ")),
                ("sys.argv", catalog().global_source_type("python", "sys.argv")),
                ("request.args", catalog().global_source_type("python", "request.args")),
                ("request.form", catalog().global_source_type("python", "request.form")),
                ("request.cookies", catalog().global_source_type("python", "request.cookies")),
                ("request.json", catalog().global_source_type("python", "request.json")),
            ] {
                let Some(source_type) = source_type else { continue };
                if !text.starts_with(primitive) {
                    continue;
                }
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
        if source.contains("from flask") || source.contains("import flask") {
            frameworks.push("Flask".to_string());
        }
        if source.contains("from django") || source.contains("import django") {
            frameworks.push("Django".to_string());
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
            if line[eq + 1..].starts_with('=') {
                continue;
            }
            let target = line[..eq].trim().to_string();
            let rhs = line[eq + 1..].trim().trim_end_matches(':').to_string();
            if target.is_empty() || rhs.is_empty() {
                continue;
            }
            let is_tainted = self.looks_tainted(&rhs);
            if is_tainted {
                summary.tainted_vars.insert(target.clone());
            }
            if target.starts_with("self.") {
                summary.modifies_properties.push(target.trim_start_matches("self.").to_string());
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
        if let Some(source_type) = catalog().global_source_type("python", expression) {
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
                let module = import
                    .path
                    .trim_start_matches("import ")
                    .trim_start_matches("from ")
                    .split_whitespace()
                    .next()?
                    .replace('.', "/");
                Some(format!("{base_path}/{module}.py"))
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
        let mut parser = pool.checkout("python").unwrap();
        parser.parse(source, None).unwrap()
    }

    #[test]
    fn extract_assignments_finds_simple_assignment() {
        let source = "x = request.args.get('id')\n";
        let tree = parse(source);
        let analyzer = PythonAnalyzer;
        let assignments = analyzer.extract_assignments(tree.root_node(), source, "module");
        assert_eq!(assignments.len(), 1);
        assert!(assignments[0].is_tainted);
    }

    #[test]
    fn extract_functions_flattens_methods_under_class_name() {
        let source = "class Handler:\n    def get(self):\n        pass\n";
        let tree = parse(source);
        let analyzer = PythonAnalyzer;
        let functions = analyzer.extract_functions(tree.root_node(), source);
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "Handler.get");
    }
}
