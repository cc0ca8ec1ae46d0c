//! The generic analyzer (C4): a single tree-walk implementation shared by
//! C, C++, C#, Java, Ruby, and Rust, parameterized by a per-language
//! `GrammarProfile` of node-kind names. This is the "mostly repetitive
//! data, not bespoke logic" half of C4 (spec §4.3/§9): adding a language
//! here means adding a `GrammarProfile` entry, not a new extractor.

use tree_sitter::Node;

use crate::error::TraceResult;
use crate::flow::{FlowMap, FlowNode};
use crate::parsing::analyzer::{
    safe_truncate_str, AnalysisState, LanguageAnalyzer, MethodFlowSummary, NodeTrackingState,
};
use crate::parsing::catalog::catalog;
use crate::symbol::{
    Assignment, CallArg, CallSite, ClassDef, FunctionDef, ParameterDef, SymbolTable, TargetType,
    Visibility,
};
use crate::types::Range;

/// The node-kind vocabulary a single grammar uses for the constructs this
/// analyzer cares about. All field names below ("name", "left"/"right",
/// "function"/"arguments", "body", "parameters") are the common convention
/// tree-sitter grammars use for these constructs; a language whose grammar
/// diverges enough to need different field names gets a bespoke analyzer
/// instead (php/python/javascript/go).
pub struct GrammarProfile {
    pub language_name: &'static str,
    pub extensions: &'static [&'static str],
    pub class_kinds: &'static [&'static str],
    /// Node kinds whose `body` holds methods belonging to a type declared
    /// elsewhere, keyed by a `type` field rather than a `name` field —
    /// Rust's `impl_item` is the only grammar in this family shaped this
    /// way (tree-sitter-rust puts methods in a separate `impl_item`, never
    /// inside `struct_item`'s body, which holds only fields).
    pub impl_kinds: &'static [&'static str],
    pub function_kinds: &'static [&'static str],
    pub assignment_kinds: &'static [&'static str],
    pub call_kinds: &'static [&'static str],
    pub property_access_kind: &'static str,
    pub index_access_kind: &'static str,
}

pub static RUST_PROFILE: GrammarProfile = GrammarProfile {
    language_name: "rust",
    extensions: &["rs"],
    class_kinds: &["struct_item"],
    impl_kinds: &["impl_item"],
    function_kinds: &["function_item"],
    assignment_kinds: &["assignment_expression", "let_declaration"],
    call_kinds: &["call_expression"],
    property_access_kind: "field_expression",
    index_access_kind: "index_expression",
};

pub static JAVA_PROFILE: GrammarProfile = GrammarProfile {
    language_name: "java",
    extensions: &["java"],
    class_kinds: &["class_declaration"],
    impl_kinds: &[],
    function_kinds: &["method_declaration"],
    assignment_kinds: &["assignment_expression", "local_variable_declaration"],
    call_kinds: &["method_invocation", "object_creation_expression"],
    property_access_kind: "field_access",
    index_access_kind: "array_access",
};

pub static C_SHARP_PROFILE: GrammarProfile = GrammarProfile {
    language_name: "c_sharp",
    extensions: &["cs"],
    class_kinds: &["class_declaration"],
    impl_kinds: &[],
    function_kinds: &["method_declaration"],
    assignment_kinds: &["assignment_expression", "variable_declarator"],
    call_kinds: &["invocation_expression", "object_creation_expression"],
    property_access_kind: "member_access_expression",
    index_access_kind: "element_access_expression",
};

pub static C_PROFILE: GrammarProfile = GrammarProfile {
    language_name: "c",
    extensions: &["c", "h"],
    class_kinds: &["struct_specifier"],
    impl_kinds: &[],
    function_kinds: &["function_definition"],
    assignment_kinds: &["assignment_expression"],
    call_kinds: &["call_expression"],
    property_access_kind: "field_expression",
    index_access_kind: "subscript_expression",
};

pub static CPP_PROFILE: GrammarProfile = GrammarProfile {
    language_name: "cpp",
    extensions: &["cc", "cpp", "cxx", "hpp", "hh"],
    class_kinds: &["class_specifier", "struct_specifier"],
    impl_kinds: &[],
    function_kinds: &["function_definition"],
    assignment_kinds: &["assignment_expression"],
    call_kinds: &["call_expression"],
    property_access_kind: "field_expression",
    index_access_kind: "subscript_expression",
};

pub static RUBY_PROFILE: GrammarProfile = GrammarProfile {
    language_name: "ruby",
    extensions: &["rb"],
    class_kinds: &["class"],
    impl_kinds: &[],
    function_kinds: &["method"],
    assignment_kinds: &["assignment"],
    call_kinds: &["call", "method_call"],
    property_access_kind: "call",
    index_access_kind: "element_reference",
};

pub struct GenericAnalyzer {
    profile: &'static GrammarProfile,
}

impl GenericAnalyzer {
    pub fn new(profile: &'static GrammarProfile) -> Self {
        Self { profile }
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

impl GenericAnalyzer {
    fn enclosing_scope_name(&self, node: Node<'_>, source: &str) -> String {
        let mut current = Some(node);
        while let Some(n) = current {
            if self.profile.function_kinds.contains(&n.kind()) {
                if let Some(name) = field_text(n, "name", source) {
                    return name.to_string();
                }
            }
            current = n.parent();
        }
        "<module>".to_string()
    }

    fn enclosing_class(&self, node: Node<'_>, source: &str) -> Option<String> {
        let mut current = Some(node);
        while let Some(n) = current {
            if self.profile.class_kinds.contains(&n.kind()) {
                return field_text(n, "name", source).map(str::to_string);
            }
            if self.profile.impl_kinds.contains(&n.kind()) {
                return self.impl_type_name(n, source);
            }
            current = n.parent();
        }
        None
    }

    /// The receiver type an `impl_item` (or equivalent) names via its `type`
    /// field, stripped of generic arguments (`impl<T> Wrapper<T>` -> `Wrapper`).
    fn impl_type_name(&self, impl_node: Node<'_>, source: &str) -> Option<String> {
        let type_node = impl_node.child_by_field_name("type")?;
        let text = node_text(type_node, source);
        Some(text.split('<').next().unwrap_or(text).trim().to_string())
    }

    fn function_def_from(&self, node: Node<'_>, source: &str) -> FunctionDef {
        let name = field_text(node, "name", source).unwrap_or("<anonymous>").to_string();
        let range = Range::from_node(&node);
        let body = node.child_by_field_name("body");
        let body_range = body.map(|b| Range::from_node(&b)).unwrap_or(range);

        let mut parameters = Vec::new();
        if let Some(params) = node.child_by_field_name("parameters") {
            let mut cursor = params.walk();
            let mut index = 0;
            for child in params.children(&mut cursor) {
                let Some(name_node) = child.child_by_field_name("name").or(Some(child)) else { continue };
                if !name_node.is_named() {
                    continue;
                }
                parameters.push(ParameterDef {
                    index,
                    name: node_text(name_node, source).to_string(),
                    type_hint: field_text(child, "type", source).map(str::to_string),
                    default_value: None,
                    is_variadic: false,
                    is_reference: false,
                });
                index += 1;
            }
        }

        FunctionDef {
            name,
            line: range.start_line,
            end_line: range.end_line,
            visibility: Visibility::Public,
            parameters,
            return_type: field_text(node, "type", source).map(str::to_string),
            body_start: body_range.start_byte,
            body_end: body_range.end_byte,
            body_source: body.map(|b| node_text(b, source).to_string()).unwrap_or_default(),
            is_static: false,
            is_async: false,
            is_exported: true,
            is_variadic: false,
        }
    }
}

impl LanguageAnalyzer for GenericAnalyzer {
    fn language_name(&self) -> &'static str {
        self.profile.language_name
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        self.profile.extensions
    }

    fn build_symbol_table(&self, file_path: &str, source: &str, root: Node<'_>) -> TraceResult<SymbolTable> {
        let mut table = SymbolTable::new(file_path, self.language_name());
        for class in self.extract_classes(root, source) {
            table.classes.insert(class.name.clone(), class);
        }
        for func in self.extract_functions(root, source) {
            if !func.name.contains('.') {
                table.functions.insert(func.name.clone(), func);
            }
        }
        Ok(table)
    }

    fn extract_classes(&self, root: Node<'_>, source: &str) -> Vec<ClassDef> {
        let mut classes: Vec<ClassDef> = Vec::new();
        let mut state = NodeTrackingState::new();
        visit_preorder(root, &mut state, &mut |n| {
            if !self.profile.class_kinds.contains(&n.kind()) {
                return;
            }
            let name = field_text(n, "name", source).unwrap_or("<anonymous>").to_string();
            let mut class = ClassDef::new(name.clone());

            if let Some(body) = n.child_by_field_name("body") {
                let mut body_cursor = body.walk();
                for member in body.children(&mut body_cursor) {
                    if !self.profile.function_kinds.contains(&member.kind()) {
                        continue;
                    }
                    let method_name = field_text(member, "name", source).unwrap_or("").to_string();
                    let mut method = self.function_def_from(member, source);
                    method.name = format!("{name}.{method_name}");
                    class.methods.insert(method_name, method);
                }
            }
            classes.push(class);
        });

        // Second pass: grammars like Rust declare methods in a separate
        // `impl_item` block, keyed by a `type` field rather than nested
        // inside the type declaration's own body.
        if !self.profile.impl_kinds.is_empty() {
            let mut impl_state = NodeTrackingState::new();
            visit_preorder(root, &mut impl_state, &mut |n| {
                if !self.profile.impl_kinds.contains(&n.kind()) {
                    return;
                }
                let Some(type_name) = self.impl_type_name(n, source) else { return };
                let Some(body) = n.child_by_field_name("body") else { return };

                let class_index = match classes.iter().position(|c| c.name == type_name) {
                    Some(index) => index,
                    None => {
                        classes.push(ClassDef::new(type_name.clone()));
                        classes.len() - 1
                    }
                };

                let mut body_cursor = body.walk();
                for member in body.children(&mut body_cursor) {
                    if !self.profile.function_kinds.contains(&member.kind()) {
                        continue;
                    }
                    let method_name = field_text(member, "name", source).unwrap_or("").to_string();
                    let mut method = self.function_def_from(member, source);
                    method.name = format!("{type_name}.{method_name}");
                    classes[class_index].methods.insert(method_name, method);
                }
            });
        }

        classes
    }

    fn extract_functions(&self, root: Node<'_>, source: &str) -> Vec<FunctionDef> {
        let mut functions = Vec::new();
        let mut state = NodeTrackingState::new();
        visit_preorder(root, &mut state, &mut |n| {
            if !self.profile.function_kinds.contains(&n.kind()) {
                return;
            }
            if let Some(class_name) = self.enclosing_class(n, source) {
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
            if !self.profile.assignment_kinds.contains(&n.kind()) {
                return;
            }
            let left = n.child_by_field_name("left").or_else(|| n.child_by_field_name("name"));
            let right = n.child_by_field_name("right").or_else(|| n.child_by_field_name("value"));
            let (Some(left), Some(right)) = (left, right) else { return };

            let range = Range::from_node(&n);
            let target_type = if left.kind() == self.profile.property_access_kind {
                TargetType::Property
            } else if left.kind() == self.profile.index_access_kind {
                TargetType::ArrayElement
            } else {
                TargetType::Variable
            };
            let rhs = node_text(right, source);
            let node_scope = self.enclosing_scope_name(n, source);
            let node_scope = if node_scope == "<module>" { scope.to_string() } else { node_scope };

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
            if !self.profile.call_kinds.contains(&n.kind()) {
                return;
            }
            let function = n
                .child_by_field_name("function")
                .or_else(|| n.child_by_field_name("method"))
                .or_else(|| n.child_by_field_name("type"));
            let Some(function) = function else { return };

            let (class_name, method_name) = if function.kind() == self.profile.property_access_kind {
                (
                    field_text(function, "object", source)
                        .or_else(|| field_text(function, "argument", source))
                        .map(str::to_string),
                    field_text(function, "field", source)
                        .or_else(|| field_text(function, "name", source))
                        .map(str::to_string),
                )
            } else {
                (None, None)
            };

            let range = Range::from_node(&n);
            let node_scope = self.enclosing_scope_name(n, source);
            let node_scope = if node_scope == "<module>" { scope.to_string() } else { node_scope };
            let mut call = CallSite::new(node_text(function, source), range.start_line, range.start_column, node_scope);
            call.class_name = class_name;
            call.method_name = method_name;
            call.is_constructor = self.profile.language_name == "java" && n.kind() == "object_creation_expression"
                || self.profile.language_name == "c_sharp" && n.kind() == "object_creation_expression";

            let args = n
                .child_by_field_name("arguments")
                .or_else(|| n.child_by_field_name("argument_list"));
            if let Some(args) = args {
                let mut arg_cursor = args.walk();
                let mut index = 0;
                for arg in args.children(&mut arg_cursor) {
                    if !arg.is_named() {
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
        // No bespoke global-source table for these languages; Java's
        // annotation-based parameters are the one structural source this
        // family needs, handled here rather than in the shared catalog
        // since it requires walking formal-parameter ancestry (spec §4.3).
        if self.profile.language_name != "java" {
            return Vec::new();
        }
        let mut sources = Vec::new();
        let mut state = NodeTrackingState::new();
        visit_preorder(root, &mut state, &mut |n| {
            if n.kind() != "marker_annotation" && n.kind() != "annotation" {
                return;
            }
            let Some(name_node) = n.child_by_field_name("name") else { return };
            let annotation_name = node_text(name_node, source);
            let Some(source_type) = catalog().annotation_source_type(annotation_name) else { return };

            // An annotation is a source only when its nearest non-body
            // ancestor is a formal parameter (spec §4.3).
            let Some(parent) = n.parent() else { return };
            if parent.kind() != "formal_parameter" {
                return;
            }
            let param_name = field_text(parent, "name", source).unwrap_or("").to_string();
            let range = Range::from_node(&n);
            sources.push(FlowNode::source(
                file,
                range.start_line,
                range.start_column,
                self.language_name(),
                &param_name,
                node_text(parent, source),
                source_type,
                None,
            ));
        });
        sources
    }

    fn detect_frameworks(&self, _symbol_table: &SymbolTable, source: &str) -> Vec<String> {
        let mut frameworks = Vec::new();
        if self.profile.language_name == "java" && source.contains("org.springframework") {
            frameworks.push("Spring".to_string());
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
        if self.looks_tainted(&method.body_source) {
            summary.returns_input = method.body_source.contains("return");
        }
        summary
    }

    fn trace_expression(&self, _expression: &str, _state: &AnalysisState<'_>) -> FlowMap {
        FlowMap::new()
    }

    fn resolve_imports(&self, _symbol_table: &SymbolTable, _base_path: &str) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::pool::ParserPool;

    #[test]
    fn rust_profile_attaches_impl_methods_to_their_struct() {
        let source = "struct Server { } impl Server { fn render(name: String) { } }";
        let pool = ParserPool::new();
        let mut parser = pool.checkout("rust").unwrap();
        let tree = parser.parse(source, None).unwrap();
        let analyzer = GenericAnalyzer::new(&RUST_PROFILE);

        let classes = analyzer.extract_classes(tree.root_node(), source);
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "Server");
        assert!(classes[0].methods.contains_key("render"), "expected render() to be attached to Server via its impl block");

        let functions = analyzer.extract_functions(tree.root_node(), source);
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "Server.render");
    }

    #[test]
    fn rust_profile_creates_a_class_for_an_impl_with_no_matching_struct() {
        let source = "impl Server { fn render(name: String) { } }";
        let pool = ParserPool::new();
        let mut parser = pool.checkout("rust").unwrap();
        let tree = parser.parse(source, None).unwrap();
        let analyzer = GenericAnalyzer::new(&RUST_PROFILE);

        let classes = analyzer.extract_classes(tree.root_node(), source);
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "Server");
        assert!(classes[0].methods.contains_key("render"));
    }

    #[test]
    fn java_profile_flattens_methods_under_class() {
        let source = "class Handler { void get() { } }";
        let pool = ParserPool::new();
        let mut parser = pool.checkout("java").unwrap();
        let tree = parser.parse(source, None).unwrap();
        let analyzer = GenericAnalyzer::new(&JAVA_PROFILE);
        let functions = analyzer.extract_functions(tree.root_node(), source);
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "Handler.get");
    }
}
