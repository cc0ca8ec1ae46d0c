//! Superglobal finder (C7.1, spec §4.5.1): walks a PHP file's syntax tree
//! recording every access to one of PHP's 8 superglobals, with enough
//! surrounding context for the taint propagator to classify the flow
//! without re-walking the tree.

use tree_sitter::Node;

use crate::parsing::analyzer::NodeTrackingState;
use crate::parsing::catalog::catalog;

/// The closed set of contexts a superglobal access can appear in (spec
/// §4.5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageContext {
    Assignment,
    FunctionArg,
    MethodArg,
    Return,
    Foreach,
    ArrayElement,
    Direct,
}

/// One recorded access to a superglobal. Deliberately does not retain the
/// source-line vector (spec §4.5.1) — only the already-extracted snippet.
#[derive(Debug, Clone)]
pub struct SuperglobalUsage {
    pub primitive_name: String,
    /// `None` means "all keys" (`*`).
    pub key: Option<String>,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub assigned_to: Option<String>,
    pub context: UsageContext,
    pub enclosing_class: Option<String>,
    pub enclosing_method: Option<String>,
    pub called_method: Option<String>,
    pub is_loop_var: bool,
    pub loop_key_var: Option<String>,
    pub loop_value_var: Option<String>,
    pub snippet: String,
}

fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

fn strip_quotes(s: &str) -> String {
    s.trim_matches(|c| c == '\'' || c == '"').to_string()
}

fn enclosing_method_and_class(node: Node<'_>, source: &str) -> (Option<String>, Option<String>) {
    let mut method = None;
    let mut class = None;
    let mut current = Some(node);
    while let Some(n) = current {
        if method.is_none() && n.kind() == "method_declaration" {
            method = n
                .child_by_field_name("name")
                .map(|name| node_text(name, source).to_string());
        }
        if n.kind() == "class_declaration" {
            class = n
                .child_by_field_name("name")
                .map(|name| node_text(name, source).to_string());
            break;
        }
        current = n.parent();
    }
    (method, class)
}

/// Walk a superglobal `variable_name` subscript access's ancestry to
/// classify its usage context and extract the fields that depend on it.
fn classify(node: Node<'_>, source: &str) -> (UsageContext, Option<String>, Option<String>, bool, Option<String>, Option<String>) {
    // `node` is the outermost expression rooted at the superglobal access
    // (either the bare `variable_name` or its enclosing `subscript_expression`).
    let Some(parent) = node.parent() else {
        return (UsageContext::Direct, None, None, false, None, None);
    };

    match parent.kind() {
        "assignment_expression" if parent.child_by_field_name("right") == Some(node) => {
            let assigned_to = parent.child_by_field_name("left").map(|l| node_text(l, source).to_string());
            (UsageContext::Assignment, assigned_to, None, false, None, None)
        }
        "return_statement" => (UsageContext::Return, None, None, false, None, None),
        "arguments" => {
            let called_method = parent
                .parent()
                .and_then(|call| call.child_by_field_name("function"))
                .map(|f| node_text(f, source).to_string());
            let is_method_call = parent
                .parent()
                .map(|call| call.kind() == "member_call_expression" || call.kind() == "scoped_call_expression")
                .unwrap_or(false);
            let context = if is_method_call {
                UsageContext::MethodArg
            } else {
                UsageContext::FunctionArg
            };
            (context, None, called_method, false, None, None)
        }
        "foreach_statement" => {
            let key_var = parent
                .child_by_field_name("key")
                .map(|k| node_text(k, source).to_string());
            let value_var = parent
                .child_by_field_name("value")
                .map(|v| node_text(v, source).to_string());
            (UsageContext::Foreach, None, None, true, key_var, value_var)
        }
        "subscript_expression" => (UsageContext::ArrayElement, None, None, false, None, None),
        _ => (UsageContext::Direct, None, None, false, None, None),
    }
}

/// Find every superglobal usage in `root`/`source`, tagging each with
/// `file`. One call per file; the caller (carrier discovery's worker pool)
/// owns parallelism across files.
pub fn find_superglobal_usages(root: Node<'_>, source: &str, file: &str) -> Vec<SuperglobalUsage> {
    let mut usages = Vec::new();
    let mut state = NodeTrackingState::new();
    visit(root, source, file, &mut state, &mut usages);
    usages
}

fn visit(node: Node<'_>, source: &str, file: &str, state: &mut NodeTrackingState, out: &mut Vec<SuperglobalUsage>) {
    if !state.enter() {
        return;
    }

    if node.kind() == "variable_name" {
        let name = node_text(node, source);
        if catalog().php_superglobal_type(name).is_some() {
            // The expression to classify is the subscript access if the
            // superglobal is immediately indexed, else the bare variable.
            let subject = node
                .parent()
                .filter(|p| p.kind() == "subscript_expression" && p.child_by_field_name("object") == Some(node))
                .unwrap_or(node);

            let key = if subject.kind() == "subscript_expression" {
                subject.child_by_field_name("index").map(|idx| strip_quotes(node_text(idx, source)))
            } else {
                None
            };

            let (enclosing_method, enclosing_class) = enclosing_method_and_class(node, source);
            let (context, assigned_to, called_method, is_loop_var, loop_key_var, loop_value_var) =
                classify(subject, source);

            let range = crate::types::Range::from_node(&node);
            out.push(SuperglobalUsage {
                primitive_name: name.to_string(),
                key,
                file: file.to_string(),
                line: range.start_line,
                column: range.start_column,
                assigned_to,
                context,
                enclosing_class,
                enclosing_method,
                called_method,
                is_loop_var,
                loop_key_var,
                loop_value_var,
                snippet: crate::parsing::analyzer::truncate_for_display(node_text(subject, source), 80),
            });
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit(child, source, file, state, out);
    }
    state.exit();
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
    fn finds_direct_assignment_to_property() {
        let source = "<?php class A { function __construct() { $this->id = $_GET['id']; } }";
        let tree = parse(source);
        let usages = find_superglobal_usages(tree.root_node(), source, "a.php");
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].primitive_name, "$_GET");
        assert_eq!(usages[0].key.as_deref(), Some("id"));
        assert_eq!(usages[0].context, UsageContext::Assignment);
        assert_eq!(usages[0].assigned_to.as_deref(), Some("$this->id"));
        assert_eq!(usages[0].enclosing_class.as_deref(), Some("A"));
    }

    #[test]
    fn finds_method_arg_usage() {
        let source = "<?php class A { function f() { $this->set($_POST['x']); } }";
        let tree = parse(source);
        let usages = find_superglobal_usages(tree.root_node(), source, "a.php");
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].context, UsageContext::MethodArg);
        assert_eq!(usages[0].called_method.as_deref(), Some("set"));
    }

    #[test]
    fn finds_foreach_population() {
        let source = "<?php class A { function f() { foreach ($_GET as $k => $v) { $this->$k = $v; } } }";
        let tree = parse(source);
        let usages = find_superglobal_usages(tree.root_node(), source, "a.php");
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].context, UsageContext::Foreach);
        assert!(usages[0].is_loop_var);
        assert_eq!(usages[0].loop_key_var.as_deref(), Some("$k"));
        assert_eq!(usages[0].loop_value_var.as_deref(), Some("$v"));
    }
}
