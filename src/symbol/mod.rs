//! The data model (C5): files, classes, methods, functions, properties,
//! imports, and the per-file extraction caches (assignments, calls) that
//! feed the tracer. See spec §3 for the full invariant list; this module is
//! the Rust realization of it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{FileId, Range};

/// The closed set of semantic source categories (spec §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    HttpGet,
    HttpPost,
    HttpCookie,
    HttpHeader,
    HttpBody,
    HttpJson,
    HttpPath,
    EnvVar,
    CliArg,
    Stdin,
    File,
    Network,
    Database,
    Session,
    /// Fallback when a source is detected but no more specific category fits.
    UserInput,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HttpGet => "http_get",
            Self::HttpPost => "http_post",
            Self::HttpCookie => "http_cookie",
            Self::HttpHeader => "http_header",
            Self::HttpBody => "http_body",
            Self::HttpJson => "http_json",
            Self::HttpPath => "http_path",
            Self::EnvVar => "env_var",
            Self::CliArg => "cli_arg",
            Self::Stdin => "stdin",
            Self::File => "file",
            Self::Network => "network",
            Self::Database => "database",
            Self::Session => "session",
            Self::UserInput => "user_input",
        }
    }
}

/// Visibility levels shared by every language's symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Module,
    Private,
}

/// How a name was carried into an assignment/call (spec §3.2 `Assignment`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Variable,
    Property,
    ArrayElement,
    Parameter,
}

/// A single `lhs = rhs`-shaped statement extracted from a method/function
/// body. `is_tainted ⇒ taint_source` is a hard invariant, enforced at
/// construction via `Assignment::tainted`/`Assignment::clean`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub target: String,
    pub source: String,
    pub line: u32,
    pub column: u32,
    pub scope: String,
    pub target_type: TargetType,
    pub operator: String,
    pub is_tainted: bool,
    pub taint_source: Option<String>,
}

impl Assignment {
    pub fn clean(
        target: impl Into<String>,
        source: impl Into<String>,
        line: u32,
        column: u32,
        scope: impl Into<String>,
        target_type: TargetType,
        operator: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            source: source.into(),
            line,
            column,
            scope: scope.into(),
            target_type,
            operator: operator.into(),
            is_tainted: false,
            taint_source: None,
        }
    }

    pub fn tainted(mut self, taint_source: impl Into<String>) -> Self {
        self.is_tainted = true;
        self.taint_source = Some(taint_source.into());
        self
    }
}

/// One positional/named argument in a `CallSite`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallArg {
    pub index: usize,
    pub value: String,
    pub is_tainted: bool,
    pub taint_source: Option<String>,
    pub taint_chain: Option<Vec<String>>,
}

/// A function/method/constructor invocation extracted from a body.
/// `has_tainted_args ⇔ tainted_arg_indices non-empty` is enforced by
/// `CallSite::finalize`, which derives the flag from the argument list
/// rather than letting callers set it independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSite {
    pub function_name: String,
    pub class_name: Option<String>,
    pub method_name: Option<String>,
    pub arguments: Vec<CallArg>,
    pub line: u32,
    pub column: u32,
    pub scope: String,
    pub is_static: bool,
    pub is_constructor: bool,
    pub has_tainted_args: bool,
    pub tainted_arg_indices: Vec<usize>,
}

impl CallSite {
    pub fn new(
        function_name: impl Into<String>,
        line: u32,
        column: u32,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            class_name: None,
            method_name: None,
            arguments: Vec::new(),
            line,
            column,
            scope: scope.into(),
            is_static: false,
            is_constructor: false,
            has_tainted_args: false,
            tainted_arg_indices: Vec::new(),
        }
    }

    /// Recompute `has_tainted_args`/`tainted_arg_indices` from `arguments`.
    /// Call after mutating `arguments` directly.
    pub fn finalize(&mut self) {
        self.tainted_arg_indices = self
            .arguments
            .iter()
            .filter(|a| a.is_tainted)
            .map(|a| a.index)
            .collect();
        self.has_tainted_args = !self.tainted_arg_indices.is_empty();
    }
}

/// One declared parameter of a function/method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDef {
    pub index: usize,
    pub name: String,
    pub type_hint: Option<String>,
    pub default_value: Option<String>,
    pub is_variadic: bool,
    pub is_reference: bool,
}

/// A function or (flattened) method definition.
///
/// `body_source` is releasable: once a file's extraction pass finishes,
/// `release_body` clears it to reclaim memory, per spec §3.3. Nothing past
/// that point may assume it is present; re-extraction re-parses on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub line: u32,
    pub end_line: u32,
    pub visibility: Visibility,
    pub parameters: Vec<ParameterDef>,
    pub return_type: Option<String>,
    pub body_start: usize,
    pub body_end: usize,
    pub body_source: String,
    pub is_static: bool,
    pub is_async: bool,
    pub is_exported: bool,
    pub is_variadic: bool,
}

impl FunctionDef {
    /// Release `body_source` to reclaim memory after extraction + pattern
    /// pre-analysis. Idempotent.
    pub fn release_body(&mut self) {
        self.body_source.clear();
        self.body_source.shrink_to_fit();
    }
}

/// Alias kept distinct at the type level for readability even though the
/// underlying shape is identical to `FunctionDef` — a method is simply a
/// function flattened under `ClassName.MethodName` (spec §4.3).
pub type MethodDef = FunctionDef;

/// A class/struct/interface-like container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    pub properties: HashMap<String, PropertyDef>,
    pub methods: HashMap<String, MethodDef>,
    pub constructor: Option<MethodDef>,
    pub traits: Vec<String>,
    pub is_abstract: bool,
    pub is_final: bool,
    pub is_carrier: bool,
    pub carrier_info: Option<CarrierInfo>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: None,
            implements: Vec::new(),
            properties: HashMap::new(),
            methods: HashMap::new(),
            constructor: None,
            traits: Vec::new(),
            is_abstract: false,
            is_final: false,
            is_carrier: false,
            carrier_info: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub visibility: Visibility,
    pub type_hint: Option<String>,
    pub is_static: bool,
}

/// Lightweight summary attached to a class once carrier discovery (C7)
/// identifies it as carrying user input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierInfo {
    pub source_types: Vec<SourceType>,
    pub confidence: f32,
}

/// How a carrier is accessed once populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPattern {
    Array,
    Method,
    Direct,
}

/// A class property or method that carries user input, the output of the
/// framework-carrier discovery engine (C7). Exactly one of
/// `property_name`/`method_name` is set — enforced by the two constructors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputCarrier {
    pub class_name: String,
    pub property_name: Option<String>,
    pub method_name: Option<String>,
    pub source_types: Vec<SourceType>,
    pub access_pattern: AccessPattern,
    pub populated_in: String,
    pub file: String,
    pub line: u32,
    pub confidence: f32,
}

impl InputCarrier {
    pub fn property(
        class_name: impl Into<String>,
        property_name: impl Into<String>,
        access_pattern: AccessPattern,
        populated_in: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        confidence: f32,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            property_name: Some(property_name.into()),
            method_name: None,
            source_types: Vec::new(),
            access_pattern,
            populated_in: populated_in.into(),
            file: file.into(),
            line,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn method(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        populated_in: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        confidence: f32,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            property_name: None,
            method_name: Some(method_name.into()),
            source_types: Vec::new(),
            access_pattern: AccessPattern::Method,
            populated_in: populated_in.into(),
            file: file.into(),
            line,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn sink_key(&self) -> (String, String) {
        let name = self
            .property_name
            .clone()
            .or_else(|| self.method_name.clone())
            .unwrap_or_default();
        (self.class_name.clone(), name)
    }
}

/// An import/use statement as extracted by a language analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub path: String,
    pub file_id: FileId,
    pub alias: Option<String>,
    pub is_glob: bool,
}

/// Per-file symbol table assembled by a language analyzer's
/// `build_symbol_table` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolTable {
    pub file_path: String,
    pub language: String,
    pub namespace: Option<String>,
    pub imports: Vec<Import>,
    pub classes: HashMap<String, ClassDef>,
    pub functions: HashMap<String, FunctionDef>,
    pub framework: Option<String>,
}

impl SymbolTable {
    pub fn new(file_path: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            language: language.into(),
            namespace: None,
            imports: Vec::new(),
            classes: HashMap::new(),
            functions: HashMap::new(),
            framework: None,
        }
    }

    /// Shrink per-file maps after a global merge, per spec §4.6 phase 3.
    /// Sources are owned elsewhere and are not touched here.
    pub fn shrink_after_merge(&mut self) {
        self.imports.clear();
        self.imports.shrink_to_fit();
        self.classes.clear();
        self.classes.shrink_to_fit();
        self.functions.clear();
        self.functions.shrink_to_fit();
    }
}

/// A globally unique, file-qualified name used by the merged symbol table's
/// `<file>::<name>` index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub file_path: Arc<str>,
    pub name: Arc<str>,
}

impl QualifiedName {
    pub fn new(file_path: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self {
            file_path: file_path.into(),
            name: name.into(),
        }
    }

    pub fn display(&self) -> String {
        format!("{}::{}", self.file_path, self.name)
    }
}

/// Merged, cross-file view built by the tracer after phase 3 (symbol-table
/// merge). Per spec §3.2: collisions on short name resolve to first-seen.
#[derive(Debug, Default)]
pub struct GlobalSymbolTable {
    qualified: HashMap<QualifiedName, Range>,
    /// short name -> first-seen qualified name, read-dominant after the
    /// merge phase completes.
    short_name_index: HashMap<Arc<str>, QualifiedName>,
    /// file -> symbol table, kept around for per-file lookups (e.g. by the
    /// tracer's forward-flow callee resolution).
    pub files: HashMap<FileId, SymbolTable>,
}

impl GlobalSymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one file's symbols into the global index. Never overwrites
    /// an existing short-name entry (first-seen wins, per spec §9 OQ2 /
    /// DESIGN.md).
    pub fn merge_file(&mut self, file_id: FileId, table: SymbolTable) {
        let file_path: Arc<str> = Arc::from(table.file_path.as_str());

        for name in table.classes.keys().chain(table.functions.keys()) {
            let name_arc: Arc<str> = Arc::from(name.as_str());
            let qualified = QualifiedName::new(file_path.clone(), name_arc.clone());
            self.qualified.insert(qualified.clone(), Range {
                start_byte: 0,
                end_byte: 0,
                start_line: 0,
                start_column: 0,
                end_line: 0,
                end_column: 0,
            });
            self.short_name_index.entry(name_arc).or_insert(qualified);
        }

        self.files.insert(file_id, table);
    }

    /// Best-effort short-name resolution. Imprecise by design (spec §9 OQ2):
    /// callers must not rely on it beyond heuristic call-graph expansion.
    pub fn resolve_short_name(&self, name: &str) -> Option<&QualifiedName> {
        self.short_name_index.get(name)
    }

    pub fn qualified_count(&self) -> usize {
        self.qualified.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_site_finalize_derives_flags_from_arguments() {
        let mut call = CallSite::new("echo", 1, 0, "global");
        call.arguments.push(CallArg {
            index: 0,
            value: "$x".into(),
            is_tainted: true,
            taint_source: Some("$_GET".into()),
            taint_chain: None,
        });
        call.finalize();
        assert!(call.has_tainted_args);
        assert_eq!(call.tainted_arg_indices, vec![0]);
    }

    #[test]
    fn call_site_finalize_clears_flags_when_no_tainted_args() {
        let mut call = CallSite::new("echo", 1, 0, "global");
        call.arguments.push(CallArg {
            index: 0,
            value: "1".into(),
            is_tainted: false,
            taint_source: None,
            taint_chain: None,
        });
        call.finalize();
        assert!(!call.has_tainted_args);
        assert!(call.tainted_arg_indices.is_empty());
    }

    #[test]
    fn assignment_tainted_sets_taint_source() {
        let a = Assignment::clean("x", "$_GET['id']", 1, 0, "global", TargetType::Variable, "=")
            .tainted("$_GET");
        assert!(a.is_tainted);
        assert_eq!(a.taint_source.as_deref(), Some("$_GET"));
    }

    #[test]
    fn input_carrier_exactly_one_of_property_or_method() {
        let p = InputCarrier::property("MyBB", "input", AccessPattern::Array, "__construct", "mybb.php", 10, 1.0);
        assert!(p.property_name.is_some());
        assert!(p.method_name.is_none());

        let m = InputCarrier::method("MyBB", "getInput", "__construct", "mybb.php", 20, 0.9);
        assert!(m.method_name.is_some());
        assert!(m.property_name.is_none());
    }

    #[test]
    fn global_table_first_seen_wins_on_short_name_collision() {
        let mut global = GlobalSymbolTable::new();

        let mut t1 = SymbolTable::new("a.php", "php");
        t1.functions.insert("render".into(), FunctionDef {
            name: "render".into(),
            line: 1,
            end_line: 2,
            visibility: Visibility::Public,
            parameters: vec![],
            return_type: None,
            body_start: 0,
            body_end: 0,
            body_source: String::new(),
            is_static: false,
            is_async: false,
            is_exported: true,
            is_variadic: false,
        });
        global.merge_file(FileId::new(1).unwrap(), t1);

        let mut t2 = SymbolTable::new("b.php", "php");
        t2.functions.insert("render".into(), FunctionDef {
            name: "render".into(),
            line: 5,
            end_line: 6,
            visibility: Visibility::Public,
            parameters: vec![],
            return_type: None,
            body_start: 0,
            body_end: 0,
            body_source: String::new(),
            is_static: false,
            is_async: false,
            is_exported: true,
            is_variadic: false,
        });
        global.merge_file(FileId::new(2).unwrap(), t2);

        let resolved = global.resolve_short_name("render").unwrap();
        assert_eq!(resolved.file_path.as_ref(), "a.php");
    }
}
