//! The language-analyzer capability contract (C3): one trait, implemented
//! once per supported language, matching the shape of the teacher's
//! `LanguageBehavior`/`LanguageParser` traits — a capability record looked
//! up by name rather than a central `switch` over language strings.

use std::collections::HashSet;

use tree_sitter::Node;

use crate::error::TraceResult;
use crate::flow::FlowMap;
use crate::symbol::{Assignment, CallSite, ClassDef, FunctionDef, SourceType, SymbolTable};
use crate::types::FileId;

/// Maximum AST recursion depth honored by every analyzer's tree walk,
/// matching the teacher's `MAX_AST_DEPTH` guard against pathological
/// generated source.
pub const MAX_AST_DEPTH: usize = 500;

/// Per-walk bookkeeping: a handled-node-kind set for coverage diagnostics
/// (grounded on the teacher's `NodeTracker`/`NodeTrackingState`) plus the
/// current recursion depth.
#[derive(Debug, Default)]
pub struct NodeTrackingState {
    handled_kinds: HashSet<&'static str>,
    depth: usize,
}

impl NodeTrackingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: &'static str) {
        self.handled_kinds.insert(kind);
    }

    pub fn handled_kinds(&self) -> &HashSet<&'static str> {
        &self.handled_kinds
    }

    /// Returns `false` once `MAX_AST_DEPTH` would be exceeded; callers must
    /// stop recursing into children when this returns `false`.
    pub fn enter(&mut self) -> bool {
        if self.depth >= MAX_AST_DEPTH {
            return false;
        }
        self.depth += 1;
        true
    }

    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// Truncate `s` to at most `max_bytes`, backing off to the nearest preceding
/// UTF-8 character boundary so multi-byte sequences (including emoji) never
/// get split mid-codepoint. Grounded on the teacher's `safe_truncate_str`.
pub fn safe_truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// A UTF-8-safe substring window `[start, end)` in byte offsets, clamped to
/// character boundaries and the string's actual length. Grounded on the
/// teacher's `safe_substring_window`.
pub fn safe_substring_window(s: &str, start: usize, end: usize) -> &str {
    let len = s.len();
    let mut start = start.min(len);
    let mut end = end.min(len);
    if start > end {
        std::mem::swap(&mut start, &mut end);
    }
    while start > 0 && !s.is_char_boundary(start) {
        start -= 1;
    }
    while end < len && !s.is_char_boundary(end) {
        end += 1;
    }
    &s[start..end]
}

/// Render `s` for a preview/snippet field, truncating with an ellipsis if it
/// exceeds `max_chars` (counted in Unicode scalar values, not bytes).
pub fn truncate_for_display(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.trim().to_string();
    }
    let truncated: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", truncated.trim_end())
}

/// Threaded through `analyze_method_body`/`trace_expression`: the ambient
/// context a deeper per-method analysis may consult without re-deriving it.
pub struct AnalysisState<'a> {
    pub current_file: &'a str,
    pub current_class: Option<&'a str>,
    pub file_id: FileId,
}

/// Summary of one method body's dataflow, produced by `analyze_method_body`.
/// May be a shallow textual heuristic rather than a full dataflow fixpoint
/// (spec §4.3) — implementations are not required to be precise, only to
/// over-approximate in the recall-biased direction.
#[derive(Debug, Default, Clone)]
pub struct MethodFlowSummary {
    pub params_to_return: Vec<String>,
    pub params_to_properties: Vec<(String, String)>,
    pub params_to_call_args: Vec<(String, String)>,
    pub tainted_vars: HashSet<String>,
    pub assignments: Vec<Assignment>,
    pub calls: Vec<CallSite>,
    pub returns: Vec<String>,
    pub returns_input: bool,
    pub modifies_properties: Vec<String>,
}

/// The uniform per-language capability interface (spec §4.3). Every
/// implementation is registered once by name in the analyzer registry
/// (`parsing::catalog`/tracer setup); nothing outside this module switches
/// on language name.
pub trait LanguageAnalyzer: Send + Sync {
    fn language_name(&self) -> &'static str;

    fn supported_extensions(&self) -> &'static [&'static str];

    fn build_symbol_table(
        &self,
        file_path: &str,
        source: &str,
        root: Node<'_>,
    ) -> TraceResult<SymbolTable>;

    fn extract_classes(&self, root: Node<'_>, source: &str) -> Vec<ClassDef>;

    fn extract_functions(&self, root: Node<'_>, source: &str) -> Vec<FunctionDef>;

    fn extract_assignments(&self, root: Node<'_>, source: &str, scope: &str) -> Vec<Assignment>;

    fn extract_calls(&self, root: Node<'_>, source: &str, scope: &str) -> Vec<CallSite>;

    fn find_input_sources(
        &self,
        root: Node<'_>,
        source: &str,
        file: &str,
    ) -> Vec<crate::flow::FlowNode>;

    fn detect_frameworks(&self, symbol_table: &SymbolTable, source: &str) -> Vec<String>;

    fn analyze_method_body(
        &self,
        method: &FunctionDef,
        source: &str,
        state: &AnalysisState<'_>,
    ) -> MethodFlowSummary;

    fn trace_expression(&self, expression: &str, state: &AnalysisState<'_>) -> FlowMap;

    /// Candidate file paths an import/use statement may resolve to, relative
    /// to `base_path`. Returns an empty list where resolution isn't
    /// supported (spec §4.3) rather than erroring.
    fn resolve_imports(&self, symbol_table: &SymbolTable, base_path: &str) -> Vec<String>;

    /// Whether `text` looks tainted per the structural/textual predicate
    /// shared across languages (spec §4.3): contains a known input
    /// primitive name, an input-function call, or a known carrier access.
    /// Default implementation delegates to the source catalog; bespoke
    /// analyzers may override for language-specific primitives.
    fn looks_tainted(&self, text: &str) -> bool {
        crate::parsing::catalog::catalog().text_looks_tainted(self.language_name(), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_truncate_backs_off_to_char_boundary() {
        let s = "a🦀b";
        // byte 2 lands inside the crab emoji's 4-byte encoding.
        let truncated = safe_truncate_str(s, 2);
        assert_eq!(truncated, "a");
    }

    #[test]
    fn safe_truncate_noop_when_within_budget() {
        assert_eq!(safe_truncate_str("hello", 10), "hello");
    }

    #[test]
    fn truncate_for_display_adds_ellipsis() {
        let s = "a".repeat(20);
        let out = truncate_for_display(&s, 5);
        assert_eq!(out.chars().count(), 5);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn node_tracking_state_enforces_max_depth() {
        let mut state = NodeTrackingState::new();
        for _ in 0..MAX_AST_DEPTH {
            assert!(state.enter());
        }
        assert!(!state.enter());
    }
}
