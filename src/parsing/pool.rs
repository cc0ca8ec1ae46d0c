//! Parser pool and language registry (C2).
//!
//! One pool per language; tree-sitter's `Parser` is `!Sync` so the pool
//! only ever hands a checked-out instance to a single caller at a time,
//! mirroring the thread-local/checkout discipline of the teacher's
//! `ParserCache` in its parse pipeline stage.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tree_sitter::{Language, Parser};

struct LanguageEntry {
    name: &'static str,
    grammar: Language,
    extensions: &'static [&'static str],
}

/// Process-wide, read-only after construction: `language_name → grammar` and
/// the derived `extension → language_name` lookup (spec §4.2).
pub struct LanguageRegistry {
    languages: HashMap<&'static str, LanguageEntry>,
    extension_index: HashMap<&'static str, &'static str>,
}

impl LanguageRegistry {
    fn build() -> Self {
        let entries = vec![
            LanguageEntry {
                name: "php",
                grammar: tree_sitter_php::LANGUAGE_PHP.into(),
                extensions: &["php", "phtml", "php5", "php7"],
            },
            LanguageEntry {
                name: "python",
                grammar: tree_sitter_python::LANGUAGE.into(),
                extensions: &["py", "pyi"],
            },
            LanguageEntry {
                name: "javascript",
                grammar: tree_sitter_javascript::LANGUAGE.into(),
                extensions: &["js", "jsx", "mjs", "cjs"],
            },
            LanguageEntry {
                name: "typescript",
                grammar: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                extensions: &["ts"],
            },
            LanguageEntry {
                name: "tsx",
                grammar: tree_sitter_typescript::LANGUAGE_TSX.into(),
                extensions: &["tsx"],
            },
            LanguageEntry {
                name: "go",
                grammar: tree_sitter_go::LANGUAGE.into(),
                extensions: &["go"],
            },
            LanguageEntry {
                name: "java",
                grammar: tree_sitter_java::LANGUAGE.into(),
                extensions: &["java"],
            },
            LanguageEntry {
                name: "c",
                grammar: tree_sitter_c::LANGUAGE.into(),
                extensions: &["c", "h"],
            },
            LanguageEntry {
                name: "cpp",
                grammar: tree_sitter_cpp::LANGUAGE.into(),
                extensions: &["cc", "cpp", "cxx", "hpp", "hh"],
            },
            LanguageEntry {
                name: "c_sharp",
                grammar: tree_sitter_c_sharp::LANGUAGE.into(),
                extensions: &["cs"],
            },
            LanguageEntry {
                name: "ruby",
                grammar: tree_sitter_ruby::LANGUAGE.into(),
                extensions: &["rb"],
            },
            LanguageEntry {
                name: "rust",
                grammar: tree_sitter_rust::LANGUAGE.into(),
                extensions: &["rs"],
            },
        ];

        let mut languages = HashMap::new();
        let mut extension_index = HashMap::new();
        for entry in entries {
            for ext in entry.extensions {
                extension_index.insert(*ext, entry.name);
            }
            languages.insert(entry.name, entry);
        }

        Self {
            languages,
            extension_index,
        }
    }

    pub fn grammar(&self, language_name: &str) -> Option<Language> {
        self.languages.get(language_name).map(|e| e.grammar.clone())
    }

    /// Lazily resolved on first query per spec §4.2; the index itself is
    /// built eagerly since the registry is tiny and read-dominant anyway.
    pub fn language_for_extension(&self, extension: &str) -> Option<&'static str> {
        self.extension_index.get(extension).copied()
    }

    pub fn language_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.languages.keys().copied()
    }
}

static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

pub fn registry() -> &'static LanguageRegistry {
    REGISTRY.get_or_init(LanguageRegistry::build)
}

/// Per-language pool of reusable parser instances. Fabricates new instances
/// on empty and retains returned instances indefinitely (spec §4.2).
pub struct ParserPool {
    pools: HashMap<&'static str, Mutex<Vec<Parser>>>,
}

impl ParserPool {
    pub fn new() -> Self {
        let mut pools = HashMap::new();
        for name in registry().language_names() {
            pools.insert(name, Mutex::new(Vec::new()));
        }
        Self { pools }
    }

    /// Check out a parser for `language_name`, creating one if the pool is
    /// empty. Returns `None` for an unregistered language name.
    pub fn checkout(&self, language_name: &str) -> Option<CheckedOutParser<'_>> {
        let pool = self.pools.get(language_name)?;
        let mut guard = pool.lock();
        let parser = guard.pop().unwrap_or_else(|| {
            let mut parser = Parser::new();
            let grammar = registry().grammar(language_name).expect("registered language has a grammar");
            parser
                .set_language(&grammar)
                .expect("grammar is ABI-compatible with the linked tree-sitter runtime");
            parser
        });
        drop(guard);

        Some(CheckedOutParser {
            pool,
            parser: Some(parser),
        })
    }
}

impl Default for ParserPool {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard: returns the parser to its pool on drop instead of dropping it,
/// so the pool retains instances across checkouts (spec §4.2).
pub struct CheckedOutParser<'a> {
    pool: &'a Mutex<Vec<Parser>>,
    parser: Option<Parser>,
}

impl std::ops::Deref for CheckedOutParser<'_> {
    type Target = Parser;
    fn deref(&self) -> &Parser {
        self.parser.as_ref().unwrap()
    }
}

impl std::ops::DerefMut for CheckedOutParser<'_> {
    fn deref_mut(&mut self) -> &mut Parser {
        self.parser.as_mut().unwrap()
    }
}

impl Drop for CheckedOutParser<'_> {
    fn drop(&mut self) {
        if let Some(parser) = self.parser.take() {
            self.pool.lock().push(parser);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_lookup_resolves_known_languages() {
        assert_eq!(registry().language_for_extension("php"), Some("php"));
        assert_eq!(registry().language_for_extension("rs"), Some("rust"));
        assert_eq!(registry().language_for_extension("unknown_ext"), None);
    }

    #[test]
    fn checkout_and_return_reuses_instance() {
        let pool = ParserPool::new();
        {
            let mut parser = pool.checkout("php").unwrap();
            let tree = parser.parse("<?php echo 1;", None).unwrap();
            assert!(tree.root_node().child_count() > 0);
        }
        // Pool should now have exactly one idle parser for "php".
        assert_eq!(pool.pools.get("php").unwrap().lock().len(), 1);
    }

    #[test]
    fn unregistered_language_returns_none() {
        let pool = ParserPool::new();
        assert!(pool.checkout("cobol").is_none());
    }
}
