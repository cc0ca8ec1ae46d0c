//! Parsing and per-language analysis (C2/C3/C4/C6): the parser pool and
//! language registry, the `LanguageAnalyzer` capability contract, the
//! bespoke structural analyzers for PHP/Python/JavaScript family/Go, the
//! generic profile-driven analyzer for the remaining languages, and the
//! process-wide source catalog.

pub mod analyzer;
pub mod catalog;
pub mod generic;
pub mod go;
pub mod javascript;
pub mod php;
pub mod pool;
pub mod python;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub use analyzer::LanguageAnalyzer;

use generic::{GenericAnalyzer, C_PROFILE, C_SHARP_PROFILE, CPP_PROFILE, JAVA_PROFILE, RUBY_PROFILE, RUST_PROFILE};
use go::GoAnalyzer;
use javascript::{Dialect, JavaScriptAnalyzer};
use php::PhpAnalyzer;
use python::PythonAnalyzer;

/// The process-wide language-name -> analyzer registry (spec §4.3/§9:
/// "dynamic dispatch over languages" realized as a capability record looked
/// up by name, never a `match` over language strings scattered through the
/// tracer).
fn registry() -> &'static HashMap<&'static str, Arc<dyn LanguageAnalyzer>> {
    static REGISTRY: OnceLock<HashMap<&'static str, Arc<dyn LanguageAnalyzer>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<&'static str, Arc<dyn LanguageAnalyzer>> = HashMap::new();
        map.insert("php", Arc::new(PhpAnalyzer));
        map.insert("python", Arc::new(PythonAnalyzer));
        map.insert("javascript", Arc::new(JavaScriptAnalyzer::new(Dialect::JavaScript)));
        map.insert("typescript", Arc::new(JavaScriptAnalyzer::new(Dialect::TypeScript)));
        map.insert("tsx", Arc::new(JavaScriptAnalyzer::new(Dialect::Tsx)));
        map.insert("go", Arc::new(GoAnalyzer));
        map.insert("rust", Arc::new(GenericAnalyzer::new(&RUST_PROFILE)));
        map.insert("java", Arc::new(GenericAnalyzer::new(&JAVA_PROFILE)));
        map.insert("c_sharp", Arc::new(GenericAnalyzer::new(&C_SHARP_PROFILE)));
        map.insert("c", Arc::new(GenericAnalyzer::new(&C_PROFILE)));
        map.insert("cpp", Arc::new(GenericAnalyzer::new(&CPP_PROFILE)));
        map.insert("ruby", Arc::new(GenericAnalyzer::new(&RUBY_PROFILE)));
        map
    })
}

/// Resolve the analyzer registered for `language_name`, as looked up from
/// `pool::registry().language_for_extension` or passed explicitly via
/// `TraceOptions::languages`.
pub fn analyzer_for_language(language_name: &str) -> Option<Arc<dyn LanguageAnalyzer>> {
    registry().get(language_name).cloned()
}

/// Resolve the analyzer registered for a file extension (without the dot).
pub fn analyzer_for_extension(extension: &str) -> Option<Arc<dyn LanguageAnalyzer>> {
    let language_name = pool::registry().language_for_extension(extension)?;
    analyzer_for_language(language_name)
}

/// All language names with a registered analyzer, for `TraceOptions`
/// validation and `--languages all` expansion.
pub fn supported_languages() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = registry().keys().copied().collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registry_entry_reports_its_own_name() {
        for (key, analyzer) in registry() {
            assert_eq!(*key, analyzer.language_name());
        }
    }

    #[test]
    fn extension_lookup_round_trips_to_the_right_analyzer() {
        let analyzer = analyzer_for_extension("php").expect("php registered");
        assert_eq!(analyzer.language_name(), "php");

        let analyzer = analyzer_for_extension("tsx").expect("tsx registered");
        assert_eq!(analyzer.language_name(), "tsx");
    }

    #[test]
    fn unknown_extension_resolves_to_none() {
        assert!(analyzer_for_extension("xyz").is_none());
    }
}
