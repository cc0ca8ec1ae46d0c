//! Layered configuration: built-in defaults → TOML file → environment
//! variables → CLI flags. The CLI flags are merged in by the caller
//! (`cli::args`) on top of the `Settings` this module loads.
//!
//! # Environment variables
//!
//! Prefixed `TAINTTRACE_`, double underscore separates nested keys:
//! `TAINTTRACE_TRACE__MAX_DEPTH=20`, `TAINTTRACE_TRACE__WORKERS=4`.

use std::collections::HashMap;
use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Top-level settings: everything that can be set in `.tainttrace/settings.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub trace: TraceOptions,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// All configurable tracer options from spec §6, as a single serializable
/// struct so it can be loaded from TOML, overridden by env vars, and patched
/// by CLI flags uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceOptions {
    /// Restrict analysis to named languages; empty means all detected.
    #[serde(default)]
    pub languages: Vec<String>,

    /// Maximum recursion depth in forward/backward tracing.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Worker pool size; defaults to the logical CPU count.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Whether to cross call edges into callee functions.
    #[serde(default = "default_true")]
    pub follow_imports: bool,

    /// Emit phase-progress diagnostics.
    #[serde(default)]
    pub verbose: bool,

    /// Basename glob patterns accepted during discovery.
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// `**`-aware glob patterns rejected during discovery.
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Heap-watermark at which shedding engages.
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,

    /// Files larger than this are skipped.
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,

    /// Hard cap on files analyzed.
    #[serde(default)]
    pub max_files: Option<usize>,

    /// Parse cache entry cap.
    #[serde(default = "default_cache_entries")]
    pub cache_max_entries: usize,

    /// Parse cache byte cap.
    #[serde(default = "default_cache_memory_bytes")]
    pub cache_max_memory_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

fn default_version() -> u32 {
    1
}
fn default_max_depth() -> usize {
    10
}
fn default_workers() -> usize {
    num_cpus::get()
}
fn default_true() -> bool {
    true
}
fn default_exclude_patterns() -> Vec<String> {
    [
        "**/node_modules/**",
        "**/vendor/**",
        "**/.git/**",
        "**/dist/**",
        "**/__pycache__/**",
        "**/target/**",
        "**/bin/**",
        "**/obj/**",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_max_memory_mb() -> u64 {
    120
}
fn default_max_file_size_bytes() -> u64 {
    5 * 1024 * 1024
}
fn default_cache_entries() -> usize {
    100
}
fn default_cache_memory_bytes() -> usize {
    32 * 1024 * 1024
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            languages: Vec::new(),
            max_depth: default_max_depth(),
            workers: default_workers(),
            follow_imports: true,
            verbose: false,
            include_patterns: Vec::new(),
            exclude_patterns: default_exclude_patterns(),
            max_memory_mb: default_max_memory_mb(),
            max_file_size_bytes: default_max_file_size_bytes(),
            max_files: None,
            cache_max_entries: default_cache_entries(),
            cache_max_memory_bytes: default_cache_memory_bytes(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            trace: TraceOptions::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Load layered config: defaults, then `.tainttrace/settings.toml` found
    /// by walking up from the current directory, then `TAINTTRACE_` env vars.
    pub fn load() -> Result<Self, figment::Error> {
        let config_path =
            Self::find_workspace_config().unwrap_or_else(|| PathBuf::from(".tainttrace/settings.toml"));

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(
                Env::prefixed("TAINTTRACE_").map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
    }

    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(
                Env::prefixed("TAINTTRACE_").map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
    }

    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(".tainttrace");
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }
        None
    }

    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(".tainttrace/settings.toml");
        if !force && config_path.exists() {
            return Err("configuration file already exists; pass --force to overwrite".into());
        }
        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_internally_consistent() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.trace.max_depth, 10);
        assert!(settings.trace.workers > 0);
        assert!(settings.trace.follow_imports);
        assert!(settings.trace.exclude_patterns.contains(&"**/node_modules/**".to_string()));
    }

    #[test]
    fn load_from_toml_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            r#"
[trace]
max_depth = 3
workers = 2
follow_imports = false
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.trace.max_depth, 3);
        assert_eq!(settings.trace.workers, 2);
        assert!(!settings.trace.follow_imports);
        // untouched defaults survive
        assert_eq!(settings.trace.max_memory_mb, 120);
    }

    #[test]
    fn zero_cache_caps_are_caller_responsibility_not_config_layer() {
        // The config layer only parses values; cache::ParseCache::new falls
        // back to defaults on zero, per spec §4.1.
        let settings = Settings::default();
        assert!(settings.trace.cache_max_entries >= 1);
    }
}
