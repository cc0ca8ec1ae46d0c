//! The source catalog (C6): process-wide, read-only tables mapping
//! language-level primitives to `SourceType`s, plus the universal pattern
//! regexes used by textual taint detection (spec §4.3/§4.4).
//!
//! Built once behind a `OnceLock` and never mutated afterward — the
//! teacher keeps its annotation-name tables as Rust consts rather than
//! runtime config for the same reason: "loaded once at startup" means
//! "immutable after process start", not "read from disk".

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::symbol::SourceType;

pub struct SourceCatalog {
    /// PHP superglobal name -> SourceType.
    php_superglobals: HashMap<&'static str, SourceType>,
    /// language -> (primitive name -> SourceType), for non-PHP "global"
    /// primitives (e.g. Python's `os.environ`, Go's `os.Args`).
    global_sources: HashMap<&'static str, HashMap<&'static str, SourceType>>,
    /// language -> (function/method name -> SourceType).
    input_functions: HashMap<&'static str, HashMap<&'static str, SourceType>>,
    /// C/C++ CGI environment variable name -> SourceType.
    cgi_env_vars: HashMap<&'static str, SourceType>,
    /// JS/TS DOM-facing sources, e.g. `document.cookie`.
    dom_sources: HashMap<&'static str, SourceType>,
    /// JS/TS Node.js-facing sources, e.g. `process.env`.
    node_sources: HashMap<&'static str, SourceType>,
    /// Java-like annotation name -> SourceType.
    annotations: HashMap<&'static str, SourceType>,

    input_method_name: Regex,
    input_property_name: Regex,
    input_object_name: Regex,
    exclude_method_name: Regex,
    deserialization_call: Regex,
    curl_exec_call: Regex,
    database_fetch_call: Regex,

    framework_markers: Vec<(&'static str, &'static str)>,
    skip_dir_names: Vec<&'static str>,
}

fn php_superglobal_table() -> HashMap<&'static str, SourceType> {
    [
        ("$_GET", SourceType::HttpGet),
        ("$_POST", SourceType::HttpPost),
        ("$_COOKIE", SourceType::HttpCookie),
        ("$_REQUEST", SourceType::HttpGet),
        ("$_SERVER", SourceType::HttpHeader),
        ("$_FILES", SourceType::HttpBody),
        ("$_ENV", SourceType::EnvVar),
        ("$_SESSION", SourceType::Session),
    ]
    .into_iter()
    .collect()
}

impl SourceCatalog {
    fn build() -> Self {
        let mut global_sources = HashMap::new();
        global_sources.insert(
            "python",
            [
                ("os.environ", SourceType::EnvVar),
                ("sys.argv", SourceType::CliArg),
                ("sys.stdin", SourceType::Stdin),
                ("request.args", SourceType::HttpGet),
                ("request.form", SourceType::HttpPost),
                ("request.cookies", SourceType::HttpCookie),
                ("request.headers", SourceType::HttpHeader),
                ("request.json", SourceType::HttpJson),
                ("request.data", SourceType::HttpBody),
            ]
            .into_iter()
            .collect::<HashMap<_, _>>(),
        );
        global_sources.insert(
            "go",
            [
                ("os.Args", SourceType::CliArg),
                ("os.Getenv", SourceType::EnvVar),
                ("os.Stdin", SourceType::Stdin),
                ("r.URL.Query", SourceType::HttpGet),
                ("r.FormValue", SourceType::HttpPost),
                ("r.Header", SourceType::HttpHeader),
                ("r.Cookie", SourceType::HttpCookie),
                ("r.Body", SourceType::HttpBody),
            ]
            .into_iter()
            .collect::<HashMap<_, _>>(),
        );

        let mut input_functions = HashMap::new();
        input_functions.insert(
            "php",
            [
                ("file_get_contents", SourceType::File),
                ("fgets", SourceType::File),
                ("getenv", SourceType::EnvVar),
                ("getallheaders", SourceType::HttpHeader),
                ("apache_request_headers", SourceType::HttpHeader),
            ]
            .into_iter()
            .collect::<HashMap<_, _>>(),
        );
        input_functions.insert(
            "python",
            [("input", SourceType::Stdin), ("os.getenv", SourceType::EnvVar)]
                .into_iter()
                .collect::<HashMap<_, _>>(),
        );

        let cgi_env_vars: HashMap<&'static str, SourceType> = [
            ("QUERY_STRING", SourceType::HttpGet),
            ("REQUEST_METHOD", SourceType::HttpHeader),
            ("HTTP_COOKIE", SourceType::HttpCookie),
            ("HTTP_USER_AGENT", SourceType::HttpHeader),
            ("CONTENT_LENGTH", SourceType::HttpHeader),
            ("REMOTE_ADDR", SourceType::HttpHeader),
            ("PATH_INFO", SourceType::HttpPath),
        ]
        .into_iter()
        .collect();

        let dom_sources: HashMap<&'static str, SourceType> = [
            ("document.cookie", SourceType::HttpCookie),
            ("document.location", SourceType::HttpPath),
            ("location.search", SourceType::HttpGet),
            ("location.hash", SourceType::HttpGet),
            ("window.name", SourceType::UserInput),
        ]
        .into_iter()
        .collect();

        let node_sources: HashMap<&'static str, SourceType> = [
            ("process.env", SourceType::EnvVar),
            ("process.argv", SourceType::CliArg),
            ("process.stdin", SourceType::Stdin),
            ("req.query", SourceType::HttpGet),
            ("req.body", SourceType::HttpBody),
            ("req.cookies", SourceType::HttpCookie),
            ("req.headers", SourceType::HttpHeader),
            ("req.params", SourceType::HttpPath),
        ]
        .into_iter()
        .collect();

        let annotations: HashMap<&'static str, SourceType> = [
            ("RequestParam", SourceType::HttpGet),
            ("PathVariable", SourceType::HttpPath),
            ("RequestBody", SourceType::HttpBody),
            ("QueryParam", SourceType::HttpGet),
            ("CookieValue", SourceType::HttpCookie),
            ("RequestHeader", SourceType::HttpHeader),
            ("FromQuery", SourceType::HttpGet),
            ("FromBody", SourceType::HttpBody),
            ("FromHeader", SourceType::HttpHeader),
            ("FromRoute", SourceType::HttpPath),
        ]
        .into_iter()
        .collect();

        let framework_markers = vec![
            ("wp-config.php", "WordPress"),
            ("artisan", "Laravel"),
            ("symfony.lock", "Symfony"),
            ("craft", "Craft CMS"),
            ("bin/console", "Symfony"),
            ("manage.py", "Django"),
            ("go.mod", "Go Modules"),
            ("package.json", "Node.js"),
        ];

        let skip_dir_names = vec![
            "vendor", "node_modules", ".git", "cache", "test", "tests", "__pycache__", "dist",
            "build", "target",
        ];

        Self {
            php_superglobals: php_superglobal_table(),
            global_sources,
            input_functions,
            cgi_env_vars,
            dom_sources,
            node_sources,
            annotations,
            input_method_name: Regex::new(
                r"(?i)^(input|get_input|getpost|getquery|getparsedbody|all|getqueryparams|getval|gettext)$",
            )
            .unwrap(),
            input_property_name: Regex::new(
                r"(?i)(input|request|params|query|cookies|headers|body|data|post|get|files|server|attributes|payload)",
            )
            .unwrap(),
            input_object_name: Regex::new(r"(?i)^(request|req|params|http|ctx|context)$").unwrap(),
            exclude_method_name: Regex::new(r"(?i)^(getdata|getbody)$").unwrap(),
            deserialization_call: Regex::new(
                r"(unserialize|json_decode|simplexml_load_string|yaml_parse)\s*\(",
            )
            .unwrap(),
            curl_exec_call: Regex::new(r"curl_(exec|multi_getcontent)\s*\(").unwrap(),
            database_fetch_call: Regex::new(r"->fetch\w*\s*\(").unwrap(),
            framework_markers,
            skip_dir_names,
        }
    }

    pub fn php_superglobal_type(&self, name: &str) -> Option<SourceType> {
        self.php_superglobals.get(name).copied()
    }

    pub fn php_superglobal_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.php_superglobals.keys().copied()
    }

    pub fn global_source_type(&self, language: &str, name: &str) -> Option<SourceType> {
        self.global_sources.get(language)?.get(name).copied()
    }

    pub fn input_function_type(&self, language: &str, name: &str) -> Option<SourceType> {
        self.input_functions.get(language)?.get(name).copied()
    }

    pub fn cgi_env_var_type(&self, name: &str) -> Option<SourceType> {
        self.cgi_env_vars.get(name).copied()
    }

    pub fn dom_source_type(&self, name: &str) -> Option<SourceType> {
        self.dom_sources.get(name).copied()
    }

    pub fn node_source_type(&self, name: &str) -> Option<SourceType> {
        self.node_sources.get(name).copied()
    }

    pub fn annotation_source_type(&self, name: &str) -> Option<SourceType> {
        self.annotations.get(name).copied()
    }

    pub fn should_skip_path(&self, path: &str) -> bool {
        let lower = path.to_ascii_lowercase();
        self.skip_dir_names
            .iter()
            .any(|dir| lower.contains(&format!("/{dir}/")) || lower.starts_with(&format!("{dir}/")))
    }

    pub fn identify_framework(&self, file_names: &[String]) -> Option<&'static str> {
        for (marker, framework) in &self.framework_markers {
            if file_names.iter().any(|f| f.ends_with(marker)) {
                return Some(framework);
            }
        }
        None
    }

    /// The universal pattern-based predicate from spec §4.3/§4.6.2: a
    /// textual over-approximation shared across languages that don't have a
    /// bespoke framework catalog.
    pub fn text_looks_tainted(&self, language: &str, text: &str) -> bool {
        if language == "php" && self.php_superglobal_names().any(|sg| text.contains(sg)) {
            return true;
        }
        if self.deserialization_call.is_match(text) {
            return true;
        }
        if self.curl_exec_call.is_match(text) {
            return true;
        }
        if UNIVERSAL_PROPERTY_PATTERNS.iter().any(|p| text.contains(p)) {
            return true;
        }
        if UNIVERSAL_METHOD_PATTERNS.iter().any(|p| text.contains(p)) {
            return true;
        }
        if self.database_fetch_call.is_match(text) {
            return true;
        }
        false
    }

    pub fn input_method_name_matches(&self, name: &str) -> bool {
        self.input_method_name.is_match(name) && !self.exclude_method_name.is_match(name)
    }

    pub fn input_property_name_matches(&self, name: &str) -> bool {
        self.input_property_name.is_match(name)
    }

    pub fn input_object_name_matches(&self, name: &str) -> bool {
        self.input_object_name.is_match(name)
    }

    /// Ordered contains-checks for source-type inference from a method or
    /// property name (spec §4.3), defaulting to `user_input`.
    pub fn infer_source_type_from_name(&self, name: &str) -> SourceType {
        let lower = name.to_ascii_lowercase();
        const ORDER: &[(&str, SourceType)] = &[
            ("cookie", SourceType::HttpCookie),
            ("header", SourceType::HttpHeader),
            ("server", SourceType::HttpHeader),
            ("post", SourceType::HttpPost),
            ("body", SourceType::HttpBody),
            ("parsed", SourceType::HttpBody),
            ("query", SourceType::HttpGet),
            ("get", SourceType::HttpGet),
            ("file", SourceType::File),
            ("upload", SourceType::File),
        ];
        for (needle, source_type) in ORDER {
            if lower.contains(needle) {
                return *source_type;
            }
        }
        SourceType::UserInput
    }

    /// Source-identification predicate from spec §4.6.2, returning
    /// `(SourceType, confidence)`.
    pub fn identify_source(&self, expression: &str) -> Option<(SourceType, f32)> {
        for sg in self.php_superglobal_names() {
            if expression.contains(sg) {
                return self.php_superglobal_type(sg).map(|t| (t, 1.0));
            }
        }
        if self.input_function_type("php", "file_get_contents").is_some()
            && expression.contains("file_get_contents(")
        {
            return Some((SourceType::File, 0.9));
        }
        if expression.contains("fgets(") {
            return Some((SourceType::File, 0.9));
        }
        if expression.contains("getenv(") {
            return Some((SourceType::EnvVar, 0.9));
        }
        if expression.contains("getallheaders(") {
            return Some((SourceType::HttpHeader, 0.9));
        }
        if UNIVERSAL_PROPERTY_PATTERNS.iter().any(|p| expression.contains(p)) {
            return Some((SourceType::UserInput, 0.95));
        }
        if expression.contains("->fetch") {
            return Some((SourceType::Database, 0.7));
        }
        if UNIVERSAL_METHOD_PATTERNS.iter().any(|p| expression.contains(p)) {
            return Some((SourceType::UserInput, 0.85));
        }
        if self.deserialization_call.is_match(expression) {
            return Some((SourceType::UserInput, 0.85));
        }
        if self.curl_exec_call.is_match(expression) {
            return Some((SourceType::Network, 0.8));
        }
        None
    }
}

const UNIVERSAL_PROPERTY_PATTERNS: &[&str] = &[
    "->input[", "->data[", "->request[", "->query[", "->cookies[", "->post[", "->get[", "->files[",
    "->server[", "->headers[", "->attributes[", "->payload[", "->args[",
];

const UNIVERSAL_METHOD_PATTERNS: &[&str] = &[
    "->input(", "->get_input(", "->getQueryParams(", "->getParsedBody(", "->all(",
];

static CATALOG: OnceLock<SourceCatalog> = OnceLock::new();

pub fn catalog() -> &'static SourceCatalog {
    CATALOG.get_or_init(SourceCatalog::build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn php_superglobal_identification_is_confidence_1() {
        let (source_type, confidence) = catalog().identify_source("$_GET['id']").unwrap();
        assert_eq!(source_type, SourceType::HttpGet);
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn universal_property_pattern_is_user_input() {
        let (source_type, confidence) = catalog().identify_source("$ctx->request['user']").unwrap();
        assert_eq!(source_type, SourceType::UserInput);
        assert!(confidence > 0.9);
    }

    #[test]
    fn database_fetch_is_lower_confidence() {
        let (source_type, confidence) = catalog().identify_source("$stmt->fetchAll()").unwrap();
        assert_eq!(source_type, SourceType::Database);
        assert_eq!(confidence, 0.7);
    }

    #[test]
    fn should_skip_path_matches_vendor_and_git() {
        assert!(catalog().should_skip_path("project/vendor/autoload.php"));
        assert!(catalog().should_skip_path(".git/hooks/pre-commit"));
        assert!(!catalog().should_skip_path("src/app.php"));
    }

    #[test]
    fn framework_identification_by_marker_file() {
        let files = vec!["wp-config.php".to_string(), "index.php".to_string()];
        assert_eq!(catalog().identify_framework(&files), Some("WordPress"));
    }

    #[test]
    fn exclude_pattern_rejects_unqualified_getdata() {
        assert!(!catalog().input_method_name_matches("getData"));
        assert!(catalog().input_method_name_matches("getQuery"));
    }

    #[test]
    fn infer_source_type_orders_cookie_before_get() {
        assert_eq!(catalog().infer_source_type_from_name("getCookieValue"), SourceType::HttpCookie);
        assert_eq!(catalog().infer_source_type_from_name("getSomething"), SourceType::HttpGet);
        assert_eq!(catalog().infer_source_type_from_name("weird_name"), SourceType::UserInput);
    }
}
