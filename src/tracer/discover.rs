//! Discovery (C8 phase 1, spec §4.6): walk the root honoring include/exclude
//! globs and the per-language extension table, truncating to `max_files`.

use std::path::{Path, PathBuf};

use crate::config::TraceOptions;
use crate::error::TraceResult;
use crate::parsing::catalog::catalog;
use crate::parsing::pool::registry;

#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub language: &'static str,
}

/// Walk `root`, keeping files whose extension maps to a registered analyzer,
/// honoring `options.include_patterns` (basename match), `options.exclude_patterns`
/// (`**`-aware path match), `options.languages` (empty = all), and
/// `options.max_files`.
pub fn discover(root: &Path, options: &TraceOptions) -> TraceResult<Vec<DiscoveredFile>> {
    let exclude: Vec<glob::Pattern> = options
        .exclude_patterns
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect();
    let include: Vec<glob::Pattern> = options
        .include_patterns
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect();

    let mut out = Vec::new();
    let walker = ignore::WalkBuilder::new(root).hidden(false).build();

    for entry in walker {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let relative_str = relative.to_string_lossy().replace('\\', "/");

        if catalog().should_skip_path(&relative_str) {
            continue;
        }
        if exclude.iter().any(|pattern| pattern.matches(&relative_str)) {
            continue;
        }
        if !include.is_empty() {
            let basename = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            if !include.iter().any(|pattern| pattern.matches(&basename)) {
                continue;
            }
        }

        let Some(extension) = path.extension().and_then(|e| e.to_str()) else { continue };
        let Some(language) = registry().language_for_extension(extension) else { continue };
        if !options.languages.is_empty() && !options.languages.iter().any(|l| l == language) {
            continue;
        }

        out.push(DiscoveredFile {
            path: path.to_path_buf(),
            language,
        });
    }

    if let Some(max_files) = options.max_files {
        out.truncate(max_files);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discovers_php_and_skips_vendor() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("app.php"), "<?php").unwrap();
        fs::create_dir(dir.path().join("vendor")).unwrap();
        fs::write(dir.path().join("vendor/lib.php"), "<?php").unwrap();

        let options = TraceOptions::default();
        let found = discover(dir.path(), &options).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("app.php"));
    }

    #[test]
    fn max_files_truncates_the_list() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("f{i}.php")), "<?php").unwrap();
        }
        let mut options = TraceOptions::default();
        options.max_files = Some(2);
        let found = discover(dir.path(), &options).unwrap();
        assert_eq!(found.len(), 2);
    }
}
