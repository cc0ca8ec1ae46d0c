//! Path-expansion command: walk every call path reachable from a starting
//! function (C9, spec §4.7).

use std::path::PathBuf;

use crate::config::TraceOptions;
use crate::tracer::Tracer;

#[allow(clippy::too_many_arguments)]
pub fn run_paths(path: PathBuf, file: PathBuf, function: &str, max_depth: Option<usize>, max_paths: usize, output: Option<PathBuf>, base: TraceOptions) {
    let mut options = base;
    if let Some(depth) = max_depth {
        options.max_depth = depth;
    }

    crate::logging::init_for_trace(options.verbose);

    let start_file = if file.is_absolute() { file } else { path.join(&file) };

    let tracer = Tracer::new(options);
    let result = match tracer.run_paths(&path, &start_file.to_string_lossy(), function, max_paths) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let rendered = serde_json::to_string_pretty(&result).unwrap_or_else(|_| "{}".to_string());
    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, rendered) {
                eprintln!("Error writing path expansion to {}: {e}", path.display());
                std::process::exit(1);
            }
            println!("Path expansion written to {}", path.display());
        }
        None => println!("{rendered}"),
    }
}
