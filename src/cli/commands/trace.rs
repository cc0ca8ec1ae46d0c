//! Forward-trace command: discover sources, trace them to sinks, emit a report.

use std::path::PathBuf;
use std::str::FromStr;

use crate::config::TraceOptions;
use crate::output::{OutputFormat, Report};
use crate::tracer::Tracer;

#[allow(clippy::too_many_arguments)]
pub fn run_trace(
    path: PathBuf,
    format: &str,
    output: Option<PathBuf>,
    languages: Vec<String>,
    max_depth: Option<usize>,
    max_files: Option<usize>,
    max_memory_mb: Option<u64>,
    no_follow_imports: bool,
    verbose: bool,
    base: TraceOptions,
) {
    let format = match OutputFormat::from_str(format) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let mut options = base;
    if !languages.is_empty() {
        options.languages = languages;
    }
    if let Some(depth) = max_depth {
        options.max_depth = depth;
    }
    if max_files.is_some() {
        options.max_files = max_files;
    }
    if let Some(cap) = max_memory_mb {
        options.max_memory_mb = cap;
    }
    if no_follow_imports {
        options.follow_imports = false;
    }
    options.verbose = verbose || options.verbose;

    crate::logging::init_for_trace(options.verbose);

    let tracer = Tracer::new(options);
    let run = match tracer.run(&path) {
        Ok(run) => run,
        Err(e) => {
            eprintln!("Error: {e}");
            for suggestion in e.recovery_suggestions() {
                eprintln!("  - {suggestion}");
            }
            std::process::exit(1);
        }
    };

    if run.partial {
        eprintln!("Warning: memory pressure forced an early stop; results are partial.");
    }

    let report = Report::new(run.stats, run.map.nodes.clone(), run.map.edges.clone());
    let rendered = report.render(format);

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, rendered) {
                eprintln!("Error writing report to {}: {e}", path.display());
                std::process::exit(1);
            }
            println!("Report written to {}", path.display());
        }
        None => println!("{rendered}"),
    }
}
