//! Backward-trace command: find the source(s) that could reach a target expression.

use std::path::PathBuf;

use crate::config::TraceOptions;
use crate::tracer::Tracer;

pub fn run_backward(path: PathBuf, target: &str, max_depth: Option<usize>, base: TraceOptions) {
    let mut options = base;
    if let Some(depth) = max_depth {
        options.max_depth = depth;
    }

    crate::logging::init_for_trace(options.verbose);

    let tracer = Tracer::new(options);
    let result = match tracer.run_backward(&path, target) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if result.sources.is_empty() {
        println!("No sources found reaching '{target}' (searched {} file(s)).", result.analyzed_files);
        return;
    }

    println!("Target: {}", result.target);
    println!("Analyzed {} file(s) in {:?}.", result.analyzed_files, result.duration);
    for source in &result.sources {
        println!("  source: {:?} '{}' ({}:{}, confidence {:.2})", source.source_type, source.expression, source.file, source.line, source.confidence);
    }
    for path in &result.paths {
        let chain: Vec<String> = path.steps.iter().map(|s| format!("{}@{}:{}", s.expression, s.file, s.line)).collect();
        println!("  path: {}", chain.join(" <- "));
    }
}
