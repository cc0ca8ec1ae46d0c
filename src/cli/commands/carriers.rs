//! Carrier-discovery command: find class properties/methods that carry user input.

use std::path::PathBuf;

use crate::carriers::discover_carriers;
use crate::config::TraceOptions;
use crate::tracer::discover::discover;

pub fn run_carriers(path: PathBuf, output: Option<PathBuf>) {
    let mut options = TraceOptions::default();
    options.languages = vec!["php".to_string()];

    let discovered = match discover(&path, &options) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let mut files = Vec::with_capacity(discovered.len());
    for file in discovered {
        match std::fs::read_to_string(&file.path) {
            Ok(source) => files.push((file.path.to_string_lossy().to_string(), source)),
            Err(e) => eprintln!("Warning: could not read {}: {e}", file.path.display()),
        }
    }

    let discovered_at = chrono::Utc::now().to_rfc3339();
    let map = match discover_carriers(&path, &files, &discovered_at) {
        Ok(map) => map,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let rendered = serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string());
    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, rendered) {
                eprintln!("Error writing carrier map to {}: {e}", path.display());
                std::process::exit(1);
            }
            println!("Carrier map written to {}", path.display());
        }
        None => println!("{rendered}"),
    }
}
