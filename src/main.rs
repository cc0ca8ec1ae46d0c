use clap::Parser;

use tainttrace::cli::commands::{backward, carriers, init, paths, trace};
use tainttrace::cli::{Cli, Commands};
use tainttrace::Settings;

fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Settings::load_from(path).unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        }),
        None => Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        }),
    };

    match cli.command {
        Commands::Init { force } => init::run_init(force),
        Commands::Config => init::run_config(&config),
        Commands::Trace {
            path,
            format,
            output,
            language,
            max_depth,
            max_files,
            max_memory_mb,
            no_follow_imports,
            verbose,
        } => trace::run_trace(
            path,
            &format,
            output,
            language,
            max_depth,
            max_files,
            max_memory_mb,
            no_follow_imports,
            verbose,
            config.trace,
        ),
        Commands::Backward { path, target, max_depth } => backward::run_backward(path, &target, max_depth, config.trace),
        Commands::Carriers { path, output } => carriers::run_carriers(path, output),
        Commands::Paths {
            path,
            file,
            function,
            max_depth,
            max_paths,
            output,
        } => paths::run_paths(path, file, &function, max_depth, max_paths, output, config.trace),
    }
}
