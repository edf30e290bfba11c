//! weftc entry point.

mod cli;

use std::path::Path;

use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;
use weft::pipeline::{PipelineConfig, compile};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (input, config) = match cli.command {
        Command::OmpOpt {
            input,
            max_iterations,
        } => (
            input,
            PipelineConfig {
                omp_opt: Some(max_iterations),
                serialize: None,
            },
        ),
        Command::Serialize {
            input,
            omp_opt,
            options,
        } => (
            input,
            PipelineConfig {
                omp_opt: omp_opt.then_some(weft_ir::rewrite::DEFAULT_MAX_ITERATIONS),
                serialize: Some(options),
            },
        ),
    };

    run(&input, &config);
}

fn run(path: &Path, config: &PipelineConfig) {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading file: {e}");
            std::process::exit(1);
        }
    };

    match compile(&source, &path.display().to_string(), config) {
        Ok(compilation) => print!("{}", compilation.print()),
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            std::process::exit(1);
        }
    }
}
