//! Maestro - Mode-driven multi-agent development orchestrator
//!
//! CLI entry point. Commands run against an in-process application
//! context; the orchestrator core lives in the workspace crates.

#![forbid(unsafe_code)]

use clap::Parser;
use maestro_core::ErrorKind;
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("maestro=info")),
        )
        .with_target(false)
        .init();

    let args = cli::Cli::parse();
    match cli::run(args).await {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {e}");
            let code = match e.kind() {
                ErrorKind::Validation | ErrorKind::NotFound => 2,
                _ => 1,
            };
            std::process::exit(code);
        }
    }
}
