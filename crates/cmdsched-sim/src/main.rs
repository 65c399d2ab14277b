//! cmdsched-sim entry point.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use cmdsched_sim::cli::Cli;
use cmdsched_sim::commands;

fn main() {
    // Load .env.local if it exists (CMDSCHED_* overrides)
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    // Logs go to stderr so snapshot output stays machine-readable
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = commands::execute(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
