//! Command-line interface definition using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::scenario::ScenarioName;

/// Build version string with git hash and build date.
fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const BUILD_DATE: &str = env!("BUILD_DATE");

    // Format: "0.1.0 (abc1234, 2026-10-18)"
    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} ({}, {})", VERSION, GIT_HASH, BUILD_DATE))
}

/// cmdsched-sim - drive the command scheduler against a simulated robot
#[derive(Parser, Debug)]
#[command(name = "cmdsched-sim")]
#[command(author, version = version_string(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Play a scenario and print the command table as it changes
    Run {
        /// Scenario to play
        #[arg(short, long, value_enum)]
        scenario: ScenarioName,

        /// Number of cycles to run (default: the scenario's own length)
        #[arg(short, long, env = "CMDSCHED_SIM_CYCLES")]
        cycles: Option<u64>,

        /// Cycle period in milliseconds (overrides CMDSCHED_PERIOD_MS)
        #[arg(short, long)]
        period_ms: Option<u64>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Print every cycle, not only the ones that changed the table
        #[arg(short, long)]
        all: bool,

        /// Also write snapshots as JSON lines to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List available scenarios
    Scenarios,
}

/// Output format for snapshots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl Cli {
    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
