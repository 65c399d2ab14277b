//! Command handlers for CLI subcommands.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use cmdsched_core::{SchedulerConfig, SchedulerSnapshot};
use tracing::info;

use crate::cli::{Commands, OutputFormat};
use crate::robot::SimRobot;
use crate::scenario::{Scenario, ScenarioName};

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Execute a CLI command.
pub fn execute(command: Commands) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Run {
            scenario,
            cycles,
            period_ms,
            format,
            all,
            output,
        } => {
            let mut config = SchedulerConfig::from_env()?;
            if let Some(ms) = period_ms {
                if ms == 0 {
                    return Err("--period-ms must be positive".into());
                }
                config = config.with_period(Duration::from_millis(ms));
            }
            let options = RunOptions {
                cycles: cycles.unwrap_or_else(|| scenario.suggested_cycles()),
                format,
                all,
            };
            cmd_run(scenario, config, &options, output.as_deref(), &mut out)
        }
        Commands::Scenarios => cmd_scenarios(&mut out),
    }
}

/// How `run` reports progress.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub cycles: u64,
    pub format: OutputFormat,
    /// Print every cycle instead of only the ones that changed the table.
    pub all: bool,
}

/// Plays `name` for the requested number of cycles, writing snapshots to
/// `out` (and as JSON lines to `output`, if given).
pub fn cmd_run(
    name: ScenarioName,
    config: SchedulerConfig,
    options: &RunOptions,
    output: Option<&Path>,
    out: &mut dyn Write,
) -> Result<()> {
    info!(
        scenario = name.as_str(),
        cycles = options.cycles,
        period_ms = config.period.as_millis() as u64,
        frequency_hz = config.frequency_hz(),
        "starting simulation"
    );

    let mut sink = match output {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };

    let mut scenario = Scenario::build(name, config)?;
    let mut changes = 0u64;

    for _ in 0..options.cycles {
        let snapshot = scenario.step()?;
        let changed = scenario.take_changed();
        if changed {
            changes += 1;
        }

        if let Some(sink) = sink.as_mut() {
            serde_json::to_writer(&mut *sink, &snapshot)?;
            writeln!(sink)?;
        }

        if changed || options.all {
            match options.format {
                OutputFormat::Text => writeln!(out, "{}", render_text(&snapshot, &scenario.robot))?,
                OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(&snapshot)?)?,
            }
        }
    }

    if let Some(mut sink) = sink {
        sink.flush()?;
    }

    if options.format == OutputFormat::Text {
        writeln!(
            out,
            "\n{} cycles, {} table changes, drivetrain at {:.2} m, arm at {:.1} deg",
            options.cycles,
            changes,
            scenario.robot.drive.distance_m.get(),
            scenario.robot.arm.angle_deg.get()
        )?;
    }
    Ok(())
}

fn cmd_scenarios(out: &mut dyn Write) -> Result<()> {
    writeln!(out, "Available scenarios:")?;
    for name in ScenarioName::ALL {
        writeln!(
            out,
            "  {:<10} {} ({} cycles)",
            name.as_str(),
            name.description(),
            name.suggested_cycles()
        )?;
    }
    Ok(())
}

/// One-line rendering of a cycle: time, running commands and owners.
pub fn render_text(snapshot: &SchedulerSnapshot, robot: &SimRobot) -> String {
    let running = snapshot.running_names().join(", ");
    let owners: Vec<String> = snapshot
        .subsystems
        .iter()
        .map(|subsystem| {
            let owner = subsystem
                .current_command
                .and_then(|id| robot.scheduler.name(id))
                .unwrap_or("-");
            format!("{}={}", subsystem.name, owner)
        })
        .collect();

    format!(
        "cycle {:>4}  t={:>7.3}s  running=[{}]  {}",
        snapshot.cycle,
        robot.elapsed().as_secs_f64(),
        running,
        owners.join(" ")
    )
}
