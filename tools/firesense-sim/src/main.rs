//! firesense-sim - run FireSense device definitions without hardware
//!
//! Loads a device file (config, channels, rules, scripted stimuli), runs it
//! against simulated pins and the in-memory sync store, and prints what the
//! rules did.

mod check;
mod device;
mod eval;
mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use common::LogConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "firesense-sim")]
#[command(about = "Run FireSense device definitions against simulated hardware")]
#[command(long_about = "Run FireSense device definitions against simulated hardware

Commands:
  run      Simulate a device for a number of ticks
  check    Validate a device file
  eval     Evaluate a single expression

Examples:
  firesense-sim run kitchen.yaml --ticks 50
  firesense-sim run kitchen.yaml --realtime
  firesense-sim check kitchen.yaml
  firesense-sim eval \"T * 9 / 5 + 32\" --set T=21.5")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Directory for daily log files
    #[arg(long, global = true, env = "FIRESENSE_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a device
    Run {
        /// Device file (YAML, TOML or JSON)
        device: PathBuf,

        /// Number of ticks to simulate
        #[arg(short, long, default_value = "20")]
        ticks: u64,

        /// Start time as Unix seconds (default: now)
        #[arg(long)]
        epoch: Option<i64>,

        /// Run the scheduler loop on the system clock until Ctrl+C
        #[arg(long, conflicts_with_all = ["ticks", "epoch"])]
        realtime: bool,

        /// Print the sync store contents after the run
        #[arg(long)]
        dump_store: bool,
    },

    /// Validate a device file
    Check {
        /// Device file (YAML, TOML or JSON)
        device: PathBuf,

        /// Print the normalized device definition as YAML
        #[arg(long)]
        print: bool,
    },

    /// Evaluate an expression
    Eval {
        /// Expression text, e.g. "(A + 1) * 2"
        expr: String,

        /// Named values, NAME=VALUE
        #[arg(short, long = "set")]
        set: Vec<String>,

        /// Value of millis
        #[arg(long, default_value = "0")]
        millis: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut log_config = LogConfig::new("firesense-sim")
        .with_level(if cli.verbose { "debug" } else { "warn" });
    log_config.ansi = !cli.no_color;
    if let Some(dir) = cli.log_dir {
        log_config = log_config.with_log_dir(dir);
    }
    common::logging::init_with_config(log_config)?;

    match cli.command {
        Commands::Run {
            device,
            ticks,
            epoch,
            realtime,
            dump_store,
        } => {
            let device = device::load_device(&device)?;
            if realtime {
                if !device.stimuli.is_empty() {
                    println!(
                        "{} stimuli are ignored in realtime mode",
                        "WARN".yellow()
                    );
                }
                run::run_realtime(&device).await?;
                return Ok(());
            }
            let epoch = epoch.unwrap_or_else(|| chrono::Utc::now().timestamp());
            let summary = run::simulate(&device, ticks, epoch).await?;
            print_summary(&summary, device.config.tick_interval_ms);
            if dump_store {
                println!("\n{}", "Store:".bright_cyan());
                println!("{}", serde_json::to_string_pretty(&summary.store)?);
            }
        },
        Commands::Check { device: path, print } => {
            let device = device::load_device(&path)?;
            let report = check::check_device(&device);
            for issue in &report.issues {
                let tag = match issue.severity {
                    check::Severity::Warning => "WARN".yellow(),
                    check::Severity::Error => "ERROR".red(),
                };
                println!("{} {}", tag, issue);
            }
            if print {
                println!("{}", serde_yaml::to_string(&device)?);
            }
            if report.has_errors() {
                anyhow::bail!("{} has errors", path.display());
            }
            println!(
                "{} {} channels, {} rules, {} warnings",
                "OK".green(),
                device.channels.len(),
                device.rules.len(),
                report.warnings()
            );
        },
        Commands::Eval { expr, set, millis } => {
            let value = eval::evaluate(&expr, &set, millis)?;
            println!("{} ({})", value.to_string().bright_green(), value.value_type());
        },
    }

    Ok(())
}

fn print_summary(summary: &run::RunSummary, tick_ms: u64) {
    for write in &summary.pin_writes {
        let level = if write.level {
            "HIGH".green()
        } else {
            "LOW".red()
        };
        println!(
            "{} gpio {} -> {}",
            format!("[{:>6} ms]", write.tick * tick_ms).dimmed(),
            write.gpio,
            level
        );
    }

    println!("\n{}", "Channels:".bright_cyan());
    for (id, value) in &summary.channels {
        println!("  {:<16} {}", id, value);
    }

    println!(
        "\n{} {} ticks, {} THEN, {} ELSE",
        "DONE".green(),
        summary.ticks,
        summary.then_branches,
        summary.else_branches
    );
}
