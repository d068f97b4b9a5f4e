//! bcast - in-process broadcaster drill and config inspection
//!
//! CLI entry point.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use bcast::cli::{Cli, Command, ConfigArgs, DrillArgs, OutputFormat};
use bcast::config::Config;
use bcast::drill::{DrillReport, run_drill};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bcast")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(log_dir.join("bcast.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Drill(args) => cmd_drill(config, &args).await,
        Command::Config(args) => cmd_config(&config, &args),
    }
}

async fn cmd_drill(mut config: Config, args: &DrillArgs) -> Result<()> {
    args.apply(&mut config.broadcaster, &mut config.drill);
    let report = run_drill(&config.broadcaster, &config.drill).await.context("Drill failed")?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }

    if report.complete && report.in_order {
        Ok(())
    } else {
        Err(eyre::eyre!("Drill detected lost or reordered messages"))
    }
}

fn cmd_config(config: &Config, args: &ConfigArgs) -> Result<()> {
    match &args.write {
        Some(path) => {
            config.save(path)?;
            println!("{} Wrote config to {}", "✓".green(), path.display());
        }
        None => print!("{}", serde_yaml::to_string(config).context("Failed to serialize config")?),
    }
    Ok(())
}

fn print_report(report: &DrillReport) {
    let status = if report.complete && report.in_order {
        "✓".green()
    } else {
        "✗".red()
    };
    println!(
        "{} {} producers → {} subscribers in {}ms",
        status,
        report.producers,
        report.subscribers,
        report.elapsed_ms.to_string().cyan()
    );
    println!("  Submitted: {}", report.submitted);
    if report.rejected > 0 {
        println!("  Rejected:  {}", report.rejected.to_string().yellow());
    }
    println!("  Deliveries: {}", report.metrics.deliveries);
    println!(
        "  In order:  {}",
        if report.in_order { "yes".green() } else { "no".red() }
    );
    println!(
        "  Complete:  {}",
        if report.complete { "yes".green() } else { "no".red() }
    );
    for (i, n) in report.received.iter().enumerate() {
        let count = if *n == report.submitted {
            n.to_string().normal()
        } else {
            n.to_string().red()
        };
        println!("    subscriber {:>3}: {}", i, count);
    }
}
