//! CLI argument parsing for bcast

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::broadcaster::BroadcasterConfig;
use crate::drill::DrillOptions;

#[derive(Parser, Debug)]
#[command(name = "bcast")]
#[command(author, version, about = "In-process publish/subscribe broadcaster", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short, long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a fan-out drill against an in-process broadcaster
    Drill(DrillArgs),

    /// Print the effective configuration as YAML
    Config(ConfigArgs),
}

#[derive(clap::Args, Debug, Default)]
pub struct ConfigArgs {
    /// Write the effective configuration to this file instead of printing it
    #[arg(short, long)]
    pub write: Option<PathBuf>,
}

/// Overrides for the configured drill; unset flags keep the config value
#[derive(clap::Args, Debug, Default)]
pub struct DrillArgs {
    /// Concurrent producers
    #[arg(short, long)]
    pub producers: Option<usize>,

    /// Registered subscribers
    #[arg(short, long)]
    pub subscribers: Option<usize>,

    /// Messages per producer
    #[arg(short, long)]
    pub messages: Option<u64>,

    /// Pending-input buffer capacity
    #[arg(short, long)]
    pub buffer: Option<usize>,

    /// Per-subscriber channel capacity
    #[arg(long)]
    pub subscriber_capacity: Option<usize>,

    /// Per-message subscriber delay in milliseconds
    #[arg(short, long)]
    pub delay_ms: Option<u64>,

    /// Submit with try_submit and count rejections
    #[arg(short, long)]
    pub try_submit: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl DrillArgs {
    /// Apply these flags on top of configured values
    pub fn apply(&self, broadcaster: &mut BroadcasterConfig, drill: &mut DrillOptions) {
        if let Some(n) = self.producers {
            drill.producers = n;
        }
        if let Some(n) = self.subscribers {
            drill.subscribers = n;
        }
        if let Some(n) = self.messages {
            drill.messages_per_producer = n;
        }
        if let Some(n) = self.delay_ms {
            drill.subscriber_delay_ms = n;
        }
        if self.try_submit {
            drill.try_submit = true;
        }
        if let Some(n) = self.buffer {
            broadcaster.buffer_capacity = n;
        }
        if let Some(n) = self.subscriber_capacity {
            broadcaster.subscriber_capacity = n;
        }
    }
}
