//! Pulse CLI - live system metrics in the terminal.
//!
//! A thin frontend over [`pulse_client::MetricsClient`]: it loads the layered
//! configuration, opens the stream and renders whatever the client publishes.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;
mod config_bridge;
mod format;
mod status;
mod theme;

use commands::{config, history, watch};
use format::OutputFormat;

/// Pulse - real-time system metrics stream
#[derive(Debug, Parser)]
#[command(name = "pulse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file layered over ~/.pulse/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Stream live metrics until interrupted
    Watch {
        /// Force a reconnect when the newest record is older than this many
        /// seconds (overrides the configured watchdog)
        #[arg(long)]
        watchdog: Option<u64>,

        /// Request recent history once the stream is up
        #[arg(long)]
        history: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },

    /// Fetch one batch of historical metrics and exit
    History {
        /// How far back to look
        #[arg(long, default_value = "5m")]
        duration: String,

        /// Sampling interval
        #[arg(long, default_value = "10s")]
        interval: String,

        /// Seconds to wait for the batch before giving up
        #[arg(long, default_value_t = 30)]
        wait: u64,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },

    /// View and check configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Show the resolved configuration with the source of every value
    Show {
        /// Output format
        #[arg(long, default_value = "toml", value_parser = ["toml", "json"])]
        format: String,

        /// Limit output to one section (connection, watchdog, logging)
        #[arg(long)]
        section: Option<String>,
    },

    /// Check the configuration and report problems
    Validate,

    /// Show which files and environment variables are consulted
    Paths,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { command } = cli.command {
        return handle_config(command, cli.config.as_deref());
    }

    let resolved = pulse_config::Config::load(cli.config.as_deref())
        .context("failed to load configuration")?;

    let mut log_config = config_bridge::to_log_config(&resolved.config);
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    // Logging is best effort; the stream still works without it.
    let _log_guard = match pulse_telemetry::setup_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        },
    };

    match cli.command {
        Commands::Watch {
            watchdog,
            history: with_history,
            format,
        } => {
            let options = watch::WatchOptions::resolve(&resolved.config, watchdog, with_history);
            watch::run_watch(&resolved.config, &options, format).await
        },
        Commands::History {
            duration,
            interval,
            wait,
            format,
        } => {
            let window = pulse_client::HistoryWindow::new(duration, interval);
            history::run_history(
                &resolved.config,
                &window,
                std::time::Duration::from_secs(wait),
                format,
            )
            .await
        },
        Commands::Config { .. } => Ok(()),
    }
}

fn handle_config(command: ConfigCommands, explicit: Option<&std::path::Path>) -> Result<()> {
    match command {
        ConfigCommands::Show { format, section } => {
            config::show_config(explicit, &format, section.as_deref())
        },
        ConfigCommands::Validate => config::validate_config(explicit),
        ConfigCommands::Paths => config::show_paths(explicit),
    }
}
