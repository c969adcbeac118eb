//! Voxgate CLI - Main entry point

mod commands;
mod manifest;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxgate_foundation::{ConfigSource, VoxgateConfig};

/// Voxgate - inspect and maintain the speech audio cache
#[derive(Parser, Debug)]
#[command(name = "voxgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (overrides $VOXGATE_CONFIG and the default locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show cache statistics
    Stats {
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Look up cached audio for a text
    Get {
        text: String,

        /// Write the audio to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Store an audio file under a text
    Put { text: String, file: PathBuf },
    /// Bulk-load audio from a JSON manifest of {text, path} entries
    Warm { manifest: PathBuf },
    /// Remove expired entries from every tier
    Cleanup,
    /// Remove every entry from every tier
    Clear,
    /// Print the effective configuration
    Config {
        /// Also write it to the global or project config file
        #[arg(long, value_enum)]
        save: Option<SaveTarget>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SaveTarget {
    Global,
    Project,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    // Load configuration
    let (config, source) = match &args.config {
        Some(path) => (
            VoxgateConfig::load_from(path)?,
            ConfigSource::File(path.clone()),
        ),
        None => VoxgateConfig::load()?,
    };
    tracing::debug!(source = ?source, "Configuration resolved");

    match args.command {
        Command::Config { save } => {
            commands::show_config(&config, &source)?;
            match save {
                Some(SaveTarget::Global) => commands::save_config(&config, true),
                Some(SaveTarget::Project) => commands::save_config(&config, false),
                None => Ok(()),
            }
        }
        Command::Stats { json } => commands::stats(&config, json).await,
        Command::Get { text, out } => commands::get(&config, &text, out.as_deref()).await,
        Command::Put { text, file } => commands::put(&config, &text, &file).await,
        Command::Warm { manifest } => commands::warm(&config, &manifest).await,
        Command::Cleanup => commands::cleanup(&config).await,
        Command::Clear => commands::clear(&config).await,
    }
}
