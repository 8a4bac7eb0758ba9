//! Portico CLI
//!
//! Talk to xdg-desktop-portal from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Is there a camera at all?
//! portico camera present
//!
//! # Ask for camera access (Ctrl+C withdraws the request)
//! portico camera access --json
//!
//! # Get a PipeWire remote limited to the camera
//! portico camera remote
//! ```

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use portico_core::ConfigFile;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Portico - xdg-desktop-portal requests without the boilerplate
#[derive(Parser)]
#[command(name = "portico")]
#[command(author = "GhostKellz")]
#[command(version)]
#[command(about = "Coordinate xdg-desktop-portal requests", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use this config file instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Camera portal operations
    #[command(alias = "cam")]
    Camera(commands::CameraArgs),

    /// Manage configuration
    Config(commands::ConfigArgs),
}

fn load_config(path: Option<PathBuf>) -> Result<ConfigFile> {
    match path {
        Some(path) => ConfigFile::load_from(path.clone())
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(ConfigFile::load_or_default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("portico={}", level).parse()?)
                .add_directive(format!("portico_core={}", level).parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Camera(args) => {
            let config = load_config(cli.config)?;
            commands::camera(args, &config).await?
        }
        Commands::Config(args) => commands::config(args, cli.config).await?,
    }

    Ok(())
}
