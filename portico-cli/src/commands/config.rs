//! Config command - inspect and create the portico config file

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use portico_core::config::{ConfigFile, sample_config};
use std::path::PathBuf;

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print where portico reads its configuration from
    Path,

    /// Show the settings portico will use
    Show,

    /// Write the commented sample config to the config path
    Init {
        /// Replace an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the commented sample config
    Sample,
}

/// Run config subcommand
pub async fn config(args: ConfigArgs, path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(ConfigFile::default_path);

    match args.command {
        ConfigCommand::Path => {
            let state = if path.exists() { "present" } else { "not created yet" };
            println!("{} ({})", path.display(), state);
        }
        ConfigCommand::Show => {
            let exists = path.exists();
            let config = ConfigFile::load_from(path.clone())
                .with_context(|| format!("Invalid configuration in {}", path.display()))?;

            if exists {
                println!("Configuration file: {}\n", path.display());
            } else {
                println!("No configuration file found at: {}", path.display());
                println!("Showing built-in defaults. Create a config file with:");
                println!("  portico config init\n");
            }

            println!("Portal:");
            println!("  Destination:  {}", config.portal.destination);
            println!("  Object path:  {}", config.portal.object_path);
            println!("Requests:");
            match config.requests.timeout() {
                Some(limit) => println!("  Timeout:      {}s", limit.as_secs()),
                None => println!("  Timeout:      none (wait for the user)"),
            }
            println!("  Buffer:       {}", config.requests.notification_buffer);
        }
        ConfigCommand::Init { force } => {
            let written = ConfigFile::write_sample(path.clone(), force)
                .with_context(|| format!("Failed to create {}", path.display()))?;

            if written {
                println!("Wrote sample configuration to {}", path.display());
                println!("Set [requests] timeout_secs to give up on unanswered dialogs.");
            } else {
                println!("{} already exists; pass --force to replace it.", path.display());
            }
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}
