#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the ad listing watcher.

use std::path::PathBuf;

use adwatch_scan::{ScanError, ScanPaths, load_config, run_user};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "adwatch_scan", about = "Classified-ad listing watcher")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a user's topics and export anything new
    Scan {
        /// User whose topics to scrape
        #[arg(long)]
        user: String,
        /// Scrape only this topic (must exist and be enabled)
        #[arg(long)]
        topic: Option<String>,
        /// Path to the TOML configuration file
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
        /// Directory holding per-topic state files
        #[arg(long, default_value = "data")]
        state_dir: PathBuf,
        /// Directory receiving CSV exports
        #[arg(long, default_value = "data")]
        export_dir: PathBuf,
        /// Marker file raised when any topic has new ads
        #[arg(long, default_value = "push_me")]
        signal_file: PathBuf,
    },
    /// List configured topics
    Topics {
        /// Path to the TOML configuration file
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
        /// Only list topics for this user
        #[arg(long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    if let Err(e) = run(Cli::parse()).await {
        log::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), ScanError> {
    match cli.command {
        Commands::Scan {
            user,
            topic,
            config,
            state_dir,
            export_dir,
            signal_file,
        } => {
            let config = load_config(&config)?;
            let paths = ScanPaths {
                state_dir,
                export_dir,
                signal_file,
            };
            run_user(&config, &paths, &user, topic.as_deref()).await
        }
        Commands::Topics { config, user } => {
            let config = load_config(&config)?;

            if let Some(ref user) = user
                && !config.users.contains_key(user)
            {
                return Err(ScanError::Config {
                    message: format!("user {user} not found in configuration"),
                });
            }

            for (id, user_config) in config
                .users
                .iter()
                .filter(|(id, _)| user.as_ref().is_none_or(|u| u == *id))
            {
                println!("{id}");
                for topic in &user_config.topics {
                    let status = if topic.enabled { "" } else { " (disabled)" };
                    println!("  {:<24} {}{status}", topic.name, topic.url);
                }
            }
            Ok(())
        }
    }
}
