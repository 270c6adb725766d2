//! confhub CLI
//!
//! Command-line tools for exercising the writeback engine.
//!
//! # Commands
//!
//! - `replay` - Replay a JSON scenario through a hub and config tree
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// confhub command-line tools.
#[derive(Parser)]
#[command(name = "confhub")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario and print the resulting tree
    Replay {
        /// Path to the scenario file
        scenario: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay { scenario, format } => {
            commands::replay::run(&scenario, &format)?;
        }
        Commands::Version => {
            println!("confhub CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
