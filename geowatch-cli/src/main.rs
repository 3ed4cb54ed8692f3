//! geowatch CLI - Command-line interface
//!
//! Drives the geowatch engine from the terminal: a synthetic-track
//! simulator, a one-off IP location lookup and a configuration viewer.
//! Reports are printed as JSON on stdout; logs go to stderr and the log file.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use geowatch::config::{config_file_path, GeowatchConfig};
use geowatch::logging::{init_logging, LoggingGuard};

use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "geowatch")]
#[command(version, about = "Location provider arbitration engine", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.geowatch/config.ini)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a watch and a one-shot request against a synthetic track
    Simulate(SimulateArgs),

    /// Locate this machine through the IP fallback endpoints
    Ip,

    /// Show the effective configuration
    Config {
        /// Only print the configuration file location
        #[arg(long)]
        path: bool,
    },
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.unwrap_or_else(config_file_path);
    let config = GeowatchConfig::load_from(&config_path)?;

    match cli.command {
        Commands::Simulate(args) => {
            let _guard = start_logging(&config)?;
            commands::simulate::run(&config, args)
        }
        Commands::Ip => {
            let _guard = start_logging(&config)?;
            commands::ip::run(&config)
        }
        Commands::Config { path } => commands::config::run(&config, &config_path, path),
    }
}

fn start_logging(config: &GeowatchConfig) -> Result<LoggingGuard, CliError> {
    init_logging(
        &config.logging.directory,
        &config.logging.file,
        &config.logging.level,
    )
    .map_err(|e| CliError::LoggingInit(e.to_string()))
}
