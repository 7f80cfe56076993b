use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod logging;

#[derive(Parser)]
#[command(name = "lever", about = "Multi-armed bandit arm selection service")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = logging::LogFormat::Text)]
    log_format: logging::LogFormat,

    /// Extra config file, applied after user and project config
    #[arg(short = 'c', long = "config", global = true)]
    config_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Run the lever server
    Serve(commands::serve::ServeArgs),
    /// Drive a running server with simulated traffic
    Simulate(commands::simulate::SimulateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.verbose, cli.log_format)?;

    let config_path = cli.config_file.as_deref();
    match cli.command {
        Commands::Config(args) => commands::config::run(args, config_path),
        Commands::Serve(args) => commands::serve::run(args, config_path).await,
        Commands::Simulate(args) => commands::simulate::run(args).await,
    }
}
