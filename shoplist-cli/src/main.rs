use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod remote;

use commands::{ConfigCommand, HistoryCommand, ShoppingCommand};
use config::Config;
use remote::Session;

#[derive(Parser)]
#[command(name = "shop")]
#[command(version)]
#[command(about = "A shared shopping list CLI", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Shopping(ShoppingCommand),

    /// Browse and reuse past trips
    History(HistoryCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Shopping(cmd)) => {
            let session = Session::connect(&config)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cmd.run(&session))?;
        }
        Some(Commands::History(cmd)) => {
            let session = Session::connect(&config)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cmd.run(&session))?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
