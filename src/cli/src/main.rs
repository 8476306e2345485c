//! Conveyor CLI - Command-line interface for managing Conveyor job queues.
//!
//! Provides commands for job management, worker triggering, health checks,
//! and CLI configuration.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config, health, jobs, trigger};
use output::OutputFormat;

/// Conveyor - Background Job Processing CLI
#[derive(Parser)]
#[command(
    name = "conveyor",
    version = "0.1.0",
    about = "Conveyor - Background Job Processing",
    long_about = "CLI tool for managing Conveyor job queues: create and inspect jobs, \
                  trigger workers, and check server health.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "CONVEYOR_API_URL")]
    api_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Job management operations
    #[command(subcommand)]
    Jobs(jobs::JobCommands),

    /// Trigger a worker invocation
    Trigger(trigger::TriggerArgs),

    /// Check server health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api_url = cli
        .api_url
        .clone()
        .or_else(config::load_api_url)
        .unwrap_or_else(|| "http://localhost:8080".to_string());

    let client = client::ApiClient::new(&api_url)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Jobs(cmd) => jobs::execute(cmd, &client, format).await,
        Commands::Trigger(args) => trigger::execute(args, &client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
