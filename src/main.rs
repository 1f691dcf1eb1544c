//! Storefront CLI entry point.

use anyhow::Result;
use clap::Parser;

use storefront::cli::commands;
use storefront::cli::{handle_error, Cli, Commands};
use storefront::domain::models::Config;
use storefront::infrastructure::{ConfigLoader, LogConfig, LoggerImpl};

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let _logger = LoggerImpl::init(&LogConfig::try_from(&config.logging)?)?;

    tracing::debug!(base_url = %config.api.base_url, "configuration loaded");

    match cli.command {
        Commands::Events(args) => commands::catalog::execute_events(args, &config, cli.json).await,
        Commands::Techniques(args) => commands::catalog::execute_techniques(args, &config, cli.json).await,
        Commands::Config(command) => commands::config::execute(command, &config, cli.json).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.json;

    if let Err(err) = run(cli).await {
        handle_error(err, json_mode);
    }
}
