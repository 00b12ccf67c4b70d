#![allow(clippy::result_large_err)]

mod cli;

use clap::Parser;
use cli::Cli;
use dotenvy::dotenv;
use iqcoin::{config::settings, errors::Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Tracing first so configuration problems are logged
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. .env is optional, variables may come from the environment
    dotenv().ok();

    // 3. Arguments before config so `--help` works without a config file
    let cli = Cli::parse();

    // 4. Application configuration
    let app_config = settings::load_app_configuration()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;
    info!("Configuration loaded");

    // 5. Run the command; every command opens (and if needed creates) the database
    cli.run(app_config)
        .await
        .inspect_err(|e| error!("Command failed: {}", e))
}
