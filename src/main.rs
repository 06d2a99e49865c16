use anyhow::Result;
use asf_guardian::cli::{Cli, CliHandler};
use asf_guardian::config::GuardianConfig;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --debug
    let default_level = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = GuardianConfig::load(cli.config.as_deref()).await?;
    tracing::debug!("Using database {}", config.database.url);

    let handler = CliHandler::new(config, cli.config);
    handler.handle_command(cli.command).await
}
