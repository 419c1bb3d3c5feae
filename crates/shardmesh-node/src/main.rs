mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use shardmesh_mode::observability::{self, LogLevelListener};
use shardmesh_mode::{ContextManager, ModeConfig, load_config};
use tracing::info;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("Configuration error")?;

    match cli.command.unwrap_or_default() {
        Commands::Run => run(config, cli.log_level).await,
        Commands::Check => {
            println!("Configuration is valid");
            Ok(())
        }
        Commands::PrintConfig => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            print!("{rendered}");
            Ok(())
        }
    }
}

async fn run(config: ModeConfig, log_level: Option<String>) -> anyhow::Result<()> {
    observability::init_tracing_with_level(log_level.as_deref().unwrap_or(&config.logging.level));

    let manager = shardmesh_sharding::install(ContextManager::builder(config))
        .listener(Arc::new(LogLevelListener))
        .build()
        .await
        .context("Context initialization failed")?;
    // the command line keeps precedence over the cluster property
    if log_level.is_none() {
        LogLevelListener.apply_current(&manager.snapshot().props);
    }
    manager.start().await.context("Failed to start watching")?;

    let instance = manager.instance().instance();
    info!(
        instance_id = %instance.id,
        worker_id = ?instance.worker_id,
        databases = manager.snapshot().databases.len(),
        "Compute node online"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    manager.stop().await.context("Failed to stop cleanly")?;
    Ok(())
}
