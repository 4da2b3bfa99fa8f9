use anyhow::{Context, Result};
use clap::Parser;
use data_source::SourceRegistry;
use tokio_util::sync::CancellationToken;

use gauge_server::console::{run_console, spawn_stdin_reader};
use gauge_server::{init_logging, Cli, GaugeServer, LoggingMode, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        ServerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;

    init_logging(LoggingMode::from_debug_flag(config.debug))
        .context("Failed to initialize logging")?;

    tracing::info!(
        "Starting up with data source '{}' on {}:{}",
        config.source,
        config.server.ip_address,
        config.server.port
    );

    let registry = SourceRegistry::with_builtin();
    let server = GaugeServer::build(config, &registry)
        .await
        .context("Failed to start server")?;

    let shutdown = CancellationToken::new();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received Ctrl+C");
                    shutdown.cancel();
                }
                Err(e) => tracing::warn!("Failed to listen for Ctrl+C: {}", e),
            }
        });
    }

    tokio::spawn(run_console(
        spawn_stdin_reader(),
        server.manager(),
        shutdown.clone(),
    ));

    server.run(shutdown).await.context("Server failed")?;
    Ok(())
}
