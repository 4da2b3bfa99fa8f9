//! Process lifecycle: build everything, connect, serve, shut down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use broadcast_server::{BroadcastServer, SessionEvent};
use data_source::{DataSource, SourceRegistry};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use var_manager::SubscriptionManager;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::orchestrator::Orchestrator;

/// A fully wired server, bound but not yet serving
///
/// # Example
///
/// ```rust,ignore
/// let config = ServerConfig::load(None)?;
/// let server = GaugeServer::build(config, &SourceRegistry::with_builtin()).await?;
///
/// let shutdown = CancellationToken::new();
/// server.run(shutdown).await?;
/// ```
pub struct GaugeServer {
    config: ServerConfig,
    source: Arc<dyn DataSource>,
    manager: SubscriptionManager,
    orchestrator: Arc<Orchestrator>,
    server: BroadcastServer,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl GaugeServer {
    /// Create the configured data source from `registry` and wire it up
    pub async fn build(config: ServerConfig, registry: &SourceRegistry) -> Result<Self> {
        let source = registry.create(&config.source, config.source_options.as_ref())?;
        Self::with_source(config, source).await
    }

    /// Wire up an already constructed data source
    ///
    /// Binds the listening socket; a bind failure is returned here.
    pub async fn with_source(config: ServerConfig, source: Arc<dyn DataSource>) -> Result<Self> {
        let (events_tx, events) = mpsc::unbounded_channel();
        let server = BroadcastServer::bind(config.bind_addr()?, events_tx).await?;

        let manager = SubscriptionManager::new(Arc::clone(&source));
        let orchestrator = Orchestrator::new(manager.clone(), server.sessions());

        Ok(Self {
            config,
            source,
            manager,
            orchestrator,
            server,
            events,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Handle for forcing values and vehicles (the console uses this)
    pub fn manager(&self) -> SubscriptionManager {
        self.manager.clone()
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Connect to the data source, then serve clients until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let Self {
            config,
            source,
            manager: _,
            orchestrator,
            server,
            events,
        } = self;

        if !connect_with_retry(source.as_ref(), config.reconnect_delay(), &shutdown).await {
            tracing::info!("Shut down before the data source connected");
            return Ok(());
        }

        let accept = tokio::spawn(server.run(shutdown.clone()));
        let protocol = tokio::spawn(orchestrator.run(events, shutdown.clone()));
        let listen = {
            let source = Arc::clone(&source);
            let shutdown = shutdown.clone();
            let poll_rate = config.poll_rate();
            tokio::spawn(async move {
                if let Err(e) = source.listen(poll_rate, shutdown).await {
                    tracing::error!("Data source stopped listening: {}", e);
                }
            })
        };

        tracing::info!("Server running; type 'exit' or press Ctrl+C to quit");
        shutdown.cancelled().await;
        tracing::info!("Shutting down...");

        if let Err(e) = source.disconnect().await {
            tracing::warn!("Failed to disconnect data source: {}", e);
        }

        match accept.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Accept loop failed: {}", e),
            Err(e) => tracing::warn!("Accept loop panicked: {}", e),
        }
        for (name, task) in [("Session protocol", protocol), ("Data source", listen)] {
            if let Err(e) = task.await {
                tracing::warn!("{} task panicked: {}", name, e);
            }
        }

        Ok(())
    }
}

/// Try to connect until it works, waiting `delay` between attempts
///
/// Returns `false` if `shutdown` fired first.
pub async fn connect_with_retry(
    source: &dyn DataSource,
    delay: Duration,
    shutdown: &CancellationToken,
) -> bool {
    while !source.is_connected() {
        tracing::info!("Connecting to data source '{}'...", source.name());

        if let Err(e) = source.connect().await {
            tracing::warn!("Failed to connect to data source '{}': {}", source.name(), e);
        }

        if source.is_connected() {
            break;
        }

        tracing::info!("Retrying in {:?}", delay);
        tokio::select! {
            _ = shutdown.cancelled() => return false,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::info!("Connected to data source '{}'", source.name());
    true
}
