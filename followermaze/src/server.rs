use anyhow::Context;
use std::future::Future;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use followermaze_core::Config;
use followermaze_hub::{ClientServer, EventSourceServer, MessageHub};

use crate::http;

pub struct FollowerMazeServer {
    config: Config,
    hub: MessageHub,
}

impl FollowerMazeServer {
    pub fn new(config: Config) -> Self {
        let hub = MessageHub::new(config.hub.clone());
        Self { config, hub }
    }

    /// Start all listeners and wait for a shutdown signal
    pub async fn start(self) -> anyhow::Result<()> {
        info!("Starting Follower Maze server...");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let client_listener = bind(&self.config.client_address()).await?;
        let source_listener = bind(&self.config.event_source_address()).await?;

        let client_handle = tokio::spawn(
            ClientServer::new(client_listener, self.hub.clone()).run(shutdown_rx.clone()),
        );
        let source_handle = tokio::spawn(
            EventSourceServer::new(source_listener, self.hub.clone()).run(shutdown_rx.clone()),
        );
        let metrics_handle = if self.config.server.enable_metrics {
            Some(self.start_metrics_server(shutdown_rx).await?)
        } else {
            info!("Metrics endpoint: disabled");
            None
        };

        info!("All servers started successfully");

        let metrics_stopped = async {
            match metrics_handle {
                Some(handle) => {
                    let _ = handle.await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = client_handle => {
                error!("Client listener stopped unexpectedly");
            }
            _ = source_handle => {
                error!("Event source listener stopped unexpectedly");
            }
            () = metrics_stopped => {
                error!("Metrics server stopped unexpectedly");
            }
            () = shutdown_signal() => {
                info!("Starting graceful shutdown");
            }
        }

        // Signal all components to shut down
        let _ = shutdown_tx.send(true);
        self.hub.shutdown();

        info!(
            connected_clients = self.hub.registry().len(),
            "Follower Maze server stopped"
        );
        Ok(())
    }

    async fn start_metrics_server(&self, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<JoinHandle<()>> {
        let listener = bind(&self.config.metrics_address()).await?;
        let router = http::create_router();

        let handle = tokio::spawn(async move {
            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("Metrics server error: {}", e);
            }

            info!("Metrics server shut down gracefully");
        });

        Ok(handle)
    }
}

async fn bind(address: &str) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Resolve on SIGINT or, on unix, SIGTERM. A signal whose handler cannot
/// be installed never fires.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let name = first_signal(interrupt, terminate).await;
    info!(signal = name, "Shutdown signal received");
}

/// Name of whichever signal future completes first
async fn first_signal(
    interrupt: impl Future<Output = ()>,
    terminate: impl Future<Output = ()>,
) -> &'static str {
    tokio::select! {
        () = interrupt => "SIGINT",
        () = terminate => "SIGTERM",
    }
}
