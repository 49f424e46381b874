//! XHDR extension server
//!
//! Connects to the X server as a regular client, serves XHDR requests on a
//! Unix socket, and keeps HDR state in step with display changes.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xhdr::config::Config;
use xhdr::server::XhdrServer;
use xhdr::x11::{LifecycleWatcher, X11Backend, X11Resolver};
use xhdr::{CapabilityBridge, Dispatcher, MetadataStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "xhdr=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting {} extension server {}.{}",
        xhdr_proto::EXTENSION_NAME,
        xhdr_proto::MAJOR_VERSION,
        xhdr_proto::MINOR_VERSION
    );

    let config = Config::load().context("Failed to load configuration")?;

    // Connect to X11
    let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
    let conn = Arc::new(conn);
    info!("Connected to X server, default screen {}", screen_num);

    let backend = Arc::new(X11Backend::new(conn.clone()).context("Failed to initialize HDR backend")?);
    let resolver = Arc::new(X11Resolver::new(
        conn.clone(),
        config.server.trusted_uids.clone(),
    ));
    let bridge = Arc::new(CapabilityBridge::new(backend.clone(), config.hdr.settings()));
    let store = Arc::new(MetadataStore::new());

    let dispatcher = Arc::new(Dispatcher::new(
        resolver,
        backend,
        bridge.clone(),
        store.clone(),
        config.dispatch_timeouts(),
    ));

    let watcher = LifecycleWatcher::new(conn.clone()).context("Failed to watch X11 events")?;
    let server = XhdrServer::new(dispatcher, config.server.socket_path())
        .start()
        .await
        .context("Failed to start XHDR server")?;

    // Setup signal handlers for graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                }
            }
            let _ = shutdown_tx.send(()).await;
        });
    }

    let result = tokio::select! {
        result = watcher.run(bridge, store) => {
            if let Err(e) = &result {
                error!("X11 event loop failed: {:#}", e);
            }
            result
        }
        _ = shutdown_rx.recv() => Ok(()),
    };

    server.shutdown();
    result
}
