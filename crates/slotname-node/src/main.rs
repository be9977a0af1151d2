//! Slot node binary
//!
//! Claims a slot from the configured pool and answers resolution queries on
//! the resolve socket until interrupted.

use slotname_node::{connect_store, NodeConfig, NodeIdentity, ResolveSocket, SlotNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slotname_node=info,slotname_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting slotname node");

    // Config and identity problems must surface before any store traffic
    let config = NodeConfig::from_env()?;
    let identity = NodeIdentity::discover(config.port, config.ipv4, config.ipv6).await?;
    tracing::info!("  Identity: {}", identity);
    tracing::info!("  Store: {:?} {}", config.backend, config.cluster.endpoints.join(","));
    tracing::info!("  Socket: {}", config.socket_path.display());

    let store = connect_store(&config).await?;
    let node = SlotNode::start(&config.cluster, identity, store).await?;
    tracing::info!("Serving as {} (slot {})", node.name(), node.ordinal());

    let socket = ResolveSocket::new(node.responder(), &config.socket_path).with_status(node.status());
    let socket_cancel = node.cancellation();
    let socket_task = tokio::spawn(async move {
        if let Err(e) = socket.run(socket_cancel).await {
            tracing::error!("Resolve socket error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    node.shutdown().await?;
    if let Err(e) = socket_task.await {
        tracing::error!("Resolve socket task failed: {}", e);
    }

    Ok(())
}
