use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use treecast::broadcast::{Broadcaster, Propagator};
use treecast::node::{Node, Transport};
use treecast::{cli, settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args and env vars
    let settings = cli::Cli::parse().into_settings()?;

    // stdout carries the protocol, so logs go to stderr
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "treecast=info".into());
    if settings.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    info!(
        "Starting {} v{} with {:?}",
        settings::APP_NAME,
        settings::APP_VERSION,
        settings
    );

    let node = Node::new(settings.rpc_timeout());
    let transport: Arc<dyn Transport> = node.clone();
    let broadcaster = Broadcaster::new(Arc::clone(&transport), settings.broadcaster_settings());
    let propagator = Arc::new(Propagator::new(
        transport,
        broadcaster,
        settings.branching_factor,
    ));
    propagator.register(&node)?;

    Arc::clone(&node)
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    propagator.shutdown().await?;

    let runtime = node.stats();
    let delivery = propagator.broadcaster().stats();
    info!(
        "Shut down cleanly: {} messages in, {} out, {} unparseable, {} rpc timeouts; \
         {} values seen, {} forwards submitted, {} delivered, {} retries, {} dropped, {} cancelled",
        runtime.messages_received.load(Ordering::Relaxed),
        runtime.messages_sent.load(Ordering::Relaxed),
        runtime.parse_errors.load(Ordering::Relaxed),
        runtime.rpc_timeouts.load(Ordering::Relaxed),
        propagator.delivered().len(),
        delivery.submitted.load(Ordering::Relaxed),
        delivery.delivered.load(Ordering::Relaxed),
        delivery.retries.load(Ordering::Relaxed),
        delivery.dropped.load(Ordering::Relaxed),
        delivery.cancelled.load(Ordering::Relaxed),
    );
    Ok(())
}
