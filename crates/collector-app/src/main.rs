//! Binary entry point: parses CLI flags, loads configuration, initializes
//! structured logging, wires up the collector server, and runs until
//! `ctrl_c` or `SIGTERM` asks it to shut down gracefully.

mod config;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use collector_transport::CollectorServer;

use crate::config::Cli;

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = Cli::parse().into_config()?;
    tracing::info!(host = %config.host, port = config.port, "starting observability collector");

    let server = CollectorServer::new(config);
    let handle = server.start().await?;
    tracing::info!(local_addr = %handle.local_addr(), "collector listening");

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining connections");
    server.shutdown(handle).await;
    tracing::info!("collector stopped");

    Ok(())
}

/// Waits for `ctrl_c`, or `SIGTERM` on unix, whichever arrives first.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
