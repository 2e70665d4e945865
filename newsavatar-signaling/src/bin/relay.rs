//! Provider relay binary
//!
//! Reads configuration from `RELAY_CONFIG` (TOML, optional) and the
//! environment, then forwards player requests to the provider.

use anyhow::Result;
use newsavatar_signaling::{RelayConfig, RelayServer};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("RELAY_CONFIG").ok();
    let config = RelayConfig::load(config_path.as_deref())?;

    tracing::info!(
        "Configuration: host={}, port={}, provider={}",
        config.host,
        config.port,
        config.provider_url
    );

    let server = RelayServer::new(&config)?;
    server
        .start_with_shutdown(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, stopping relay");
        })
        .await?;

    tracing::info!("Relay shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
