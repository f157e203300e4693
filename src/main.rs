mod api;
mod bootstrap;
mod config;
mod error;
mod execution;
mod ledger;
mod server;
mod settlement;

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,subscription_reconciler=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting subscription payment reconciler");

    let config = crate::config::Config::from_env()?;
    let bind_address = config.bind_address();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let components = bootstrap::initialize_components(&config, shutdown_rx.clone())?;

    let reconciler = components.reconciler.start(shutdown_rx.clone());

    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            shutdown_signal().await;
            info!("🛑 Shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    let app = server::create_app(components.state);
    let served = server::run_server(app, &bind_address, shutdown_rx).await;

    // Listener is down either way; stop the loop too
    let _ = shutdown_tx.send(true);
    if let Err(e) = reconciler.await {
        error!("Reconciliation loop panicked: {}", e);
    }
    served?;

    info!("👋 Reconciler stopped");
    Ok(())
}
