use std::sync::Arc;

use anyhow::Context;
use pokemon_tracker_api::agents::ThreadChance;
use pokemon_tracker_api::app::App;
use pokemon_tracker_api::config::AppConfig;
use pokemon_tracker_api::infrastructure::broker::connect_broker;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    // Connect to the message broker
    tracing::info!(url = %config.broker_url, "Connecting to message broker...");
    let broker = connect_broker(&config.broker_url, config.retry)
        .await
        .context("failed to connect to message broker")?;
    tracing::info!("Message broker connected successfully");

    let app = App::bootstrap(&config, broker, Arc::new(ThreadChance)).await?;

    // Start server
    let addr = config.addr();
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind address")?;

    axum::serve(listener, app.router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    tracing::info!("Shutting down, draining agents");
    app.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
