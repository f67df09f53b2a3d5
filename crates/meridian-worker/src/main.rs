//! Meridian worker entry point.

use std::error::Error;

use meridian_worker::config::WorkerConfig;
use meridian_worker::routes;
use meridian_worker::state::AppState;
use meridian_worker::telemetry;
use meridian_worker::wiring::Services;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = WorkerConfig::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!(
        namespace = %config.namespace,
        env = %config.env,
        in_memory = config.in_memory,
        "starting Meridian worker"
    );

    let addr = config.bind_addr()?;
    let services = Services::build(config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumers = services.spawn_consumers(&shutdown_rx)?;
    tracing::info!(roles = consumers.len(), "consumer roles started");

    let app = routes::build_router(AppState::from_services(&services));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    services.bus.flush().await;
    tracing::info!("shutting down consumer roles");
    if shutdown_tx.send(true).is_err() {
        tracing::debug!("no consumer role was listening for shutdown");
    }
    for task in consumers {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "consumer task ended abnormally");
        }
    }

    telemetry.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
