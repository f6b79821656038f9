use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cmd::build_service;
use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("gateway-server starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?;
    tracing::info!(config = %args.config, backend = %config.cluster.backend, "loaded config");

    let service = build_service(&config)?;

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- API server ---
    let api_port = args.port.unwrap_or(config.api_port);
    let api_token = token.clone();
    let mut api_handle =
        tokio::spawn(async move { gateway_api_server::run(api_port, service, api_token).await });

    tracing::info!(port = api_port, "server ready");

    // --- Wait for Ctrl+C, or for the API server to stop on its own ---
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutting down...");
        }
        result = &mut api_handle => {
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ServerError::Api(e)),
                Err(e) => Err(ServerError::Api(format!("api task: {e}"))),
            };
        }
    }

    token.cancel();

    // Drain in-flight requests, then abort.
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut api_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "api server error"),
        Ok(Err(e)) => tracing::error!(error = %e, "api task failed"),
        Err(_) => {
            tracing::warn!(timeout = ?DRAIN_TIMEOUT, "drain timed out, aborting");
            api_handle.abort();
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}
