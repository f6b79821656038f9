mod http;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;

use browse_engine::BrowsingService;

#[derive(Clone)]
pub(crate) struct AppState {
    service: Arc<BrowsingService>,
}

/// Routes of the gateway, without a listener. Split out so the router can
/// be mounted elsewhere.
pub fn router(service: Arc<BrowsingService>) -> Router {
    let state = AppState { service };

    Router::new()
        .route(
            "/api/topics",
            get(http::handle_list_topics).post(http::handle_create_topic),
        )
        .route("/api/topics/{name}", axum::routing::delete(http::handle_delete_topic))
        .route("/api/topics/{name}/partitions", get(http::handle_partitions))
        .route(
            "/api/topics/{name}/messages",
            get(http::handle_topic_messages).post(http::handle_publish),
        )
        .route("/api/topics/{name}/pages", post(http::handle_page))
        .route("/api/topics/{name}/offsets", post(http::handle_offsets))
        .route("/api/info", get(http::handle_info))
        .route("/api/acl", get(http::handle_acl))
        .with_state(state)
}

/// Broker gateway HTTP API server.
pub async fn run(
    port: u16,
    service: Arc<BrowsingService>,
    shutdown: CancellationToken,
) -> Result<(), String> {
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|e| format!("bind api :{port}: {e}"))?;
    tracing::info!(port, "gateway API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| format!("axum serve: {e}"))?;

    Ok(())
}
