use std::collections::{BTreeMap, HashMap};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use broker_api::{GatewayError, OrderingPolicy, Payload};

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  Responses
// ═══════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct ErrorBody {
    error: broker_api::ErrorKind,
    message: String,
}

fn status_of(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::TopicNotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::TopicAlreadyExists(_) => StatusCode::CONFLICT,
        GatewayError::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
        GatewayError::BrokerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::InsufficientBrokers { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        GatewayError::CreationNotConfirmed(_)
        | GatewayError::DeletionNotConfirmed(_)
        | GatewayError::Broker(_) => StatusCode::BAD_GATEWAY,
        GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        GatewayError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
    }
}

fn error_response(err: &GatewayError) -> Response {
    let status = status_of(err);
    if status.is_server_error() {
        tracing::warn!(error = %err, status = status.as_u16(), "request failed");
    } else {
        tracing::debug!(error = %err, status = status.as_u16(), "request rejected");
    }
    let body = ErrorBody {
        error: err.kind(),
        message: err.to_string(),
    };
    (status, Json(body)).into_response()
}

fn respond<T: Serialize>(result: Result<T, GatewayError>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => error_response(&e),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Topics: GET / POST /api/topics, DELETE /api/topics/{name}
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_list_topics(State(state): State<AppState>) -> impl IntoResponse {
    respond(state.service.get_topics().await)
}

fn default_one() -> i32 {
    1
}

fn default_replication() -> i16 {
    1
}

#[derive(Deserialize)]
pub(crate) struct CreateTopicBody {
    name: String,
    #[serde(default = "default_one")]
    partitions: i32,
    #[serde(default = "default_replication", alias = "replications")]
    replication_factor: i16,
    #[serde(default)]
    config: HashMap<String, String>,
}

pub(crate) async fn handle_create_topic(
    State(state): State<AppState>,
    Json(body): Json<CreateTopicBody>,
) -> impl IntoResponse {
    let result = state
        .service
        .create_topic(&body.name, body.partitions, body.replication_factor, body.config)
        .await;
    match result {
        Ok(topics) => (StatusCode::CREATED, Json(topics)).into_response(),
        Err(e) => error_response(&e),
    }
}

pub(crate) async fn handle_delete_topic(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    respond(state.service.delete_topic(&name).await)
}

pub(crate) async fn handle_partitions(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    respond(state.service.get_partitions(&name).await)
}

// ═══════════════════════════════════════════════════════════════
//  Messages
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_topic_messages(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    respond(state.service.get_topic_messages(&name).await)
}

fn default_partition() -> i32 {
    -1
}

#[derive(Deserialize)]
pub(crate) struct PublishBody {
    /// Negative: the broker picks the partition.
    #[serde(default = "default_partition")]
    partition: i32,
    #[serde(default)]
    key: Option<Payload>,
    value: Payload,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

pub(crate) async fn handle_publish(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<PublishBody>,
) -> impl IntoResponse {
    respond(
        state
            .service
            .publish_and_refresh(&name, body.partition, body.key, body.value, body.headers)
            .await,
    )
}

#[derive(Deserialize)]
pub(crate) struct PageBody {
    #[serde(default)]
    order: OrderingPolicy,
    page_size: Option<usize>,
    /// Resume offsets of the previous page; absent for the first page.
    #[serde(default)]
    positions: Option<BTreeMap<i32, i64>>,
}

pub(crate) async fn handle_page(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<PageBody>,
) -> impl IntoResponse {
    let page_size = body.page_size.unwrap_or(state.service.settings().page_size);
    respond(
        state
            .service
            .get_messages(&name, body.order, page_size, body.positions)
            .await,
    )
}

#[derive(Deserialize)]
pub(crate) struct OffsetsBody {
    /// Empty: every partition of the topic.
    #[serde(default)]
    partitions: Vec<i32>,
    #[serde(default)]
    order: OrderingPolicy,
    page_size_hint: Option<usize>,
}

pub(crate) async fn handle_offsets(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<OffsetsBody>,
) -> impl IntoResponse {
    respond(
        state
            .service
            .get_offsets(&name, &body.partitions, body.order, body.page_size_hint)
            .await,
    )
}

// ═══════════════════════════════════════════════════════════════
//  Cluster
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    respond(state.service.get_info().await)
}

pub(crate) async fn handle_acl(State(state): State<AppState>) -> impl IntoResponse {
    respond(state.service.get_acl_info().await)
}
