use crate::state::AppState;
use crm_core::checkpoint::validate_thread_id;
use crm_core::interaction::{InteractionRecord, LogForm};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, info};
use uuid::Uuid;

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(json!({ "detail": detail.into() })))
}

// ── Root / health ───────────────────────────────────────────────────────

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}

async fn root() -> impl IntoResponse {
    Json(json!({ "message": "AI-First HCP CRM API is running." }))
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ── Agent chat ──────────────────────────────────────────────────────────

pub fn agent_routes() -> Router<AppState> {
    Router::new().route("/agent/chat/stream", post(chat_stream))
}

#[derive(Debug, Deserialize)]
struct ChatInput {
    thread_id: String,
    message: String,
}

/// Run one user turn and stream its events as SSE `data:` lines.
async fn chat_stream(
    State(state): State<AppState>,
    Json(input): Json<ChatInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_thread_id(&input.thread_id)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    if input.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message must not be empty"));
    }

    info!(thread_id = %input.thread_id, "Chat turn started");
    let rx = state.conversations.stream(input.thread_id, input.message);
    let stream = UnboundedReceiverStream::new(rx)
        .map(|event| Ok::<Event, Infallible>(Event::default().data(event.to_sse_data())));

    Ok(Sse::new(stream))
}

// ── Interactions ────────────────────────────────────────────────────────

pub fn interaction_routes() -> Router<AppState> {
    Router::new()
        .route("/interactions", get(list_interactions))
        .route("/interactions/log_form", post(log_form))
        .route("/interactions/{id}", get(get_interaction))
}

async fn log_form(
    State(state): State<AppState>,
    Json(form): Json<LogForm>,
) -> Result<(StatusCode, Json<InteractionRecord>), ApiError> {
    form.draft
        .validate()
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e))?;

    let record = form.into_record();
    state.interactions.insert(record.clone()).await.map_err(|e| {
        error!("Failed to store interaction: {}", e);
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database error during form log: {}", e),
        )
    })?;

    info!(id = %record.interaction_id, hcp = %record.draft.hcp_name, "Interaction stored");
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_interactions(State(state): State<AppState>) -> Json<Vec<InteractionRecord>> {
    Json(state.interactions.list().await)
}

async fn get_interaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InteractionRecord>, ApiError> {
    state
        .interactions
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Interaction not found"))
}
