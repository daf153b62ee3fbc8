//! HTTP handlers
//!
//! | Route | Result |
//! |---|---|
//! | `GET /poll?channel_name=&amount=` | poll key as text |
//! | `GET /poll/votes?uid=` | tally as a JSON array, `[]` when unknown |
//! | `GET /poll/disconnect?uid=` | `204` |
//! | `GET /health` | liveness JSON |

use crate::polls::{parse_choice_count, PollEngine, PollError, VoteTally};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Application state shared across all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<PollEngine>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: Arc<PollEngine>) -> Self {
        Self {
            engine,
            started_at: Instant::now(),
        }
    }
}

/// Build the application routes
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/poll", get(open_poll))
        .route("/poll/votes", get(read_votes))
        .route("/poll/disconnect", get(close_poll))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct OpenPollParams {
    pub channel_name: Option<String>,
    pub amount: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PollKeyParams {
    pub uid: Option<String>,
}

async fn open_poll(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OpenPollParams>,
) -> Result<String, PollError> {
    let max = state.engine.config().max_choices;
    let choices = parse_choice_count(params.amount.as_deref(), max)?;
    let channel = params.channel_name.unwrap_or_default();
    state.engine.open_poll(&channel, choices).await
}

async fn read_votes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PollKeyParams>,
) -> Json<VoteTally> {
    let tally = match params.uid.as_deref() {
        Some(key) => state.engine.read_tally(key),
        None => VoteTally::empty(),
    };
    Json(tally)
}

async fn close_poll(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PollKeyParams>,
) -> StatusCode {
    if let Some(key) = params.uid.as_deref() {
        let closed = state.engine.close_poll(key);
        debug!(poll = %key, closed, "Disconnect requested");
    }
    StatusCode::NO_CONTENT
}

/// Liveness response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_polls: usize,
    pub uptime_seconds: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_polls: state.engine.stats().stored_polls,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// Error body returned with non-2xx responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        let (status, code) = if self.is_invalid_argument() {
            (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT")
        } else {
            match &self {
                PollError::Adapter(err) => {
                    warn!(error = %err, "Chat source failed while opening a poll");
                    (StatusCode::BAD_GATEWAY, "ADAPTER_FAILURE")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            }
        };

        let body = ErrorResponse {
            error: code.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
