//! Control endpoints and the UI page.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ServerState;
use crate::events::LogEntry;
use crate::pipeline::{PipelineError, PipelinePhase, TriggerSource};

const INDEX_HTML: &str = include_str!("index.html");

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

fn rejected(e: PipelineError) -> (StatusCode, Json<Value>) {
    match e {
        PipelineError::Busy => (StatusCode::CONFLICT, Json(json!({ "status": "busy" }))),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "message": other.to_string() })),
        ),
    }
}

/// `POST /api/trigger`: waits for the lock up to its timeout.
pub async fn trigger(State(state): State<ServerState>) -> (StatusCode, Json<Value>) {
    match state.orchestrator.trigger(TriggerSource::Manual).await {
        Ok(run) => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "accepted", "run_id": run.id() })),
        ),
        Err(e) => rejected(e),
    }
}

/// `POST /api/stop`: succeeds whether or not anything was playing.
pub async fn stop(State(state): State<ServerState>) -> Json<Value> {
    let was_playing = state.orchestrator.stop();
    Json(json!({ "status": "stopped", "was_playing": was_playing }))
}

#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    #[serde(default)]
    pub text: String,
}

pub async fn speak(
    State(state): State<ServerState>,
    Json(request): Json<SpeakRequest>,
) -> (StatusCode, Json<Value>) {
    if request.text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "message": "text is required" })),
        );
    }
    match state.orchestrator.speak(&request.text).await {
        Ok(run) => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "accepted", "run_id": run.id() })),
        ),
        Err(e) => rejected(e),
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub phase: PipelinePhase,
    pub running: bool,
    pub playing: bool,
    pub subscribers: usize,
    /// Sequence number of the newest camera frame.
    pub frame: Option<u64>,
}

pub async fn status(State(state): State<ServerState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        phase: state.orchestrator.phase(),
        running: state.orchestrator.is_running(),
        playing: state.orchestrator.is_playing(),
        subscribers: state.hub.subscriber_count(),
        frame: state.frames.read().map(|s| s.seq),
    })
}

pub async fn log_history(State(state): State<ServerState>) -> Json<Vec<LogEntry>> {
    Json(state.hub.recent_logs())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
