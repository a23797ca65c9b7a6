//! REST API handlers.
//!
//! Each handler goes through the shared `ShutoffEngine` and returns JSON in
//! the `{success, data, error}` envelope.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Cycles ─────────────────────────────────────────────────────

/// Optional body of a cycle trigger. Without `now` the cycle runs at the
/// current wall-clock time.
#[derive(Debug, Default, serde::Deserialize)]
pub struct CycleRequest {
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

impl CycleRequest {
    fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
    }
}

/// POST /api/v1/cycles
pub async fn run_cycle(State(state): State<ApiState>, body: Bytes) -> impl IntoResponse {
    let req = match CycleRequest::parse(&body) {
        Ok(req) => req,
        Err(e) => {
            return error_response(&format!("invalid cycle request: {e}"), StatusCode::BAD_REQUEST)
                .into_response();
        }
    };
    let now = req.now.unwrap_or_else(Utc::now);

    match state.engine.run_cycle(now).await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => {
            warn!(error = %e, "triggered cycle failed");
            error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response()
        }
    }
}

/// GET /api/v1/cycles/last
pub async fn last_cycle(State(state): State<ApiState>) -> impl IntoResponse {
    match state.engine.last_report().await {
        Some(report) => ApiResponse::ok(report).into_response(),
        None => error_response("no cycle has run yet", StatusCode::NOT_FOUND).into_response(),
    }
}

// ── Appliances ─────────────────────────────────────────────────

/// GET /api/v1/appliances
pub async fn list_appliances(State(state): State<ApiState>) -> impl IntoResponse {
    match state.engine.inspect_all(Utc::now()).await {
        Ok(views) => ApiResponse::ok(views).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response(),
    }
}

/// GET /api/v1/appliances/{id}
pub async fn get_appliance(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.inspect(&id, Utc::now()).await {
        Ok(Some(view)) => ApiResponse::ok(view).into_response(),
        Ok(None) => error_response("appliance not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response(),
    }
}

// ── Prometheus / health ────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let stats = state.engine.stats().await;
    let last = state.engine.last_report().await;

    let body = crate::render_prometheus(&stats, last.as_ref());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}
