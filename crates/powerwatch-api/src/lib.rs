//! powerwatch-api — REST API for powerwatch.
//!
//! Axum route handlers for triggering decision cycles, reading the last
//! cycle report, and inspecting appliance power and dwell state.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/cycles` | Run one cycle now (optional `{"now": "<rfc3339>"}`) |
//! | GET | `/api/v1/cycles/last` | Most recent cycle report |
//! | GET | `/api/v1/appliances` | Every appliance with power and dwell state |
//! | GET | `/api/v1/appliances/{id}` | One appliance |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/healthz` | Liveness probe |

pub mod handlers;
pub mod prometheus;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use powerwatch_engine::ShutoffEngine;

pub use prometheus::render_prometheus;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<ShutoffEngine>,
}

/// Build the complete API router (REST + metrics + health).
pub fn build_router(engine: Arc<ShutoffEngine>) -> Router {
    let api_state = ApiState { engine };

    let api_routes = Router::new()
        .route("/cycles", post(handlers::run_cycle))
        .route("/cycles/last", get(handlers::last_cycle))
        .route("/appliances", get(handlers::list_appliances))
        .route("/appliances/{id}", get(handlers::get_appliance))
        .with_state(api_state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(api_state))
        .route("/healthz", get(handlers::healthz))
}
