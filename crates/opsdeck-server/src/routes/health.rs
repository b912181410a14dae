//! Health, report and trend endpoints.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use opsdeck_core::{HealthReport, TrendPoint};
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/report", get(report))
        .route("/scan", post(scan))
        .route("/trends", get(trends))
}

/// Liveness response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `healthy` or `degraded`.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Whether the backing store answered a ping.
    pub store_connected: bool,
    /// Whether periodic monitoring is running.
    pub monitoring: bool,
}

/// Trend query parameters.
#[derive(Debug, Deserialize)]
pub struct TrendsParams {
    /// Return only the most recent points.
    pub limit: Option<usize>,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_connected = state.plane.gateway().ping().await.is_ok();

    Json(HealthResponse {
        status: if store_connected { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_connected,
        monitoring: state.plane.is_monitoring(),
    })
}

async fn report(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.plane.health().report().await)
}

async fn scan(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.plane.health().scan().await)
}

async fn trends(
    State(state): State<AppState>,
    Query(params): Query<TrendsParams>,
) -> Json<Vec<TrendPoint>> {
    Json(state.plane.health().trends().list(params.limit))
}
