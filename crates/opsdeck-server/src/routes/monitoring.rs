//! Alert and monitoring endpoints.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use opsdeck_core::Alert;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::extract::OptionalJson;
use crate::AppState;

/// Alert and monitoring routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/alerts", get(list_alerts))
        .route("/alerts/:id/resolve", post(resolve_alert))
        .route("/monitoring/start", post(start_monitoring))
        .route("/monitoring/stop", post(stop_monitoring))
}

/// Alert list parameters.
#[derive(Debug, Deserialize)]
pub struct AlertParams {
    /// Include resolved alerts.
    #[serde(default)]
    pub all: bool,
}

/// Start monitoring request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMonitoringRequest {
    /// Scan interval in seconds; the configured interval when absent.
    pub interval_secs: Option<u64>,
}

/// Monitoring state response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringResponse {
    /// Whether monitoring is running after the call.
    pub monitoring: bool,
    /// Whether the call changed anything.
    pub changed: bool,
}

async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<AlertParams>,
) -> Json<Vec<Alert>> {
    Json(state.plane.health().alerts().list(params.all))
}

async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Alert>, AppError> {
    Ok(Json(state.plane.health().alerts().resolve(&id)?))
}

async fn start_monitoring(
    State(state): State<AppState>,
    OptionalJson(request): OptionalJson<StartMonitoringRequest>,
) -> Result<Json<MonitoringResponse>, AppError> {
    let changed = state
        .plane
        .start_monitoring(request.interval_secs.map(Duration::from_secs))?;
    Ok(Json(MonitoringResponse {
        monitoring: true,
        changed,
    }))
}

async fn stop_monitoring(State(state): State<AppState>) -> Json<MonitoringResponse> {
    let changed = state.plane.stop_monitoring().await;
    Json(MonitoringResponse {
        monitoring: false,
        changed,
    })
}
