//! Migration endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use opsdeck_core::{
    ExecutionReport, Migration, MigrationEvent, MigrationPlan, MigrationStatus, MigrationSummary,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::AppState;

/// Migration routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/migrations", get(list_migrations).post(define_migration))
        .route("/migrations/status", get(migration_status))
        .route("/migrations/history", get(migration_history))
        .route("/migrations/plan", post(plan_migrations))
        .route("/migrations/:id", get(get_migration))
        .route("/migrations/:id/execute", post(execute_migration))
        .route("/migrations/:id/rollback", post(rollback_migration))
        .route("/migrations/:id/reset", post(reset_migration))
}

/// Define migration request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefineMigrationRequest {
    /// Migration name.
    pub name: String,
    /// What it changes.
    #[serde(default)]
    pub description: String,
    /// Script applying the change.
    pub up_script: String,
    /// Script reverting the change.
    #[serde(default)]
    pub down_script: String,
    /// Ids of migrations that must complete first.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Plan request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    /// Deployment name.
    pub name: String,
    /// What the deployment does.
    #[serde(default)]
    pub description: String,
    /// Migrations in execution order.
    pub migration_ids: Vec<String>,
}

/// Result of an execute or rollback call.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    /// The migration acted on.
    pub migration_id: String,
    /// Status after the call.
    pub status: MigrationStatus,
    /// Gateway round trip in milliseconds.
    pub elapsed_ms: u64,
    /// Failure message, if the script did not apply.
    pub error: Option<String>,
}

impl From<ExecutionReport> for ExecutionResponse {
    fn from(report: ExecutionReport) -> Self {
        Self {
            migration_id: report.migration_id,
            status: report.status,
            elapsed_ms: report.elapsed.as_millis() as u64,
            error: report.error.map(|e| e.to_string()),
        }
    }
}

async fn list_migrations(State(state): State<AppState>) -> Json<Vec<Migration>> {
    Json(state.plane.migrations().list())
}

async fn define_migration(
    State(state): State<AppState>,
    Json(request): Json<DefineMigrationRequest>,
) -> Result<(StatusCode, Json<Migration>), AppError> {
    let migration = state.plane.migrations().define(
        &request.name,
        &request.description,
        &request.up_script,
        &request.down_script,
        request.dependencies,
    )?;
    Ok((StatusCode::CREATED, Json(migration)))
}

async fn migration_status(State(state): State<AppState>) -> Json<MigrationSummary> {
    Json(state.plane.migrations().status())
}

async fn migration_history(
    State(state): State<AppState>,
) -> Result<Json<Vec<MigrationEvent>>, AppError> {
    Ok(Json(state.plane.migrations().history()?))
}

async fn get_migration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Migration>, AppError> {
    state
        .plane
        .migrations()
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("migration not found: {}", id)))
}

async fn plan_migrations(
    State(state): State<AppState>,
    Json(request): Json<PlanRequest>,
) -> Result<Json<MigrationPlan>, AppError> {
    let plan = state.plane.migrations().plan(
        &request.name,
        &request.description,
        &request.migration_ids,
    )?;
    Ok(Json(plan))
}

// Execute and rollback run on their own task so a dropped client
// connection cannot abandon a migration in `running`.
async fn execute_migration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionResponse>, AppError> {
    let plane = state.plane.clone();
    let cancel = state.shutdown.clone();
    let report =
        tokio::spawn(async move { plane.migrations().execute(&id, &cancel).await }).await??;
    Ok(Json(report.into()))
}

async fn rollback_migration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionResponse>, AppError> {
    let plane = state.plane.clone();
    let cancel = state.shutdown.clone();
    let report =
        tokio::spawn(async move { plane.migrations().rollback(&id, &cancel).await }).await??;
    Ok(Json(report.into()))
}

async fn reset_migration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Migration>, AppError> {
    Ok(Json(state.plane.migrations().reset(&id)?))
}
