//! Backup and recovery endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use opsdeck_core::{Backup, BackupHealth, RecoveryPlan, RecoveryResult};
use serde::Deserialize;

use crate::error::AppError;
use crate::extract::OptionalJson;
use crate::AppState;

/// Backup routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/backups", get(list_backups).post(create_backup))
        .route("/backups/health", get(backup_health))
        .route("/backups/:id", get(get_backup).delete(delete_backup))
        .route("/backups/:id/recovery-plan", get(recovery_plan))
        .route("/backups/:id/recover", post(recover))
}

/// Create backup request.
#[derive(Debug, Default, Deserialize)]
pub struct CreateBackupRequest {
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

async fn list_backups(State(state): State<AppState>) -> Json<Vec<Backup>> {
    Json(state.plane.backups().list_backups())
}

async fn create_backup(
    State(state): State<AppState>,
    OptionalJson(request): OptionalJson<CreateBackupRequest>,
) -> Result<(StatusCode, Json<Backup>), AppError> {
    let plane = state.plane.clone();
    let cancel = state.shutdown.clone();
    let backup = tokio::spawn(async move {
        plane
            .backups()
            .create_backup(&request.description, &cancel)
            .await
    })
    .await??;
    Ok((StatusCode::CREATED, Json(backup)))
}

async fn backup_health(State(state): State<AppState>) -> Json<BackupHealth> {
    Json(state.plane.backups().check_backup_health())
}

async fn get_backup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Backup>, AppError> {
    state
        .plane
        .backups()
        .get_backup(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("backup not found: {}", id)))
}

async fn delete_backup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.plane.backups().delete_backup(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("backup not found: {}", id)))
    }
}

async fn recovery_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RecoveryPlan>, AppError> {
    Ok(Json(state.plane.backups().build_recovery_plan(&id)?))
}

async fn recover(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RecoveryResult>, AppError> {
    let plan = state.plane.backups().build_recovery_plan(&id)?;
    let plane = state.plane.clone();
    let cancel = state.shutdown.clone();
    let result = tokio::spawn(async move {
        plane.backups().execute_recovery_plan(&plan, &cancel).await
    })
    .await?;
    Ok(Json(result))
}
