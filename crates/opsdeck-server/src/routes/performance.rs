//! Cache, query telemetry and optimization endpoints.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use opsdeck_core::{CacheStats, ExplainInfo, QueryMetric, Suggestion};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::AppState;

/// Default number of queries returned by `/queries/top`.
const DEFAULT_TOP_LIMIT: usize = 10;

/// Performance routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cache/stats", get(cache_stats))
        .route("/cache", delete(clear_cache))
        .route("/queries/slow", get(slow_queries))
        .route("/queries/top", get(top_queries))
        .route("/queries/record", post(record_query))
        .route("/queries/analyze", post(analyze_query))
}

/// Slow query parameters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowParams {
    /// Average time above which a query is slow; the configured
    /// threshold when absent.
    pub threshold_ms: Option<f64>,
}

/// Top query parameters.
#[derive(Debug, Deserialize)]
pub struct TopParams {
    /// Number of queries to return.
    pub limit: Option<usize>,
}

/// One observed query execution.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRequest {
    /// Query text.
    pub query: String,
    /// Execution time in milliseconds.
    pub duration_ms: f64,
}

/// Optimization request.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Query text.
    pub query: String,
    /// Explain output for the query, if available.
    #[serde(default)]
    pub explain: ExplainInfo,
}

/// Optimization response.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    /// The query as submitted.
    pub query: String,
    /// Findings, one per matching rule.
    pub suggestions: Vec<Suggestion>,
}

async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.plane.cache().stats())
}

async fn clear_cache(State(state): State<AppState>) -> StatusCode {
    state.plane.cache().clear();
    StatusCode::NO_CONTENT
}

async fn slow_queries(
    State(state): State<AppState>,
    Query(params): Query<SlowParams>,
) -> Result<Json<Vec<QueryMetric>>, AppError> {
    let threshold = params
        .threshold_ms
        .unwrap_or(state.plane.config().health.slow_query_ms);
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(AppError::Unprocessable(
            "thresholdMs must be a non-negative number".to_string(),
        ));
    }
    Ok(Json(state.plane.telemetry().slow_queries(threshold)))
}

async fn top_queries(
    State(state): State<AppState>,
    Query(params): Query<TopParams>,
) -> Json<Vec<QueryMetric>> {
    let limit = params.limit.unwrap_or(DEFAULT_TOP_LIMIT);
    Json(state.plane.telemetry().top(limit))
}

async fn record_query(
    State(state): State<AppState>,
    Json(request): Json<RecordRequest>,
) -> Result<StatusCode, AppError> {
    if request.query.trim().is_empty() {
        return Err(AppError::Unprocessable("query is empty".to_string()));
    }
    if !request.duration_ms.is_finite() || request.duration_ms < 0.0 {
        return Err(AppError::Unprocessable(
            "durationMs must be a non-negative number".to_string(),
        ));
    }

    state
        .plane
        .telemetry()
        .record(&request.query, request.duration_ms);
    Ok(StatusCode::ACCEPTED)
}

async fn analyze_query(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Json<AnalyzeResponse> {
    let suggestions = state
        .plane
        .advisor()
        .suggest_optimizations(&request.query, &request.explain);
    Json(AnalyzeResponse {
        query: request.query,
        suggestions,
    })
}
