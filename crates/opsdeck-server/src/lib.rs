//! Opsdeck HTTP/JSON API.
//!
//! Exposes the control plane's migrations, backups, cache and telemetry,
//! health reports, alerts and monitoring over REST.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

pub use config::{Args, ServerConfig};
pub use error::AppError;

use std::sync::Arc;

use axum::Router;
use opsdeck_core::{CancellationToken, ControlPlane};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// The control plane.
    pub plane: Arc<ControlPlane>,
    /// Cancelled when the server shuts down; passed to long-running
    /// operations.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state.
    pub fn new(plane: ControlPlane) -> Self {
        Self {
            plane: Arc::new(plane),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::routes())
        .merge(routes::monitoring::routes())
        .merge(routes::migrations::routes())
        .merge(routes::backups::routes())
        .merge(routes::performance::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
