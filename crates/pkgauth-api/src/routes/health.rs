//! Health check endpoints

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::state::AppState;

/// Health status response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Users currently held in the credential cache
    pub cached_credentials: usize,
    pub registration_enabled: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    metrics::counter!("pkgauth_health_checks_total").increment(1);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        cached_credentials: state.plugin.authenticator().cache().len(),
        registration_enabled: state.plugin.config().allow_registration,
    })
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
}
