//! Authentication and access-check routes
//!
//! Every endpoint is a thin JSON wrapper around one plugin operation.
//! Denials come back as the plugin's error, mapped to an HTTP status.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use pkgauth_auth::AuthError;
use pkgauth_core::{Operation, PackageAccess, RemoteUser};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Username/password pair for login and registration
#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthenticateResponse {
    pub groups: Vec<String>,
}

#[derive(Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub username: String,
    pub old_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct AllowRequest {
    #[serde(default)]
    pub user: RemoteUser,
    pub package: PackageAccess,
}

#[derive(Serialize)]
pub struct AllowResponse {
    pub allowed: bool,
}

/// POST /-/auth/authenticate
async fn authenticate(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<AuthenticateResponse>, ApiError> {
    let groups = state
        .plugin
        .authenticate(&request.username, &request.password)
        .await?;
    Ok(Json(AuthenticateResponse { groups }))
}

/// POST /-/auth/users
async fn add_user(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<OkResponse>), ApiError> {
    let ok = state
        .plugin
        .add_user(&request.username, &request.password)
        .await?;
    Ok((StatusCode::CREATED, Json(OkResponse { ok })))
}

/// POST /-/auth/change-password
async fn change_password(
    State(state): State<AppState>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let ok = state
        .plugin
        .change_password(&request.username, &request.old_password, &request.new_password)
        .await?;
    Ok(Json(OkResponse { ok }))
}

/// POST /-/auth/allow/{operation}
async fn allow(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    Json(request): Json<AllowRequest>,
) -> Result<Json<AllowResponse>, ApiError> {
    let operation = operation
        .parse::<Operation>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if request.package.name.trim().is_empty() {
        return Err(AuthError::BadData("Bad package, package name must not be empty!".to_string()).into());
    }

    debug!(
        "Checking {} on {} for {:?}",
        operation, request.package.name, request.user.name
    );
    let allowed = state
        .plugin
        .allow(operation, &request.user, &request.package)
        .await?;
    Ok(Json(AllowResponse { allowed }))
}

/// Create auth routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/-/auth/authenticate", post(authenticate))
        .route("/-/auth/users", post(add_user))
        .route("/-/auth/change-password", post(change_password))
        .route("/-/auth/allow/{operation}", post(allow))
}
