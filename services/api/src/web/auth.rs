//! services/api/src/web/auth.rs
//!
//! Session endpoints: staff login, trainee passcode login, logout and reset.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use training_portal_core::{rbac, LandingView, PermissionCatalog, Role, UserSession};
use utoipa::ToSchema;

use crate::error::store_rejection;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    /// Role id (`training_coordinator`) or display label (`Training Coordinator`).
    pub role: String,
    pub name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct PasscodeLoginRequest {
    pub email: String,
    pub code: String,
    pub name: Option<String>,
}

/// The current session together with what the role may do.
#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    #[schema(value_type = Object)]
    pub user: UserSession,
    #[schema(value_type = String)]
    pub landing_view: LandingView,
    pub permissions: Vec<String>,
}

impl SessionResponse {
    pub fn new(catalog: &PermissionCatalog, user: UserSession) -> Self {
        let permissions = catalog
            .permissions_for_role(user.role)
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();
        Self {
            landing_view: user.role.landing_view(),
            permissions,
            user,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Staff login by email and role
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = SessionResponse),
        (status = 400, description = "Unknown role, missing email, or trainee login attempt")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let role = req
        .role
        .parse::<Role>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    if role == Role::Trainee {
        return Err((
            StatusCode::BAD_REQUEST,
            "Trainees sign in with a passcode".to_string(),
        ));
    }

    let mut user = UserSession::new(req.email.trim(), role);
    user.name = req.name.filter(|n| !n.trim().is_empty());
    state.store.set_user(user.clone()).map_err(store_rejection)?;
    info!(email = %user.email, %role, "Staff user logged in");

    Ok((StatusCode::OK, Json(SessionResponse::new(&state.catalog, user))))
}

/// POST /auth/passcode - Trainee login with an issued passcode
#[utoipa::path(
    post,
    path = "/auth/passcode",
    request_body = PasscodeLoginRequest,
    responses(
        (status = 200, description = "Login successful; the passcode is now used", body = SessionResponse),
        (status = 401, description = "Passcode expired, unknown or already used")
    )
)]
pub async fn passcode_login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasscodeLoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = state
        .store
        .login_with_passcode(&req.email, req.code.trim(), req.name)
        .map_err(store_rejection)?;
    info!(email = %user.email, "Trainee logged in with passcode");

    Ok((StatusCode::OK, Json(SessionResponse::new(&state.catalog, user))))
}

/// POST /auth/logout - End the current session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.store.logout().map_err(store_rejection)?;
    Ok(StatusCode::OK)
}

/// POST /auth/reset - Clear all local state and the device cache
#[utoipa::path(
    post,
    path = "/auth/reset",
    responses(
        (status = 200, description = "Local state cleared"),
        (status = 401, description = "No active session"),
        (status = 403, description = "Administrators only")
    )
)]
pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserSession>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if !rbac::is_admin(&state.catalog, Some(user.role)) {
        return Err((
            StatusCode::FORBIDDEN,
            "Only administrators can reset the portal".to_string(),
        ));
    }
    state.store.reset();
    info!(email = %user.email, "Portal state reset");
    Ok(StatusCode::OK)
}

/// GET /session - The logged-in user
#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Current session", body = SessionResponse),
        (status = 401, description = "No active session")
    )
)]
pub async fn session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserSession>,
) -> Json<SessionResponse> {
    Json(SessionResponse::new(&state.catalog, user))
}
