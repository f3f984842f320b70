//! services/api/src/web/middleware.rs
//!
//! Session middleware for protecting routes, and the permission gate handlers use.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;
use training_portal_core::{rbac, Permission, PermissionCatalog, UserSession};

use crate::web::state::AppState;

/// Middleware that requires a logged-in user.
///
/// If a session exists, inserts the `UserSession` into request extensions for handlers to use.
/// Otherwise returns 401 Unauthorized.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let user = state.store.user().ok_or(StatusCode::UNAUTHORIZED)?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Rejects the request with 403 unless the session's role holds `permission`.
pub fn authorize(
    catalog: &PermissionCatalog,
    user: &UserSession,
    permission: Permission,
) -> Result<(), (StatusCode, String)> {
    if rbac::has_permission(catalog, Some(user.role), permission) {
        return Ok(());
    }
    warn!(email = %user.email, role = %user.role, %permission, "Permission denied");
    Err((
        StatusCode::FORBIDDEN,
        format!("Role {} lacks permission {}", user.role, permission),
    ))
}
