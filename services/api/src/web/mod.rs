pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_session;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::web::state::AppState;

/// Builds the API router: public login routes plus everything behind `require_session`.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no session required)
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/passcode", post(auth::passcode_login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (session required)
    let protected_routes = Router::new()
        .route("/auth/reset", post(auth::reset_handler))
        .route("/session", get(auth::session_handler))
        .route(
            "/passcodes",
            post(rest::issue_passcode_handler).get(rest::list_passcodes_handler),
        )
        .route(
            "/assignments/{email}",
            put(rest::assign_training_handler).get(rest::get_assignment_handler),
        )
        .route(
            "/assignments/{email}/completions",
            post(rest::complete_module_handler),
        )
        .route(
            "/forms/{kind}",
            put(rest::save_form_handler).get(rest::get_form_handler),
        )
        .route(
            "/observations",
            post(rest::submit_observation_handler).get(rest::list_observations_handler),
        )
        .route(
            "/requests",
            post(rest::submit_request_handler).get(rest::list_requests_handler),
        )
        .route("/requests/{id}", patch(rest::update_request_handler))
        .route("/sync", post(rest::sync_handler))
        .route("/notifications", get(rest::notifications_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
