//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the portal's REST endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::store_rejection;
use crate::events::{Notification, NotificationLevel};
use crate::web::auth::{self, LoginRequest, PasscodeLoginRequest, SessionResponse};
use crate::web::middleware::authorize;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;
use training_portal_core::{
    domain::normalize_email, rbac, FormKind, FormSubmission, PasscodeEntry, Permission,
    RequestComplaint, RequestKind, RequestStatus, SafetyObservation, Severity,
    TrainingAssignment, TrainingModule, TrainingProgress, UserSession,
};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

type Rejection = (StatusCode, String);

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::passcode_login_handler,
        auth::logout_handler,
        auth::reset_handler,
        auth::session_handler,
        issue_passcode_handler,
        list_passcodes_handler,
        assign_training_handler,
        get_assignment_handler,
        complete_module_handler,
        save_form_handler,
        get_form_handler,
        submit_observation_handler,
        list_observations_handler,
        submit_request_handler,
        update_request_handler,
        list_requests_handler,
        sync_handler,
        notifications_handler,
    ),
    components(
        schemas(
            LoginRequest,
            PasscodeLoginRequest,
            SessionResponse,
            IssuePasscodeRequest,
            AssignTrainingRequest,
            CompleteModuleRequest,
            AssignmentResponse,
            ObservationRequest,
            SubmitRequestPayload,
            UpdateRequestPayload,
            SyncResponse,
            Notification,
            NotificationLevel,
        )
    ),
    tags(
        (name = "Training Portal API", description = "Role-based training portal: sessions, passcodes, training, forms and requests.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// Issues a passcode. Without `code` a random one is generated.
#[derive(Deserialize, ToSchema)]
pub struct IssuePasscodeRequest {
    pub trainee_email: String,
    pub code: Option<String>,
    pub valid_days: Option<i64>,
}

/// Module labels from the training catalog, e.g. `"BOSIET"` or `"FIRE WATCH"`.
#[derive(Deserialize, ToSchema)]
pub struct AssignTrainingRequest {
    pub modules: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CompleteModuleRequest {
    pub module: String,
}

#[derive(Serialize, ToSchema)]
pub struct AssignmentResponse {
    #[schema(value_type = Object)]
    pub assignment: TrainingAssignment,
    #[schema(value_type = Option<Object>)]
    pub progress: Option<TrainingProgress>,
}

#[derive(Deserialize, ToSchema)]
pub struct ObservationRequest {
    pub location: String,
    pub description: String,
    #[schema(value_type = String, example = "medium")]
    pub severity: Severity,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitRequestPayload {
    #[schema(value_type = String, example = "complaint")]
    pub kind: RequestKind,
    pub subject: String,
    pub details: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateRequestPayload {
    #[schema(value_type = String, example = "in_progress")]
    pub status: RequestStatus,
}

#[derive(Serialize, ToSchema)]
pub struct SyncResponse {
    pub passcodes: usize,
    #[schema(value_type = Option<Object>)]
    pub assignment: Option<TrainingAssignment>,
}

fn parse_form_kind(raw: &str) -> Result<FormKind, Rejection> {
    raw.parse::<FormKind>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))
}

fn parse_module(raw: &str) -> Result<TrainingModule, Rejection> {
    raw.parse::<TrainingModule>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

fn is_self(user: &UserSession, email: &str) -> bool {
    normalize_email(&user.email) == normalize_email(email)
}

//=========================================================================================
// Passcodes
//=========================================================================================

/// Issue a passcode for a trainee.
#[utoipa::path(
    post,
    path = "/passcodes",
    request_body = IssuePasscodeRequest,
    responses(
        (status = 201, description = "Passcode issued", body = Object),
        (status = 400, description = "Non-numeric code, bad validity or missing email"),
        (status = 403, description = "Role cannot issue passcodes")
    )
)]
pub async fn issue_passcode_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserSession>,
    Json(req): Json<IssuePasscodeRequest>,
) -> Result<impl IntoResponse, Rejection> {
    if !rbac::can_issue_passcodes(&state.catalog, Some(user.role)) {
        return Err((
            StatusCode::FORBIDDEN,
            format!("Role {} cannot issue passcodes", user.role),
        ));
    }
    let entry = state
        .store
        .issue_passcode(&req.trainee_email, req.code.as_deref(), req.valid_days)
        .map_err(store_rejection)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// List the passcode registry, including used and expired codes.
#[utoipa::path(
    get,
    path = "/passcodes",
    responses(
        (status = 200, description = "All issued passcodes", body = [Object]),
        (status = 403, description = "Role cannot issue passcodes")
    )
)]
pub async fn list_passcodes_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserSession>,
) -> Result<Json<Vec<PasscodeEntry>>, Rejection> {
    authorize(&state.catalog, &user, Permission::IssuePasscodes)?;
    Ok(Json(state.store.passcodes()))
}

//=========================================================================================
// Training
//=========================================================================================

/// Replace a trainee's assigned modules.
#[utoipa::path(
    put,
    path = "/assignments/{email}",
    request_body = AssignTrainingRequest,
    params(("email" = String, Path, description = "The trainee's email.")),
    responses(
        (status = 200, description = "Assignment stored", body = AssignmentResponse),
        (status = 400, description = "Unknown module or empty module list"),
        (status = 403, description = "Role cannot assign training")
    )
)]
pub async fn assign_training_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserSession>,
    Path(email): Path<String>,
    Json(req): Json<AssignTrainingRequest>,
) -> Result<Json<AssignmentResponse>, Rejection> {
    authorize(&state.catalog, &user, Permission::AssignTraining)?;
    let modules = req
        .modules
        .iter()
        .map(|m| parse_module(m))
        .collect::<Result<Vec<_>, _>>()?;

    let assignment = state
        .store
        .assign_training_modules(&email, modules)
        .map_err(store_rejection)?;
    info!(trainee = %assignment.trainee_email, modules = assignment.modules.len(), "Training assigned");
    Ok(Json(AssignmentResponse {
        progress: state.store.training_progress(&email),
        assignment,
    }))
}

/// A trainee's assignment and progress. Trainees may only read their own.
#[utoipa::path(
    get,
    path = "/assignments/{email}",
    params(("email" = String, Path, description = "The trainee's email.")),
    responses(
        (status = 200, description = "Current assignment", body = AssignmentResponse),
        (status = 403, description = "Not the trainee and cannot manage trainees"),
        (status = 404, description = "Nothing assigned")
    )
)]
pub async fn get_assignment_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserSession>,
    Path(email): Path<String>,
) -> Result<Json<AssignmentResponse>, Rejection> {
    if !is_self(&user, &email) {
        authorize(&state.catalog, &user, Permission::ManageTrainees)?;
    }
    let assignment = state.store.trainee_assignments(&email).ok_or((
        StatusCode::NOT_FOUND,
        format!("No training assigned to {}", email),
    ))?;
    Ok(Json(AssignmentResponse {
        progress: state.store.training_progress(&email),
        assignment,
    }))
}

/// Record completion of an assigned module by the trainee themself.
#[utoipa::path(
    post,
    path = "/assignments/{email}/completions",
    request_body = CompleteModuleRequest,
    params(("email" = String, Path, description = "The trainee's email.")),
    responses(
        (status = 200, description = "Updated progress", body = Object),
        (status = 400, description = "Module unknown or not assigned"),
        (status = 403, description = "Only the trainee can complete their modules")
    )
)]
pub async fn complete_module_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserSession>,
    Path(email): Path<String>,
    Json(req): Json<CompleteModuleRequest>,
) -> Result<Json<TrainingProgress>, Rejection> {
    authorize(&state.catalog, &user, Permission::ViewOwnTraining)?;
    if !is_self(&user, &email) {
        return Err((
            StatusCode::FORBIDDEN,
            "Trainees can only complete their own modules".to_string(),
        ));
    }
    let module = parse_module(&req.module)?;
    let progress = state
        .store
        .complete_module(&email, module)
        .map_err(store_rejection)?;
    Ok(Json(progress))
}

//=========================================================================================
// Forms
//=========================================================================================

/// Submit a form, replacing any earlier submission of the same kind.
#[utoipa::path(
    put,
    path = "/forms/{kind}",
    request_body = Object,
    params(("kind" = String, Path, description = "onboarding, medical_fitness, ppe_issuance, training_evaluation or site_induction")),
    responses(
        (status = 201, description = "Form stored", body = Object),
        (status = 400, description = "Unknown form kind or empty form"),
        (status = 403, description = "Role cannot submit forms")
    )
)]
pub async fn save_form_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserSession>,
    Path(kind): Path<String>,
    Json(fields): Json<Map<String, Value>>,
) -> Result<impl IntoResponse, Rejection> {
    authorize(&state.catalog, &user, Permission::SubmitForms)?;
    let kind = parse_form_kind(&kind)?;
    let form = state.store.save_form(kind, fields).map_err(store_rejection)?;
    Ok((StatusCode::CREATED, Json(form)))
}

/// The latest submission of a form kind.
#[utoipa::path(
    get,
    path = "/forms/{kind}",
    params(("kind" = String, Path, description = "The form kind.")),
    responses(
        (status = 200, description = "Stored form", body = Object),
        (status = 403, description = "Role can neither submit forms nor view reports"),
        (status = 404, description = "Form not submitted yet")
    )
)]
pub async fn get_form_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserSession>,
    Path(kind): Path<String>,
) -> Result<Json<FormSubmission>, Rejection> {
    if !rbac::has_any(
        &state.catalog,
        Some(user.role),
        [Permission::SubmitForms, Permission::ViewReports],
    ) {
        return Err((
            StatusCode::FORBIDDEN,
            format!("Role {} cannot read forms", user.role),
        ));
    }
    let kind = parse_form_kind(&kind)?;
    state
        .store
        .form(kind)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("No {} form submitted", kind.as_str())))
}

//=========================================================================================
// Safety Observations
//=========================================================================================

#[utoipa::path(
    post,
    path = "/observations",
    request_body = ObservationRequest,
    responses(
        (status = 201, description = "Observation recorded", body = Object),
        (status = 400, description = "Missing location or description"),
        (status = 403, description = "Role cannot submit observations")
    )
)]
pub async fn submit_observation_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserSession>,
    Json(req): Json<ObservationRequest>,
) -> Result<impl IntoResponse, Rejection> {
    authorize(&state.catalog, &user, Permission::SubmitSafetyObservation)?;
    let observation = state
        .store
        .submit_observation(&req.location, &req.description, req.severity)
        .map_err(store_rejection)?;
    Ok((StatusCode::CREATED, Json(observation)))
}

#[utoipa::path(
    get,
    path = "/observations",
    responses(
        (status = 200, description = "All observations", body = [Object]),
        (status = 403, description = "Role cannot view reports")
    )
)]
pub async fn list_observations_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserSession>,
) -> Result<Json<Vec<SafetyObservation>>, Rejection> {
    authorize(&state.catalog, &user, Permission::ViewReports)?;
    Ok(Json(state.store.observations()))
}

//=========================================================================================
// Requests and Complaints
//=========================================================================================

#[utoipa::path(
    post,
    path = "/requests",
    request_body = SubmitRequestPayload,
    responses(
        (status = 201, description = "Request recorded", body = Object),
        (status = 400, description = "Missing subject or details"),
        (status = 403, description = "Role cannot submit requests")
    )
)]
pub async fn submit_request_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserSession>,
    Json(req): Json<SubmitRequestPayload>,
) -> Result<impl IntoResponse, Rejection> {
    authorize(&state.catalog, &user, Permission::SubmitRequests)?;
    let request = state
        .store
        .submit_request(req.kind, &req.subject, &req.details)
        .map_err(store_rejection)?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Move a request or complaint to a new status.
#[utoipa::path(
    patch,
    path = "/requests/{id}",
    request_body = UpdateRequestPayload,
    params(("id" = Uuid, Path, description = "The request id.")),
    responses(
        (status = 200, description = "Updated request", body = Object),
        (status = 403, description = "Role cannot review requests"),
        (status = 404, description = "Unknown request")
    )
)]
pub async fn update_request_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserSession>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRequestPayload>,
) -> Result<Json<RequestComplaint>, Rejection> {
    authorize(&state.catalog, &user, Permission::ReviewRequests)?;
    let request = state
        .store
        .update_request_status(id, req.status)
        .map_err(store_rejection)?;
    Ok(Json(request))
}

/// Reviewers see every request; everyone else sees their own.
#[utoipa::path(
    get,
    path = "/requests",
    responses(
        (status = 200, description = "Visible requests", body = [Object])
    )
)]
pub async fn list_requests_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserSession>,
) -> Json<Vec<RequestComplaint>> {
    let mut requests = state.store.requests();
    if !rbac::has_permission(&state.catalog, Some(user.role), Permission::ReviewRequests) {
        requests.retain(|r| is_self(&user, &r.submitted_by));
    }
    Json(requests)
}

//=========================================================================================
// Sync and Notifications
//=========================================================================================

/// Pull passcodes and the session user's assignment from the remote service.
#[utoipa::path(
    post,
    path = "/sync",
    responses(
        (status = 200, description = "Local state replaced with remote state", body = SyncResponse),
        (status = 502, description = "Remote service unavailable; local state unchanged")
    )
)]
pub async fn sync_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SyncResponse>, Rejection> {
    let report = state.store.sync().await.map_err(store_rejection)?;
    Ok(Json(SyncResponse {
        passcodes: report.passcodes,
        assignment: report.assignment,
    }))
}

/// Drain pending background notices such as failed remote writes.
#[utoipa::path(
    get,
    path = "/notifications",
    responses(
        (status = 200, description = "Pending notifications, oldest first", body = [Notification])
    )
)]
pub async fn notifications_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Notification>> {
    Json(state.notifications.drain())
}
