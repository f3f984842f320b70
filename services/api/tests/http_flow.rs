use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use portal_api::web::{self, state::AppState};
use serde_json::{json, Value};
use tower::ServiceExt;
use training_portal_core::{
    memory::{MemoryCache, MemoryRemote},
    AppStore, PermissionCatalog, StoreOptions,
};

fn app() -> Router {
    let store = Arc::new(AppStore::open(
        Arc::new(MemoryRemote::new()),
        Arc::new(MemoryCache::new()),
        StoreOptions::default(),
    ));
    web::router(Arc::new(AppState::new(store, PermissionCatalog::standard())))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn login_staff(app: &Router, email: &str, role: &str) {
    let (status, body) = call(
        app,
        Method::POST,
        "/auth/login",
        Some(json!({ "email": email, "role": role })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
}

#[tokio::test]
async fn protected_routes_need_a_session() {
    let app = app();
    let (status, _) = call(&app, Method::GET, "/session", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, Method::GET, "/passcodes", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn staff_login_reports_landing_view_and_permissions() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/login",
        Some(json!({ "email": "coord@x.com", "role": "Training Coordinator", "name": "Cora" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], json!("training_coordinator"));
    assert_eq!(body["landing_view"], json!("training_dashboard"));
    assert!(body["permissions"]
        .as_array()
        .unwrap()
        .contains(&json!("issue_passcodes")));

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/login",
        Some(json!({ "email": "t@x.com", "role": "trainee" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/login",
        Some(json!({ "email": "x@x.com", "role": "janitor" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn issued_passcode_logs_the_trainee_in_once() {
    let app = app();
    login_staff(&app, "coord@x.com", "training_coordinator").await;

    let (status, entry) = call(
        &app,
        Method::POST,
        "/passcodes",
        Some(json!({ "trainee_email": "trainee@x.com", "code": "4821", "valid_days": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["code"], json!("4821"));
    assert_eq!(entry["issued_by"], json!("coord@x.com"));

    let (status, _) = call(
        &app,
        Method::POST,
        "/passcodes",
        Some(json!({ "trainee_email": "trainee@x.com", "code": "12a4" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    call(&app, Method::POST, "/auth/logout", None).await;

    let login = json!({ "email": "Trainee@X.com", "code": "4821" });
    let (status, body) = call(&app, Method::POST, "/auth/passcode", Some(login.clone())).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["user"]["role"], json!("trainee"));
    assert_eq!(body["landing_view"], json!("trainee_dashboard"));

    let (status, body) = call(&app, Method::POST, "/auth/passcode", Some(login)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.as_str().unwrap().contains("already been used"));

    // Trainees cannot issue codes.
    let (status, _) = call(
        &app,
        Method::POST,
        "/passcodes",
        Some(json!({ "trainee_email": "other@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn trainee_completes_assigned_modules() {
    let app = app();
    login_staff(&app, "coord@x.com", "training_coordinator").await;

    let (status, _) = call(
        &app,
        Method::PUT,
        "/assignments/trainee@x.com",
        Some(json!({ "modules": ["BOSIET", "unknown course"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        Method::PUT,
        "/assignments/trainee@x.com",
        Some(json!({ "modules": ["bosiet", "FIRE WATCH"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["assignment"]["modules"], json!(["BOSIET", "FIRE WATCH"]));
    assert_eq!(body["progress"]["percent_complete"], json!(0));

    call(
        &app,
        Method::POST,
        "/passcodes",
        Some(json!({ "trainee_email": "trainee@x.com", "code": "5150" })),
    )
    .await;
    call(
        &app,
        Method::POST,
        "/auth/passcode",
        Some(json!({ "email": "trainee@x.com", "code": "5150" })),
    )
    .await;

    let (status, progress) = call(
        &app,
        Method::POST,
        "/assignments/trainee@x.com/completions",
        Some(json!({ "module": "BOSIET" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", progress);
    assert_eq!(progress["percent_complete"], json!(50));
    assert_eq!(progress["remaining"], json!(["FIRE WATCH"]));

    let (status, _) = call(
        &app,
        Method::POST,
        "/assignments/trainee@x.com/completions",
        Some(json!({ "module": "HUET" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::GET, "/assignments/someone@x.com", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::GET, "/assignments/trainee@x.com", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn requests_are_reviewed_by_permitted_roles() {
    let app = app();
    login_staff(&app, "nurse@x.com", "nurse").await;

    let (status, request) = call(
        &app,
        Method::POST,
        "/requests",
        Some(json!({ "kind": "request", "subject": "Gloves", "details": "Size M" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = request["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        Method::PATCH,
        &format!("/requests/{}", id),
        Some(json!({ "status": "resolved" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    login_staff(&app, "ops@x.com", "operations_manager").await;
    let (status, updated) = call(
        &app,
        Method::PATCH,
        &format!("/requests/{}", id),
        Some(json!({ "status": "resolved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], json!("resolved"));

    let (_, all) = call(&app, Method::GET, "/requests", None).await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn forms_replace_their_slot() {
    let app = app();
    login_staff(&app, "nurse@x.com", "nurse").await;

    let (status, _) = call(&app, Method::PUT, "/forms/medical_fitness", Some(json!({ "fit": false }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(&app, Method::PUT, "/forms/medical_fitness", Some(json!({ "fit": true }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, form) = call(&app, Method::GET, "/forms/medical_fitness", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(form["fields"]["fit"], json!(true));

    let (status, _) = call(&app, Method::GET, "/forms/tax_return", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_is_reserved_for_administrators() {
    let app = app();
    login_staff(&app, "nurse@x.com", "nurse").await;
    let (status, _) = call(&app, Method::POST, "/auth/reset", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    login_staff(&app, "coo@x.com", "chief_operations_officer").await;
    let (status, _) = call(&app, Method::POST, "/auth/reset", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, Method::GET, "/session", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sync_pulls_remote_passcodes() {
    let app = app();
    login_staff(&app, "coord@x.com", "training_coordinator").await;
    call(
        &app,
        Method::POST,
        "/passcodes",
        Some(json!({ "trainee_email": "trainee@x.com", "code": "4821" })),
    )
    .await;
    // Let the background insert land before pulling.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let (status, report) = call(&app, Method::POST, "/sync", None).await;
    assert_eq!(status, StatusCode::OK, "{}", report);
    assert_eq!(report["passcodes"], json!(1));
    assert_eq!(report["assignment"], Value::Null);
}
