//! services/api/src/bin/api.rs

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use portal_api::{
    adapters::{FileCache, PgRemoteStore},
    config::Config,
    error::ApiError,
    events::spawn_event_listener,
    web::{self, rest::ApiDoc, state::AppState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use training_portal_core::{
    memory::MemoryRemote, AppStore, PermissionCatalog, RemoteStore, StoreOptions, SystemClock,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Remote Store ---
    let remote: Arc<dyn RemoteStore> = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            let db_adapter = PgRemoteStore::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
        None => {
            warn!("DATABASE_URL is not set; remote records are kept in memory only.");
            Arc::new(MemoryRemote::new())
        }
    };

    // --- 3. Open the Local Cache & the Store ---
    let cache = Arc::new(FileCache::new(config.cache_dir.clone(), config.cache_max_bytes)?);
    info!(dir = %config.cache_dir.display(), "Local cache ready");
    let store = Arc::new(AppStore::open(
        remote,
        cache,
        StoreOptions {
            cache_key: config.cache_key.clone(),
            passcode_policy: config.passcode_policy,
            clock: Arc::new(SystemClock),
        },
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(store.clone(), PermissionCatalog::standard()));
    spawn_event_listener(store.subscribe(), app_state.notifications.clone());

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(web::router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
