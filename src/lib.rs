//! DreamToon - backend functions for turning dreams into comic strips
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - /functions/v1 endpoints used by the mobile app           │
//! │  - Auth-provider and store webhooks                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Dream → storyboard → panels orchestration                │
//! │  - Avatars, accounts, subscriptions                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Data / Storage / Providers                     │
//! │  - SQLite (sqlx)                                            │
//! │  - R2 or local blob storage                                 │
//! │  - OpenAI and the hosted auth provider over HTTPS           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Business logic layer
//! - `comic`: Prompts, storyboard validation, moderation, stitching
//! - `openai`: AI provider client
//! - `auth`: Bearer authentication and webhook secrets
//! - `data`: Database layer
//! - `storage`: Blob storage
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod comic;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod openai;
pub mod service;
pub mod storage;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like database pool, storage, and HTTP clients.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Blob storage (R2 or local directory)
    pub storage: Arc<storage::MediaStorage>,

    /// OpenAI client
    pub openai: openai::OpenAiClient,

    /// Auth provider client
    pub auth: Arc<auth::AuthProvider>,

    /// HTTP client for fetching user-supplied images
    pub http_client: reqwest::Client,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database (runs migrations)
    /// 2. Build the outbound HTTP client
    /// 3. Initialize blob storage
    /// 4. Build the provider clients
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = data::Database::connect(&config.database.path).await?;
        tracing::info!(path = %config.database.path.display(), "Database connected");

        // 2. Initialize HTTP client
        // Image generation routinely takes longer than a minute
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("DreamToon/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(180))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        // 3. Initialize blob storage
        let storage = storage::MediaStorage::new(&config.storage).await?;
        tracing::info!(backend = ?config.storage.backend, "Media storage initialized");

        // 4. Provider clients
        let openai = openai::OpenAiClient::new(http_client.clone(), config.openai.clone());
        let auth = auth::AuthProvider::new(http_client.clone(), &config.auth);
        tracing::info!(
            chat_model = %config.openai.chat_model,
            image_model = %config.openai.image_model,
            "Provider clients initialized"
        );

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(db),
            storage: Arc::new(storage),
            openai,
            auth: Arc::new(auth),
            http_client,
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    let cors_layer = build_cors_layer(&state.config.server);
    let body_limit = state.config.server.max_body_bytes;

    let mut router = Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/functions/v1", api::functions_router());
    if state.config.storage.backend == config::StorageBackendKind::Local {
        router = router.merge(api::files_router());
    }

    router
        .layer(axum::extract::DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
