pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

pub use error::{RelayError, Result};

use crate::config::RelayConfig;
use crate::services::relay::RelayService;
use crate::services::storage::StorageService;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::files::upload_file,
        api::handlers::files::upload_text,
        api::handlers::files::download_file,
        api::handlers::system::get_stats,
        api::handlers::system::cleanup_files,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::files::UploadResponse,
            api::handlers::files::UploadForm,
            api::handlers::system::StatsResponse,
            api::handlers::system::CleanupRequest,
            api::handlers::system::CleanupResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "files", description = "Upload and download"),
        (name = "system", description = "Storage statistics, cleanup and liveness")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayService>,
    pub config: RelayConfig,
}

impl AppState {
    pub fn new(storage: Arc<dyn StorageService>, config: RelayConfig) -> Self {
        let relay = Arc::new(RelayService::new(storage, config.base_url()));
        Self { relay, config }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(api::handlers::ui::index))
        .route("/health", get(api::handlers::health::health_check))
        .route("/upload", post(api::handlers::files::upload_file))
        .route("/files/:name", get(api::handlers::files::download_file))
        .route("/stats", get(api::handlers::system::get_stats))
        .route("/cleanup", post(api::handlers::system::cleanup_files))
        .route("/test/upload-text", post(api::handlers::files::upload_text))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.max_file_size,
        ))
        .with_state(state)
}
