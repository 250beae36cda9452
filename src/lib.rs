pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::PipelineConfig;
use crate::services::upload_pipeline::UploadPipeline;
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// Multipart framing on top of the artifact itself.
const MULTIPART_OVERHEAD: usize = 10 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::videos::create_video,
        api::handlers::videos::get_video,
        api::handlers::videos::upload_video,
        api::handlers::videos::upload_thumbnail,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::videos::CreateVideoRequest,
            api::handlers::videos::VideoUploadForm,
            api::handlers::videos::ThumbnailUploadForm,
            models::VideoView,
            models::PresignedUrl,
            models::Classification,
        )
    ),
    tags(
        (name = "videos", description = "Video upload and playback endpoints"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub pipeline: Arc<UploadPipeline>,
    pub config: PipelineConfig,
}

pub fn create_app(state: AppState) -> Router {
    let auth = || from_fn_with_state(state.clone(), api::middleware::auth::auth_middleware);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/videos",
            post(api::handlers::videos::create_video).layer(auth()),
        )
        .route(
            "/videos/:video_id",
            get(api::handlers::videos::get_video).layer(auth()),
        )
        .route(
            "/videos/:video_id/video",
            post(api::handlers::videos::upload_video)
                .layer(axum::extract::DefaultBodyLimit::max(
                    state.config.max_upload_size + MULTIPART_OVERHEAD,
                ))
                .layer(auth()),
        )
        .route(
            "/videos/:video_id/thumbnail",
            post(api::handlers::videos::upload_thumbnail)
                .layer(axum::extract::DefaultBodyLimit::max(
                    state.config.max_thumbnail_size + MULTIPART_OVERHEAD,
                ))
                .layer(auth()),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
