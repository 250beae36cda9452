use crate::AppState;
use crate::api::error::AppError;
use crate::models::VideoView;
use crate::services::upload_pipeline::UploadRequest;
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
};
use futures::TryStreamExt;
use serde::Deserialize;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateVideoRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
}

/// Multipart body of `POST /videos/{video_id}/video`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct VideoUploadForm {
    #[schema(value_type = String, format = Binary)]
    video: Vec<u8>,
}

/// Multipart body of `POST /videos/{video_id}/thumbnail`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ThumbnailUploadForm {
    #[schema(value_type = String, format = Binary)]
    thumbnail: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
enum Artifact {
    Video,
    Thumbnail,
}

impl Artifact {
    fn field_name(self) -> &'static str {
        match self {
            Artifact::Video => "video",
            Artifact::Thumbnail => "thumbnail",
        }
    }
}

#[utoipa::path(
    post,
    path = "/videos",
    request_body = CreateVideoRequest,
    responses(
        (status = 201, description = "Draft video created", body = VideoView),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "videos"
)]
pub async fn create_video(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateVideoRequest>,
) -> Result<(StatusCode, Json<VideoView>), AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let view = state
        .pipeline
        .create_video(&claims.sub, req.title, req.description)
        .await?;

    Ok((StatusCode::CREATED, Json(view)))
}

#[utoipa::path(
    get,
    path = "/videos/{video_id}",
    params(
        ("video_id" = String, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Video with presigned URLs", body = VideoView),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Video not found")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "videos"
)]
pub async fn get_video(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
) -> Result<Json<VideoView>, AppError> {
    let view = state.pipeline.get_video(&video_id, &claims.sub).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/videos/{video_id}/video",
    params(
        ("video_id" = String, Path, description = "Video ID")
    ),
    request_body(content = VideoUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Video processed and stored", body = VideoView),
        (status = 400, description = "Unsupported or malformed upload"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the owner"),
        (status = 413, description = "Upload too large")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "videos"
)]
pub async fn upload_video(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<VideoView>, AppError> {
    receive(&state, claims, video_id, multipart, Artifact::Video)
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/videos/{video_id}/thumbnail",
    params(
        ("video_id" = String, Path, description = "Video ID")
    ),
    request_body(content = ThumbnailUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Thumbnail stored", body = VideoView),
        (status = 400, description = "Unsupported or malformed upload"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the owner"),
        (status = 413, description = "Upload too large")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "videos"
)]
pub async fn upload_thumbnail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<VideoView>, AppError> {
    receive(&state, claims, video_id, multipart, Artifact::Thumbnail)
        .await
        .map(Json)
}

async fn receive(
    state: &AppState,
    claims: Claims,
    video_id: String,
    mut multipart: Multipart,
    artifact: Artifact,
) -> Result<VideoView, AppError> {
    let result: Result<VideoView, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            if field.name() != Some(artifact.field_name()) {
                continue;
            }

            let media_type = field.content_type().map(|s| s.to_string());
            let body = StreamReader::new(field.map_err(std::io::Error::other));
            let request = UploadRequest {
                video_id,
                principal: claims.sub,
                media_type,
                body,
            };

            let view = match artifact {
                Artifact::Video => state.pipeline.upload_video(request).await?,
                Artifact::Thumbnail => state.pipeline.upload_thumbnail(request).await?,
            };
            return Ok(view);
        }

        Err(AppError::BadRequest(format!(
            "No {} provided",
            artifact.field_name()
        )))
    }
    .await;

    if let Err(e) = &result {
        // Read the rest of the body so the client sees the response instead of a reset.
        tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
        while let Ok(Some(mut field)) = multipart.next_field().await {
            while let Ok(Some(_)) = field.chunk().await {}
        }
    }
    result
}

fn multipart_error(e: MultipartError) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(err_msg)
    }
}
