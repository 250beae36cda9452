use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use sea_orm::Database;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use video_upload_service::config::PipelineConfig;
use video_upload_service::infrastructure::database;
use video_upload_service::models::StorageReference;
use video_upload_service::services::media_tool::{MediaTool, ToolError, ToolRequest};
use video_upload_service::services::object_store::MemoryObjectStore;
use video_upload_service::services::upload_pipeline::UploadPipeline;
use video_upload_service::services::video_store::{SeaOrmVideoStore, VideoStore};
use video_upload_service::utils::auth::create_jwt;
use video_upload_service::{AppState, create_app};

const SECRET: &str = "test_secret";
const BOUNDARY: &str = "---------------------------123456789012345678901234567";

/// Answers probes with fixed dimensions and remuxes by prefixing a header box.
struct FakeFfmpeg {
    width: u32,
    height: u32,
    fail_remux: bool,
}

#[async_trait]
impl MediaTool for FakeFfmpeg {
    async fn run(&self, request: ToolRequest<'_>) -> Result<Vec<u8>, ToolError> {
        match request {
            ToolRequest::Probe { .. } => Ok(json!({
                "streams": [
                    {"codec_type": "video", "width": self.width, "height": self.height}
                ]
            })
            .to_string()
            .into_bytes()),
            ToolRequest::FastStart { input, output } => {
                if self.fail_remux {
                    return Err(ToolError::Exited {
                        program: "ffmpeg".to_string(),
                        status: "exit status: 1".to_string(),
                        stderr: "moov atom not found".to_string(),
                    });
                }
                let mut data = b"moov".to_vec();
                data.extend(tokio::fs::read(input).await.unwrap());
                tokio::fs::write(output, data).await.unwrap();
                Ok(Vec::new())
            }
        }
    }
}

struct TestApp {
    app: Router,
    objects: Arc<MemoryObjectStore>,
    videos: Arc<SeaOrmVideoStore>,
    staging: tempfile::TempDir,
}

async fn setup(tool: FakeFfmpeg) -> TestApp {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();

    let staging = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        staging_dir: staging.path().to_path_buf(),
        jwt_secret: SECRET.to_string(),
        ..PipelineConfig::development()
    };

    let objects = Arc::new(MemoryObjectStore::new(
        "videos".to_string(),
        config.max_presign_expiry(),
    ));
    let videos = Arc::new(SeaOrmVideoStore::new(db.clone()));
    let pipeline = Arc::new(UploadPipeline::new(
        config.clone(),
        Arc::new(tool),
        objects.clone(),
        videos.clone(),
    ));

    let app = create_app(AppState {
        db,
        pipeline,
        config,
    });

    TestApp {
        app,
        objects,
        videos,
        staging,
    }
}

fn landscape() -> FakeFfmpeg {
    FakeFfmpeg {
        width: 1920,
        height: 1080,
        fail_remux: false,
    }
}

fn staged_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn multipart_body(field: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"clip\"\r\n\
         Content-Type: {content_type}\r\n\r\n",
        boundary = BOUNDARY,
        field = field,
        content_type = content_type
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn create_video(app: &Router, token: &str) -> String {
    let (status, body) = send(
        app,
        Request::builder()
            .method("POST")
            .uri("/videos")
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .body(Body::from(
                json!({"title": "Boots", "description": "Trailer"}).to_string(),
            ))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["video_url"].is_null());
    body["id"].as_str().unwrap().to_string()
}

fn upload_request(video_id: &str, token: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/videos/{}/video", video_id))
        .header("Authorization", format!("Bearer {}", token))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body("video", content_type, data)))
        .unwrap()
}

#[tokio::test]
async fn test_owner_upload_end_to_end() {
    let t = setup(landscape()).await;
    let token = create_jwt("owner", SECRET).unwrap();
    let video_id = create_video(&t.app, &token).await;

    let (status, body) = send(
        &t.app,
        upload_request(&video_id, &token, "video/mp4", b"ftypisom-mdat"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);

    // The response carries a presigned URL, never the stored reference.
    let url = body["video_url"]["url"].as_str().unwrap();
    assert!(url.starts_with("memory://videos/landscape/"));
    assert!(body["video_url"]["expires_at"].is_string());
    assert_eq!(
        t.objects.fetch_at(url, chrono::Utc::now()).unwrap(),
        b"moovftypisom-mdat"
    );

    let record = t.videos.get(&video_id).await.unwrap();
    let reference = StorageReference::parse(record.video_url.as_deref().unwrap()).unwrap();
    assert_eq!(reference.bucket(), "videos");
    assert!(reference.key().starts_with("landscape/"));
    assert!(reference.key().ends_with(".mp4"));

    assert_eq!(staged_count(t.staging.path()), 0);
}

#[tokio::test]
async fn test_portrait_upload_is_keyed_under_portrait() {
    let t = setup(FakeFfmpeg {
        width: 1080,
        height: 1920,
        fail_remux: false,
    })
    .await;
    let token = create_jwt("owner", SECRET).unwrap();
    let video_id = create_video(&t.app, &token).await;

    let (status, _) = send(
        &t.app,
        upload_request(&video_id, &token, "video/mp4", b"ftypisom"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(t.objects.keys().iter().all(|k| k.starts_with("portrait/")));
}

#[tokio::test]
async fn test_non_owner_is_forbidden_before_staging() {
    let t = setup(landscape()).await;
    let owner = create_jwt("owner", SECRET).unwrap();
    let intruder = create_jwt("intruder", SECRET).unwrap();
    let video_id = create_video(&t.app, &owner).await;

    let (status, body) = send(
        &t.app,
        upload_request(&video_id, &intruder, "video/mp4", b"ftypisom"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());
    assert_eq!(staged_count(t.staging.path()), 0);
    assert_eq!(t.objects.object_count(), 0);

    let (status, _) = send(
        &t.app,
        Request::builder()
            .uri(format!("/videos/{}", video_id))
            .header("Authorization", format!("Bearer {}", intruder))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_transcode_failure_keeps_record_unchanged() {
    let t = setup(FakeFfmpeg {
        width: 1920,
        height: 1080,
        fail_remux: true,
    })
    .await;
    let token = create_jwt("owner", SECRET).unwrap();
    let video_id = create_video(&t.app, &token).await;
    let before = t.videos.get(&video_id).await.unwrap();

    let (status, body) = send(
        &t.app,
        upload_request(&video_id, &token, "video/mp4", b"garbage"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal Server Error");

    let after = t.videos.get(&video_id).await.unwrap();
    assert_eq!(after.video_url, before.video_url);
    assert_eq!(after.version, before.version);
    assert_eq!(staged_count(t.staging.path()), 0);
    assert_eq!(t.objects.object_count(), 0);
}

#[tokio::test]
async fn test_unsupported_media_type_is_rejected() {
    let t = setup(landscape()).await;
    let token = create_jwt("owner", SECRET).unwrap();
    let video_id = create_video(&t.app, &token).await;

    let (status, body) = send(
        &t.app,
        upload_request(&video_id, &token, "video/x-matroska", b"\x1a\x45\xdf\xa3"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unsupported"));
    assert_eq!(staged_count(t.staging.path()), 0);
}

#[tokio::test]
async fn test_missing_video_field_is_rejected() {
    let t = setup(landscape()).await;
    let token = create_jwt("owner", SECRET).unwrap();
    let video_id = create_video(&t.app, &token).await;

    let (status, _) = send(
        &t.app,
        Request::builder()
            .method("POST")
            .uri(format!("/videos/{}/video", video_id))
            .header("Authorization", format!("Bearer {}", token))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body("file", "video/mp4", b"ftypisom")))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_video_mints_fresh_urls() {
    let t = setup(landscape()).await;
    let token = create_jwt("owner", SECRET).unwrap();
    let video_id = create_video(&t.app, &token).await;

    let (status, _) = send(
        &t.app,
        upload_request(&video_id, &token, "video/mp4", b"ftypisom"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let get = || {
        Request::builder()
            .uri(format!("/videos/{}", video_id))
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = send(&t.app, get()).await;
    assert_eq!(status, StatusCode::OK);
    let url = body["video_url"]["url"].as_str().unwrap().to_string();
    assert!(url.contains("X-Signature="));

    // The stored field is still the reference, not the URL.
    let record = t.videos.get(&video_id).await.unwrap();
    assert!(!record.video_url.unwrap().contains("X-Signature"));

    // A URL is rejected by the store once its window has passed.
    let later = chrono::Utc::now() + chrono::Duration::seconds(601);
    assert!(t.objects.fetch_at(&url, later).is_err());
}

#[tokio::test]
async fn test_thumbnail_upload() {
    let t = setup(landscape()).await;
    let token = create_jwt("owner", SECRET).unwrap();
    let video_id = create_video(&t.app, &token).await;

    let request = |content_type: &str| {
        Request::builder()
            .method("POST")
            .uri(format!("/videos/{}/thumbnail", video_id))
            .header("Authorization", format!("Bearer {}", token))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(
                "thumbnail",
                content_type,
                b"\xff\xd8\xff\xe0",
            )))
            .unwrap()
    };

    let (status, _) = send(&t.app, request("image/gif")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&t.app, request("image/jpeg")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        body["thumbnail_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("memory://videos/thumbnails/")
    );
    assert_eq!(staged_count(t.staging.path()), 0);
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let t = setup(landscape()).await;
    let token = create_jwt("owner", SECRET).unwrap();

    for (id, expected) in [
        ("not-a-uuid", StatusCode::BAD_REQUEST),
        (
            "6a1f7c8e-1d3b-4c61-9f1a-2b3c4d5e6f70",
            StatusCode::NOT_FOUND,
        ),
    ] {
        let (status, _) = send(
            &t.app,
            Request::builder()
                .uri(format!("/videos/{}", id))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, expected, "id {}", id);
    }
}

#[tokio::test]
async fn test_presign_windows_are_bounded() {
    let store = MemoryObjectStore::new("videos".to_string(), Duration::from_secs(3600));
    let reference = StorageReference::new("videos", "landscape/k.mp4").unwrap();
    let now = chrono::Utc::now();

    let ten_minutes = store
        .presign_at(&reference, Duration::from_secs(600), now)
        .unwrap();
    let twenty_minutes = store
        .presign_at(&reference, Duration::from_secs(1200), now)
        .unwrap();
    assert_ne!(ten_minutes.url, twenty_minutes.url);

    assert!(
        store
            .presign_at(&reference, Duration::from_secs(7200), now)
            .is_err()
    );
}
