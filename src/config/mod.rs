use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Which object store backend the service talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Memory,
}

/// Configuration for the upload pipeline and its collaborators
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum video upload size in bytes (default: 1 GB)
    pub max_upload_size: usize,

    /// Accepted video media types (default: "video/mp4")
    pub allowed_video_types: Vec<String>,

    /// Maximum thumbnail size in bytes (default: 10 MB)
    pub max_thumbnail_size: usize,

    /// Accepted thumbnail media types (default: "image/jpeg", "image/png")
    pub allowed_thumbnail_types: Vec<String>,

    /// Validity of presigned read URLs in seconds (default: 600)
    pub presign_expiry_secs: u64,

    /// Upper bound for any presigned URL in seconds (default: 3600)
    pub max_presign_expiry_secs: u64,

    /// ffprobe executable (default: "ffprobe")
    pub ffprobe_path: String,

    /// ffmpeg executable (default: "ffmpeg")
    pub ffmpeg_path: String,

    /// Deadline for a single probe or remux run in seconds (default: 300)
    pub tool_timeout_secs: u64,

    /// Deadline for pushing one artifact to the object store in seconds (default: 900)
    pub upload_timeout_secs: u64,

    /// Part size for multipart uploads in bytes (default: 8 MB)
    pub chunk_size: usize,

    /// Directory for staged files (default: system temp dir)
    pub staging_dir: PathBuf,

    /// Object store backend: "s3" or "memory" (default: "s3")
    pub storage_backend: StorageBackend,

    /// Bucket all artifacts are written to (default: "videos")
    pub s3_bucket: String,

    /// Bucket region (default: "us-east-1")
    pub s3_region: String,

    /// Custom S3 endpoint, e.g. MinIO (default: none)
    pub s3_endpoint: Option<String>,

    /// JWT Secret Key (Required in production)
    pub jwt_secret: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 1024 * 1024 * 1024, // 1 GB
            allowed_video_types: vec!["video/mp4".to_string()],
            max_thumbnail_size: 10 * 1024 * 1024, // 10 MB
            allowed_thumbnail_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
            presign_expiry_secs: 10 * 60,
            max_presign_expiry_secs: 60 * 60,
            ffprobe_path: "ffprobe".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            tool_timeout_secs: 300,
            upload_timeout_secs: 900,
            chunk_size: 8 * 1024 * 1024, // 8 MB
            staging_dir: env::temp_dir(),
            storage_backend: StorageBackend::S3,
            s3_bucket: "videos".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            jwt_secret: "secret".to_string(),
        }
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_backend(value: &str) -> StorageBackend {
    match value.to_lowercase().as_str() {
        "memory" => StorageBackend::Memory,
        _ => StorageBackend::S3,
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        let config = Self {
            max_upload_size: env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size),

            allowed_video_types: env::var("ALLOWED_VIDEO_TYPES")
                .ok()
                .map(|v| parse_list(&v))
                .unwrap_or(default.allowed_video_types),

            max_thumbnail_size: env::var("MAX_THUMBNAIL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_thumbnail_size),

            allowed_thumbnail_types: env::var("ALLOWED_THUMBNAIL_TYPES")
                .ok()
                .map(|v| parse_list(&v))
                .unwrap_or(default.allowed_thumbnail_types),

            presign_expiry_secs: env::var("PRESIGN_EXPIRY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.presign_expiry_secs),

            max_presign_expiry_secs: env::var("MAX_PRESIGN_EXPIRY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_presign_expiry_secs),

            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or(default.ffprobe_path),

            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or(default.ffmpeg_path),

            tool_timeout_secs: env::var("TOOL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.tool_timeout_secs),

            upload_timeout_secs: env::var("UPLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.upload_timeout_secs),

            chunk_size: env::var("CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.chunk_size),

            staging_dir: env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            storage_backend: env::var("STORAGE_BACKEND")
                .map(|v| parse_backend(&v))
                .unwrap_or(default.storage_backend),

            s3_bucket: env::var("S3_BUCKET").unwrap_or(default.s3_bucket),

            s3_region: env::var("S3_REGION").unwrap_or(default.s3_region),

            s3_endpoint: env::var("S3_ENDPOINT").ok(),

            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret),
        };
        config.clamp_presign_expiry()
    }

    /// Keep the presign validity within the store's maximum.
    pub fn clamp_presign_expiry(mut self) -> Self {
        if self.presign_expiry_secs > self.max_presign_expiry_secs {
            tracing::warn!(
                "Presign expiry of {}s exceeds the maximum of {}s, clamping",
                self.presign_expiry_secs,
                self.max_presign_expiry_secs
            );
            self.presign_expiry_secs = self.max_presign_expiry_secs;
        }
        self
    }

    /// Create config for development (in-memory object store, short deadlines)
    pub fn development() -> Self {
        Self {
            tool_timeout_secs: 60,
            upload_timeout_secs: 120,
            storage_backend: StorageBackend::Memory,
            s3_bucket: "videos-dev".to_string(),
            ..Self::default()
        }
    }

    /// Create config for production (strict secrets)
    pub fn production() -> Self {
        Self {
            storage_backend: StorageBackend::S3,
            jwt_secret: env::var("JWT_SECRET").expect("CRITICAL: JWT_SECRET must be set"),
            ..Self::from_env()
        }
    }

    pub fn presign_expiry(&self) -> Duration {
        Duration::from_secs(self.presign_expiry_secs)
    }

    pub fn max_presign_expiry(&self) -> Duration {
        Duration::from_secs(self.max_presign_expiry_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn is_allowed_video_type(&self, media_type: &str) -> bool {
        self.allowed_video_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(media_type))
    }

    pub fn is_allowed_thumbnail_type(&self, media_type: &str) -> bool {
        self.allowed_thumbnail_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(media_type))
    }
}
