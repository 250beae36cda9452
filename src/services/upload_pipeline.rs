use crate::config::PipelineConfig;
use crate::entities::videos;
use crate::models::{PresignedUrl, StorageReference, VideoView};
use crate::services::error::{PipelineError, PipelineResult};
use crate::services::inspector::MediaInspector;
use crate::services::keys::{generate_key, media_type_to_extension};
use crate::services::media_tool::MediaTool;
use crate::services::object_store::ObjectStore;
use crate::services::staging::{StagedFile, StagingArea};
use crate::services::transcoder::FastStartTranscoder;
use crate::services::video_store::{NewVideo, VideoStore};
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncRead;
use uuid::Uuid;

const THUMBNAIL_PREFIX: &str = "thumbnails";

/// Last step an upload completed. Steps run strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Received,
    Validated,
    Staged,
    Transcoded,
    Classified,
    Keyed,
    Uploaded,
    Referenced,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::Validated => "validated",
            PipelineStage::Staged => "staged",
            PipelineStage::Transcoded => "transcoded",
            PipelineStage::Classified => "classified",
            PipelineStage::Keyed => "keyed",
            PipelineStage::Uploaded => "uploaded",
            PipelineStage::Referenced => "referenced",
        };
        f.write_str(name)
    }
}

/// One inbound artifact for an existing video record.
pub struct UploadRequest<R> {
    pub video_id: String,
    pub principal: String,
    /// Content type declared by the client. Trusted only as far as the allow-list.
    pub media_type: Option<String>,
    pub body: R,
}

struct Progress<'a> {
    video_id: &'a str,
    stage: PipelineStage,
}

impl Progress<'_> {
    fn advance(&mut self, stage: PipelineStage) {
        self.stage = stage;
        tracing::debug!(video_id = %self.video_id, stage = %stage, "Upload advanced");
    }
}

/// Drives an upload from raw stream to a referenced object.
///
/// Every staged file is owned by the invocation that created it and is removed
/// on any exit, including a dropped future.
pub struct UploadPipeline {
    config: PipelineConfig,
    staging: StagingArea,
    transcoder: FastStartTranscoder,
    inspector: MediaInspector,
    objects: Arc<dyn ObjectStore>,
    videos: Arc<dyn VideoStore>,
}

impl UploadPipeline {
    pub fn new(
        config: PipelineConfig,
        tool: Arc<dyn MediaTool>,
        objects: Arc<dyn ObjectStore>,
        videos: Arc<dyn VideoStore>,
    ) -> Self {
        Self {
            staging: StagingArea::new(config.staging_dir.clone()),
            transcoder: FastStartTranscoder::new(tool.clone()),
            inspector: MediaInspector::new(tool),
            config,
            objects,
            videos,
        }
    }

    pub async fn create_video(
        &self,
        principal: &str,
        title: String,
        description: Option<String>,
    ) -> PipelineResult<VideoView> {
        if title.trim().is_empty() {
            return Err(PipelineError::InvalidInput("title is required".to_string()));
        }

        let video = self
            .videos
            .insert(NewVideo {
                user_id: principal.to_string(),
                title,
                description,
            })
            .await?;

        tracing::info!(video_id = %video.id, user_id = %principal, "Draft video created");
        self.presign(video).await
    }

    /// Load `video_id` and check that `principal` owns it.
    pub async fn authorize(&self, video_id: &str, principal: &str) -> PipelineResult<videos::Model> {
        Uuid::parse_str(video_id)
            .map_err(|_| PipelineError::InvalidInput(format!("invalid video ID: {}", video_id)))?;

        let video = self.videos.get(video_id).await?;
        if video.user_id != principal {
            tracing::warn!(
                video_id = %video_id,
                principal = %principal,
                "Rejected access to a video owned by another user"
            );
            return Err(PipelineError::Unauthorized(video_id.to_string()));
        }
        Ok(video)
    }

    /// Read side: the record with fresh presigned URLs.
    pub async fn get_video(&self, video_id: &str, principal: &str) -> PipelineResult<VideoView> {
        let video = self.authorize(video_id, principal).await?;
        self.presign(video).await
    }

    pub async fn presign(&self, video: videos::Model) -> PipelineResult<VideoView> {
        let video_url = self.presign_field(video.video_url.as_deref()).await?;
        let thumbnail_url = self.presign_field(video.thumbnail_url.as_deref()).await?;
        Ok(view(video, video_url, thumbnail_url))
    }

    /// View of a freshly referenced record. The upload already succeeded, so a
    /// presign failure drops the URLs instead of failing the request.
    async fn presign_committed(&self, video: videos::Model) -> VideoView {
        let video_id = video.id.clone();
        let video_url = self.presign_field(video.video_url.as_deref()).await;
        let thumbnail_url = self.presign_field(video.thumbnail_url.as_deref()).await;

        match (video_url, thumbnail_url) {
            (Ok(video_url), Ok(thumbnail_url)) => view(video, video_url, thumbnail_url),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(
                    video_id = %video_id,
                    "Upload referenced but presigning failed: {}",
                    e
                );
                view(video, None, None)
            }
        }
    }

    async fn presign_field(&self, encoded: Option<&str>) -> PipelineResult<Option<PresignedUrl>> {
        let Some(encoded) = encoded else {
            return Ok(None);
        };
        let reference = StorageReference::parse(encoded)?;
        let presigned = self
            .objects
            .presign_get(&reference, self.config.presign_expiry())
            .await?;
        Ok(Some(presigned))
    }

    /// Stage, fast-start, classify, store and reference a video.
    pub async fn upload_video<R>(&self, request: UploadRequest<R>) -> PipelineResult<VideoView>
    where
        R: AsyncRead + Unpin + Send,
    {
        let video_id = request.video_id.clone();
        let mut progress = Progress {
            video_id: &video_id,
            stage: PipelineStage::Received,
        };

        match self.run_video(request, &mut progress).await {
            Ok(video) => {
                tracing::info!(video_id = %video_id, "Video upload referenced");
                Ok(self.presign_committed(video).await)
            }
            Err(e) => {
                tracing::warn!(
                    video_id = %video_id,
                    stage = %progress.stage,
                    "Video upload aborted: {}",
                    e
                );
                Err(e)
            }
        }
    }

    async fn run_video<R>(
        &self,
        request: UploadRequest<R>,
        progress: &mut Progress<'_>,
    ) -> PipelineResult<videos::Model>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut video = self.authorize(&request.video_id, &request.principal).await?;

        let media_type = validate_media_type(request.media_type.as_deref(), |essence| {
            self.config.is_allowed_video_type(essence)
        })?;
        progress.advance(PipelineStage::Validated);

        let suffix = media_type_to_extension(&media_type);
        let original = self
            .stage_body(request.body, self.config.max_upload_size as u64, &suffix)
            .await?;
        progress.advance(PipelineStage::Staged);

        let mut processed = self
            .transcoder
            .process(&self.staging, original.path())
            .await?;
        original.release();
        progress.advance(PipelineStage::Transcoded);

        let classification = self.inspector.classify(processed.path()).await?;
        progress.advance(PipelineStage::Classified);

        let reference = self.new_reference(&media_type, classification.as_str())?;
        progress.advance(PipelineStage::Keyed);

        self.put(&reference, &mut processed, &media_type).await?;
        processed.release();
        progress.advance(PipelineStage::Uploaded);

        video.video_url = Some(reference.encode());
        let video = self.commit(video, &reference).await?;
        progress.advance(PipelineStage::Referenced);

        Ok(video)
    }

    /// Stage, store and reference a thumbnail image. No transcode or classification.
    pub async fn upload_thumbnail<R>(&self, request: UploadRequest<R>) -> PipelineResult<VideoView>
    where
        R: AsyncRead + Unpin + Send,
    {
        let video_id = request.video_id.clone();
        match self.run_thumbnail(request).await {
            Ok(video) => {
                tracing::info!(video_id = %video_id, "Thumbnail referenced");
                Ok(self.presign_committed(video).await)
            }
            Err(e) => {
                tracing::warn!(video_id = %video_id, "Thumbnail upload aborted: {}", e);
                Err(e)
            }
        }
    }

    async fn run_thumbnail<R>(&self, request: UploadRequest<R>) -> PipelineResult<videos::Model>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut video = self.authorize(&request.video_id, &request.principal).await?;

        let media_type = validate_media_type(request.media_type.as_deref(), |essence| {
            self.config.is_allowed_thumbnail_type(essence)
        })?;

        let mut staged = self
            .stage_body(request.body, self.config.max_thumbnail_size as u64, "")
            .await?;

        let reference = self.new_reference(&media_type, THUMBNAIL_PREFIX)?;
        self.put(&reference, &mut staged, &media_type).await?;
        staged.release();

        video.thumbnail_url = Some(reference.encode());
        self.commit(video, &reference).await
    }

    async fn stage_body<R>(&self, body: R, limit: u64, suffix: &str) -> PipelineResult<StagedFile>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut staged = self.staging.create(suffix).await?;
        let written = staged.write_from(body, limit).await?;
        staged.rewind().await?;

        if written == 0 {
            return Err(PipelineError::InvalidInput("upload is empty".to_string()));
        }
        Ok(staged)
    }

    fn new_reference(&self, media_type: &str, prefix: &str) -> PipelineResult<StorageReference> {
        let key = generate_key(media_type, Some(prefix))?;
        Ok(StorageReference::new(self.objects.bucket(), key)?)
    }

    async fn put(
        &self,
        reference: &StorageReference,
        staged: &mut StagedFile,
        content_type: &str,
    ) -> PipelineResult<()> {
        staged.rewind().await?;
        let after = self.config.upload_timeout();

        tokio::time::timeout(
            after,
            self.objects
                .put_object(reference, Box::new(staged.handle()), content_type),
        )
        .await
        .map_err(|_| PipelineError::TimedOut {
            step: "upload",
            after,
        })??;
        Ok(())
    }

    /// Persist the reference. On failure the fresh object is orphaned: try to
    /// delete it and report the inconsistency either way.
    async fn commit(
        &self,
        video: videos::Model,
        reference: &StorageReference,
    ) -> PipelineResult<videos::Model> {
        match self.videos.update(video).await {
            Ok(video) => Ok(video),
            Err(source) => {
                tracing::error!(
                    bucket = %reference.bucket(),
                    key = %reference.key(),
                    "Object uploaded but record update failed: {}",
                    source
                );
                if let Err(e) = self.objects.delete_object(reference).await {
                    tracing::error!(
                        bucket = %reference.bucket(),
                        key = %reference.key(),
                        "Failed to delete orphaned object: {}",
                        e
                    );
                }
                Err(PipelineError::UploadedButUnreferenced {
                    bucket: reference.bucket().to_string(),
                    key: reference.key().to_string(),
                    source,
                })
            }
        }
    }
}

fn view(
    video: videos::Model,
    video_url: Option<PresignedUrl>,
    thumbnail_url: Option<PresignedUrl>,
) -> VideoView {
    VideoView {
        id: video.id,
        user_id: video.user_id,
        title: video.title,
        description: video.description,
        video_url,
        thumbnail_url,
        created_at: video.created_at,
        updated_at: video.updated_at,
    }
}

/// Parse a declared content type and check its essence against an allow-list.
fn validate_media_type(
    declared: Option<&str>,
    allowed: impl Fn(&str) -> bool,
) -> PipelineResult<String> {
    let declared = declared
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| PipelineError::InvalidInput("missing media type".to_string()))?;

    let parsed: mime::Mime = declared
        .parse()
        .map_err(|_| PipelineError::InvalidInput(format!("malformed media type: {}", declared)))?;

    let essence = parsed.essence_str().to_ascii_lowercase();
    if !allowed(&essence) {
        return Err(PipelineError::InvalidInput(format!(
            "unsupported media type: {}",
            essence
        )));
    }
    Ok(essence)
}
