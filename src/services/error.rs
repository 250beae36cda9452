use crate::models::ReferenceError;
use crate::services::inspector::InspectionError;
use crate::services::keys::KeyError;
use crate::services::object_store::StorageError;
use crate::services::staging::StagingError;
use crate::services::transcoder::TranscodeError;
use crate::services::video_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// One error per failed upload or read, whatever step it came from.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upload exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("authentication required")]
    Unauthenticated,

    #[error("video {0} is not owned by the caller")]
    Unauthorized(String),

    #[error("video {0} not found")]
    NotFound(String),

    #[error("inspection failed: {0}")]
    InspectionFailed(#[source] InspectionError),

    #[error("transcode failed: {0}")]
    TranscodeFailed(#[from] TranscodeError),

    #[error("staging failed: {0}")]
    StagingFailed(#[source] StagingError),

    #[error("storage write failed: {0}")]
    StorageWriteFailed(String),

    #[error("invalid storage reference: {0}")]
    InvalidReference(String),

    #[error("object {bucket}/{key} was uploaded but the record update failed: {source}")]
    UploadedButUnreferenced {
        bucket: String,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("record store error: {0}")]
    RecordStore(#[source] StoreError),

    #[error("{step} timed out after {after:?}")]
    TimedOut { step: &'static str, after: Duration },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl From<StagingError> for PipelineError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::LimitExceeded { limit } => PipelineError::PayloadTooLarge { limit },
            // A broken inbound stream is the client's failure, not ours.
            StagingError::SourceRead(e) => {
                PipelineError::InvalidInput(format!("upload stream interrupted: {}", e))
            }
            other => PipelineError::StagingFailed(other),
        }
    }
}

impl From<InspectionError> for PipelineError {
    fn from(err: InspectionError) -> Self {
        match err {
            InspectionError::NoVideoStream | InspectionError::MissingDimensions => {
                PipelineError::InvalidInput(err.to_string())
            }
            other => PipelineError::InspectionFailed(other),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => PipelineError::NotFound(id),
            other => PipelineError::RecordStore(other),
        }
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidReference(msg) => PipelineError::InvalidReference(msg),
            other => PipelineError::StorageWriteFailed(other.to_string()),
        }
    }
}

impl From<ReferenceError> for PipelineError {
    fn from(err: ReferenceError) -> Self {
        PipelineError::InvalidReference(err.to_string())
    }
}

impl From<KeyError> for PipelineError {
    fn from(err: KeyError) -> Self {
        PipelineError::StorageWriteFailed(err.to_string())
    }
}
