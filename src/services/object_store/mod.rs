pub mod memory;
pub mod s3;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

use crate::models::{PresignedUrl, StorageReference};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object write failed: {0}")]
    WriteFailed(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("presign failed: {0}")]
    PresignFailed(String),

    #[error("object delete failed: {0}")]
    DeleteFailed(String),

    #[error("access denied: {0}")]
    AccessDenied(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Durable, content-addressed artifact storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket new artifacts are written to.
    fn bucket(&self) -> &str;

    /// Stream `body` to the store. Returns once the store acknowledges receipt.
    /// Not retried here.
    async fn put_object<'a>(
        &self,
        reference: &StorageReference,
        body: Box<dyn AsyncRead + Unpin + Send + 'a>,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Mint a read URL valid for `expires_in`. Computed locally; the object
    /// is not checked for existence.
    async fn presign_get(
        &self,
        reference: &StorageReference,
        expires_in: Duration,
    ) -> StorageResult<PresignedUrl>;

    async fn delete_object(&self, reference: &StorageReference) -> StorageResult<()>;
}

/// Reject validity windows that are empty or longer than `max`.
pub fn validate_expiry(expires_in: Duration, max: Duration) -> StorageResult<()> {
    if expires_in.is_zero() {
        return Err(StorageError::InvalidReference(
            "validity window must be positive".to_string(),
        ));
    }
    if expires_in > max {
        return Err(StorageError::InvalidReference(format!(
            "validity window of {}s exceeds the maximum of {}s",
            expires_in.as_secs(),
            max.as_secs()
        )));
    }
    Ok(())
}
