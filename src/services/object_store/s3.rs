use super::{ObjectStore, StorageError, StorageResult, validate_expiry};
use crate::models::{PresignedUrl, StorageReference};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};

// S3 rejects multipart parts smaller than this, except the last one.
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    chunk_size: usize,
    max_presign_expiry: Duration,
}

impl S3ObjectStore {
    pub fn new(
        client: Client,
        bucket: String,
        chunk_size: usize,
        max_presign_expiry: Duration,
    ) -> Self {
        Self {
            client,
            bucket,
            chunk_size: chunk_size.max(MIN_PART_SIZE),
            max_presign_expiry,
        }
    }

    async fn upload_parts(
        &self,
        reference: &StorageReference,
        upload_id: &str,
        first_chunk: Vec<u8>,
        reader: &mut (dyn AsyncRead + Unpin + Send + '_),
    ) -> StorageResult<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut part_number = 1;
        let mut chunk = first_chunk;

        loop {
            let upload_part_res = self
                .client
                .upload_part()
                .bucket(reference.bucket())
                .key(reference.key())
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| StorageError::WriteFailed(DisplayErrorContext(&e).to_string()))?;

            parts.push(
                CompletedPart::builder()
                    .e_tag(upload_part_res.e_tag().unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );

            chunk = read_chunk(reader, self.chunk_size).await?;
            if chunk.is_empty() {
                break;
            }
            part_number += 1;
        }

        Ok(parts)
    }

    async fn put_multipart(
        &self,
        reference: &StorageReference,
        first_chunk: Vec<u8>,
        reader: &mut (dyn AsyncRead + Unpin + Send + '_),
        content_type: &str,
    ) -> StorageResult<()> {
        let multipart_upload_res = self
            .client
            .create_multipart_upload()
            .bucket(reference.bucket())
            .key(reference.key())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::WriteFailed(DisplayErrorContext(&e).to_string()))?;

        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| StorageError::WriteFailed("No upload ID".to_string()))?
            .to_string();

        let parts = match self
            .upload_parts(reference, &upload_id, first_chunk, reader)
            .await
        {
            Ok(parts) => parts,
            Err(e) => {
                self.abort(reference, &upload_id).await;
                return Err(e);
            }
        };

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        if let Err(e) = self
            .client
            .complete_multipart_upload()
            .bucket(reference.bucket())
            .key(reference.key())
            .upload_id(&upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
        {
            self.abort(reference, &upload_id).await;
            return Err(StorageError::WriteFailed(
                DisplayErrorContext(&e).to_string(),
            ));
        }

        Ok(())
    }

    async fn abort(&self, reference: &StorageReference, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(reference.bucket())
            .key(reference.key())
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!(
                "Failed to abort multipart upload {} for {}: {}",
                upload_id,
                reference,
                DisplayErrorContext(&e)
            );
        }
    }
}

/// Fill up to `size` bytes; shorter only at end of stream.
async fn read_chunk(
    reader: &mut (dyn AsyncRead + Unpin + Send + '_),
    size: usize,
) -> StorageResult<Vec<u8>> {
    let mut buffer = vec![0u8; size];
    let mut n = 0;
    while n < size {
        let read = reader
            .read(&mut buffer[n..])
            .await
            .map_err(|e| StorageError::WriteFailed(format!("reading artifact: {}", e)))?;
        if read == 0 {
            break;
        }
        n += read;
    }
    buffer.truncate(n);
    Ok(buffer)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object<'a>(
        &self,
        reference: &StorageReference,
        mut body: Box<dyn AsyncRead + Unpin + Send + 'a>,
        content_type: &str,
    ) -> StorageResult<()> {
        let start = Instant::now();
        let first_chunk = read_chunk(body.as_mut(), self.chunk_size).await?;

        if first_chunk.len() < self.chunk_size {
            let size = first_chunk.len();
            self.client
                .put_object()
                .bucket(reference.bucket())
                .key(reference.key())
                .content_type(content_type)
                .body(ByteStream::from(first_chunk))
                .send()
                .await
                .map_err(|e| {
                    tracing::error!(
                        bucket = %reference.bucket(),
                        key = %reference.key(),
                        "S3 put_object failed: {}",
                        DisplayErrorContext(&e)
                    );
                    StorageError::WriteFailed(DisplayErrorContext(&e).to_string())
                })?;

            tracing::info!(
                bucket = %reference.bucket(),
                key = %reference.key(),
                size,
                duration_ms = start.elapsed().as_millis() as u64,
                "S3 upload successful"
            );
            return Ok(());
        }

        self.put_multipart(reference, first_chunk, body.as_mut(), content_type)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    bucket = %reference.bucket(),
                    key = %reference.key(),
                    "S3 multipart upload failed: {}",
                    e
                );
            })?;

        tracing::info!(
            bucket = %reference.bucket(),
            key = %reference.key(),
            duration_ms = start.elapsed().as_millis() as u64,
            "S3 multipart upload successful"
        );
        Ok(())
    }

    async fn presign_get(
        &self,
        reference: &StorageReference,
        expires_in: Duration,
    ) -> StorageResult<PresignedUrl> {
        validate_expiry(expires_in, self.max_presign_expiry)?;

        let presigning_config = PresigningConfig::builder()
            .expires_in(expires_in)
            .build()
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let issued_at = Utc::now();
        let presigned_request = self
            .client
            .get_object()
            .bucket(reference.bucket())
            .key(reference.key())
            .presigned(presigning_config)
            .await
            .map_err(|e| StorageError::PresignFailed(DisplayErrorContext(&e).to_string()))?;

        let expires_at = issued_at
            + chrono::Duration::from_std(expires_in)
                .map_err(|e| StorageError::InvalidReference(e.to_string()))?;

        Ok(PresignedUrl {
            url: presigned_request.uri().to_string(),
            expires_at,
        })
    }

    async fn delete_object(&self, reference: &StorageReference) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(reference.bucket())
            .key(reference.key())
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}
