//! In-process object store for development and tests.
//!
//! Presigned URLs have the form
//! `memory://{bucket}/{key}?X-Expires={unix}&X-Signature={hex}` where the
//! signature is HMAC-SHA256 over method, bucket, key and expiry, keyed with a
//! per-store secret. [`MemoryObjectStore::fetch_at`] plays the role of the
//! store's front door and rejects tampered or expired URLs.

use super::{ObjectStore, StorageError, StorageResult, validate_expiry};
use crate::models::{PresignedUrl, StorageReference};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

pub struct MemoryObjectStore {
    bucket: String,
    secret: [u8; 32],
    max_presign_expiry: Duration,
    objects: Mutex<HashMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new(bucket: String, max_presign_expiry: Duration) -> Self {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self {
            bucket,
            secret,
            max_presign_expiry,
            objects: Mutex::new(HashMap::new()),
        }
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), StoredObject>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, reference: &StorageReference) -> Option<StoredObject> {
        self.objects()
            .get(&(reference.bucket().to_string(), reference.key().to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects().len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects().keys().map(|(_, key)| key.clone()).collect()
    }

    fn sign(&self, bucket: &str, key: &str, expires: i64) -> StorageResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;
        mac.update(format!("GET\n{}\n{}\n{}", bucket, key, expires).as_bytes());
        Ok(mac)
    }

    /// Presign as if the current time were `now`.
    pub fn presign_at(
        &self,
        reference: &StorageReference,
        expires_in: Duration,
        now: DateTime<Utc>,
    ) -> StorageResult<PresignedUrl> {
        validate_expiry(expires_in, self.max_presign_expiry)?;

        let expires_at = now
            + chrono::Duration::from_std(expires_in)
                .map_err(|e| StorageError::InvalidReference(e.to_string()))?;
        let expires = expires_at.timestamp();
        let signature = hex::encode(
            self.sign(reference.bucket(), reference.key(), expires)?
                .finalize()
                .into_bytes(),
        );

        let mut url = Url::parse(&format!("memory://{}/", reference.bucket()))
            .map_err(|e| StorageError::InvalidReference(e.to_string()))?;
        url.set_path(reference.key());
        url.query_pairs_mut()
            .append_pair("X-Expires", &expires.to_string())
            .append_pair("X-Signature", &signature);

        Ok(PresignedUrl {
            url: url.to_string(),
            expires_at,
        })
    }

    /// Serve a presigned URL as the store would at instant `now`.
    pub fn fetch_at(&self, presigned: &str, now: DateTime<Utc>) -> StorageResult<Vec<u8>> {
        let url = Url::parse(presigned)
            .map_err(|e| StorageError::AccessDenied(format!("unparseable url: {}", e)))?;

        let bucket = url
            .host_str()
            .ok_or_else(|| StorageError::AccessDenied("missing bucket".to_string()))?
            .to_string();
        let key = url.path().trim_start_matches('/').to_string();

        let mut expires = None;
        let mut signature = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "X-Expires" => expires = value.parse::<i64>().ok(),
                "X-Signature" => signature = hex::decode(value.as_bytes()).ok(),
                _ => {}
            }
        }
        let (expires, signature) = expires
            .zip(signature)
            .ok_or_else(|| StorageError::AccessDenied("missing signature".to_string()))?;

        self.sign(&bucket, &key, expires)?
            .verify_slice(&signature)
            .map_err(|_| StorageError::AccessDenied("signature mismatch".to_string()))?;

        if now.timestamp() > expires {
            return Err(StorageError::AccessDenied("request has expired".to_string()));
        }

        self.objects()
            .get(&(bucket, key))
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::AccessDenied("no such key".to_string()))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object<'a>(
        &self,
        reference: &StorageReference,
        mut body: Box<dyn AsyncRead + Unpin + Send + 'a>,
        content_type: &str,
    ) -> StorageResult<()> {
        let mut data = Vec::new();
        body.read_to_end(&mut data)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("reading artifact: {}", e)))?;

        tracing::debug!(
            bucket = %reference.bucket(),
            key = %reference.key(),
            size = data.len(),
            "Stored object in memory"
        );

        self.objects().insert(
            (reference.bucket().to_string(), reference.key().to_string()),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn presign_get(
        &self,
        reference: &StorageReference,
        expires_in: Duration,
    ) -> StorageResult<PresignedUrl> {
        self.presign_at(reference, expires_in, Utc::now())
    }

    async fn delete_object(&self, reference: &StorageReference) -> StorageResult<()> {
        self.objects()
            .remove(&(reference.bucket().to_string(), reference.key().to_string()));
        Ok(())
    }
}
