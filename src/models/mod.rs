use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use utoipa::ToSchema;

/// Separator used when a reference is flattened into a single record column.
pub const REFERENCE_DELIMITER: char = ',';

/// Absolute tolerance used when matching a probed ratio against 16:9 and 9:16.
pub const ASPECT_RATIO_TOLERANCE: f64 = 0.01;

const LANDSCAPE_RATIO: f64 = 16.0 / 9.0;
const PORTRAIT_RATIO: f64 = 9.0 / 16.0;

/// Aspect-ratio bucket of an uploaded video. Also used as the storage key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Landscape,
    Portrait,
    Other,
}

impl Classification {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        if width == 0 || height == 0 {
            return Classification::Other;
        }

        let ratio = f64::from(width) / f64::from(height);
        if (ratio - LANDSCAPE_RATIO).abs() < ASPECT_RATIO_TOLERANCE {
            Classification::Landscape
        } else if (ratio - PORTRAIT_RATIO).abs() < ASPECT_RATIO_TOLERANCE {
            Classification::Portrait
        } else {
            Classification::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Landscape => "landscape",
            Classification::Portrait => "portrait",
            Classification::Other => "other",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("bucket must not be empty")]
    EmptyBucket,

    #[error("key must not be empty")]
    EmptyKey,

    #[error("bucket '{0}' contains the reference delimiter")]
    DelimiterInBucket(String),

    #[error("expected '<bucket>{REFERENCE_DELIMITER}<key>', got '{0}'")]
    Malformed(String),
}

/// Where an artifact lives in the object store: bucket plus key.
///
/// This, not a resolved URL, is what gets persisted. It is flattened into a
/// single column as `bucket,key`. Bucket names may never contain the
/// delimiter, so parsing splits on the first occurrence and keys are free to
/// contain it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageReference {
    bucket: String,
    key: String,
}

impl StorageReference {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Result<Self, ReferenceError> {
        let bucket = bucket.into();
        let key = key.into();

        if bucket.is_empty() {
            return Err(ReferenceError::EmptyBucket);
        }
        if bucket.contains(REFERENCE_DELIMITER) {
            return Err(ReferenceError::DelimiterInBucket(bucket));
        }
        if key.is_empty() {
            return Err(ReferenceError::EmptyKey);
        }

        Ok(Self { bucket, key })
    }

    pub fn parse(encoded: &str) -> Result<Self, ReferenceError> {
        let (bucket, key) = encoded
            .split_once(REFERENCE_DELIMITER)
            .ok_or_else(|| ReferenceError::Malformed(encoded.to_string()))?;
        Self::new(bucket, key)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn encode(&self) -> String {
        format!("{}{}{}", self.bucket, REFERENCE_DELIMITER, self.key)
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.bucket, REFERENCE_DELIMITER, self.key)
    }
}

/// Time-bounded read capability for one stored object. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// A video record as callers see it: stored references resolved to fresh
/// presigned URLs.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VideoView {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub video_url: Option<PresignedUrl>,
    pub thumbnail_url: Option<PresignedUrl>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_table() {
        assert_eq!(Classification::from_dimensions(1920, 1080), Classification::Landscape);
        assert_eq!(Classification::from_dimensions(960, 540), Classification::Landscape);
        assert_eq!(Classification::from_dimensions(1280, 720), Classification::Landscape);
        assert_eq!(Classification::from_dimensions(1080, 1920), Classification::Portrait);
        assert_eq!(Classification::from_dimensions(720, 1280), Classification::Portrait);
        assert_eq!(Classification::from_dimensions(1000, 1000), Classification::Other);
        assert_eq!(Classification::from_dimensions(640, 480), Classification::Other);
        assert_eq!(Classification::from_dimensions(1920, 0), Classification::Other);
    }

    #[test]
    fn test_classification_tolerance_is_absolute() {
        // 1.7867 is within 0.01 of 16/9, 1.7978 is not
        assert_eq!(Classification::from_dimensions(17867, 10000), Classification::Landscape);
        assert_eq!(Classification::from_dimensions(17978, 10000), Classification::Other);
        // 0.5625 +/- 0.009 stays portrait
        assert_eq!(Classification::from_dimensions(5715, 10000), Classification::Portrait);
        assert_eq!(Classification::from_dimensions(5730, 10000), Classification::Other);
    }

    #[test]
    fn test_reference_round_trip_with_delimiter_in_key() {
        let reference = StorageReference::new("videos", "landscape/a,b.mp4").unwrap();
        let encoded = reference.encode();
        assert_eq!(encoded, "videos,landscape/a,b.mp4");
        assert_eq!(StorageReference::parse(&encoded).unwrap(), reference);
    }

    #[test]
    fn test_reference_rejects_malformed_input() {
        assert_eq!(
            StorageReference::parse("no-delimiter"),
            Err(ReferenceError::Malformed("no-delimiter".to_string()))
        );
        assert_eq!(StorageReference::parse(",key"), Err(ReferenceError::EmptyBucket));
        assert_eq!(StorageReference::parse("bucket,"), Err(ReferenceError::EmptyKey));
        assert!(matches!(
            StorageReference::new("bad,bucket", "key"),
            Err(ReferenceError::DelimiterInBucket(_))
        ));
    }
}
