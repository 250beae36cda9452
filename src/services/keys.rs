//! Storage key derivation.
//!
//! Key format: `{random}{extension}`, or `{prefix}/{random}{extension}` when a
//! prefix (usually a [`Classification`](crate::models::Classification)) is given.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

/// Bytes of entropy behind every key.
pub const KEY_ENTROPY_BYTES: usize = 32;

const FALLBACK_EXTENSION: &str = ".bin";

#[derive(Error, Debug)]
#[error("secure random source unavailable: {0}")]
pub struct KeyError(#[from] rand::Error);

/// Map a media type to a file extension: `video/mp4` -> `.mp4`.
///
/// Anything that is not exactly `type/subtype` maps to `.bin`. Parameters
/// (`; codecs=...`) are dropped first.
pub fn media_type_to_extension(media_type: &str) -> String {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    let mut parts = essence.split('/');

    match (parts.next(), parts.next(), parts.next()) {
        (Some(kind), Some(subtype), None) if !kind.is_empty() && !subtype.is_empty() => {
            format!(".{}", subtype.to_ascii_lowercase())
        }
        _ => FALLBACK_EXTENSION.to_string(),
    }
}

/// Derive an unguessable object key for an artifact of `media_type`.
///
/// Uniqueness is statistical (256 bits from the OS RNG); collisions are never checked.
pub fn generate_key(media_type: &str, prefix: Option<&str>) -> Result<String, KeyError> {
    let mut id = [0u8; KEY_ENTROPY_BYTES];
    OsRng.try_fill_bytes(&mut id)?;

    let random = URL_SAFE_NO_PAD.encode(id);
    let extension = media_type_to_extension(media_type);

    Ok(match prefix {
        Some(prefix) => format!("{}/{}{}", prefix.trim_matches('/'), random, extension),
        None => format!("{}{}", random, extension),
    })
}
