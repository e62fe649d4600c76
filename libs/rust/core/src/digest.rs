//! Content hashing for registry identities.
//!
//! Values are serialized to canonical JSON before hashing: going through
//! `serde_json::Value` sorts object keys, so two structurally equal values hash
//! the same regardless of field declaration order.

use serde::Serialize;
use sha2::{Digest as _, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("value could not be canonicalized for hashing: {0}")]
pub struct DigestError(#[from] pub serde_json::Error);

pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// SHA-256 over the canonical JSON encoding of `value`, lower hex.
pub fn digest_value<T: Serialize + ?Sized>(value: &T) -> Result<String, DigestError> {
    let canonical = serde_json::to_value(value)?;
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(digest_bytes(&bytes))
}

/// Strip an optional `sha256:` algorithm prefix and lowercase.
pub fn normalize_digest(digest: &str) -> String {
    let d = digest.trim();
    d.strip_prefix("sha256:").unwrap_or(d).to_ascii_lowercase()
}
