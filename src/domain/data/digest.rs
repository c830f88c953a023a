use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 of the canonical JSON encoding of `value`, hex encoded.
pub fn digest<T: Serialize>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}
