//! `Upload-Metadata` header encoding.
//!
//! The header is a comma separated list of `key base64(value)` pairs. A key
//! with an empty value is written without the space and value part.

use std::collections::BTreeMap;

use base64::{Engine, engine::general_purpose::STANDARD};

/// Encodes metadata pairs into an `Upload-Metadata` header value.
///
/// Keys are expected to be validated already (no spaces, no commas).
pub fn encode_metadata(metadata: &BTreeMap<String, String>) -> String {
    metadata
        .iter()
        .map(|(key, value)| {
            if value.is_empty() {
                key.clone()
            } else {
                format!("{key} {}", STANDARD.encode(value.as_bytes()))
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
