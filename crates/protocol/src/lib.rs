//! Wire-level vocabulary of the tus resumable upload protocol.
//!
//! Shared by the transfer primitives and the HTTP client so header names,
//! status values and the `Upload-Metadata` encoding live in one place.

pub mod constants;
pub mod metadata;
pub mod types;

// Re-export primary types for convenience.
pub use metadata::encode_metadata;
pub use types::{SessionSnapshot, SessionState};
