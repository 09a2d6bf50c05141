//! Chunk planning, progress accounting and payload primitives for
//! resumable uploads.

mod chunked;
mod progress;
mod types;
mod validation;

pub use chunked::{ChunkPlan, checksum_header_value, fingerprint};
pub use progress::{ProgressTracker, percent};
pub use types::{Chunk, Payload};
pub use validation::validate_metadata_key;

/// Default chunk size in bytes.
///
/// Small enough that a dropped connection on a mobile link loses little
/// work; callers uploading large files should raise it.
pub const DEFAULT_CHUNK_SIZE: usize = 20_000;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("chunk size must be at least 1 byte")]
    ZeroChunkSize,

    #[error("resume offset {offset} is beyond payload length {total}")]
    ResumeOffsetOutOfRange { offset: u64, total: u64 },

    #[error("invalid metadata key: {0}")]
    InvalidMetadataKey(String),
}
