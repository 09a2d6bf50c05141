//! tus protocol constants.

/// Protocol version sent in every `Tus-Resumable` header.
pub const TUS_VERSION: &str = "1.0.0";

pub const HEADER_TUS_RESUMABLE: &str = "Tus-Resumable";
pub const HEADER_UPLOAD_LENGTH: &str = "Upload-Length";
pub const HEADER_UPLOAD_OFFSET: &str = "Upload-Offset";
pub const HEADER_UPLOAD_METADATA: &str = "Upload-Metadata";
pub const HEADER_UPLOAD_CHECKSUM: &str = "Upload-Checksum";

/// Content type required on every PATCH body.
pub const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

/// Algorithm name used with the checksum extension.
pub const CHECKSUM_ALGORITHM: &str = "sha256";

/// Returned by a server when the `Upload-Checksum` does not match the body.
pub const STATUS_CHECKSUM_MISMATCH: u16 = 460;

/// 4xx statuses that tus clients still treat as transient: offset
/// conflict, upload locked, checksum mismatch.
pub const RETRYABLE_CLIENT_STATUSES: [u16; 3] = [409, 423, STATUS_CHECKSUM_MISMATCH];

/// Statuses on a HEAD request meaning the upload URL is gone for good.
pub const GONE_STATUSES: [u16; 3] = [403, 404, 410];
