//! Resumable chunked uploads over the tus protocol.
//!
//! A caller hands a [`Payload`](uploadtus_transfer::Payload) and
//! [`UploadOptions`] to [`UploadClient::start`] and gets back a
//! [`SessionHandle`]. The session runs on its own tokio task, sends the
//! payload chunk by chunk, retries transient failures from a fixed delay
//! schedule and reports [`UploadEvent`]s until it succeeds, fails or is
//! cancelled.
//!
//! # Pipeline
//!
//! 1. **Resolve**: continue a known upload (explicit URL or resume store)
//!    or plan from byte zero
//! 2. **Create**: register the upload and obtain its URL
//! 3. **Upload**: PATCH each chunk, re-syncing the offset after failures
//! 4. **Finish**: publish the terminal outcome

pub mod driver;
pub mod error;
pub mod handle;
pub mod http;
pub mod resume;
pub mod retry;
mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
mod mock;

// Re-export primary types for convenience.
pub use driver::TransportDriver;
pub use error::{TransportError, UploadError};
pub use handle::{SessionHandle, UploadClient};
pub use http::{HttpTransport, HttpTransportBuilder};
pub use resume::{FileResumeStore, MemoryResumeStore, ResumeStore};
pub use retry::{Decision, RetryPolicy};
pub use transport::{RemoteOffset, Transport, TransportFuture};
pub use types::{DEFAULT_EVENT_BUFFER, SessionOutcome, UploadEvent, UploadOptions};
