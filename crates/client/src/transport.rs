//! Transport trait: the wire seam between a session and the remote side.
//!
//! [`HttpTransport`](crate::http::HttpTransport) speaks tus over HTTP.
//! Keeping the seam a trait lets session logic be tested with scripted
//! mocks and lets callers plug in other carriers.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::TransportError;

/// Boxed future returned by [`Transport`] methods.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Upload state as reported by the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteOffset {
    /// Bytes the remote holds for this upload.
    pub offset: u64,
    /// Declared upload length, when the remote reports one.
    pub length: Option<u64>,
}

/// Abstract connection to an upload endpoint.
///
/// Every method is a single exchange. Implementations classify failures
/// into [`TransportError`] and never retry on their own.
pub trait Transport: Send + Sync {
    /// Registers a new upload of `upload_length` bytes and returns its URL.
    fn create<'a>(
        &'a self,
        endpoint: &'a str,
        upload_length: u64,
        metadata: &'a BTreeMap<String, String>,
    ) -> TransportFuture<'a, String>;

    /// Appends `data` at `offset` and returns the remote's new offset.
    ///
    /// Must be safe to repeat with the same offset.
    fn patch<'a>(
        &'a self,
        upload_url: &'a str,
        offset: u64,
        data: &'a [u8],
        checksum: Option<&'a str>,
    ) -> TransportFuture<'a, u64>;

    /// Queries how many bytes the remote holds.
    fn head<'a>(&'a self, upload_url: &'a str) -> TransportFuture<'a, RemoteOffset>;

    /// Deletes the upload on the remote side.
    fn terminate<'a>(&'a self, upload_url: &'a str) -> TransportFuture<'a, ()>;
}
