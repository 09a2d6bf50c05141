//! Transport driver: one session's view of the remote upload.
//!
//! Owns the upload URL once it exists, turns chunks into exchanges and
//! sanity-checks the offsets the remote reports.

use std::sync::Arc;

use tracing::{debug, info};

use uploadtus_transfer::{Chunk, Payload, checksum_header_value};

use crate::error::TransportError;
use crate::transport::{RemoteOffset, Transport};

pub struct TransportDriver {
    transport: Arc<dyn Transport>,
    endpoint: String,
    payload: Payload,
    upload_url: Option<String>,
    checksum: bool,
}

impl TransportDriver {
    pub fn new(transport: Arc<dyn Transport>, endpoint: String, payload: Payload) -> Self {
        Self {
            transport,
            endpoint,
            payload,
            upload_url: None,
            checksum: false,
        }
    }

    /// Sends an `Upload-Checksum` with every chunk.
    pub fn with_checksum(mut self, enabled: bool) -> Self {
        self.checksum = enabled;
        self
    }

    pub fn upload_url(&self) -> Option<&str> {
        self.upload_url.as_deref()
    }

    /// Targets an upload created earlier instead of creating a new one.
    pub fn set_upload_url(&mut self, upload_url: String) {
        self.upload_url = Some(upload_url);
    }

    /// Drops the upload URL so the next first chunk creates a new upload.
    pub fn forget_upload_url(&mut self) {
        self.upload_url = None;
    }

    /// Sends one chunk and returns the remote's cumulative offset.
    ///
    /// When `is_first` is set and no upload URL is known yet, the upload is
    /// created first. A zero-length chunk only creates.
    pub async fn send(&mut self, chunk: &Chunk, is_first: bool) -> Result<u64, TransportError> {
        if is_first && self.upload_url.is_none() {
            let url = self
                .transport
                .create(&self.endpoint, self.payload.len(), self.payload.metadata())
                .await?;
            info!(upload_url = %url, total = self.payload.len(), "upload registered");
            self.upload_url = Some(url);
        }

        let upload_url = self
            .upload_url
            .as_deref()
            .ok_or_else(|| TransportError::protocol("chunk sent before the upload was created"))?;

        if chunk.is_empty() {
            return Ok(chunk.offset);
        }

        let data = self.payload.slice(chunk);
        let checksum = self.checksum.then(|| checksum_header_value(data));
        let offset = self
            .transport
            .patch(upload_url, chunk.offset, data, checksum.as_deref())
            .await?;

        if offset < chunk.offset || offset > self.payload.len() {
            return Err(TransportError::protocol(format!(
                "remote reported offset {offset} for chunk at {} of {} bytes",
                chunk.offset,
                self.payload.len()
            )));
        }

        debug!(%upload_url, offset = chunk.offset, size = chunk.size, accepted = offset, "chunk accepted");
        Ok(offset)
    }

    /// Asks the remote how many bytes it holds for the current upload.
    pub async fn query_offset(&self) -> Result<RemoteOffset, TransportError> {
        let upload_url = self
            .upload_url
            .as_deref()
            .ok_or_else(|| TransportError::protocol("no upload to query"))?;
        let remote = self.transport.head(upload_url).await?;
        if remote.offset > self.payload.len() {
            return Err(TransportError::protocol(format!(
                "remote holds {} bytes of a {} byte payload",
                remote.offset,
                self.payload.len()
            )));
        }
        Ok(remote)
    }

    /// Deletes the current upload on the remote side, if there is one.
    pub async fn terminate(&self) -> Result<(), TransportError> {
        match self.upload_url.as_deref() {
            Some(upload_url) => self.transport.terminate(upload_url).await,
            None => Ok(()),
        }
    }
}
