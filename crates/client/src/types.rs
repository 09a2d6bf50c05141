//! Options, notifications and shared state of upload sessions.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use uploadtus_protocol::{SessionSnapshot, SessionState};
use uploadtus_transfer::DEFAULT_CHUNK_SIZE;

use crate::error::TransportError;
use crate::resume::ResumeStore;
use crate::retry::RetryPolicy;

/// Default capacity of the per-session event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Configuration of one upload session.
#[derive(Clone)]
pub struct UploadOptions {
    /// tus creation endpoint.
    pub endpoint: String,
    /// Maximum bytes per PATCH.
    pub chunk_size: usize,
    pub retry: RetryPolicy,
    /// Upload created earlier; the session continues it instead of creating.
    pub upload_url: Option<String>,
    /// Offset already held by the remote for `upload_url`. Skips the
    /// initial offset query when set.
    pub resume_offset: Option<u64>,
    pub resume_store: Option<Arc<dyn ResumeStore>>,
    pub remove_fingerprint_on_success: bool,
    /// Attach `Upload-Checksum` to every chunk.
    pub checksum: bool,
    /// Delete the remote upload when the session is cancelled.
    pub terminate_on_cancel: bool,
    pub event_buffer: usize,
}

impl UploadOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            upload_url: None,
            resume_offset: None,
            resume_store: None,
            remove_fingerprint_on_success: false,
            checksum: false,
            terminate_on_cancel: false,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry = RetryPolicy::new(delays);
        self
    }

    /// Continues an existing upload, optionally from a known offset.
    pub fn resume(mut self, upload_url: impl Into<String>, offset: Option<u64>) -> Self {
        self.upload_url = Some(upload_url.into());
        self.resume_offset = offset;
        self
    }

    pub fn with_resume_store(mut self, store: Arc<dyn ResumeStore>) -> Self {
        self.resume_store = Some(store);
        self
    }

    pub fn remove_fingerprint_on_success(mut self, remove: bool) -> Self {
        self.remove_fingerprint_on_success = remove;
        self
    }

    pub fn with_checksum(mut self, enabled: bool) -> Self {
        self.checksum = enabled;
        self
    }

    pub fn terminate_on_cancel(mut self, terminate: bool) -> Self {
        self.terminate_on_cancel = terminate;
        self
    }
}

/// Notification delivered to the collaborator.
///
/// Sent in order on the session's channel. `Progress` values never
/// decrease, and `Succeeded` or `Failed` is always the last event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    /// Percentage of the payload accepted by the remote.
    Progress { percent: u8 },
    /// A chunk was accepted.
    ChunkComplete {
        chunk_size: u64,
        bytes_accepted: u64,
        bytes_total: u64,
    },
    Succeeded { upload_url: String },
    Failed { message: String },
}

/// Terminal result of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Succeeded {
        upload_url: String,
    },
    Failed {
        message: String,
        /// Last exchange error, when the failure came from the transport.
        error: Option<TransportError>,
    },
    Aborted,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Shared, lock-protected session snapshot.
///
/// Written only by the session task; read by any number of handles.
#[derive(Debug)]
pub(crate) struct SessionRecord {
    inner: RwLock<SessionSnapshot>,
}

impl SessionRecord {
    pub(crate) fn new(session_id: String, total_bytes: u64) -> Self {
        Self {
            inner: RwLock::new(SessionSnapshot {
                session_id,
                state: SessionState::Idle,
                total_bytes,
                bytes_accepted: 0,
                current_attempt: 0,
                upload_url: None,
                error: String::new(),
            }),
        }
    }

    fn update(&self, f: impl FnOnce(&mut SessionSnapshot)) {
        let mut s = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut s);
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.update(|s| s.state = state);
    }

    /// Records accepted bytes. The counter never moves backwards.
    pub(crate) fn set_accepted(&self, bytes_accepted: u64) {
        self.update(|s| {
            s.bytes_accepted = s.bytes_accepted.max(bytes_accepted.min(s.total_bytes));
            s.current_attempt = 0;
        });
    }

    pub(crate) fn set_attempt(&self, attempt: u32) {
        self.update(|s| s.current_attempt = attempt);
    }

    pub(crate) fn set_upload_url(&self, upload_url: Option<String>) {
        self.update(|s| s.upload_url = upload_url);
    }

    pub(crate) fn fail(&self, error: &str) {
        self.update(|s| {
            s.state = SessionState::Failed;
            s.error = error.to_string();
        });
    }
}
