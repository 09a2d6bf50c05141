//! Starting upload sessions and observing them from the outside.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use uploadtus_protocol::SessionSnapshot;
use uploadtus_transfer::{Payload, TransferError};

use crate::error::UploadError;
use crate::http::HttpTransport;
use crate::session::UploadSession;
use crate::transport::Transport;
use crate::types::{SessionOutcome, SessionRecord, UploadEvent, UploadOptions};

/// Starts upload sessions over a shared transport.
///
/// Sessions are independent: each runs on its own tokio task and shares
/// nothing but the transport.
#[derive(Clone)]
pub struct UploadClient {
    transport: Arc<dyn Transport>,
}

impl UploadClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Client speaking tus over HTTP with default settings.
    pub fn http() -> Result<Self, UploadError> {
        Ok(Self::new(Arc::new(HttpTransport::new()?)))
    }

    /// Validates `options` and spawns a session uploading `payload`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        payload: Payload,
        options: UploadOptions,
    ) -> Result<SessionHandle, UploadError> {
        validate(&payload, &options)?;

        let id = uuid::Uuid::new_v4().to_string();
        let record = Arc::new(SessionRecord::new(id.clone(), payload.len()));
        let (events_tx, events_rx) = mpsc::channel(options.event_buffer.max(1));
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        debug!(
            session_id = %id,
            endpoint = %options.endpoint,
            total = payload.len(),
            "starting upload session"
        );

        let session = UploadSession::new(
            self.transport.clone(),
            payload,
            options,
            record.clone(),
            events_tx,
            cancel.clone(),
        );
        tokio::spawn(async move {
            let outcome = session.run().await;
            let _ = outcome_tx.send(Some(outcome));
        });

        Ok(SessionHandle {
            id,
            cancel,
            record,
            events: Mutex::new(Some(events_rx)),
            outcome: outcome_rx,
        })
    }
}

fn validate(payload: &Payload, options: &UploadOptions) -> Result<(), UploadError> {
    if options.chunk_size == 0 {
        return Err(TransferError::ZeroChunkSize.into());
    }

    let endpoint = reqwest::Url::parse(&options.endpoint)
        .map_err(|e| UploadError::InvalidEndpoint(format!("{}: {e}", options.endpoint)))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(UploadError::InvalidEndpoint(format!(
            "{}: unsupported scheme {}",
            options.endpoint,
            endpoint.scheme()
        )));
    }

    if let Some(offset) = options.resume_offset {
        if options.upload_url.is_none() {
            return Err(UploadError::ResumeOffsetWithoutUrl);
        }
        if offset > payload.len() {
            return Err(TransferError::ResumeOffsetOutOfRange {
                offset,
                total: payload.len(),
            }
            .into());
        }
    }
    Ok(())
}

/// Caller's view of a running session.
pub struct SessionHandle {
    id: String,
    cancel: CancellationToken,
    record: Arc<SessionRecord>,
    events: Mutex<Option<mpsc::Receiver<UploadEvent>>>,
    outcome: watch::Receiver<Option<SessionOutcome>>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Requests cancellation. Idempotent; has no effect once the session
    /// reached a terminal state.
    pub fn cancel(&self) {
        if !self.is_finished() && !self.cancel.is_cancelled() {
            debug!(session_id = %self.id, "cancelling upload session");
        }
        self.cancel.cancel();
    }

    /// Takes the event receiver. Returns `None` after the first call.
    pub fn take_events(&self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.record.snapshot()
    }

    /// Returns `true` once the session published its outcome.
    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Waits for the terminal outcome.
    ///
    /// Events not yet claimed with [`take_events`](Self::take_events) are
    /// discarded so an unread channel cannot stall the session.
    pub async fn wait(&self) -> SessionOutcome {
        drop(self.take_events());

        let mut outcome = self.outcome.clone();
        let result = outcome
            .wait_for(Option::is_some)
            .await
            .map(|o| (*o).clone());
        match result {
            Ok(Some(outcome)) => outcome,
            _ => SessionOutcome::Failed {
                message: "upload task stopped unexpectedly".into(),
                error: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::mock::MockTransport;
    use uploadtus_protocol::SessionState;

    fn client(mock: &Arc<MockTransport>) -> UploadClient {
        UploadClient::new(mock.clone())
    }

    fn payload(len: usize) -> Payload {
        Payload::from_bytes(vec![7u8; len])
            .with_metadata("filename", "photo_1.jpeg")
            .unwrap()
    }

    #[tokio::test]
    async fn start_and_wait() {
        let mock = Arc::new(MockTransport::new());
        let handle = client(&mock)
            .start(payload(50_000), UploadOptions::new("http://tus.test/files"))
            .unwrap();

        let mut events = handle.take_events().unwrap();
        let mut percents = Vec::new();
        let mut terminal = None;
        while let Some(event) = events.recv().await {
            match event {
                UploadEvent::Progress { percent } => percents.push(percent),
                UploadEvent::ChunkComplete { .. } => {}
                other => terminal = Some(other),
            }
        }

        assert_eq!(percents, vec![40, 80, 100]);
        assert_eq!(
            terminal,
            Some(UploadEvent::Succeeded {
                upload_url: mock.upload_url()
            })
        );
        assert!(handle.wait().await.is_success());
        assert!(handle.is_finished());

        let snap = handle.snapshot();
        assert_eq!(snap.session_id, handle.id());
        assert_eq!(snap.state, SessionState::Succeeded);
        assert_eq!(snap.bytes_accepted, 50_000);
    }

    #[tokio::test]
    async fn events_taken_once() {
        let mock = Arc::new(MockTransport::new());
        let handle = client(&mock)
            .start(payload(10), UploadOptions::new("http://tus.test/files"))
            .unwrap();
        assert!(handle.take_events().is_some());
        assert!(handle.take_events().is_none());
        handle.wait().await;
    }

    #[tokio::test]
    async fn wait_without_reading_events_does_not_stall() {
        let mock = Arc::new(MockTransport::new());
        let options = UploadOptions {
            event_buffer: 1,
            ..UploadOptions::new("http://tus.test/files").with_chunk_size(10)
        };
        let handle = client(&mock).start(payload(1_000), options).unwrap();

        assert!(handle.wait().await.is_success());
        assert_eq!(mock.patch_offsets().len(), 100);
    }

    #[tokio::test]
    async fn cancel_reaches_session_blocked_on_unread_events() {
        let mock = Arc::new(MockTransport::new());
        let options = UploadOptions {
            event_buffer: 1,
            ..UploadOptions::new("http://tus.test/files").with_chunk_size(10)
        };
        let handle = client(&mock).start(payload(1_000), options).unwrap();
        let _events = handle.take_events().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        handle.cancel();

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(2), handle.wait()).await;
        assert_eq!(outcome, Ok(SessionOutcome::Aborted));
        assert_eq!(handle.snapshot().state, SessionState::Aborted);
        assert!(mock.patch_offsets().len() < 100);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let mock = Arc::new(MockTransport::new());
        let stalled = mock.stall_patch(0);
        let handle = client(&mock)
            .start(payload(100), UploadOptions::new("http://tus.test/files"))
            .unwrap();

        stalled.notified().await;
        handle.cancel();
        handle.cancel();

        assert_eq!(handle.wait().await, SessionOutcome::Aborted);
        assert_eq!(handle.snapshot().state, SessionState::Aborted);
        handle.cancel();
        assert_eq!(handle.snapshot().state, SessionState::Aborted);
    }

    #[tokio::test]
    async fn cancel_after_success_is_noop() {
        let mock = Arc::new(MockTransport::new());
        let handle = client(&mock)
            .start(payload(100), UploadOptions::new("http://tus.test/files"))
            .unwrap();

        assert!(handle.wait().await.is_success());
        handle.cancel();
        assert_eq!(handle.snapshot().state, SessionState::Succeeded);
        assert!(handle.wait().await.is_success());
    }

    #[tokio::test]
    async fn failure_reaches_wait() {
        let mock = Arc::new(MockTransport::new());
        mock.fail_create(TransportError::from_status(403, "forbidden"));
        let handle = client(&mock)
            .start(payload(100), UploadOptions::new("http://tus.test/files"))
            .unwrap();

        let SessionOutcome::Failed { message, error } = handle.wait().await else {
            panic!("expected failure");
        };
        assert!(message.contains("403"));
        assert_eq!(error.and_then(|e| e.status()), Some(403));
        assert_eq!(handle.snapshot().error, message);
    }

    #[tokio::test]
    async fn sessions_run_independently() {
        let first = Arc::new(MockTransport::new());
        let second = Arc::new(MockTransport::new());
        let stalled = first.stall_patch(0);

        let a = client(&first)
            .start(payload(100), UploadOptions::new("http://tus.test/files"))
            .unwrap();
        let b = client(&second)
            .start(payload(100), UploadOptions::new("http://tus.test/files"))
            .unwrap();

        assert!(b.wait().await.is_success());
        stalled.notified().await;
        assert!(!a.is_finished());
        a.cancel();
        assert_eq!(a.wait().await, SessionOutcome::Aborted);
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn rejects_zero_chunk_size() {
        let mock = Arc::new(MockTransport::new());
        let err = client(&mock)
            .start(
                payload(10),
                UploadOptions::new("http://tus.test/files").with_chunk_size(0),
            )
            .err()
            .unwrap();
        assert!(matches!(
            err,
            UploadError::Transfer(TransferError::ZeroChunkSize)
        ));
    }

    #[tokio::test]
    async fn rejects_invalid_endpoint() {
        let mock = Arc::new(MockTransport::new());
        for endpoint in ["not a url", "ftp://tus.test/files"] {
            let err = client(&mock)
                .start(payload(10), UploadOptions::new(endpoint))
                .err()
                .unwrap();
            assert!(matches!(err, UploadError::InvalidEndpoint(_)), "{endpoint}");
        }
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn rejects_bad_resume_offsets() {
        let mock = Arc::new(MockTransport::new());
        let mut options = UploadOptions::new("http://tus.test/files");
        options.resume_offset = Some(5);
        let err = client(&mock).start(payload(10), options).err().unwrap();
        assert!(matches!(err, UploadError::ResumeOffsetWithoutUrl));

        let options = UploadOptions::new("http://tus.test/files")
            .resume("http://tus.test/files/1", Some(11));
        let err = client(&mock).start(payload(10), options).err().unwrap();
        assert!(matches!(
            err,
            UploadError::Transfer(TransferError::ResumeOffsetOutOfRange { offset: 11, total: 10 })
        ));
    }
}
