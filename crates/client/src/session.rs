//! Upload session state machine.
//!
//! One [`UploadSession`] drives one payload from `Idle` to a terminal state:
//! it resolves where to start, walks the chunk plan through the transport
//! driver, consults the retry policy on failures and reports progress on
//! the event channel. Exchanges and retry delays are raced against the
//! session's cancellation token, and so is waiting for room on the event
//! channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use uploadtus_protocol::SessionState;
use uploadtus_protocol::constants::GONE_STATUSES;
use uploadtus_transfer::{ChunkPlan, Payload, ProgressTracker, TransferError, fingerprint};

use crate::driver::TransportDriver;
use crate::error::{TransportError, UploadError};
use crate::resume::ResumeStore;
use crate::retry::{Decision, RetryPolicy};
use crate::transport::{RemoteOffset, Transport};
use crate::types::{SessionOutcome, SessionRecord, UploadEvent, UploadOptions};

/// Upper bound on the best-effort DELETE sent after a cancellation.
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why the session left the upload loop early.
enum Stop {
    Aborted,
    Failed(TransportError),
}

impl From<TransferError> for Stop {
    fn from(e: TransferError) -> Self {
        Stop::Failed(TransportError::protocol(e.to_string()))
    }
}

/// Successful result of one exchange in the upload loop.
enum Step {
    Sent(u64),
    Synced(RemoteOffset),
}

pub(crate) struct UploadSession {
    driver: TransportDriver,
    total: u64,
    chunk_size: usize,
    retry: RetryPolicy,
    upload_url: Option<String>,
    resume_offset: Option<u64>,
    store: Option<Arc<dyn ResumeStore>>,
    fingerprint: Option<String>,
    remove_fingerprint_on_success: bool,
    terminate_on_cancel: bool,
    /// Upload URL already published to the record and the store.
    saved_url: Option<String>,
    progress: ProgressTracker,
    last_percent: Option<u8>,
    record: Arc<SessionRecord>,
    events: mpsc::Sender<UploadEvent>,
    cancel: CancellationToken,
}

impl UploadSession {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        payload: Payload,
        options: UploadOptions,
        record: Arc<SessionRecord>,
        events: mpsc::Sender<UploadEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let total = payload.len();
        let fingerprint = options
            .resume_store
            .as_ref()
            .map(|_| fingerprint(payload.bytes(), &options.endpoint));
        let driver =
            TransportDriver::new(transport, options.endpoint, payload).with_checksum(options.checksum);

        Self {
            driver,
            total,
            chunk_size: options.chunk_size,
            retry: options.retry,
            upload_url: options.upload_url,
            resume_offset: options.resume_offset,
            store: options.resume_store,
            fingerprint,
            remove_fingerprint_on_success: options.remove_fingerprint_on_success,
            terminate_on_cancel: options.terminate_on_cancel,
            saved_url: None,
            progress: ProgressTracker::new(total),
            last_percent: None,
            record,
            events,
            cancel,
        }
    }

    /// Runs the session to its terminal state.
    pub(crate) async fn run(mut self) -> SessionOutcome {
        self.record.set_state(SessionState::Creating);
        debug!(total = self.total, chunk_size = self.chunk_size, "upload session started");

        match self.drive().await {
            Ok(upload_url) => self.succeed(upload_url).await,
            Err(Stop::Aborted) => self.abort().await,
            Err(Stop::Failed(e)) => self.fail(e).await,
        }
    }

    async fn drive(&mut self) -> Result<String, Stop> {
        let start = self.resolve_start().await?;
        if self.driver.upload_url().is_some() {
            self.record.set_state(SessionState::Uploading);
        }
        let mut plan = ChunkPlan::new(self.total, self.chunk_size, start)?;
        self.progress = ProgressTracker::resumed(self.total, start);
        self.record.set_accepted(start);

        let mut attempt: u32 = 0;
        let mut is_first = true;
        let mut resync = false;
        let mut next = plan.next();

        while let Some(chunk) = next {
            self.check_cancelled()?;

            let step = if resync {
                race(&self.cancel, self.driver.query_offset())
                    .await
                    .map(Step::Synced)
            } else {
                let sent = race(&self.cancel, self.driver.send(&chunk, is_first)).await;
                self.remember_upload_url().await;
                sent.map(Step::Sent)
            };

            match step {
                Ok(Step::Sent(offset)) if offset == chunk.offset && !chunk.is_empty() => {
                    let e = TransportError::Network(format!(
                        "remote accepted no bytes of the chunk at {offset}"
                    ));
                    self.backoff(&mut attempt, e).await?;
                    resync = true;
                }
                Ok(Step::Sent(offset)) => {
                    is_first = false;
                    attempt = 0;
                    self.record.set_state(SessionState::Uploading);
                    self.accept(offset).await?;
                    if offset != chunk.end() {
                        debug!(expected = chunk.end(), offset, "remote offset differs, replanning");
                        plan = plan.restart_at(offset)?;
                    }
                    next = plan.next();
                }
                Ok(Step::Synced(remote)) => {
                    resync = false;
                    let accepted = self.progress.bytes_accepted();
                    if remote.offset < accepted {
                        return Err(Stop::Failed(TransportError::protocol(format!(
                            "remote offset moved back from {accepted} to {}",
                            remote.offset
                        ))));
                    }
                    if remote.offset > accepted {
                        debug!(offset = remote.offset, "remote already applied the failed chunk");
                        is_first = false;
                        attempt = 0;
                        self.record.set_state(SessionState::Uploading);
                        self.accept(remote.offset).await?;
                    }
                    plan = plan.restart_at(remote.offset)?;
                    next = plan.next();
                }
                Err(e) => {
                    self.backoff(&mut attempt, e).await?;
                    resync = self.driver.upload_url().is_some();
                }
            }
        }

        self.driver
            .upload_url()
            .map(str::to_string)
            .ok_or_else(|| Stop::Failed(TransportError::protocol("upload finished without an upload URL")))
    }

    /// Finds the offset to start at, continuing a known upload when possible.
    async fn resolve_start(&mut self) -> Result<u64, Stop> {
        let (upload_url, known_offset) = match self.upload_url.take() {
            Some(url) => (Some(url), self.resume_offset),
            None => (self.lookup_fingerprint().await, None),
        };
        let Some(upload_url) = upload_url else {
            return Ok(0);
        };

        self.driver.set_upload_url(upload_url.clone());
        self.record.set_upload_url(Some(upload_url.clone()));
        self.saved_url = Some(upload_url);

        if let Some(offset) = known_offset {
            debug!(offset, "resuming at caller-provided offset");
            return Ok(offset);
        }

        let mut attempt: u32 = 0;
        loop {
            self.check_cancelled()?;
            match race(&self.cancel, self.driver.query_offset()).await {
                Ok(remote) if remote.length.is_some_and(|len| len != self.total) => {
                    info!(length = ?remote.length, total = self.total, "previous upload has a different length, starting over");
                    self.discard_upload_url().await;
                    return Ok(0);
                }
                Ok(remote) => {
                    info!(offset = remote.offset, total = self.total, "resuming previous upload");
                    return Ok(remote.offset);
                }
                Err(e) if e.status().is_some_and(|s| GONE_STATUSES.contains(&s)) => {
                    info!(error = %e, "previous upload is gone, starting over");
                    self.discard_upload_url().await;
                    return Ok(0);
                }
                Err(e) => self.backoff(&mut attempt, e).await?,
            }
        }
    }

    /// Consults the retry policy and sleeps when another attempt is allowed.
    async fn backoff(&self, attempt: &mut u32, error: TransportError) -> Result<(), Stop> {
        if matches!(error, TransportError::Aborted) {
            return Err(Stop::Aborted);
        }

        match self.retry.should_retry(*attempt, &error) {
            Decision::GiveUp => Err(Stop::Failed(error)),
            Decision::Retry(delay) => {
                *attempt += 1;
                self.record.set_attempt(*attempt);
                warn!(
                    attempt = *attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "exchange failed, retrying"
                );
                self.pause(delay).await
            }
        }
    }

    async fn pause(&self, delay: Duration) -> Result<(), Stop> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Stop::Aborted),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn check_cancelled(&self) -> Result<(), Stop> {
        if self.cancel.is_cancelled() {
            Err(Stop::Aborted)
        } else {
            Ok(())
        }
    }

    async fn accept(&mut self, offset: u64) -> Result<(), Stop> {
        let chunk_size = offset.saturating_sub(self.progress.bytes_accepted());
        let percent = self.progress.on_chunk_accepted(offset);
        self.record.set_accepted(offset);

        self.emit(UploadEvent::ChunkComplete {
            chunk_size,
            bytes_accepted: self.progress.bytes_accepted(),
            bytes_total: self.total,
        })
        .await?;
        self.emit(UploadEvent::Progress { percent }).await?;
        self.last_percent = Some(percent);
        Ok(())
    }

    /// Runs `op` against the resume store on the blocking pool.
    ///
    /// Returns `None` when the session has no store.
    async fn with_store<T, F>(&self, op: F) -> Option<Result<T, UploadError>>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ResumeStore, &str) -> Result<T, UploadError> + Send + 'static,
    {
        let (store, fingerprint) = (self.store.clone()?, self.fingerprint.clone()?);
        let joined = tokio::task::spawn_blocking(move || op(store.as_ref(), &fingerprint)).await;
        Some(joined.unwrap_or_else(|e| Err(UploadError::Io(std::io::Error::other(e)))))
    }

    async fn lookup_fingerprint(&self) -> Option<String> {
        match self.with_store(|store, fingerprint| store.find(fingerprint)).await? {
            Ok(found) => {
                if let Some(url) = &found {
                    debug!(upload_url = %url, "found previous upload for payload");
                }
                found
            }
            Err(e) => {
                warn!(error = %e, "resume store lookup failed");
                None
            }
        }
    }

    /// Publishes a freshly created upload URL to the record and the store.
    async fn remember_upload_url(&mut self) {
        let Some(url) = self.driver.upload_url() else {
            return;
        };
        if self.saved_url.as_deref() == Some(url) {
            return;
        }

        let url = url.to_string();
        self.record.set_upload_url(Some(url.clone()));
        let saved = {
            let url = url.clone();
            self.with_store(move |store, fingerprint| store.save(fingerprint, &url))
                .await
        };
        if let Some(Err(e)) = saved {
            warn!(error = %e, "failed to save upload URL");
        }
        self.saved_url = Some(url);
    }

    async fn discard_upload_url(&mut self) {
        self.driver.forget_upload_url();
        self.record.set_upload_url(None);
        self.saved_url = None;
        self.forget_fingerprint().await;
    }

    async fn forget_fingerprint(&self) {
        let removed = self
            .with_store(|store, fingerprint| store.remove(fingerprint))
            .await;
        if let Some(Err(e)) = removed {
            warn!(error = %e, "failed to remove upload URL from resume store");
        }
    }

    async fn succeed(&mut self, upload_url: String) -> SessionOutcome {
        let percent = self.progress.complete();
        self.record.set_accepted(self.total);
        self.record.set_state(SessionState::Succeeded);
        if self.remove_fingerprint_on_success {
            self.forget_fingerprint().await;
        }

        info!(upload_url = %upload_url, total = self.total, "upload complete");
        // Outcome is settled, a cancel can only cut delivery short.
        if self.last_percent != Some(percent) {
            let _ = self.emit(UploadEvent::Progress { percent }).await;
            self.last_percent = Some(percent);
        }
        let _ = self
            .emit(UploadEvent::Succeeded {
                upload_url: upload_url.clone(),
            })
            .await;
        SessionOutcome::Succeeded { upload_url }
    }

    async fn fail(&mut self, e: TransportError) -> SessionOutcome {
        let message = e.to_string();
        error!(
            error = %message,
            bytes_accepted = self.progress.bytes_accepted(),
            "upload failed"
        );
        self.record.fail(&message);
        let _ = self
            .emit(UploadEvent::Failed {
                message: message.clone(),
            })
            .await;
        SessionOutcome::Failed {
            message,
            error: Some(e),
        }
    }

    async fn abort(&mut self) -> SessionOutcome {
        self.record.set_state(SessionState::Aborted);
        info!(bytes_accepted = self.progress.bytes_accepted(), "upload aborted");

        if self.terminate_on_cancel && self.driver.upload_url().is_some() {
            match tokio::time::timeout(TERMINATE_TIMEOUT, self.driver.terminate()).await {
                Ok(Ok(())) => {
                    debug!("remote upload terminated");
                    self.discard_upload_url().await;
                }
                Ok(Err(e)) => warn!(error = %e, "failed to terminate upload"),
                Err(_) => warn!(
                    timeout_ms = TERMINATE_TIMEOUT.as_millis() as u64,
                    "terminate request timed out"
                ),
            }
        }
        SessionOutcome::Aborted
    }

    /// Delivers `event`, waiting for room in the channel until cancelled.
    ///
    /// A dropped receiver is not an error.
    async fn emit(&self, event: UploadEvent) -> Result<(), Stop> {
        tokio::select! {
            biased;
            _ = self.events.send(event) => Ok(()),
            _ = self.cancel.cancelled() => Err(Stop::Aborted),
        }
    }
}

/// Resolves `exchange`, or fails with `Aborted` as soon as `cancel` fires.
async fn race<T>(
    cancel: &CancellationToken,
    exchange: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransportError::Aborted),
        result = exchange => result,
    }
}
