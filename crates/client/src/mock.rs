//! Scripted in-memory transport for session tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::transport::{RemoteOffset, Transport, TransportFuture};

const UPLOAD_URL: &str = "http://tus.test/files/mock-upload";

/// One exchange seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create {
        length: u64,
        metadata: BTreeMap<String, String>,
    },
    Patch {
        offset: u64,
        len: usize,
        checksum: Option<String>,
        at: Instant,
    },
    Head,
    Terminate,
}

enum PatchFailure {
    /// Fail without touching the remote state.
    Before(TransportError),
    /// Store the chunk, then lose the response.
    After(TransportError),
}

#[derive(Default)]
struct MockState {
    created: bool,
    remote_offset: u64,
    remote_length: Option<u64>,
    calls: Vec<Call>,
    create_failures: VecDeque<TransportError>,
    head_failures: VecDeque<TransportError>,
    patch_failures: HashMap<u64, VecDeque<PatchFailure>>,
    patch_replies: HashMap<u64, u64>,
    stalls: HashMap<u64, Arc<Notify>>,
    terminate_stalls: bool,
}

/// Remote that stores one upload and follows tus offset rules.
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Pretends an upload already exists at [`upload_url`](Self::upload_url).
    pub fn with_existing_upload(self, offset: u64, length: Option<u64>) -> Self {
        {
            let mut s = self.state.lock().unwrap();
            s.created = true;
            s.remote_offset = offset;
            s.remote_length = length;
        }
        self
    }

    pub fn upload_url(&self) -> String {
        UPLOAD_URL.to_string()
    }

    pub fn fail_create(&self, err: TransportError) {
        self.state.lock().unwrap().create_failures.push_back(err);
    }

    pub fn fail_head(&self, err: TransportError) {
        self.state.lock().unwrap().head_failures.push_back(err);
    }

    /// Fails the next patch at `offset` before the remote applies it.
    pub fn fail_patch(&self, offset: u64, err: TransportError) {
        self.state
            .lock()
            .unwrap()
            .patch_failures
            .entry(offset)
            .or_default()
            .push_back(PatchFailure::Before(err));
    }

    /// Applies the next patch at `offset` but reports `err`.
    pub fn fail_patch_after_apply(&self, offset: u64, err: TransportError) {
        self.state
            .lock()
            .unwrap()
            .patch_failures
            .entry(offset)
            .or_default()
            .push_back(PatchFailure::After(err));
    }

    /// Replies `reply` to the next successful patch at `offset`.
    pub fn override_patch_reply(&self, offset: u64, reply: u64) {
        self.state.lock().unwrap().patch_replies.insert(offset, reply);
    }

    /// Makes a patch at `offset` hang forever. The returned notifier fires
    /// once the stalled exchange is in flight.
    pub fn stall_patch(&self, offset: u64) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.state
            .lock()
            .unwrap()
            .stalls
            .insert(offset, notify.clone());
        notify
    }

    /// Makes every terminate request hang forever.
    pub fn stall_terminate(&self) {
        self.state.lock().unwrap().terminate_stalls = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn create_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Create { .. }))
            .count()
    }

    pub fn head_count(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::Head).count()
    }

    pub fn patch_offsets(&self) -> Vec<u64> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                Call::Patch { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect()
    }

    pub fn patch_times(&self) -> Vec<Instant> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                Call::Patch { at, .. } => Some(*at),
                _ => None,
            })
            .collect()
    }

    pub fn remote_offset(&self) -> u64 {
        self.state.lock().unwrap().remote_offset
    }
}

impl Transport for MockTransport {
    fn create<'a>(
        &'a self,
        _endpoint: &'a str,
        upload_length: u64,
        metadata: &'a BTreeMap<String, String>,
    ) -> TransportFuture<'a, String> {
        let result = {
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::Create {
                length: upload_length,
                metadata: metadata.clone(),
            });
            match s.create_failures.pop_front() {
                Some(err) => Err(err),
                None => {
                    s.created = true;
                    s.remote_offset = 0;
                    s.remote_length = Some(upload_length);
                    Ok(UPLOAD_URL.to_string())
                }
            }
        };
        Box::pin(async move { result })
    }

    fn patch<'a>(
        &'a self,
        _upload_url: &'a str,
        offset: u64,
        data: &'a [u8],
        checksum: Option<&'a str>,
    ) -> TransportFuture<'a, u64> {
        let (stall, result) = {
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::Patch {
                offset,
                len: data.len(),
                checksum: checksum.map(str::to_string),
                at: Instant::now(),
            });

            let stall = s.stalls.get(&offset).cloned();
            let failure = s
                .patch_failures
                .get_mut(&offset)
                .and_then(VecDeque::pop_front);

            let result = match failure {
                _ if !s.created => Err(TransportError::from_status(404, "no such upload")),
                Some(PatchFailure::Before(err)) => Err(err),
                _ if offset != s.remote_offset => {
                    Err(TransportError::from_status(409, "offset mismatch"))
                }
                Some(PatchFailure::After(err)) => {
                    s.remote_offset += data.len() as u64;
                    Err(err)
                }
                None => {
                    s.remote_offset += data.len() as u64;
                    let applied = s.remote_offset;
                    Ok(s.patch_replies.remove(&offset).unwrap_or(applied))
                }
            };
            (stall, result)
        };

        Box::pin(async move {
            if let Some(notify) = stall {
                notify.notify_one();
                std::future::pending::<()>().await;
            }
            result
        })
    }

    fn head<'a>(&'a self, _upload_url: &'a str) -> TransportFuture<'a, RemoteOffset> {
        let result = {
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::Head);
            match s.head_failures.pop_front() {
                Some(err) => Err(err),
                None if !s.created => Err(TransportError::from_status(404, "no such upload")),
                None => Ok(RemoteOffset {
                    offset: s.remote_offset,
                    length: s.remote_length,
                }),
            }
        };
        Box::pin(async move { result })
    }

    fn terminate<'a>(&'a self, _upload_url: &'a str) -> TransportFuture<'a, ()> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Terminate);
        let stall = s.terminate_stalls;
        if !stall {
            s.created = false;
        }
        Box::pin(async move {
            if stall {
                std::future::pending::<()>().await;
            }
            Ok(())
        })
    }
}
