//! Upload URL storage keyed by payload fingerprint.
//!
//! Lets a session started after a crash or restart find the upload it
//! created earlier and continue from the remote offset.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::UploadError;

/// Persistent map from fingerprint to upload URL.
///
/// Sessions call the store from tokio's blocking pool, so implementations
/// may block on disk or network I/O.
pub trait ResumeStore: Send + Sync {
    /// Returns the upload URL stored for `fingerprint`.
    fn find(&self, fingerprint: &str) -> Result<Option<String>, UploadError>;

    /// Remembers `upload_url` for `fingerprint`, replacing any earlier entry.
    fn save(&self, fingerprint: &str, upload_url: &str) -> Result<(), UploadError>;

    /// Forgets `fingerprint`. Removing an unknown entry is not an error.
    fn remove(&self, fingerprint: &str) -> Result<(), UploadError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryResumeStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryResumeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ResumeStore for MemoryResumeStore {
    fn find(&self, fingerprint: &str) -> Result<Option<String>, UploadError> {
        Ok(self.lock().get(fingerprint).cloned())
    }

    fn save(&self, fingerprint: &str, upload_url: &str) -> Result<(), UploadError> {
        self.lock()
            .insert(fingerprint.to_string(), upload_url.to_string());
        Ok(())
    }

    fn remove(&self, fingerprint: &str) -> Result<(), UploadError> {
        self.lock().remove(fingerprint);
        Ok(())
    }
}

/// JSON file store (`{"<fingerprint>": "<upload url>"}`).
///
/// The file is read and rewritten on every operation; the mutex serializes
/// writers within this process.
#[derive(Debug)]
pub struct FileResumeStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileResumeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>, UploadError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, entries: &HashMap<String, String>) -> Result<(), UploadError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), entries = entries.len(), "resume store written");
        Ok(())
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, String>) -> (T, bool),
    ) -> Result<T, UploadError> {
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut entries = self.load()?;
        let (out, dirty) = f(&mut entries);
        if dirty {
            self.store(&entries)?;
        }
        Ok(out)
    }
}

impl ResumeStore for FileResumeStore {
    fn find(&self, fingerprint: &str) -> Result<Option<String>, UploadError> {
        self.with_entries(|entries| (entries.get(fingerprint).cloned(), false))
    }

    fn save(&self, fingerprint: &str, upload_url: &str) -> Result<(), UploadError> {
        self.with_entries(|entries| {
            entries.insert(fingerprint.to_string(), upload_url.to_string());
            ((), true)
        })
    }

    fn remove(&self, fingerprint: &str) -> Result<(), UploadError> {
        self.with_entries(|entries| ((), entries.remove(fingerprint).is_some()))
    }
}
