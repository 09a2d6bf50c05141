//! Uploader configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/uploadtus/uploader.toml`
//! - Windows: `%APPDATA%/uploadtus/uploader.toml`
//!
//! Command-line flags override individual fields.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use uploadtus_client::{FileResumeStore, UploadOptions};

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// tus creation endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bytes per PATCH request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Delays before each retry, in milliseconds.
    #[serde(default = "default_retry_delays")]
    pub retry_delays_ms: Vec<u64>,

    /// Extra headers sent with every request (e.g. `Authorization`).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Per-request timeout in seconds (0 = none).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// JSON file remembering unfinished uploads.
    #[serde(default)]
    pub resume_store: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub remove_fingerprint_on_success: bool,

    /// Send `Upload-Checksum` with every chunk.
    #[serde(default)]
    pub checksum: bool,

    /// Delete the remote upload on Ctrl-C.
    #[serde(default)]
    pub terminate_on_cancel: bool,
}

fn default_endpoint() -> String {
    "http://localhost:8080/upload".into()
}

fn default_chunk_size() -> usize {
    uploadtus_transfer::DEFAULT_CHUNK_SIZE
}

fn default_retry_delays() -> Vec<u64> {
    vec![0, 3_000, 6_000, 12_000, 24_000]
}

fn default_request_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            chunk_size: default_chunk_size(),
            retry_delays_ms: default_retry_delays(),
            headers: BTreeMap::new(),
            request_timeout_secs: default_request_timeout(),
            resume_store: None,
            remove_fingerprint_on_success: default_true(),
            checksum: false,
            terminate_on_cancel: false,
        }
    }
}

impl Config {
    /// Loads `path`, or the default location when `path` is `None`.
    ///
    /// An explicit path must exist; a missing default file yields the
    /// default configuration.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = config_path()?;
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// Session options described by this configuration.
    pub fn upload_options(&self) -> UploadOptions {
        let delays = self
            .retry_delays_ms
            .iter()
            .map(|&ms| Duration::from_millis(ms))
            .collect();
        let mut options = UploadOptions::new(self.endpoint.clone())
            .with_chunk_size(self.chunk_size)
            .with_retry_delays(delays)
            .with_checksum(self.checksum)
            .terminate_on_cancel(self.terminate_on_cancel)
            .remove_fingerprint_on_success(self.remove_fingerprint_on_success);
        if let Some(path) = &self.resume_store {
            options = options.with_resume_store(std::sync::Arc::new(FileResumeStore::new(path)));
        }
        options
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("uploadtus")
            .join("uploader.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("uploadtus").join("uploader.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/uploadtus/uploader.toml"))
    }
}
