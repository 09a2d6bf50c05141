//! Error types for upload sessions.

use uploadtus_protocol::constants::RETRYABLE_CLIENT_STATUSES;
use uploadtus_transfer::TransferError;

/// Classified failure of a single network exchange.
///
/// The transport classifies; the retry policy decides. `Network` and
/// `Server` are retryable, `Client` and `Aborted` are not.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("request rejected{}: {message}", status_suffix(.status))]
    Client {
        /// HTTP status, or `None` for a malformed response.
        status: Option<u16>,
        message: String,
    },

    #[error("aborted")]
    Aborted,
}

impl TransportError {
    /// Classifies an unexpected HTTP status.
    ///
    /// 5xx and the transient tus statuses (409, 423, 460) are server-side
    /// faults; every other status is a rejection of the request.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status >= 500 || RETRYABLE_CLIENT_STATUSES.contains(&status) {
            Self::Server { status, message }
        } else {
            Self::Client {
                status: Some(status),
                message,
            }
        }
    }

    /// A response that does not follow the protocol.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Client {
            status: None,
            message: message.into(),
        }
    }

    /// Returns `true` for errors worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            Self::Client { status, .. } => *status,
            Self::Network(_) | Self::Aborted => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            return Self::protocol(e.to_string());
        }
        match e.status() {
            Some(status) => Self::from_status(status.as_u16(), e.to_string()),
            None => Self::Network(e.to_string()),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

/// Errors raised while configuring or starting an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("resume offset given without an upload URL")]
    ResumeOffsetWithoutUrl,

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
