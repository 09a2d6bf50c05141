use serde::{Deserialize, Serialize};

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "creating")]
    Creating,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "aborted")]
    Aborted,
}

impl SessionState {
    /// Returns `true` for `Succeeded`, `Failed` and `Aborted`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }
}

/// Point-in-time view of an upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: SessionState,
    pub total_bytes: u64,
    pub bytes_accepted: u64,
    pub current_attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl SessionSnapshot {
    /// Returns the accepted fraction as a percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.state == SessionState::Succeeded {
                100.0
            } else {
                0.0
            };
        }
        self.bytes_accepted as f64 / self.total_bytes as f64 * 100.0
    }
}
