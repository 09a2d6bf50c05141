/// Percentage of `total` covered by `bytes_accepted`, floored and clamped
/// to `0..=100`. An empty payload is always 100.
pub fn percent(bytes_accepted: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let accepted = bytes_accepted.min(total) as u128;
    (accepted * 100 / total as u128) as u8
}

/// Tracks accepted bytes for one session and derives the percentage
/// reported to the collaborator.
///
/// Reported percentages never decrease, even if a caller feeds a smaller
/// byte count than before.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: u64,
    bytes_accepted: u64,
    last_percent: u8,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            bytes_accepted: 0,
            last_percent: 0,
        }
    }

    /// Starts tracking with bytes already held by the remote.
    pub fn resumed(total: u64, bytes_accepted: u64) -> Self {
        let mut tracker = Self::new(total);
        tracker.bytes_accepted = bytes_accepted.min(total);
        tracker.last_percent = if total == 0 {
            0
        } else {
            percent(tracker.bytes_accepted, total)
        };
        tracker
    }

    /// Records the cumulative bytes accepted after a chunk and returns the
    /// percentage to report.
    pub fn on_chunk_accepted(&mut self, bytes_accepted: u64) -> u8 {
        self.bytes_accepted = self.bytes_accepted.max(bytes_accepted.min(self.total));
        self.last_percent = self.last_percent.max(percent(self.bytes_accepted, self.total));
        self.last_percent
    }

    /// Marks the upload finished. Always reports exactly 100, covering a
    /// final partial chunk that rounded down.
    pub fn complete(&mut self) -> u8 {
        self.bytes_accepted = self.total;
        self.last_percent = 100;
        self.last_percent
    }

    pub fn bytes_accepted(&self) -> u64 {
        self.bytes_accepted
    }

}
