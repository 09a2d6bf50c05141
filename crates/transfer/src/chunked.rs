use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};

use uploadtus_protocol::constants::CHECKSUM_ALGORITHM;

use crate::TransferError;
use crate::types::Chunk;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Builds the `Upload-Checksum` header value (`sha256 <base64 digest>`).
pub fn checksum_header_value(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    format!("{CHECKSUM_ALGORITHM} {}", STANDARD.encode(digest))
}

/// Identifies a payload/endpoint pair across process restarts.
///
/// Two sessions uploading the same bytes to the same endpoint share a
/// fingerprint, which is what lets a resume store find the earlier upload.
pub fn fingerprint(data: &[u8], endpoint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.update([0u8]);
    hasher.update(endpoint.as_bytes());
    format!("tus-{}", hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// ChunkPlan
// ---------------------------------------------------------------------------

/// Lazy sequence of contiguous chunks covering `[resume_offset, total)`.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    total: u64,
    chunk_size: u64,
    next_offset: u64,
    empty_emitted: bool,
}

impl ChunkPlan {
    /// Plans chunks of at most `chunk_size` bytes starting at `resume_offset`.
    pub fn new(total: u64, chunk_size: usize, resume_offset: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::ZeroChunkSize);
        }
        if resume_offset > total {
            return Err(TransferError::ResumeOffsetOutOfRange {
                offset: resume_offset,
                total,
            });
        }
        Ok(Self {
            total,
            chunk_size: chunk_size as u64,
            next_offset: resume_offset,
            empty_emitted: false,
        })
    }

    /// Returns a fresh plan with the same shape starting at `offset`.
    pub fn restart_at(&self, offset: u64) -> Result<Self, TransferError> {
        Self::new(self.total, self.chunk_size as usize, offset)
    }

    /// Bytes not yet covered by produced chunks.
    fn remaining(&self) -> u64 {
        self.total - self.next_offset
    }
}

impl Iterator for ChunkPlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.total == 0 {
            if self.empty_emitted {
                return None;
            }
            self.empty_emitted = true;
            return Some(Chunk { offset: 0, size: 0 });
        }

        if self.next_offset >= self.total {
            return None;
        }

        let size = self.chunk_size.min(self.total - self.next_offset);
        let chunk = Chunk {
            offset: self.next_offset,
            size,
        };
        self.next_offset += size;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = if self.total == 0 {
            usize::from(!self.empty_emitted)
        } else {
            self.remaining().div_ceil(self.chunk_size) as usize
        };
        (n, Some(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(plan: ChunkPlan) -> Vec<(u64, u64)> {
        plan.map(|c| (c.offset, c.end())).collect()
    }

    #[test]
    fn checksum_header_uses_base64_digest() {
        assert_eq!(
            checksum_header_value(b"hello"),
            "sha256 LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ="
        );
    }

    #[test]
    fn fingerprint_depends_on_endpoint() {
        let a = fingerprint(b"data", "http://a/files");
        let b = fingerprint(b"data", "http://b/files");
        assert_ne!(a, b);
        assert_eq!(a, fingerprint(b"data", "http://a/files"));
        assert!(a.starts_with("tus-"));
    }

    #[test]
    fn plan_splits_with_short_tail() {
        let plan = ChunkPlan::new(50_000, 20_000, 0).unwrap();
        assert_eq!(
            ranges(plan),
            vec![(0, 20_000), (20_000, 40_000), (40_000, 50_000)]
        );
    }

    #[test]
    fn plan_exact_multiple() {
        let plan = ChunkPlan::new(40, 10, 0).unwrap();
        assert_eq!(ranges(plan).len(), 4);
    }

    #[test]
    fn plan_empty_payload_yields_one_empty_chunk() {
        let mut plan = ChunkPlan::new(0, 10, 0).unwrap();
        assert_eq!(plan.size_hint(), (1, Some(1)));
        assert_eq!(plan.next(), Some(Chunk { offset: 0, size: 0 }));
        assert_eq!(plan.next(), None);
        assert_eq!(plan.size_hint(), (0, Some(0)));
    }

    #[test]
    fn plan_resumes_at_offset() {
        let plan = ChunkPlan::new(50_000, 20_000, 25_000).unwrap();
        assert_eq!(ranges(plan), vec![(25_000, 45_000), (45_000, 50_000)]);
    }

    #[test]
    fn plan_resume_at_end_is_empty() {
        let mut plan = ChunkPlan::new(100, 10, 100).unwrap();
        assert_eq!(plan.next(), None);
        assert_eq!(plan.size_hint(), (0, Some(0)));
    }

    #[test]
    fn plan_rejects_zero_chunk_size() {
        assert_eq!(
            ChunkPlan::new(10, 0, 0).unwrap_err(),
            TransferError::ZeroChunkSize
        );
    }

    #[test]
    fn plan_rejects_offset_past_end() {
        assert!(matches!(
            ChunkPlan::new(10, 4, 11),
            Err(TransferError::ResumeOffsetOutOfRange { offset: 11, total: 10 })
        ));
    }

    #[test]
    fn restart_is_repeatable() {
        let mut plan = ChunkPlan::new(30, 10, 0).unwrap();
        plan.next();
        plan.next();
        let again = plan.restart_at(10).unwrap();
        assert_eq!(ranges(again.clone()), vec![(10, 20), (20, 30)]);
        assert_eq!(ranges(again), vec![(10, 20), (20, 30)]);
    }

    #[test]
    fn plans_cover_payload_without_gaps() {
        for total in [0u64, 1, 2, 9, 10, 11, 99, 100, 1_001, 50_000] {
            for chunk_size in [1usize, 3, 10, 64, 20_000] {
                let plan = ChunkPlan::new(total, chunk_size, 0).unwrap();
                let (hint, _) = plan.size_hint();
                let chunks: Vec<Chunk> = plan.collect();

                let expected = if total == 0 {
                    1
                } else {
                    total.div_ceil(chunk_size as u64)
                };
                assert_eq!(chunks.len() as u64, expected);
                assert_eq!(chunks.len(), hint);
                assert_eq!(chunks[0].offset, 0);
                assert_eq!(chunks.last().unwrap().end(), total);
                for pair in chunks.windows(2) {
                    assert_eq!(pair[0].end(), pair[1].offset);
                }
                for c in &chunks {
                    assert!(c.size <= chunk_size as u64);
                }
            }
        }
    }
}
