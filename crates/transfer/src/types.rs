use std::collections::BTreeMap;
use std::sync::Arc;

use crate::TransferError;
use crate::validation::validate_metadata_key;

/// A byte range `[offset, offset + size)` within a [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset within the payload.
    pub offset: u64,
    /// Size of this chunk in bytes.
    pub size: u64,
}

impl Chunk {
    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Returns `true` for the zero-length chunk planned for an empty payload.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Immutable bytes to upload plus their string metadata.
///
/// Cloning is cheap: the bytes are shared.
#[derive(Debug, Clone)]
pub struct Payload {
    data: Arc<[u8]>,
    metadata: BTreeMap<String, String>,
}

impl Payload {
    /// Creates a payload, validating every metadata key.
    pub fn new(
        data: impl Into<Arc<[u8]>>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Self, TransferError> {
        for key in metadata.keys() {
            validate_metadata_key(key)?;
        }
        Ok(Self {
            data: data.into(),
            metadata,
        })
    }

    /// Creates a payload without metadata.
    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Adds one metadata pair.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, TransferError> {
        let key = key.into();
        validate_metadata_key(&key)?;
        self.metadata.insert(key, value.into());
        Ok(self)
    }

    /// Total length in bytes.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Returns the bytes covered by `chunk`.
    ///
    /// Chunks come from a [`ChunkPlan`](crate::ChunkPlan) over this payload,
    /// so the range is always in bounds.
    pub fn slice(&self, chunk: &Chunk) -> &[u8] {
        &self.data[chunk.offset as usize..chunk.end() as usize]
    }
}
