use serde::{Deserialize, Serialize};

/// Lifecycle of one shard inside a session's shard table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardStatus {
    /// Not yet dispatched to a worker
    Pending,
    /// A worker is pushing/pulling this shard
    InFlight,
    /// Confirmed stored (upload) or verified and written (download)
    Done,
    /// Terminal failure (retry budget exhausted or fatal error class)
    Failed,
}

/// Layout of one shard within a file.
///
/// Offsets and sizes refer to both the plaintext and the encrypted byte
/// stream: the CTR keystream is length-preserving, so the two layouts are
/// identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMeta {
    /// Zero-based logical index within the file
    pub index: u64,
    /// Byte offset of this shard's first byte
    pub offset: u64,
    /// Shard length; equal for all shards except possibly the last
    pub size: u64,
    /// Hex hash of the encrypted shard bytes, filled in once computed
    pub hash: Option<String>,
}

/// The single terminal outcome of a transfer session.
///
/// Exactly one of these is produced per session, exactly once. Cancellation
/// wins over a concurrent failure: if the caller requested cancellation
/// before the session resolved, the outcome is `Cancelled` even when a
/// shard error was already in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome<T> {
    Done(T),
    Failed(String),
    Cancelled,
}

impl<T> TransferOutcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, TransferOutcome::Done(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferOutcome::Cancelled)
    }

    /// The success value, if the session finished.
    pub fn ok(self) -> Option<T> {
        match self {
            TransferOutcome::Done(value) => Some(value),
            _ => None,
        }
    }
}

/// Result of a finished upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// Identifier of the finalized file record
    pub file_id: String,
    /// Hex content hash of the full encrypted file, as computed by the bridge
    pub content_hash: String,
}

/// Result of a finished download session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    /// Total bytes written to the destination
    pub bytes_written: u64,
    /// Hex content hash of the encrypted file, recomputed from verified shards
    pub content_hash: String,
}
