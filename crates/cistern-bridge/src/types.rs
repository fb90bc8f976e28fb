//! Wire types for the bridge JSON API

use serde::{Deserialize, Serialize};

/// A staging frame allocated by the bridge before upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: String,
}

/// One shard's storage location for one attempt.
///
/// Produced by the bridge at registration time (upload) or fetched by index
/// (download). `alt_url` is the optional alternate replica address used for
/// the single retry a download is allowed on transport or integrity failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pointer {
    pub index: u64,
    /// Expected hex hash of the encrypted shard bytes
    pub hash: String,
    /// Shard length in bytes
    pub size: u64,
    /// Mirror address for this shard
    pub url: String,
    /// Short-lived access token for the mirror
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_url: Option<String>,
}

/// The file record returned by frame finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    /// Hex content hash of the full encrypted file
    pub content_hash: String,
}

/// File metadata as the bridge stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub id: String,
    /// Obfuscated name (the bridge never sees the plaintext name)
    pub name: String,
    pub size: u64,
    /// Key-derivation index recorded at finalization
    pub index: String,
    #[serde(default)]
    pub content_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub name: String,
}

/// Body of `PUT /frames/{id}` — announces one shard of a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterShard {
    pub index: u64,
    pub hash: String,
    pub size: u64,
}

/// Body of `POST /buckets/{bucket}/files` — promotes a frame to a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeFrame {
    pub frame: String,
    /// Obfuscated file name
    pub name: String,
    /// Key-derivation index to record on the file
    pub index: String,
    /// Ordered hex hashes of every shard, `0..n-1`
    pub hashes: Vec<String>,
}
