//! SHA-256 shard and content hashing
//!
//! A shard's identity is the SHA-256 of its encrypted bytes. The whole-file
//! content hash is the SHA-256 over the ordered shard hash bytes, so both
//! the bridge and the client can compute it from shard registrations alone,
//! in any completion order.

use sha2::{Digest, Sha256};

/// Hash encrypted shard bytes to the hex identifier used on the wire.
pub fn shard_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Combine ordered shard hashes into the whole-file content hash.
pub fn content_hash<S: AsRef<str>>(ordered_shard_hashes: &[S]) -> anyhow::Result<String> {
    let mut hasher = Sha256::new();
    for hash in ordered_shard_hashes {
        let raw = hex::decode(hash.as_ref())
            .map_err(|e| anyhow::anyhow!("shard hash is not valid hex: {e}"))?;
        hasher.update(&raw);
    }
    Ok(hex::encode(hasher.finalize()))
}
