//! Key hierarchy: master secret → bucket key → per-file key and counter
//!
//! The chain is deterministic end to end. Bucket and file identifiers are
//! hex strings on the wire (bridge object ids); they are decoded to raw
//! bytes before entering the HMAC chain so the derivation matches the
//! protocol bit-for-bit.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha512;
use zeroize::Zeroize;

use crate::kdf::MasterSecret;
use crate::{INDEX_SIZE, IV_SIZE, KEY_SIZE};

type HmacSha512 = Hmac<Sha512>;

/// A per-file 256-bit encryption key. Zeroized on drop.
#[derive(Clone)]
pub struct FileKey {
    bytes: [u8; KEY_SIZE],
}

impl FileKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The (key, counter) pair for one file, plus the index it derives from.
///
/// The index is recorded in the file record at finalization so the pair can
/// be re-derived for download or resume; nothing here is ever persisted.
/// Callers needing out-of-band delivery may wrap `key`/`iv` themselves.
#[derive(Clone)]
pub struct EncryptionInfo {
    /// Hex key-derivation index (64 chars), client-chosen at upload time
    pub index: String,
    pub key: FileKey,
    pub iv: [u8; IV_SIZE],
}

impl EncryptionInfo {
    /// Draw a fresh random index and derive the pair for it.
    pub fn generate(master: &MasterSecret, bucket_id: &str) -> anyhow::Result<Self> {
        let mut raw = [0u8; INDEX_SIZE];
        rand::thread_rng().fill_bytes(&mut raw);
        Self::for_index(master, bucket_id, &hex::encode(raw))
    }

    /// Re-derive the pair for a known index (download / resume path).
    pub fn for_index(master: &MasterSecret, bucket_id: &str, index: &str) -> anyhow::Result<Self> {
        let (key, iv) = derive_file_key(master, bucket_id, index)?;
        Ok(Self {
            index: index.to_string(),
            key,
            iv,
        })
    }
}

impl std::fmt::Debug for EncryptionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionInfo")
            .field("index", &self.index)
            .field("key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .finish()
    }
}

/// Derive the deterministic (key, counter) pair for one file.
///
/// `bucket_id` and `index` are the hex identifiers the bridge knows the
/// bucket and file by. Same inputs always yield the same outputs.
pub fn derive_file_key(
    master: &MasterSecret,
    bucket_id: &str,
    index: &str,
) -> anyhow::Result<(FileKey, [u8; IV_SIZE])> {
    let bucket_bytes = decode_id("bucket id", bucket_id)?;
    let index_bytes = decode_id("file index", index)?;

    let bucket_key = hmac_sha512(master.as_bytes(), &[&bucket_bytes]);
    let mut file_key_wide = hmac_sha512(&bucket_key[..KEY_SIZE], &[&index_bytes]);

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&file_key_wide[..KEY_SIZE]);

    let iv_wide = hmac_sha512(&key_bytes, &[&bucket_bytes, &index_bytes]);
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&iv_wide[..IV_SIZE]);

    file_key_wide.zeroize();

    Ok((FileKey::from_bytes(key_bytes), iv))
}

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> [u8; 64] {
    // HMAC accepts any key length; unwrap cannot fire
    let mut mac = HmacSha512::new_from_slice(key).expect("HMAC key length");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

fn decode_id(what: &str, id: &str) -> anyhow::Result<Vec<u8>> {
    if id.is_empty() {
        anyhow::bail!("{what} is empty");
    }
    hex::decode(id).map_err(|e| anyhow::anyhow!("{what} is not valid hex: {e}"))
}
