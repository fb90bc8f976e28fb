//! Offset-addressable AES-256-CTR keystream
//!
//! CTR mode makes the keystream random-access: block `offset / 16` of the
//! keystream depends only on the counter, never on preceding data. Shards
//! therefore encrypt and decrypt independently at their own byte offsets,
//! which is what allows the worker pools to process them in any order.

use aes::Aes256;
use cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use ctr::Ctr128BE;

use crate::keys::FileKey;
use crate::IV_SIZE;

type Aes256Ctr = Ctr128BE<Aes256>;

/// XOR the keystream starting at `offset` into `buf` in place.
///
/// Encryption and decryption are the same operation; `encrypt_at` and
/// `decrypt_at` exist so call sites read as what they mean.
pub fn apply_keystream_at(
    key: &FileKey,
    iv: &[u8; IV_SIZE],
    offset: u64,
    buf: &mut [u8],
) -> anyhow::Result<()> {
    if buf.is_empty() {
        return Ok(());
    }

    let mut cipher = Aes256Ctr::new(key.as_bytes().into(), iv.into());
    cipher
        .try_seek(offset)
        .map_err(|e| anyhow::anyhow!("keystream seek to offset {offset} failed: {e}"))?;
    cipher.apply_keystream(buf);
    Ok(())
}

/// Encrypt `plaintext` as the bytes at `offset` within the file.
pub fn encrypt_at(
    key: &FileKey,
    iv: &[u8; IV_SIZE],
    offset: u64,
    plaintext: &[u8],
) -> anyhow::Result<Vec<u8>> {
    let mut out = plaintext.to_vec();
    apply_keystream_at(key, iv, offset, &mut out)?;
    Ok(out)
}

/// Decrypt `ciphertext` as the bytes at `offset` within the file.
pub fn decrypt_at(
    key: &FileKey,
    iv: &[u8; IV_SIZE],
    offset: u64,
    ciphertext: &[u8],
) -> anyhow::Result<Vec<u8>> {
    let mut out = ciphertext.to_vec();
    apply_keystream_at(key, iv, offset, &mut out)?;
    Ok(out)
}
