//! Deterministic filename obfuscation
//!
//! The bridge indexes files by an opaque identifier, never by plaintext
//! name. Obfuscation is a keyed hash, not encryption: the same
//! (master, bucket, name) triple always maps to the same identifier, which
//! is what makes existence checks and lookups by name possible, and the
//! mapping is irreversible, so the bridge cannot recover the name.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use crate::kdf::MasterSecret;
use crate::KEY_SIZE;

type HmacSha512 = Hmac<Sha512>;

const NAME_KEY_DOMAIN: &[u8] = b"cistern-names";

/// Map a plaintext file name to its opaque bridge identifier.
///
/// HMAC-SHA512 over the UTF-8 name bytes, keyed by the name key and salted
/// by the bucket identifier; hex output (128 chars).
pub fn obfuscate_name(
    master: &MasterSecret,
    bucket_id: &str,
    name: &str,
) -> anyhow::Result<String> {
    if name.is_empty() {
        anyhow::bail!("file name is empty");
    }

    let name_key = derive_name_key(master)?;
    let mut mac = HmacSha512::new_from_slice(&name_key).expect("HMAC key length");
    mac.update(bucket_id.as_bytes());
    mac.update(name.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Derive the name-obfuscation key from the master secret via HKDF-SHA256.
fn derive_name_key(master: &MasterSecret) -> anyhow::Result<[u8; KEY_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(None, master.as_bytes());
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(NAME_KEY_DOMAIN, &mut okm)
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))?;
    Ok(okm)
}
