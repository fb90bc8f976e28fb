//! Master secret: Argon2id passphrase derivation and key-material hygiene

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// The 256-bit master secret all per-bucket and per-file keys derive from.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct MasterSecret {
    bytes: [u8; KEY_SIZE],
}

impl MasterSecret {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for MasterSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id parameters for passphrase derivation
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Derive the master secret from a passphrase and salt using Argon2id.
///
/// The salt should be 16 bytes, randomly generated once and stored alongside
/// the account metadata (it does not need to be secret).
pub fn derive_master_secret(
    passphrase: &SecretString,
    salt: &[u8; 16],
    params: &KdfParams,
) -> anyhow::Result<MasterSecret> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| anyhow::anyhow!("invalid Argon2id params: {e}"))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut secret = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut secret)
        .map_err(|e| anyhow::anyhow!("Argon2id KDF failed: {e}"))?;

    Ok(MasterSecret::from_bytes(secret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn fast_params() -> KdfParams {
        KdfParams {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn kdf_deterministic() {
        let passphrase = SecretString::from("correct horse battery staple");
        let salt = [7u8; 16];

        let s1 = derive_master_secret(&passphrase, &salt, &fast_params()).unwrap();
        let s2 = derive_master_secret(&passphrase, &salt, &fast_params()).unwrap();

        assert_eq!(s1.as_bytes(), s2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn kdf_different_passphrases() {
        let salt = [7u8; 16];

        let s1 =
            derive_master_secret(&SecretString::from("passphrase-a"), &salt, &fast_params())
                .unwrap();
        let s2 =
            derive_master_secret(&SecretString::from("passphrase-b"), &salt, &fast_params())
                .unwrap();

        assert_ne!(s1.as_bytes(), s2.as_bytes());
    }

    #[test]
    fn kdf_different_salts() {
        let passphrase = SecretString::from("same-passphrase");

        let s1 = derive_master_secret(&passphrase, &[1u8; 16], &fast_params()).unwrap();
        let s2 = derive_master_secret(&passphrase, &[2u8; 16], &fast_params()).unwrap();

        assert_ne!(s1.as_bytes(), s2.as_bytes());
    }

    #[test]
    fn debug_is_redacted() {
        let secret = MasterSecret::from_bytes([42u8; KEY_SIZE]);
        let printed = format!("{secret:?}");
        assert!(printed.contains("REDACTED"));
        assert!(!printed.contains("42"));
    }
}
