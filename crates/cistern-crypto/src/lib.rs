//! cistern-crypto: client-side encryption for the cistern storage client
//!
//! Architecture: deterministic per-file keys + offset-addressable CTR keystream
//!
//! Every derivation is a pure function of its inputs, so no derived material
//! ever needs persisting: a resumed or re-created session recomputes the same
//! keys from the same identifiers.
//!
//! Key hierarchy:
//! ```text
//! MasterSecret (256-bit; supplied directly, or Argon2id from a passphrase)
//!   ├── BucketKey = HMAC-SHA512(master, bucket_id)[..32]       (per bucket)
//!   │     └── FileKey = HMAC-SHA512(bucket_key, index)[..32]   (per file)
//!   │           └── IV = HMAC-SHA512(file_key, bucket_id || index)[..16]
//!   └── NameKey = HKDF-SHA256(master, "cistern-names")         (obfuscation)
//! ```
//!
//! Shard data is encrypted with AES-256-CTR: the keystream at any byte offset
//! is computed directly from the counter, so shards encrypt and decrypt
//! independently and in parallel with no sequential dependency.

pub mod hash;
pub mod kdf;
pub mod keys;
pub mod names;
pub mod stream;

pub use hash::{content_hash, shard_hash};
pub use kdf::{derive_master_secret, KdfParams, MasterSecret};
pub use keys::{derive_file_key, EncryptionInfo, FileKey};
pub use names::obfuscate_name;
pub use stream::{decrypt_at, encrypt_at};

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the AES-CTR initial counter block
pub const IV_SIZE: usize = 16;

/// Size of a file's key-derivation index in bytes (hex-encoded on the wire)
pub const INDEX_SIZE: usize = 32;
