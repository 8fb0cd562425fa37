//! Encryption at rest for uploaded files.
//!
//! Three primitives live here:
//! - [`whole`]: AES-256-CBC over the complete file, used for files that fit in one chunk.
//! - [`chunked`]: AES-256-GCM sealed chunks, used for large files processed incrementally.
//! - [`envelope`]: encrypted download references under the master key.
//!
//! File content is always encrypted with a fresh per-file key ([`FileKey`]); the master
//! key never touches file bytes.

pub mod chunked;
pub mod envelope;
pub mod keys;
pub mod whole;

use thiserror::Error;

pub use chunked::{ChunkCipher, CHUNK_OVERHEAD};
pub use envelope::MetadataCipher;
pub use keys::{parse_master_key, FileKey, MasterKey};
pub use whole::{decode_blob, decrypt_whole, encode_blob, encrypt_whole, STOP_MARKER};

/// Errors that can occur during encryption/decryption operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The provided key is not valid (wrong length or encoding).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The encrypted value or blob is malformed.
    #[error("invalid encrypted data: {0}")]
    InvalidFormat(String),

    /// Decryption failed: wrong key or corrupted data.
    #[error("decryption failed (wrong key or corrupted data)")]
    DecryptionFailed,

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
}
