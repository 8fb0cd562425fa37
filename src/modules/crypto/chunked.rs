//! Chunked AES-256-GCM for files processed incrementally.
//!
//! Every chunk is sealed independently with a fresh 96-bit nonce and its index as
//! associated data, so chunks cannot be reordered or spliced between positions.
//! Sealed layout: `nonce (12) ++ tag (16) ++ ciphertext`.
//!
//! Blob layout: `STOP_MARKER ++ sealed_0 ++ sealed_1 ++ ...`; all sealed chunks except
//! the last are exactly `chunk_size + CHUNK_OVERHEAD` bytes long.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};

use super::keys::FileKey;
use super::CryptoError;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const CHUNK_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

pub struct ChunkCipher {
    cipher: Aes256Gcm,
}

impl ChunkCipher {
    pub fn new(key: &FileKey) -> Result<Self, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(format!("invalid AES key: {e}")))?;
        Ok(Self { cipher })
    }

    pub fn encrypt_chunk(&self, index: u64, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let aad = index.to_be_bytes();

        let sealed = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        // aes-gcm returns ciphertext || tag
        let (data, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        let mut out = Vec::with_capacity(CHUNK_OVERHEAD + data.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(tag);
        out.extend_from_slice(data);
        Ok(out)
    }

    pub fn decrypt_chunk(&self, index: u64, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < CHUNK_OVERHEAD {
            return Err(CryptoError::InvalidFormat(format!(
                "sealed chunk {index} is {} bytes, shorter than nonce and tag",
                sealed.len()
            )));
        }

        let (nonce, rest) = sealed.split_at(NONCE_LEN);
        let (tag, data) = rest.split_at(TAG_LEN);

        let mut combined = Vec::with_capacity(data.len() + TAG_LEN);
        combined.extend_from_slice(data);
        combined.extend_from_slice(tag);

        let aad = index.to_be_bytes();
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: &combined,
                    aad: &aad,
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// Size of a sealed full chunk on disk.
pub fn sealed_chunk_len(chunk_size: usize) -> usize {
    chunk_size + CHUNK_OVERHEAD
}

/// Number of chunks needed for `size` bytes. An empty file still takes one chunk.
pub fn chunk_count(size: u64, chunk_size: u64) -> u64 {
    if size == 0 || chunk_size == 0 {
        return 1;
    }
    size.div_ceil(chunk_size)
}
