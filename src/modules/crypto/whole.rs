//! Whole-file AES-256-CBC with PKCS#7 padding.
//!
//! Stored blob layout: `STOP_MARKER ++ base64(iv ++ ciphertext)`.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;

use super::keys::{FileKey, KEY_LEN};
use super::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const IV_LEN: usize = 16;

/// Prefix written before every stored blob. An inert stop line so that a
/// misconfigured server executing the file outputs nothing; not a security boundary.
pub const STOP_MARKER: &[u8] = b"<?php exit; ?>\n";

pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypt a complete file under a fresh key and IV.
pub fn encrypt_whole(plaintext: &[u8]) -> Result<(FileKey, [u8; IV_LEN], Vec<u8>), CryptoError> {
    let key = FileKey::generate();
    let iv = generate_iv();
    let ciphertext = encrypt_with(&key, &iv, plaintext)?;
    Ok((key, iv, ciphertext))
}

pub fn encrypt_with(key: &FileKey, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    cbc_encrypt(key.as_bytes(), iv, plaintext)
}

pub fn decrypt_whole(key: &FileKey, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    cbc_decrypt(key.as_bytes(), iv, ciphertext)
}

pub(crate) fn cbc_encrypt(
    key: &[u8; KEY_LEN],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|e| CryptoError::InvalidKey(format!("invalid AES-CBC key/iv: {e}")))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

pub(crate) fn cbc_decrypt(
    key: &[u8; KEY_LEN],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if iv.len() != IV_LEN {
        return Err(CryptoError::InvalidFormat(format!(
            "IV must be {IV_LEN} bytes, got {}",
            iv.len()
        )));
    }
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| CryptoError::InvalidKey(format!("invalid AES-CBC key/iv: {e}")))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Serialize IV and ciphertext into the on-disk blob.
pub fn encode_blob(iv: &[u8], ciphertext: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(iv.len() + ciphertext.len());
    raw.extend_from_slice(iv);
    raw.extend_from_slice(ciphertext);

    let encoded = B64.encode(raw);
    let mut blob = Vec::with_capacity(STOP_MARKER.len() + encoded.len());
    blob.extend_from_slice(STOP_MARKER);
    blob.extend_from_slice(encoded.as_bytes());
    blob
}

/// Parse an on-disk blob back into `(iv, ciphertext)`. The stop marker is optional.
pub fn decode_blob(blob: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let body = strip_stop_marker(blob);
    let text = std::str::from_utf8(body)
        .map_err(|_| CryptoError::InvalidFormat("blob is not base64 text".to_owned()))?;
    let raw = B64
        .decode(text.trim())
        .map_err(|e| CryptoError::InvalidFormat(format!("invalid base64 blob: {e}")))?;

    if raw.len() <= IV_LEN {
        return Err(CryptoError::InvalidFormat("blob too short".to_owned()));
    }
    let (iv, ciphertext) = raw.split_at(IV_LEN);
    Ok((iv.to_vec(), ciphertext.to_vec()))
}

pub fn strip_stop_marker(blob: &[u8]) -> &[u8] {
    blob.strip_prefix(STOP_MARKER).unwrap_or(blob)
}
