use std::fmt;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::CryptoError;

pub const KEY_LEN: usize = 32;

/// A 32-byte AES-256 master key, zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    #[cfg(test)]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Per-file content key. Stored hex-encoded next to the file record.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FileKey([u8; KEY_LEN]);

impl FileKey {
    /// Generate a fresh random key from the OS RNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_hex(raw: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(raw.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("invalid hex: {e}")))?;
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "file key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FileKey([REDACTED])")
    }
}

/// Parse a 32-byte master key from hex or base64.
///
/// Accepts either 64 hex characters or a base64 string that decodes to exactly
/// 32 bytes.
pub fn parse_master_key(raw: &str) -> Result<MasterKey, CryptoError> {
    let trimmed = raw.trim();
    if trimmed.len() == KEY_LEN * 2 {
        if let Ok(bytes) = hex::decode(trimmed) {
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(&bytes);
            return Ok(MasterKey(key));
        }
    }
    if let Ok(bytes) = B64.decode(trimmed) {
        if bytes.len() == KEY_LEN {
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(&bytes);
            return Ok(MasterKey(key));
        }
    }
    Err(CryptoError::InvalidKey(
        "must be 32 bytes encoded as 64 hex chars or base64".to_owned(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_master_key_hex() {
        let key = parse_master_key(&"ab".repeat(32)).unwrap();
        assert_eq!(key.as_bytes(), &[0xab; 32]);
    }

    #[test]
    fn test_parse_master_key_base64() {
        let encoded = B64.encode([7u8; 32]);
        let key = parse_master_key(&encoded).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; 32]);
    }

    #[test]
    fn test_parse_master_key_rejects_short() {
        assert!(matches!(
            parse_master_key("deadbeef"),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_file_key_hex_roundtrip_and_freshness() {
        let a = FileKey::generate();
        let b = FileKey::generate();
        assert_ne!(a.to_hex(), b.to_hex());

        let restored = FileKey::from_hex(&a.to_hex()).unwrap();
        assert_eq!(restored.as_bytes(), a.as_bytes());
        assert!(FileKey::from_hex("abcd").is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = FileKey::generate();
        assert_eq!(format!("{key:?}"), "FileKey([REDACTED])");
    }
}
