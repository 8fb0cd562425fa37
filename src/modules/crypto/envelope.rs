use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64URL;
use base64::Engine;
use serde::{de::DeserializeOwned, Serialize};

use super::keys::MasterKey;
use super::whole::{cbc_decrypt, cbc_encrypt, generate_iv, IV_LEN};
use super::CryptoError;

/// Encrypts small JSON documents (download references) under the master key.
///
/// Output is `base64url(iv ++ ciphertext)`. Decryption tries the current key first,
/// then the previous one so references issued before a key rotation stay valid.
#[derive(Debug, Clone)]
pub struct MetadataCipher {
    current: MasterKey,
    previous: Option<MasterKey>,
}

impl MetadataCipher {
    pub fn new(current: MasterKey, previous: Option<MasterKey>) -> Self {
        Self { current, previous }
    }

    pub fn seal<T: Serialize>(&self, value: &T) -> Result<String, CryptoError> {
        let json = serde_json::to_vec(value)
            .map_err(|e| CryptoError::EncryptionFailed(format!("serialize: {e}")))?;
        let iv = generate_iv();
        let ciphertext = cbc_encrypt(self.current.as_bytes(), &iv, &json)?;

        let mut raw = Vec::with_capacity(IV_LEN + ciphertext.len());
        raw.extend_from_slice(&iv);
        raw.extend_from_slice(&ciphertext);
        Ok(B64URL.encode(raw))
    }

    pub fn open<T: DeserializeOwned>(&self, sealed: &str) -> Result<T, CryptoError> {
        let raw = B64URL
            .decode(sealed.trim())
            .map_err(|e| CryptoError::InvalidFormat(format!("invalid base64url: {e}")))?;
        if raw.len() <= IV_LEN {
            return Err(CryptoError::InvalidFormat("reference too short".to_owned()));
        }
        let (iv, ciphertext) = raw.split_at(IV_LEN);

        let keys = std::iter::once(&self.current).chain(self.previous.iter());
        for key in keys {
            let Ok(plaintext) = cbc_decrypt(key.as_bytes(), iv, ciphertext) else {
                continue;
            };
            // Wrong-key output can pass the padding check by chance; JSON parsing settles it.
            if let Ok(value) = serde_json::from_slice::<T>(&plaintext) {
                return Ok(value);
            }
        }
        Err(CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        stored_as: String,
        expires: i64,
    }

    fn doc() -> Doc {
        Doc {
            stored_as: "abc_1700000000.php".to_string(),
            expires: 1_700_086_400,
        }
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = MetadataCipher::new(MasterKey::from_bytes([1; 32]), None);
        let sealed = cipher.seal(&doc()).unwrap();
        assert!(!sealed.contains('+') && !sealed.contains('/') && !sealed.contains('='));
        assert_eq!(cipher.open::<Doc>(&sealed).unwrap(), doc());
    }

    #[test]
    fn test_previous_key_still_opens() {
        let old = MetadataCipher::new(MasterKey::from_bytes([1; 32]), None);
        let sealed = old.seal(&doc()).unwrap();

        let rotated = MetadataCipher::new(
            MasterKey::from_bytes([2; 32]),
            Some(MasterKey::from_bytes([1; 32])),
        );
        assert_eq!(rotated.open::<Doc>(&sealed).unwrap(), doc());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let a = MetadataCipher::new(MasterKey::from_bytes([1; 32]), None);
        let b = MetadataCipher::new(MasterKey::from_bytes([3; 32]), None);
        let sealed = a.seal(&doc()).unwrap();
        assert!(b.open::<Doc>(&sealed).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let cipher = MetadataCipher::new(MasterKey::from_bytes([1; 32]), None);
        assert!(cipher.open::<Doc>("not-a-reference").is_err());
        assert!(cipher.open::<Doc>("").is_err());
    }
}
