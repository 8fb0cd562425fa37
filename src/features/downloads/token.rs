//! Short-lived, action-scoped download tokens.
//!
//! A token is `hex(HMAC-SHA256(secret, "tick|download:<file>|<user>")[..10])`.
//! Time is split into ticks of half the token lifetime; a token verifies during the
//! tick it was issued in and the following one.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

use crate::modules::crypto::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of the MAC kept in the token
pub const TOKEN_BYTES: usize = 10;

const ACTION_PREFIX: &str = "download:";

#[derive(Clone)]
pub struct DownloadTokenSigner {
    mac: HmacSha256,
    tick_secs: i64,
}

impl std::fmt::Debug for DownloadTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTokenSigner")
            .field("tick_secs", &self.tick_secs)
            .finish_non_exhaustive()
    }
}

impl DownloadTokenSigner {
    pub fn new(secret: &[u8], lifetime: Duration) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::InvalidKey(
                "download token secret is empty".to_string(),
            ));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let tick_secs = i64::try_from(lifetime.as_secs() / 2).unwrap_or(i64::MAX).max(1);
        Ok(Self { mac, tick_secs })
    }

    pub fn generate(&self, filename: &str, user_sub: &str) -> String {
        self.generate_at(filename, user_sub, Utc::now())
    }

    pub fn verify(&self, token: &str, filename: &str, user_sub: &str) -> bool {
        self.verify_at(token, filename, user_sub, Utc::now())
    }

    /// Latest instant at which a token issued at `now` still verifies.
    pub fn valid_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let next_next = (self.tick(now) + 2) * self.tick_secs;
        DateTime::from_timestamp(next_next - 1, 0).unwrap_or(now)
    }

    pub(crate) fn generate_at(&self, filename: &str, user_sub: &str, now: DateTime<Utc>) -> String {
        let tag = self.sign(self.tick(now), filename, user_sub);
        hex::encode(&tag[..TOKEN_BYTES])
    }

    pub(crate) fn verify_at(
        &self,
        token: &str,
        filename: &str,
        user_sub: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let Ok(provided) = hex::decode(token.trim()) else {
            return false;
        };
        if provided.len() != TOKEN_BYTES {
            return false;
        }

        let tick = self.tick(now);
        [tick, tick - 1].into_iter().any(|t| {
            self.keyed(t, filename, user_sub)
                .verify_truncated_left(&provided)
                .is_ok()
        })
    }

    fn tick(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp().div_euclid(self.tick_secs)
    }

    fn keyed(&self, tick: i64, filename: &str, user_sub: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(format!("{tick}|{ACTION_PREFIX}{filename}|{user_sub}").as_bytes());
        mac
    }

    fn sign(&self, tick: i64, filename: &str, user_sub: &str) -> Vec<u8> {
        self.keyed(tick, filename, user_sub)
            .finalize()
            .into_bytes()
            .to_vec()
    }
}

/// `<base>/download?file=<name>&token=<token>`
pub fn download_url(base_url: &str, filename: &str, token: &str) -> String {
    format!(
        "{}/download?file={}&token={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(filename),
        urlencoding::encode(token)
    )
}

/// `<base>/download?ref=<envelope>`
pub fn reference_url(base_url: &str, reference: &str) -> String {
    format!(
        "{}/download?ref={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(reference)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FILE_A: &str = "0123456789abcdef0123456789abcdef_1700000000.php";
    const FILE_B: &str = "fedcba9876543210fedcba9876543210_1700000000.php";

    fn signer() -> DownloadTokenSigner {
        DownloadTokenSigner::new(b"test-secret", Duration::from_secs(24 * 3600)).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_token_shape() {
        let token = signer().generate(FILE_A, "7");
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_token_bound_to_file_and_user() {
        let s = signer();
        let now = at(1_700_000_000);
        let token = s.generate_at(FILE_A, "7", now);

        assert!(s.verify_at(&token, FILE_A, "7", now));
        assert!(!s.verify_at(&token, FILE_B, "7", now));
        assert!(!s.verify_at(&token, FILE_A, "8", now));
    }

    #[test]
    fn test_token_valid_for_current_and_next_tick_only() {
        let s = signer();
        let half = 12 * 3600;
        let issued = at(100 * half);
        let token = s.generate_at(FILE_A, "7", issued);

        assert!(s.verify_at(&token, FILE_A, "7", at(100 * half + half - 1)));
        assert!(s.verify_at(&token, FILE_A, "7", at(101 * half + half - 1)));
        assert!(!s.verify_at(&token, FILE_A, "7", at(102 * half)));
        assert_eq!(s.valid_until(issued), at(102 * half - 1));
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        let s = signer();
        assert!(!s.verify("", FILE_A, "7"));
        assert!(!s.verify("not-hex", FILE_A, "7"));
        assert!(!s.verify("abcd", FILE_A, "7"));
    }

    #[test]
    fn test_different_secrets_disagree() {
        let other = DownloadTokenSigner::new(b"other", Duration::from_secs(3600)).unwrap();
        let token = signer().generate(FILE_A, "7");
        assert!(!other.verify(&token, FILE_A, "7"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(DownloadTokenSigner::new(b"", Duration::from_secs(60)).is_err());
    }

    #[test]
    fn test_download_url_encodes_parameters() {
        assert_eq!(
            download_url("https://example.org/", "a b.php", "00ff"),
            "https://example.org/download?file=a%20b.php&token=00ff"
        );
        assert_eq!(
            reference_url("https://example.org", "ab-_c"),
            "https://example.org/download?ref=ab-_c"
        );
    }
}
