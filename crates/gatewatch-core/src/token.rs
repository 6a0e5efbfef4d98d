//! HMAC bearer tokens.
//!
//! Format (hex encoded): `[8-byte expiry][subject bytes][32-byte HMAC-SHA256]`.
//! The gateway only verifies tokens; issuing them is left to the service
//! that authenticates users.

use crate::error::{GatewatchError, Result};
use ring::hmac;
use std::time::{SystemTime, UNIX_EPOCH};

const EXPIRY_LEN: usize = 8;
const TAG_LEN: usize = 32;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn sign(secret: &[u8], expiry: u64, subject: &str) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let mut data = Vec::with_capacity(EXPIRY_LEN + subject.len() + TAG_LEN);
    data.extend_from_slice(&expiry.to_be_bytes());
    data.extend_from_slice(subject.as_bytes());
    let tag = hmac::sign(&key, &data);
    data.extend_from_slice(tag.as_ref());
    data
}

/// Create a token for `subject` valid for `ttl_secs`.
pub fn create_token(secret: &[u8], subject: &str, ttl_secs: u64) -> String {
    hex::encode(sign(secret, now_secs().saturating_add(ttl_secs), subject))
}

/// Verify signature and expiry, returning the token's subject.
pub fn verify_token(secret: &[u8], token: &str) -> Result<String> {
    let raw = hex::decode(token.trim())
        .map_err(|e| GatewatchError::Token(format!("not hex: {e}")))?;
    if raw.len() < EXPIRY_LEN + TAG_LEN {
        return Err(GatewatchError::Token(format!(
            "invalid token length: {}",
            raw.len()
        )));
    }

    let (data, tag) = raw.split_at(raw.len() - TAG_LEN);
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    hmac::verify(&key, data, tag)
        .map_err(|_| GatewatchError::Token("invalid token signature".into()))?;

    let mut expiry_bytes = [0u8; EXPIRY_LEN];
    expiry_bytes.copy_from_slice(&data[..EXPIRY_LEN]);
    if now_secs() > u64::from_be_bytes(expiry_bytes) {
        return Err(GatewatchError::Token("token expired".into()));
    }

    String::from_utf8(data[EXPIRY_LEN..].to_vec())
        .map_err(|_| GatewatchError::Token("subject is not utf-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn create_and_verify() {
        let token = create_token(SECRET, "user-42", 3600);
        assert_eq!(verify_token(SECRET, &token).unwrap(), "user-42");
    }

    #[test]
    fn wrong_secret() {
        let token = create_token(SECRET, "user-42", 3600);
        assert!(verify_token(b"another secret", &token).is_err());
    }

    #[test]
    fn tampered_subject() {
        let token = create_token(SECRET, "user-42", 3600);
        let mut raw = hex::decode(&token).unwrap();
        raw[EXPIRY_LEN] ^= 0x01;
        assert!(verify_token(SECRET, &hex::encode(raw)).is_err());
    }

    #[test]
    fn expired_token() {
        let token = hex::encode(sign(SECRET, now_secs() - 10, "user-42"));
        let err = verify_token(SECRET, &token).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn invalid_input() {
        assert!(verify_token(SECRET, "zz").is_err());
        assert!(verify_token(SECRET, &hex::encode([0u8; 10])).is_err());
    }
}
