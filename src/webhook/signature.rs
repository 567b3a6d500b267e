//! HMAC-SHA256 signatures of webhook payloads.
//!
//! GitHub (and the generic hooks) send `sha256=<hex>` in `X-Hub-Signature-256`,
//! Bitbucket the same format in `X-Hub-Signature`, Gogs sends the bare hex digest
//! in `X-Gogs-Signature`. GitLab sends the secret itself in `X-Gitlab-Token`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies a hex encoded signature against the payload and secret.
///
/// Uses constant-time comparison. Malformed hex is never valid.
pub fn verify_hex_signature(payload: &[u8], hex_signature: &str, secret: &[u8]) -> bool {
    let Ok(signature) = hex::decode(hex_signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);

    mac.verify_slice(&signature).is_ok()
}

/// Verifies a `sha256=<hex>` signature header against the payload and secret.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    signature_header
        .strip_prefix("sha256=")
        .is_some_and(|hex_signature| verify_hex_signature(payload, hex_signature, secret))
}

/// Compares a plain token with the secret in constant time.
pub fn verify_token(token: &str, secret: &[u8]) -> bool {
    // Keyed with each value, the tags only match if the values do.
    let (Ok(expected), Ok(actual)) = (
        HmacSha256::new_from_slice(secret),
        HmacSha256::new_from_slice(token.as_bytes()),
    ) else {
        return false;
    };

    actual.verify_slice(&expected.finalize().into_bytes()).is_ok()
}

#[cfg(test)]
pub(crate) fn compute_signature(payload: &[u8], secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}
