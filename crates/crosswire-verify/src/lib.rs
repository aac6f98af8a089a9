//! Webhook signature verification for both platforms.
//!
//! Each platform signs its webhook deliveries with HMAC-SHA256 over a
//! canonical string it defines itself:
//!
//! - threads platform: `"{timestamp}:{stable_json(body)}"`, digest base64
//! - chat platform:    `"v0:{timestamp}:{raw_body}"`, digest hex, `v0=` prefix
//!
//! Verification fails closed: no configured secret means refusal, never a
//! silent pass. Digest comparison goes through `Mac::verify_slice`, which is
//! constant-time.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("signing secret is not configured")]
    MissingSecret,

    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("signature is not in the expected format")]
    MalformedSignature,

    #[error("signature mismatch")]
    Mismatch,

    #[error("webhook body is not valid JSON")]
    InvalidBody(#[from] serde_json::Error),
}

/// Verify a threads-platform webhook delivery.
///
/// The platform signs the stably key-ordered JSON serialization of the body,
/// not the raw bytes, so the body is parsed and re-serialized before hashing.
pub fn verify_threads(
    raw_body: &[u8],
    timestamp: Option<&str>,
    signature: Option<&str>,
    secret: Option<&str>,
) -> Result<(), VerifyError> {
    let secret = secret.ok_or(VerifyError::MissingSecret)?;
    let timestamp = timestamp.ok_or(VerifyError::MissingHeader("X-Signature-Timestamp"))?;
    let signature = signature.ok_or(VerifyError::MissingHeader("X-Signature"))?;

    let expected = B64
        .decode(signature)
        .map_err(|_| VerifyError::MalformedSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerifyError::MissingSecret)?;
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(canonical_json(raw_body)?.as_bytes());

    mac.verify_slice(&expected).map_err(|_| VerifyError::Mismatch)
}

/// Verify a chat-platform webhook delivery.
///
/// The chat platform signs the untouched raw body, prefixed with a version
/// sentinel, and ships the digest hex-encoded behind the same sentinel.
pub fn verify_chat(
    raw_body: &[u8],
    timestamp: Option<&str>,
    signature: Option<&str>,
    secret: Option<&str>,
) -> Result<(), VerifyError> {
    let secret = secret.ok_or(VerifyError::MissingSecret)?;
    let timestamp = timestamp.ok_or(VerifyError::MissingHeader("X-Request-Timestamp"))?;
    let signature = signature.ok_or(VerifyError::MissingHeader("X-Signature"))?;

    let hex_digest = signature
        .strip_prefix("v0=")
        .ok_or(VerifyError::MalformedSignature)?;
    let expected = hex::decode(hex_digest).map_err(|_| VerifyError::MalformedSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerifyError::MissingSecret)?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(raw_body);

    mac.verify_slice(&expected).map_err(|_| VerifyError::Mismatch)
}

/// Deterministic JSON serialization of a webhook body.
///
/// `serde_json`'s map type is a BTreeMap (the `preserve_order` feature is
/// deliberately off), so parsing and re-serializing sorts object keys at
/// every nesting level.
pub fn canonical_json(raw_body: &[u8]) -> Result<String, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_slice(raw_body)?;
    serde_json::to_string(&value)
}
