//! HMAC-SHA256 verification of GitHub webhook deliveries.
//!
//! GitHub signs each delivery body with the app's webhook secret and sends the
//! result in `X-Hub-Signature-256` as `sha256=<hex>`. Deliveries that fail
//! verification are rejected before any parsing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Decodes a `sha256=<hex>` header value. Returns `None` for any other shape.
///
/// ```
/// use cla_connect::webhooks::parse_signature_header;
///
/// assert_eq!(parse_signature_header("sha256=0aff"), Some(vec![0x0a, 0xff]));
/// assert!(parse_signature_header("sha1=0aff").is_none());
/// assert!(parse_signature_header("sha256=zz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    hex::decode(header.strip_prefix("sha256=")?).ok()
}

/// Signs `payload` the way GitHub does, producing a header value.
///
/// ```
/// use cla_connect::webhooks::{sign_payload, verify_signature};
///
/// let header = sign_payload(b"{}", b"secret").unwrap();
/// assert!(header.starts_with("sha256="));
/// assert!(verify_signature(b"{}", &header, b"secret"));
/// assert!(!verify_signature(b"{}", &header, b"other"));
/// ```
pub fn sign_payload(payload: &[u8], secret: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Checks `signature_header` against `payload` in constant time.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
