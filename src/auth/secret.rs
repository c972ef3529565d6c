//! Shared-secret comparison for webhooks

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Check a presented header value against the configured secret.
///
/// Both sides are run through HMAC-SHA256 keyed with the secret and the tags
/// are compared in constant time, so neither length nor a matching prefix
/// changes the timing.
pub fn verify_shared_secret(presented: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(secret.as_bytes());
    let expected = mac.finalize().into_bytes();

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(presented.as_bytes());
    mac.verify_slice(&expected).is_ok()
}
