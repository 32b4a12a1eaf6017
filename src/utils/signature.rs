use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

type HmacSha512 = Hmac<Sha512>;

/// Header Paystack uses for the webhook HMAC.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Hex HMAC-SHA512 of `body` keyed with `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_signature(secret: &str, body: &[u8], provided: &str) -> bool {
    let Some(expected) = sign(secret, body) else {
        return false;
    };
    let provided = provided.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// SHA-256 of the raw body, stored with every webhook log entry.
pub fn payload_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}
