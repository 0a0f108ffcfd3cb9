//! HMAC-SHA256 signatures for outbound webhook payloads.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::EngineError;

type HmacSha256 = Hmac<Sha256>;

/// Sign `payload` with `key`, returning lowercase hex.
///
/// Callers must sign the exact bytes they transmit.
pub fn sign(payload: &[u8], key: &[u8]) -> Result<String, EngineError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| EngineError::Validation(format!("invalid signing key: {}", e)))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature, as a receiver would do it.
pub fn verify(payload: &[u8], key: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
