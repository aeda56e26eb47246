// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Body signatures for webhook receivers.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use wabridge_core::BridgeError;

/// Header carrying the shared secret.
pub const TOKEN_HEADER: &str = "X-Webhook-Token";

/// Header carrying `sha256=<hex>` of the body, keyed with the sink secret.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// HMAC-SHA256 of `body` in the `sha256=<hex>` format used by GitHub-style
/// receivers.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, BridgeError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| BridgeError::Webhook(format!("failed to initialize webhook HMAC: {e}")))?;
    mac.update(body);
    Ok(format!(
        "sha256={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc4231_vector() {
        assert_eq!(
            sign("Jefe", b"what do ya want for nothing?").unwrap(),
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn different_secrets_differ() {
        assert_ne!(sign("a", b"{}").unwrap(), sign("b", b"{}").unwrap());
    }
}
