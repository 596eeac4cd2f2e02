//! HMAC-SHA256 request signatures.

use super::Verifier;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Accepts a payload when its signature is the hex HMAC-SHA256 under the shared secret
pub struct HmacVerifier {
    secret: Vec<u8>,
}

impl HmacVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Hex signature for `payload`; used by clients and tests
    pub fn sign(&self, payload: &[u8]) -> String {
        match HmacSha256::new_from_slice(&self.secret) {
            Ok(mut mac) => {
                mac.update(payload);
                hex::encode(mac.finalize().into_bytes())
            }
            Err(_) => String::new(),
        }
    }
}

impl Verifier for HmacVerifier {
    fn verify(&self, signature: &str, payload: &[u8]) -> bool {
        if self.secret.is_empty() {
            tracing::warn!("no signing secret configured, rejecting");
            return false;
        }

        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }
}
