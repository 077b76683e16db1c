//! One-way digests for password-reset secrets.
//!
//! Only the SHA-256 hex digest of a reset token is ever persisted; the raw
//! token leaves the process once, inside the reset link.

use rand::RngCore;
use sha2::{Digest, Sha256};

const RESET_TOKEN_BYTES: usize = 20;

/// Hex-encoded SHA-256 of `secret`.
pub fn digest_token(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a fresh reset token. Returns `(raw_token, digest)`.
pub fn generate_reset_token() -> (String, String) {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let raw = hex::encode(bytes);
    let digest = digest_token(&raw);
    (raw, digest)
}
