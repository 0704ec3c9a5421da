//! SHA-256 hex digests.

use sha2::{Digest, Sha256};

/// Compute SHA-256 of a UTF-8 string and return lowercase hex.
///
/// This is the only hash primitive the signature chain uses.
pub fn sha256_hex(value: &str) -> String {
    let hash = Sha256::digest(value.as_bytes());
    hex::encode(hash)
}

/// Hash the private key once so it can prefix every signature input.
pub fn hashed_private_key(private_key: &str) -> String {
    sha256_hex(private_key)
}
