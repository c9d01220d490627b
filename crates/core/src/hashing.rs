//! Shared SHA-256 hex digest utility.
//!
//! Used to fingerprint captured screenshots so consumers can tell two
//! runs against the same page apart without storing the image bytes.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_known_hash() {
        let hash = sha256_hex(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn different_screenshots_hash_differently() {
        assert_ne!(sha256_hex(b"\x89PNG-a"), sha256_hex(b"\x89PNG-b"));
        assert_eq!(sha256_hex(b"\x89PNG-a").len(), 64);
    }
}
