use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a string.
///
/// This is the only safe textual identifier for scanned input: results and
/// audit records carry the hash, never the text itself.
pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Short cache key: first 16 hex characters of the SHA-256 digest.
///
/// 64 bits of digest keeps keys compact while making collisions negligible
/// for cache-sized working sets.
pub fn text_key(s: &str) -> String {
    let mut key = sha256_hex(s);
    key.truncate(16);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex("Hello, how are you today?"),
            sha256_hex("Hello, how are you today?")
        );
        assert_eq!(sha256_hex("").len(), 64);
    }

    #[test]
    fn text_key_is_prefix_of_digest() {
        let full = sha256_hex("abc");
        let short = text_key("abc");
        assert_eq!(short.len(), 16);
        assert!(full.starts_with(&short));
    }
}
