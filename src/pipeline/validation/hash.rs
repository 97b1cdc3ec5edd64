use base64::Engine;
use sha2::{Digest, Sha256};

/// SHA-256 of uploaded bytes, base64-encoded. Used to detect duplicate uploads.
pub fn content_hash(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    base64::engine::general_purpose::STANDARD.encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_deterministic() {
        assert_eq!(content_hash(b"drawing rev A"), content_hash(b"drawing rev A"));
    }

    #[test]
    fn content_hash_differs_for_different_bytes() {
        assert_ne!(content_hash(b"drawing rev A"), content_hash(b"drawing rev B"));
    }

    #[test]
    fn content_hash_is_base64_sha256() {
        // 32 bytes → 44 base64 characters with padding
        assert_eq!(content_hash(b"").len(), 44);
        assert_eq!(content_hash(b""), "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=");
    }
}
