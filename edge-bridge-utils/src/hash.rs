use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};

/// Calculate SHA-256 hash of input bytes
///
/// Returns lowercase hex string of length 64.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Calculate SHA-256 hash of input bytes, returning the raw 32-byte digest.
#[inline]
pub fn sha256_raw(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Calculate SHA-256 of input bytes and encode it with base64.
///
/// This is the encoding used on the wire by the file transfer protocol.
#[inline]
pub fn sha256_base64(data: &[u8]) -> String {
    BASE64.encode(sha256_raw(data))
}

/// Decode a base64 string into raw bytes.
#[inline]
pub fn base64_decode(value: &str) -> Option<Vec<u8>> {
    BASE64.decode(value).ok()
}

/// Encode raw bytes with base64.
#[inline]
pub fn base64_encode(value: &[u8]) -> String {
    BASE64.encode(value)
}

/// Incremental SHA-256 over a sequence of string fields.
///
/// Field boundaries are not delimited; callers must feed fields in a fixed
/// order for digests to be comparable.
pub struct FieldDigest {
    hasher: Sha256,
}

impl FieldDigest {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    #[inline]
    pub fn update(&mut self, field: &str) {
        self.hasher.update(field.as_bytes());
    }

    pub fn finish_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl Default for FieldDigest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        let hash = sha256_hex(b"hello world");
        assert_eq!(hash.len(), 64);
        // Known SHA-256 of "hello world"
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_sha256_base64_roundtrip() {
        let encoded = sha256_base64(b"hello world");
        let decoded = base64_decode(&encoded).unwrap();
        assert_eq!(decoded, sha256_raw(b"hello world"));
    }

    #[test]
    fn test_field_digest_matches_concatenation() {
        let mut digest = FieldDigest::new();
        digest.update("foo");
        digest.update("bar");
        assert_eq!(digest.finish_hex(), sha256_hex(b"foobar"));
    }
}
