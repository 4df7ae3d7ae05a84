//! Payload checksums sent in `x-amz-checksum-{algorithm}` headers, so that
//! S3 verifies an upload's integrity before storing it.

use base64::Engine;
use sha2::{Digest, Sha256};

/// Hex encoded SHA-256 of an empty payload.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// A payload checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    /// SHA-256 digest
    Sha256([u8; 32]),
}

impl Checksum {
    /// SHA-256 of `data`.
    pub fn sha256(data: &[u8]) -> Self {
        Self::Sha256(Sha256::digest(data).into())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Sha256(digest) => digest,
        }
    }

    /// Algorithm name as it appears in the header name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256(_) => "sha256",
        }
    }
}

/// Base64 of the digest, the form S3 expects in the header value.
impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&base64::engine::general_purpose::STANDARD.encode(self.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_formats_sha256_as_base64() {
        let checksum = Checksum::sha256(b"hello world");
        assert_eq!(checksum.name(), "sha256");
        assert_eq!(
            checksum.to_string(),
            "uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek="
        );
    }

    #[test]
    fn it_matches_the_empty_payload_constant() {
        let digest = Sha256::digest(b"");
        let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
        assert_eq!(hex, EMPTY_PAYLOAD_SHA256);
    }
}
