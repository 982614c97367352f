//! SHA hash functions
//!
//! SHA-256/384/512 for fingerprints and signature digests, SHA-1 for key identifiers.

use sha1::Sha1;
use sha2::{Digest, Sha256 as Sha256Hasher, Sha384, Sha512};

/// Digest paired with a signature algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    /// SHA-256 (32-byte output)
    #[default]
    Sha256,
    /// SHA-384 (48-byte output)
    Sha384,
    /// SHA-512 (64-byte output)
    Sha512,
}

/// Compute hash of data using specified algorithm
pub fn hash(data: &[u8], algorithm: HashAlgorithm) -> Vec<u8> {
    match algorithm {
        HashAlgorithm::Sha256 => Sha256Hasher::digest(data).to_vec(),
        HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
        HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
    }
}

/// SHA-256 digest
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256Hasher::digest(data).into()
}

/// SHA-256 digest as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// SHA-1 digest, used only where X.509 or OCSP mandates it
pub fn sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_lengths() {
        let data = b"Hello, World!";
        assert_eq!(hash(data, HashAlgorithm::Sha256).len(), 32);
        assert_eq!(hash(data, HashAlgorithm::Sha384).len(), 48);
        assert_eq!(hash(data, HashAlgorithm::Sha512).len(), 64);
        assert_eq!(sha1(data).len(), 20);
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
