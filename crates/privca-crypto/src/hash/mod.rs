//! Cryptographic hash functions
//!
//! SHA-2 digests for fingerprints and signatures, and SHA-1 for the
//! key identifiers and OCSP CertID hashes that X.509 still mandates.

pub mod sha;

pub use sha::{hash, sha1, sha256, sha256_hex, HashAlgorithm};
