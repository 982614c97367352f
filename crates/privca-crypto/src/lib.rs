//! privca Cryptography Library
//!
//! Cryptographic primitives for the privca certificate authority: RSA,
//! ECDSA and Ed25519 keys, AES-256-GCM, hashing and key derivation.

pub mod error;

// Cryptographic algorithm modules
pub mod asymmetric;
pub mod hash;
pub mod kdf;
pub mod symmetric;

// Re-export commonly used types for convenience
pub use asymmetric::{ecdsa::EcCurve, ecdsa::Ecdsa, ed25519::Ed25519, rsa::Rsa};
pub use hash::{sha1, sha256, sha256_hex, HashAlgorithm};
pub use kdf::derive_key32;
pub use symmetric::{Aes, SealedBox};
