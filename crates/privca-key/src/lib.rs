//! Signing keys for the privca certificate authority
//!
//! Wraps the primitives from `privca-crypto` behind the `Key`, `KeySign`
//! and `KeyExport` traits, and adds algorithm-tagged generation, PKCS#8
//! loading and SPKI-based signature verification.

pub mod error;
pub mod key;

// Re-export core functionality
pub use key::{
    generate::{generate, generate_key_pair, GeneratedKeyPair},
    util::{load_signing_key_from_pkcs8_der, load_signing_key_from_pkcs8_pem},
    verify::{describe_spki, is_weak_signature_algorithm, signature_algorithm_name, verify_signature},
    Algorithm, EcKey, Ed25519Key, Key, KeyExport, KeySign, KeySpec, RsaKey, SigningKey,
};
pub use privca_crypto::EcCurve;
