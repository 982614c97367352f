//! Asymmetric cryptography algorithms
//!
//! Key generation, PKCS#8/SPKI encoding and signatures for RSA, ECDSA
//! (P-256, P-384, P-521) and Ed25519.

pub mod ecdsa;
pub mod ed25519;
pub mod rsa;

pub use ecdsa::{EcCurve, Ecdsa};
pub use ed25519::Ed25519;
pub use rsa::Rsa;
