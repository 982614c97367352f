//! Symmetric encryption algorithms
//!
//! AES-256-GCM with the authentication tag kept apart from the ciphertext.

pub mod aes;

pub use aes::{Aes, SealedBox, KEY_LEN, NONCE_LEN, TAG_LEN};
