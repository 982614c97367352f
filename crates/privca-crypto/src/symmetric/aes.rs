//! AES-GCM authenticated encryption
//!
//! Provides AEAD encryption using AES-GCM algorithm with 256-bit keys.

use aes_gcm::{
    aead::{AeadCore, AeadInPlace, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce, Tag,
};

use crate::error::{Error, Result};

/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;
/// GCM nonce length in bytes (96 bits)
pub const NONCE_LEN: usize = 12;
/// GCM authentication tag length in bytes
pub const TAG_LEN: usize = 16;

/// Ciphertext with its nonce and detached authentication tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
}

/// AES-256-GCM cipher wrapper
pub struct Aes {
    cipher: Aes256Gcm,
}

impl Aes {
    /// Create a new AES-256-GCM cipher from a 32-byte key
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        Self { cipher }
    }

    /// Encrypt with a fresh random nonce, returning the tag separately
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<SealedBox> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut buffer = plaintext.to_vec();

        let tag = self
            .cipher
            .encrypt_in_place_detached(&nonce, aad, &mut buffer)
            .map_err(|e| Error::AeadError(format!("AES-GCM encryption failed: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(&nonce);
        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(&tag);

        Ok(SealedBox {
            ciphertext: buffer,
            nonce: nonce_bytes,
            tag: tag_bytes,
        })
    }

    /// Decrypt and authenticate a detached-tag ciphertext
    pub fn open(
        &self,
        ciphertext: &[u8],
        nonce: &[u8; NONCE_LEN],
        tag: &[u8; TAG_LEN],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        let nonce = Nonce::from_slice(nonce);
        let tag = Tag::from_slice(tag);
        let mut buffer = ciphertext.to_vec();

        self.cipher
            .decrypt_in_place_detached(nonce, aad, &mut buffer, tag)
            .map_err(|e| Error::AeadError(format!("AES-GCM decryption failed: {}", e)))?;

        Ok(buffer)
    }
}
