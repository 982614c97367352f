//! Key Derivation Functions (KDF)
//!
//! HKDF-SHA256 for deriving fixed-length symmetric keys.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::{Error, Result};

/// Derive a 32-byte symmetric key with HKDF-SHA256
///
/// # Arguments
/// - `ikm`: input keying material
/// - `salt`: non-secret salt
/// - `info`: context binding label
pub fn derive_key32(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|e| Error::Other(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}
