use ed25519_dalek::{
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    Signature, Signer, SigningKey, Verifier, VerifyingKey,
};
use pkcs8::LineEnding;

use crate::error::{Error, Result};

pub struct Ed25519 {
    pub inner: SigningKey,
}

impl From<SigningKey> for Ed25519 {
    fn from(value: SigningKey) -> Self {
        Self { inner: value }
    }
}

impl Ed25519 {
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed).map_err(|e| Error::GetrandomError(e.to_string()))?;
        Ok(SigningKey::from_bytes(&seed).into())
    }

    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let signing_key = SigningKey::from_pkcs8_der(der)?;
        Ok(signing_key.into())
    }

    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let signing_key = SigningKey::from_pkcs8_pem(pem)?;
        Ok(signing_key.into())
    }
}

impl Ed25519 {
    /// Get the public key for this keypair
    pub fn public_key(&self) -> VerifyingKey {
        self.inner.verifying_key()
    }

    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>> {
        let der = self.inner.to_pkcs8_der()?;
        Ok(der.as_bytes().to_vec())
    }

    pub fn to_pkcs8_pem(&self) -> Result<String> {
        let pem = self.inner.to_pkcs8_pem(LineEnding::LF)?;
        Ok(pem.to_string())
    }

    pub fn to_spki_der(&self) -> Result<Vec<u8>> {
        let der = self.public_key().to_public_key_der()?;
        Ok(der.as_bytes().to_vec())
    }

    pub fn to_spki_pem(&self) -> Result<String> {
        let pem = self.public_key().to_public_key_pem(LineEnding::LF)?;
        Ok(pem)
    }

    /// Sign a message, producing the 64-byte signature
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.inner.sign(message).to_bytes()
    }
}

/// Verify an Ed25519 signature against an SPKI DER public key
pub fn verify_with_spki_der(spki_der: &[u8], message: &[u8], signature: &[u8]) -> Result<bool> {
    let public_key = VerifyingKey::from_public_key_der(spki_der)?;
    let Ok(signature) = Signature::from_slice(signature) else {
        return Ok(false);
    };
    Ok(public_key.verify(message, &signature).is_ok())
}
