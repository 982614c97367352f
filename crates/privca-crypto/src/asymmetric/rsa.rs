//! RSA keys for CA and leaf certificates
//!
//! Signatures are PKCS#1 v1.5. The CA always signs over SHA-256; verification
//! accepts SHA-384 and SHA-512 as well so foreign chains can be checked.

use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{traits::PublicKeyParts, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::{
    error::{Error, Result},
    hash::HashAlgorithm,
};

/// RSA modulus sizes accepted for new keys
pub const SUPPORTED_KEY_SIZES: [usize; 3] = [2048, 3072, 4096];

/// RSA private key
pub struct Rsa {
    secret: RsaPrivateKey,
}

impl Rsa {
    /// Generate a key with a modulus from [`SUPPORTED_KEY_SIZES`]
    pub fn generate(bits: usize) -> Result<Self> {
        if !SUPPORTED_KEY_SIZES.contains(&bits) {
            return Err(Error::UnsupportedKeySize(bits));
        }
        let secret = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|e| Error::Other(format!("RSA-{bits} generation: {e}")))?;
        Ok(Self { secret })
    }

    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            secret: RsaPrivateKey::from_pkcs8_der(der)?,
        })
    }

    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        Ok(Self {
            secret: RsaPrivateKey::from_pkcs8_pem(pem)?,
        })
    }

    /// Modulus length in bits
    pub fn modulus_bits(&self) -> usize {
        self.secret.size() * 8
    }

    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>> {
        Ok(self.secret.to_pkcs8_der()?.as_bytes().to_vec())
    }

    pub fn to_pkcs8_pem(&self) -> Result<String> {
        Ok(self.secret.to_pkcs8_pem(LineEnding::LF)?.to_string())
    }

    pub fn to_spki_der(&self) -> Result<Vec<u8>> {
        let der = self.public().to_public_key_der()?;
        Ok(der.into_vec())
    }

    pub fn to_spki_pem(&self) -> Result<String> {
        Ok(self.public().to_public_key_pem(LineEnding::LF)?)
    }

    /// PKCS#1 v1.5 signature over SHA-256
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let (scheme, digest) = pkcs1v15(HashAlgorithm::Sha256, message);
        self.secret
            .sign_with_rng(&mut rand::thread_rng(), scheme, &digest)
            .map_err(|e| Error::Other(format!("RSA signing: {e}")))
    }

    fn public(&self) -> RsaPublicKey {
        RsaPublicKey::from(&self.secret)
    }
}

/// Padding scheme and message digest for one hash choice
fn pkcs1v15(hash: HashAlgorithm, message: &[u8]) -> (Pkcs1v15Sign, Vec<u8>) {
    match hash {
        HashAlgorithm::Sha256 => (
            Pkcs1v15Sign::new::<Sha256>(),
            Sha256::digest(message).to_vec(),
        ),
        HashAlgorithm::Sha384 => (
            Pkcs1v15Sign::new::<Sha384>(),
            Sha384::digest(message).to_vec(),
        ),
        HashAlgorithm::Sha512 => (
            Pkcs1v15Sign::new::<Sha512>(),
            Sha512::digest(message).to_vec(),
        ),
    }
}

/// Verify a PKCS#1 v1.5 signature against an SPKI DER public key.
///
/// A malformed key is an error; a signature that does not match is `Ok(false)`.
pub fn verify_with_spki_der(
    spki_der: &[u8],
    message: &[u8],
    signature: &[u8],
    hash: HashAlgorithm,
) -> Result<bool> {
    let public_key = public_key_from_spki_der(spki_der)?;
    let (scheme, digest) = pkcs1v15(hash, message);
    Ok(public_key.verify(scheme, &digest, signature).is_ok())
}

/// Modulus length in bits of an RSA public key in SPKI DER form
pub fn modulus_bits(spki_der: &[u8]) -> Result<usize> {
    Ok(public_key_from_spki_der(spki_der)?.size() * 8)
}

pub fn public_key_from_spki_der(der: &[u8]) -> Result<RsaPublicKey> {
    Ok(RsaPublicKey::from_public_key_der(der)?)
}
