pub mod ecdsa;
pub mod ed25519;
pub mod generate;
pub mod rsa;
pub mod spec;
pub mod util;
pub mod verify;

use serde::{Deserialize, Serialize};
use spki::AlgorithmIdentifierOwned;

pub use self::{ecdsa::EcKey, ed25519::Ed25519Key, rsa::RsaKey, spec::KeySpec};
use crate::error::Result;

/// Public-key algorithm family
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    Rsa,
    Ecdsa,
    Ed25519,
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rsa => "RSA",
            Self::Ecdsa => "ECDSA",
            Self::Ed25519 => "Ed25519",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Core identity of an asymmetric key
pub trait Key {
    /// Algorithm family of this key
    fn algorithm(&self) -> Algorithm;

    /// Algorithm plus size or curve
    fn spec(&self) -> KeySpec;

    /// Public key in SPKI DER form
    fn spki_der(&self) -> Result<Vec<u8>>;

    /// SHA-256 over the SPKI DER
    fn fingerprint_sha256_spki(&self) -> Result<Vec<u8>> {
        let spki = self.spki_der()?;
        Ok(privca_crypto::sha256(&spki).to_vec())
    }

    /// Short identifier: the first 16 bytes of the SPKI fingerprint
    fn key_id(&self) -> Result<Vec<u8>> {
        let mut fingerprint = self.fingerprint_sha256_spki()?;
        fingerprint.truncate(16);
        Ok(fingerprint)
    }
}

/// Private and public key export
pub trait KeyExport {
    fn to_pkcs8_pem(&self) -> Result<String>;
    fn to_pkcs8_der(&self) -> Result<Vec<u8>>;
    fn to_spki_pem(&self) -> Result<String>;
}

/// Signing capability
pub trait KeySign {
    /// Sign a message; the digest is implied by the signature algorithm
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;

    /// X.509 AlgorithmIdentifier of the produced signatures
    fn signature_algorithm_id(&self) -> AlgorithmIdentifierOwned;
}

/// A key that can identify itself, export and sign
pub trait SigningKey: Key + KeyExport + KeySign + Send + Sync {}

impl<T: Key + KeyExport + KeySign + Send + Sync> SigningKey for T {}
