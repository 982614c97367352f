use privca_crypto::Rsa;
use spki::{
    der::{asn1::Null, Any, AnyRef},
    AlgorithmIdentifierOwned,
};

use super::{Algorithm, Key, KeyExport, KeySign, KeySpec};
use crate::error::{Error, Result};

// ============================================================================
// Core Key Structure
// ============================================================================

/// RSA signing key
///
/// Signs with PKCS#1 v1.5 over SHA-256, the only RSA signature scheme the
/// CA emits.
///
/// # Examples
///
/// ```no_run
/// use privca_key::{Key, KeySign, RsaKey};
///
/// let key = RsaKey::generate(2048).unwrap();
/// let signature = key.sign(b"Hello, World!").unwrap();
/// assert_eq!(signature.len(), 256);
/// ```
pub struct RsaKey {
    inner: Rsa,
}

// ============================================================================
// Constructors
// ============================================================================

impl RsaKey {
    /// Generate a new RSA key pair of 2048, 3072 or 4096 bits
    pub fn generate(bits: usize) -> Result<Self> {
        let inner = Rsa::generate(bits)
            .map_err(|e| Error::KeyError(format!("RSA-{bits} generation failed: {e}")))?;
        Ok(Self { inner })
    }

    /// Import from PKCS8 PEM format
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let inner = Rsa::from_pkcs8_pem(pem)
            .map_err(|e| Error::ImportError(format!("RSA PKCS8 PEM import failed: {e}")))?;
        Ok(Self { inner })
    }

    /// Import from PKCS8 DER format
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let inner = Rsa::from_pkcs8_der(der)
            .map_err(|e| Error::ImportError(format!("RSA PKCS8 DER import failed: {e}")))?;
        Ok(Self { inner })
    }

    /// RSA modulus size in bits
    pub fn size_bits(&self) -> usize {
        self.inner.modulus_bits()
    }
}

// ============================================================================
// Trait Implementations
// ============================================================================

impl Key for RsaKey {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Rsa
    }

    fn spec(&self) -> KeySpec {
        KeySpec::Rsa {
            bits: self.size_bits(),
        }
    }

    fn spki_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_spki_der()
            .map_err(|e| Error::EncodingError(format!("RSA SPKI DER encoding failed: {e}")))
    }
}

impl KeySign for RsaKey {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .sign(message)
            .map_err(|e| Error::SignatureError(format!("RSA signing failed: {e}")))
    }

    fn signature_algorithm_id(&self) -> AlgorithmIdentifierOwned {
        // sha256WithRSAEncryption carries explicit NULL parameters
        AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            parameters: Some(Any::from(AnyRef::from(Null))),
        }
    }
}

impl KeyExport for RsaKey {
    fn to_pkcs8_pem(&self) -> Result<String> {
        self.inner
            .to_pkcs8_pem()
            .map_err(|e| Error::ExportError(format!("RSA PKCS8 PEM export failed: {e}")))
    }

    fn to_pkcs8_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_pkcs8_der()
            .map_err(|e| Error::ExportError(format!("RSA PKCS8 DER export failed: {e}")))
    }

    fn to_spki_pem(&self) -> Result<String> {
        self.inner
            .to_spki_pem()
            .map_err(|e| Error::ExportError(format!("RSA public PEM export failed: {e}")))
    }
}

// ============================================================================
// Tests
// ============================================================================
