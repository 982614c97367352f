use privca_crypto::Ed25519;
use spki::AlgorithmIdentifierOwned;

use super::{Algorithm, Key, KeyExport, KeySign, KeySpec};
use crate::error::{Error, Result};

/// Ed25519 signing key
pub struct Ed25519Key {
    inner: Ed25519,
}

impl Ed25519Key {
    pub fn generate() -> Result<Self> {
        let inner = Ed25519::generate()
            .map_err(|e| Error::KeyError(format!("Ed25519 generation failed: {e}")))?;
        Ok(Self { inner })
    }

    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let inner = Ed25519::from_pkcs8_pem(pem)
            .map_err(|e| Error::ImportError(format!("Ed25519 PKCS8 PEM import failed: {e}")))?;
        Ok(Self { inner })
    }

    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let inner = Ed25519::from_pkcs8_der(der)
            .map_err(|e| Error::ImportError(format!("Ed25519 PKCS8 DER import failed: {e}")))?;
        Ok(Self { inner })
    }
}

impl Key for Ed25519Key {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Ed25519
    }

    fn spec(&self) -> KeySpec {
        KeySpec::Ed25519
    }

    fn spki_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_spki_der()
            .map_err(|e| Error::EncodingError(format!("Ed25519 SPKI DER encoding failed: {e}")))
    }
}

impl KeySign for Ed25519Key {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        Ok(self.inner.sign(message).to_vec())
    }

    fn signature_algorithm_id(&self) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc8410::ID_ED_25519,
            parameters: None,
        }
    }
}

impl KeyExport for Ed25519Key {
    fn to_pkcs8_pem(&self) -> Result<String> {
        self.inner
            .to_pkcs8_pem()
            .map_err(|e| Error::ExportError(format!("Ed25519 PKCS8 PEM export failed: {e}")))
    }

    fn to_pkcs8_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_pkcs8_der()
            .map_err(|e| Error::ExportError(format!("Ed25519 PKCS8 DER export failed: {e}")))
    }

    fn to_spki_pem(&self) -> Result<String> {
        self.inner
            .to_spki_pem()
            .map_err(|e| Error::ExportError(format!("Ed25519 public PEM export failed: {e}")))
    }
}
