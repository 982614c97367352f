use const_oid::ObjectIdentifier;
use privca_crypto::{EcCurve, Ecdsa};
use spki::AlgorithmIdentifierOwned;

use super::{Algorithm, Key, KeyExport, KeySign, KeySpec};
use crate::error::{Error, Result};

/// ecdsa-with-SHA256
pub const ECDSA_WITH_SHA_256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
/// ecdsa-with-SHA384
pub const ECDSA_WITH_SHA_384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
/// ecdsa-with-SHA512
pub const ECDSA_WITH_SHA_512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");

/// ECDSA signing key on P-256, P-384 or P-521
///
/// The digest follows the curve: SHA-256, SHA-384 and SHA-512 respectively.
pub struct EcKey {
    inner: Ecdsa,
}

impl EcKey {
    pub fn generate(curve: EcCurve) -> Result<Self> {
        let inner = Ecdsa::generate(curve)
            .map_err(|e| Error::KeyError(format!("ECDSA {curve} generation failed: {e}")))?;
        Ok(Self { inner })
    }

    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let inner = Ecdsa::from_pkcs8_pem(pem)
            .map_err(|e| Error::ImportError(format!("ECDSA PKCS8 PEM import failed: {e}")))?;
        Ok(Self { inner })
    }

    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let inner = Ecdsa::from_pkcs8_der(der)
            .map_err(|e| Error::ImportError(format!("ECDSA PKCS8 DER import failed: {e}")))?;
        Ok(Self { inner })
    }

    pub fn curve(&self) -> EcCurve {
        self.inner.curve()
    }
}

impl Key for EcKey {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Ecdsa
    }

    fn spec(&self) -> KeySpec {
        KeySpec::Ecdsa {
            curve: self.curve(),
        }
    }

    fn spki_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_spki_der()
            .map_err(|e| Error::EncodingError(format!("ECDSA SPKI DER encoding failed: {e}")))
    }
}

impl KeySign for EcKey {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .sign(message)
            .map_err(|e| Error::SignatureError(format!("ECDSA signing failed: {e}")))
    }

    fn signature_algorithm_id(&self) -> AlgorithmIdentifierOwned {
        // ECDSA signature algorithms omit parameters
        let oid = match self.curve() {
            EcCurve::P256 => ECDSA_WITH_SHA_256,
            EcCurve::P384 => ECDSA_WITH_SHA_384,
            EcCurve::P521 => ECDSA_WITH_SHA_512,
        };
        AlgorithmIdentifierOwned {
            oid,
            parameters: None,
        }
    }
}

impl KeyExport for EcKey {
    fn to_pkcs8_pem(&self) -> Result<String> {
        self.inner
            .to_pkcs8_pem()
            .map_err(|e| Error::ExportError(format!("ECDSA PKCS8 PEM export failed: {e}")))
    }

    fn to_pkcs8_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_pkcs8_der()
            .map_err(|e| Error::ExportError(format!("ECDSA PKCS8 DER export failed: {e}")))
    }

    fn to_spki_pem(&self) -> Result<String> {
        self.inner
            .to_spki_pem()
            .map_err(|e| Error::ExportError(format!("ECDSA public PEM export failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_algorithm_follows_curve() {
        let expected = [
            (EcCurve::P256, ECDSA_WITH_SHA_256),
            (EcCurve::P384, ECDSA_WITH_SHA_384),
            (EcCurve::P521, ECDSA_WITH_SHA_512),
        ];
        for (curve, oid) in expected {
            let key = EcKey::generate(curve).unwrap();
            assert_eq!(key.signature_algorithm_id().oid, oid);
            assert_eq!(key.spec(), KeySpec::Ecdsa { curve });
        }
    }

    #[test]
    fn test_sign_verifies_with_spki() {
        let key = EcKey::generate(EcCurve::P256).unwrap();
        let signature = key.sign(b"ecdsa message").unwrap();
        let spki = key.spki_der().unwrap();
        assert!(
            privca_crypto::asymmetric::ecdsa::verify_with_spki_der(&spki, b"ecdsa message", &signature)
                .unwrap()
        );
    }

    #[test]
    fn test_import_keeps_curve() {
        let key = EcKey::generate(EcCurve::P521).unwrap();
        let imported = EcKey::from_pkcs8_der(&key.to_pkcs8_der().unwrap()).unwrap();
        assert_eq!(imported.curve(), EcCurve::P521);
        assert_eq!(imported.key_id().unwrap(), key.key_id().unwrap());
    }
}
