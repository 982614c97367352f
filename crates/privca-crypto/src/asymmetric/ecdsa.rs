//! ECDSA over the NIST curves P-256, P-384 and P-521.
//!
//! Each curve signs with its matching digest: SHA-256, SHA-384 and SHA-512.
//! Signatures are DER encoded (`Ecdsa-Sig-Value`), as X.509 expects.

use std::fmt;

use p256::elliptic_curve::rand_core::OsRng;
use pkcs8::{
    der::Decode, spki::SubjectPublicKeyInfoRef, DecodePrivateKey, EncodePrivateKey,
    EncodePublicKey, LineEnding, ObjectIdentifier,
};

use crate::error::{Error, Result};

/// secp256r1
pub const SECP_256_R_1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
/// secp384r1
pub const SECP_384_R_1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");
/// secp521r1
pub const SECP_521_R_1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.35");

/// Supported NIST curves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    /// Parse a curve name such as `P-256`, `p384` or `secp521r1`
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.to_ascii_lowercase().replace(['-', '_'], "");
        match normalized.as_str() {
            "p256" | "secp256r1" | "prime256v1" => Some(Self::P256),
            "p384" | "secp384r1" => Some(Self::P384),
            "p521" | "secp521r1" => Some(Self::P521),
            _ => None,
        }
    }

    /// Curve name in `P-nnn` form
    pub fn name(&self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    /// Named-curve OID carried in the SPKI parameters
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            Self::P256 => SECP_256_R_1,
            Self::P384 => SECP_384_R_1,
            Self::P521 => SECP_521_R_1,
        }
    }

    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        [Self::P256, Self::P384, Self::P521]
            .into_iter()
            .find(|curve| curve.oid() == *oid)
    }
}

impl fmt::Display for EcCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

enum EcSecret {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
    P521(p521::SecretKey),
}

/// ECDSA private key on one of the supported curves
pub struct Ecdsa {
    inner: EcSecret,
}

impl Ecdsa {
    /// Generate a new key pair on the given curve
    pub fn generate(curve: EcCurve) -> Result<Self> {
        let inner = match curve {
            EcCurve::P256 => EcSecret::P256(p256::SecretKey::random(&mut OsRng)),
            EcCurve::P384 => EcSecret::P384(p384::SecretKey::random(&mut OsRng)),
            EcCurve::P521 => EcSecret::P521(p521::SecretKey::random(&mut OsRng)),
        };
        Ok(Self { inner })
    }

    /// Import from PKCS8 DER format, detecting the curve from the key parameters
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        if let Ok(key) = p256::SecretKey::from_pkcs8_der(der) {
            return Ok(Self { inner: EcSecret::P256(key) });
        }
        if let Ok(key) = p384::SecretKey::from_pkcs8_der(der) {
            return Ok(Self { inner: EcSecret::P384(key) });
        }
        let key = p521::SecretKey::from_pkcs8_der(der)?;
        Ok(Self { inner: EcSecret::P521(key) })
    }

    /// Import from PKCS8 PEM format
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        if let Ok(key) = p256::SecretKey::from_pkcs8_pem(pem) {
            return Ok(Self { inner: EcSecret::P256(key) });
        }
        if let Ok(key) = p384::SecretKey::from_pkcs8_pem(pem) {
            return Ok(Self { inner: EcSecret::P384(key) });
        }
        let key = p521::SecretKey::from_pkcs8_pem(pem)?;
        Ok(Self { inner: EcSecret::P521(key) })
    }

    pub fn curve(&self) -> EcCurve {
        match self.inner {
            EcSecret::P256(_) => EcCurve::P256,
            EcSecret::P384(_) => EcCurve::P384,
            EcSecret::P521(_) => EcCurve::P521,
        }
    }
}

impl Ecdsa {
    /// Export private key to PKCS8 DER format
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>> {
        let doc = match &self.inner {
            EcSecret::P256(key) => key.to_pkcs8_der()?,
            EcSecret::P384(key) => key.to_pkcs8_der()?,
            EcSecret::P521(key) => key.to_pkcs8_der()?,
        };
        Ok(doc.as_bytes().to_vec())
    }

    /// Export private key to PKCS8 PEM format
    pub fn to_pkcs8_pem(&self) -> Result<String> {
        let pem = match &self.inner {
            EcSecret::P256(key) => key.to_pkcs8_pem(LineEnding::LF)?,
            EcSecret::P384(key) => key.to_pkcs8_pem(LineEnding::LF)?,
            EcSecret::P521(key) => key.to_pkcs8_pem(LineEnding::LF)?,
        };
        Ok(pem.to_string())
    }

    /// Export public key to SPKI DER format
    pub fn to_spki_der(&self) -> Result<Vec<u8>> {
        let doc = match &self.inner {
            EcSecret::P256(key) => key.public_key().to_public_key_der()?,
            EcSecret::P384(key) => key.public_key().to_public_key_der()?,
            EcSecret::P521(key) => key.public_key().to_public_key_der()?,
        };
        Ok(doc.as_bytes().to_vec())
    }

    /// Export public key to SPKI PEM format
    pub fn to_spki_pem(&self) -> Result<String> {
        let pem = match &self.inner {
            EcSecret::P256(key) => key.public_key().to_public_key_pem(LineEnding::LF)?,
            EcSecret::P384(key) => key.public_key().to_public_key_pem(LineEnding::LF)?,
            EcSecret::P521(key) => key.public_key().to_public_key_pem(LineEnding::LF)?,
        };
        Ok(pem)
    }

    /// Sign with the curve's digest, returning a DER-encoded signature
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match &self.inner {
            EcSecret::P256(key) => {
                use p256::ecdsa::{signature::Signer, Signature, SigningKey};
                let signature: Signature = SigningKey::from(key).sign(message);
                Ok(signature.to_der().as_bytes().to_vec())
            }
            EcSecret::P384(key) => {
                use p384::ecdsa::{signature::Signer, Signature, SigningKey};
                let signature: Signature = SigningKey::from(key).sign(message);
                Ok(signature.to_der().as_bytes().to_vec())
            }
            EcSecret::P521(key) => {
                use p521::ecdsa::{signature::Signer, Signature, SigningKey};
                let signing_key = SigningKey::from_slice(&key.to_bytes())
                    .map_err(|e| Error::Other(format!("P-521 signing key: {e}")))?;
                let signature: Signature = signing_key.sign(message);
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }
}

/// Curve named by an EC public key in SPKI DER form
pub fn curve_from_spki_der(spki_der: &[u8]) -> Result<EcCurve> {
    let spki = SubjectPublicKeyInfoRef::from_der(spki_der)?;
    let oid = spki.algorithm.parameters_oid()?;
    EcCurve::from_oid(&oid).ok_or_else(|| Error::UnsupportedCurve(oid.to_string()))
}

/// Verify a DER-encoded ECDSA signature against an SPKI DER public key
///
/// The digest is implied by the curve.
pub fn verify_with_spki_der(spki_der: &[u8], message: &[u8], signature: &[u8]) -> Result<bool> {
    let spki = SubjectPublicKeyInfoRef::from_der(spki_der)?;
    let oid = spki.algorithm.parameters_oid()?;
    let curve = EcCurve::from_oid(&oid).ok_or_else(|| Error::UnsupportedCurve(oid.to_string()))?;
    let point = spki.subject_public_key.raw_bytes();

    let verified = match curve {
        EcCurve::P256 => {
            use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
            let Ok(key) = VerifyingKey::from_sec1_bytes(point) else {
                return Ok(false);
            };
            let Ok(signature) = Signature::from_der(signature) else {
                return Ok(false);
            };
            key.verify(message, &signature).is_ok()
        }
        EcCurve::P384 => {
            use p384::ecdsa::{signature::Verifier, Signature, VerifyingKey};
            let Ok(key) = VerifyingKey::from_sec1_bytes(point) else {
                return Ok(false);
            };
            let Ok(signature) = Signature::from_der(signature) else {
                return Ok(false);
            };
            key.verify(message, &signature).is_ok()
        }
        EcCurve::P521 => {
            use p521::ecdsa::{signature::Verifier, Signature, VerifyingKey};
            let Ok(key) = VerifyingKey::from_sec1_bytes(point) else {
                return Ok(false);
            };
            let Ok(signature) = Signature::from_der(signature) else {
                return Ok(false);
            };
            key.verify(message, &signature).is_ok()
        }
    };
    Ok(verified)
}
