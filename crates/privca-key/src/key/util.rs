use std::convert::TryFrom;

use const_oid::ObjectIdentifier;
use pkcs8::{der::pem::PemLabel, spki::der::asn1::AnyRef, PrivateKeyInfo, SecretDocument};
use privca_crypto::EcCurve;

use super::{ecdsa::EcKey, ed25519::Ed25519Key, rsa::RsaKey, SigningKey};
use crate::error::{Error, Result};

/// 根据 PKCS#8 PEM 内容加载具备签名能力的密钥。
///
/// 会自动识别 RSA、ECDSA（P-256/P-384/P-521）与 Ed25519，并返回实现 `SigningKey` 的 trait object。
pub fn load_signing_key_from_pkcs8_pem(pem: &str) -> Result<Box<dyn SigningKey>> {
    let algorithm = detect_signing_algorithm_from_pem(pem)?;

    match algorithm {
        SigningAlgorithm::Ed25519 => Ok(Box::new(Ed25519Key::from_pkcs8_pem(pem)?)),
        SigningAlgorithm::Ecdsa => Ok(Box::new(EcKey::from_pkcs8_pem(pem)?)),
        SigningAlgorithm::Rsa => Ok(Box::new(RsaKey::from_pkcs8_pem(pem)?)),
    }
}

/// 根据 PKCS#8 DER 数据加载具备签名能力的密钥。
pub fn load_signing_key_from_pkcs8_der(der: &[u8]) -> Result<Box<dyn SigningKey>> {
    let algorithm = detect_signing_algorithm_from_der(der)?;

    match algorithm {
        SigningAlgorithm::Ed25519 => Ok(Box::new(Ed25519Key::from_pkcs8_der(der)?)),
        SigningAlgorithm::Ecdsa => Ok(Box::new(EcKey::from_pkcs8_der(der)?)),
        SigningAlgorithm::Rsa => Ok(Box::new(RsaKey::from_pkcs8_der(der)?)),
    }
}

enum SigningAlgorithm {
    Ed25519,
    Ecdsa,
    Rsa,
}

fn detect_signing_algorithm(info: &PrivateKeyInfo<'_>) -> Result<SigningAlgorithm> {
    let oid = info.algorithm.oid;

    if oid == const_oid::db::rfc8410::ID_ED_25519 {
        return Ok(SigningAlgorithm::Ed25519);
    }

    if oid == const_oid::db::rfc5912::RSA_ENCRYPTION {
        return Ok(SigningAlgorithm::Rsa);
    }

    if oid == const_oid::db::rfc5912::ID_EC_PUBLIC_KEY {
        let Some(params) = info.algorithm.parameters else {
            return Err(Error::ImportError(
                "EC key is missing curve parameters".to_string(),
            ));
        };
        let curve_oid = parse_curve_oid(params)?;
        return EcCurve::from_oid(&curve_oid)
            .map(|_| SigningAlgorithm::Ecdsa)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("EC curve OID {curve_oid}")));
    }

    Err(Error::UnsupportedAlgorithm(format!(
        "signing algorithm OID {oid}"
    )))
}

fn parse_curve_oid(any: AnyRef<'_>) -> Result<ObjectIdentifier> {
    ObjectIdentifier::try_from(any)
        .map_err(|e| Error::ImportError(format!("Failed to parse curve OID: {e}")))
}

fn detect_signing_algorithm_from_pem(pem: &str) -> Result<SigningAlgorithm> {
    let (label, doc) = SecretDocument::from_pem(pem)
        .map_err(|e| Error::ImportError(format!("Failed to decode PEM: {e}")))?;

    if label != PrivateKeyInfo::PEM_LABEL {
        return Err(Error::ImportError(format!("Invalid PKCS#8 label: {label}")));
    }

    let info = PrivateKeyInfo::try_from(doc.as_bytes())
        .map_err(|e| Error::ImportError(format!("Failed to parse PKCS#8: {e}")))?;

    detect_signing_algorithm(&info)
}

fn detect_signing_algorithm_from_der(der: &[u8]) -> Result<SigningAlgorithm> {
    let info = PrivateKeyInfo::try_from(der)
        .map_err(|e| Error::ImportError(format!("Failed to parse PKCS#8: {e}")))?;

    detect_signing_algorithm(&info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Algorithm, Key, KeyExport, KeySpec};

    #[test]
    fn test_load_detects_each_algorithm() {
        let rsa = RsaKey::generate(2048).unwrap();
        let loaded = load_signing_key_from_pkcs8_pem(&rsa.to_pkcs8_pem().unwrap()).unwrap();
        assert_eq!(loaded.algorithm(), Algorithm::Rsa);

        let ec = EcKey::generate(EcCurve::P384).unwrap();
        let loaded = load_signing_key_from_pkcs8_der(&ec.to_pkcs8_der().unwrap()).unwrap();
        assert_eq!(loaded.spec(), KeySpec::Ecdsa { curve: EcCurve::P384 });

        let ed = Ed25519Key::generate().unwrap();
        let loaded = load_signing_key_from_pkcs8_pem(&ed.to_pkcs8_pem().unwrap()).unwrap();
        assert_eq!(loaded.algorithm(), Algorithm::Ed25519);
    }

    #[test]
    fn test_load_rejects_public_key_pem() {
        let ed = Ed25519Key::generate().unwrap();
        let public_pem = ed.to_spki_pem().unwrap();
        assert!(matches!(
            load_signing_key_from_pkcs8_pem(&public_pem),
            Err(Error::ImportError(_))
        ));
    }

    #[test]
    fn test_load_rejects_garbage() {
        assert!(load_signing_key_from_pkcs8_der(b"not a key").is_err());
        assert!(load_signing_key_from_pkcs8_pem("not a pem").is_err());
    }
}
