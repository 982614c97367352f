//! Signature verification against SPKI-encoded public keys
//!
//! Covers the signature algorithms X.509 objects issued by this CA carry,
//! and refuses the legacy digests (MD2, MD5, SHA-1) outright.

use const_oid::ObjectIdentifier;
use privca_crypto::{
    asymmetric::{ecdsa, ed25519, rsa},
    EcCurve, HashAlgorithm,
};
use spki::{der::Decode, SubjectPublicKeyInfoRef};

use super::{
    ecdsa::{ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ECDSA_WITH_SHA_512},
    KeySpec,
};
use crate::error::{Error, Result};

/// sha384WithRSAEncryption
pub const SHA_384_WITH_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
/// sha512WithRSAEncryption
pub const SHA_512_WITH_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");

const MD2_WITH_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.2");
const MD5_WITH_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.4");
const SHA_1_WITH_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const ECDSA_WITH_SHA_1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");

/// Whether a signature algorithm relies on a broken digest
pub fn is_weak_signature_algorithm(oid: &ObjectIdentifier) -> bool {
    [
        MD2_WITH_RSA_ENCRYPTION,
        MD5_WITH_RSA_ENCRYPTION,
        SHA_1_WITH_RSA_ENCRYPTION,
        ECDSA_WITH_SHA_1,
    ]
    .contains(oid)
}

/// Human readable name of a signature algorithm OID
pub fn signature_algorithm_name(oid: &ObjectIdentifier) -> String {
    let name = match *oid {
        o if o == const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION => "sha256WithRSAEncryption",
        o if o == SHA_384_WITH_RSA_ENCRYPTION => "sha384WithRSAEncryption",
        o if o == SHA_512_WITH_RSA_ENCRYPTION => "sha512WithRSAEncryption",
        o if o == ECDSA_WITH_SHA_256 => "ecdsa-with-SHA256",
        o if o == ECDSA_WITH_SHA_384 => "ecdsa-with-SHA384",
        o if o == ECDSA_WITH_SHA_512 => "ecdsa-with-SHA512",
        o if o == const_oid::db::rfc8410::ID_ED_25519 => "Ed25519",
        o if o == MD2_WITH_RSA_ENCRYPTION => "md2WithRSAEncryption",
        o if o == MD5_WITH_RSA_ENCRYPTION => "md5WithRSAEncryption",
        o if o == SHA_1_WITH_RSA_ENCRYPTION => "sha1WithRSAEncryption",
        o if o == ECDSA_WITH_SHA_1 => "ecdsa-with-SHA1",
        _ => return oid.to_string(),
    };
    name.to_string()
}

/// Verify `signature` over `message` with the public key in `spki_der`
///
/// Returns `Ok(false)` for a well-formed but wrong signature and an error
/// for algorithms that are unsupported or refused.
pub fn verify_signature(
    spki_der: &[u8],
    signature_algorithm: &ObjectIdentifier,
    message: &[u8],
    signature: &[u8],
) -> Result<bool> {
    if is_weak_signature_algorithm(signature_algorithm) {
        return Err(Error::UnsupportedAlgorithm(format!(
            "weak signature algorithm {}",
            signature_algorithm_name(signature_algorithm)
        )));
    }

    let oid = *signature_algorithm;
    let verified = if oid == const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION {
        rsa::verify_with_spki_der(spki_der, message, signature, HashAlgorithm::Sha256)?
    } else if oid == SHA_384_WITH_RSA_ENCRYPTION {
        rsa::verify_with_spki_der(spki_der, message, signature, HashAlgorithm::Sha384)?
    } else if oid == SHA_512_WITH_RSA_ENCRYPTION {
        rsa::verify_with_spki_der(spki_der, message, signature, HashAlgorithm::Sha512)?
    } else if oid == ECDSA_WITH_SHA_256 || oid == ECDSA_WITH_SHA_384 || oid == ECDSA_WITH_SHA_512 {
        // the digest is bound to the curve
        let expected = match ecdsa::curve_from_spki_der(spki_der)? {
            EcCurve::P256 => ECDSA_WITH_SHA_256,
            EcCurve::P384 => ECDSA_WITH_SHA_384,
            EcCurve::P521 => ECDSA_WITH_SHA_512,
        };
        if expected != oid {
            return Err(Error::UnsupportedAlgorithm(format!(
                "{} with this curve",
                signature_algorithm_name(&oid)
            )));
        }
        ecdsa::verify_with_spki_der(spki_der, message, signature)?
    } else if oid == const_oid::db::rfc8410::ID_ED_25519 {
        ed25519::verify_with_spki_der(spki_der, message, signature)?
    } else {
        return Err(Error::UnsupportedAlgorithm(format!(
            "signature algorithm {}",
            signature_algorithm_name(&oid)
        )));
    };

    Ok(verified)
}

/// Describe the key held in an SPKI structure
///
/// RSA sizes are reported as found, so callers can apply their own floor.
pub fn describe_spki(spki_der: &[u8]) -> Result<KeySpec> {
    let spki = SubjectPublicKeyInfoRef::from_der(spki_der)
        .map_err(|e| Error::EncodingError(format!("Failed to parse SPKI: {e}")))?;
    let oid = spki.algorithm.oid;

    if oid == const_oid::db::rfc5912::RSA_ENCRYPTION {
        let bits = rsa::modulus_bits(spki_der)?;
        return Ok(KeySpec::Rsa { bits });
    }
    if oid == const_oid::db::rfc5912::ID_EC_PUBLIC_KEY {
        let curve = ecdsa::curve_from_spki_der(spki_der)?;
        return Ok(KeySpec::Ecdsa { curve });
    }
    if oid == const_oid::db::rfc8410::ID_ED_25519 {
        return Ok(KeySpec::Ed25519);
    }

    Err(Error::UnsupportedAlgorithm(format!("public key algorithm {oid}")))
}
