//! TBS construction and signing
//!
//! Follows build_unsigned → to_der → sign → assemble, so the bytes that are
//! signed are exactly the bytes that end up in the certificate.

use der::{asn1::BitString, Encode};
use privca_key::{KeySign, SigningKey};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use time::OffsetDateTime;
use x509_cert::{
    ext::Extension, name::Name, serial_number::SerialNumber, time::Validity, Certificate,
    TbsCertificate, Version,
};

use super::cert_utils::to_x509_time;
use crate::error::{PkiError, Result};

/// Everything that goes into a certificate apart from the signature
#[derive(Debug, Clone)]
pub struct CertificateParams {
    pub serial_number: SerialNumber,
    pub subject: Name,
    pub issuer: Name,
    pub subject_public_key_info: SubjectPublicKeyInfoOwned,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub extensions: Vec<Extension>,
}

pub fn build_unsigned(
    params: CertificateParams,
    signature: AlgorithmIdentifierOwned,
) -> Result<TbsCertificate> {
    if params.not_after <= params.not_before {
        return Err(PkiError::ValidationError(format!(
            "notAfter {} is not after notBefore {}",
            params.not_after, params.not_before
        )));
    }

    Ok(TbsCertificate {
        version: Version::V3,
        serial_number: params.serial_number,
        signature,
        issuer: params.issuer,
        validity: Validity {
            not_before: to_x509_time(params.not_before)?,
            not_after: to_x509_time(params.not_after)?,
        },
        subject: params.subject,
        subject_public_key_info: params.subject_public_key_info,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: (!params.extensions.is_empty()).then_some(params.extensions),
    })
}

pub fn assemble(
    tbs_certificate: TbsCertificate,
    signature_algorithm: AlgorithmIdentifierOwned,
    signature: &[u8],
) -> Result<Certificate> {
    Ok(Certificate {
        tbs_certificate,
        signature_algorithm,
        signature: BitString::from_bytes(signature)?,
    })
}

/// Sign the DER of any to-be-signed structure
pub fn sign_der<T: Encode>(tbs: &T, signer: &dyn SigningKey) -> Result<Vec<u8>> {
    let der = tbs
        .to_der()
        .map_err(|e| PkiError::EncodingError(format!("Failed to encode TBS: {e}")))?;
    signer.sign(&der).map_err(|e| {
        tracing::error!(tbs_len = der.len(), "Signing failed");
        PkiError::SigningError(e.to_string())
    })
}

pub fn sign_certificate(params: CertificateParams, signer: &dyn SigningKey) -> Result<Certificate> {
    let algorithm = signer.signature_algorithm_id();
    let tbs = build_unsigned(params, algorithm.clone())?;
    let signature = sign_der(&tbs, signer)?;
    assemble(tbs, algorithm, &signature)
}
