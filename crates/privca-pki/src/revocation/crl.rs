//! CRL 编码
//!
//! Builds and signs X.509 v2 CRLs; bookkeeping lives in the parent module.

use der::{asn1::BitString, Decode, Encode};
use privca_key::{KeySign, SigningKey};
use time::OffsetDateTime;
use x509_cert::{
    crl::{CertificateList, RevokedCert, TbsCertList},
    name::Name,
    Version,
};

use crate::{
    cert::{
        builder::sign_der,
        cert_utils::{serial_from_hex, to_x509_time, PEM_X509_CRL},
        extensions::{authority_key_identifier, crl_number, crl_reason, delta_crl_indicator, issuing_distribution_point},
    },
    error::{PkiError, Result},
    store::RevokedEntry,
};

/// Inputs for one CRL
#[derive(Debug)]
pub struct CrlParams<'a> {
    pub issuer: Name,
    pub crl_number: u64,
    /// Set for a delta CRL
    pub base_crl_number: Option<u64>,
    pub this_update: OffsetDateTime,
    pub next_update: OffsetDateTime,
    pub entries: &'a [RevokedEntry],
    pub authority_key_id: &'a [u8],
    pub distribution_url: Option<&'a str>,
}

/// 构造并签名 CRL
pub fn build_crl(params: CrlParams<'_>, signer: &dyn SigningKey) -> Result<CertificateList> {
    if params.next_update <= params.this_update {
        return Err(PkiError::ValidationError(
            "nextUpdate must be after thisUpdate".to_string(),
        ));
    }

    let revoked = params
        .entries
        .iter()
        .map(|entry| {
            Ok(RevokedCert {
                serial_number: serial_from_hex(&entry.record.serial_number)?,
                revocation_date: to_x509_time(entry.record.revocation_date)?,
                crl_entry_extensions: Some(vec![crl_reason(entry.record.reason.to_crl_reason())?]),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut extensions = vec![
        authority_key_identifier(params.authority_key_id)?,
        crl_number(params.crl_number)?,
        issuing_distribution_point(params.distribution_url)?,
    ];
    if let Some(base) = params.base_crl_number {
        extensions.push(delta_crl_indicator(base)?);
    }

    let algorithm = signer.signature_algorithm_id();
    let tbs_cert_list = TbsCertList {
        version: Version::V2,
        signature: algorithm.clone(),
        issuer: params.issuer,
        this_update: to_x509_time(params.this_update)?,
        next_update: Some(to_x509_time(params.next_update)?),
        revoked_certificates: (!revoked.is_empty()).then_some(revoked),
        crl_extensions: Some(extensions),
    };

    let signature = sign_der(&tbs_cert_list, signer)?;
    Ok(CertificateList {
        tbs_cert_list,
        signature_algorithm: algorithm,
        signature: BitString::from_bytes(&signature)?,
    })
}

pub fn crl_der(crl: &CertificateList) -> Result<Vec<u8>> {
    crl.to_der()
        .map_err(|e| PkiError::EncodingError(format!("Failed to encode CRL: {e}")))
}

pub fn crl_pem(der: &[u8]) -> String {
    crate::cert::cert_utils::der_to_pem(PEM_X509_CRL, der)
}

/// Parse a CRL from PEM or DER
pub fn parse_crl(data: &[u8]) -> Result<CertificateList> {
    let der = if data.starts_with(b"-----BEGIN") {
        let block = pem::parse(data)
            .map_err(|e| PkiError::ParseError(format!("Failed to parse CRL PEM: {e}")))?;
        if block.tag() != PEM_X509_CRL {
            return Err(PkiError::ParseError(format!(
                "Invalid PEM tag {}, expected {PEM_X509_CRL}",
                block.tag()
            )));
        }
        block.into_contents()
    } else {
        data.to_vec()
    };
    CertificateList::from_der(&der)
        .map_err(|e| PkiError::ParseError(format!("Failed to parse CRL DER: {e}")))
}
