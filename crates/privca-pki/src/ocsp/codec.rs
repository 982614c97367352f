//! OCSP 编解码 (RFC 6960)
//!
//! Keeps the `x509-ocsp` structures behind a small surface: parse a request,
//! build a signed response, and the client-side pair used by tests and tools.

use const_oid::db::rfc5912;
pub use const_oid::db::rfc6960::{ID_PKIX_OCSP_BASIC, ID_PKIX_OCSP_NONCE};
use der::{
    asn1::{BitString, GeneralizedTime, Null, OctetString},
    Any, Decode, Encode,
};
use privca_key::{KeySign, SigningKey};
use spki::AlgorithmIdentifierOwned;
use time::OffsetDateTime;
use x509_cert::{ext::Extension, name::Name, Certificate};
use x509_ocsp::{
    BasicOcspResponse, CertId, CertStatus, OcspGeneralizedTime, OcspRequest, OcspResponse,
    Request, ResponderId, ResponseData, RevokedInfo, SingleResponse, TbsRequest, Version,
};

use super::OcspStatus;
use crate::{
    cert::{
        builder::sign_der,
        cert_utils::{from_unix_duration, serial_from_hex, serial_hex, spki_der, to_generalized_time},
    },
    error::{PkiError, Result},
    types::RevocationReason,
};

/// 证书状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateState {
    Good,
    Revoked {
        at: OffsetDateTime,
        reason: Option<RevocationReason>,
    },
    Unknown,
}

/// The parts of an OCSPRequest the responder acts on
#[derive(Debug, Clone)]
pub struct ParsedOcspRequest {
    /// First CertID, echoed back verbatim
    pub cert_id: CertId,
    /// Lowercase hex, as stored
    pub serial_number: String,
    pub nonce: Option<Extension>,
}

/// Parse a DER OCSPRequest; anything unusable is `MalformedRequest`
pub fn parse_ocsp_request(der: &[u8]) -> Result<ParsedOcspRequest> {
    let request = OcspRequest::from_der(der)
        .map_err(|e| PkiError::MalformedRequest(format!("Not an OCSPRequest: {e}")))?;
    let TbsRequest {
        request_list,
        request_extensions,
        ..
    } = request.tbs_request;

    let first = request_list
        .into_iter()
        .next()
        .ok_or_else(|| PkiError::MalformedRequest("Request list is empty".to_string()))?;
    let serial_number = serial_hex(&first.req_cert.serial_number);
    if serial_number.is_empty() {
        return Err(PkiError::MalformedRequest("CertID has no serial number".to_string()));
    }

    let nonce = request_extensions
        .unwrap_or_default()
        .into_iter()
        .find(|ext| ext.extn_id == ID_PKIX_OCSP_NONCE);

    Ok(ParsedOcspRequest {
        cert_id: first.req_cert,
        serial_number,
        nonce,
    })
}

/// Whether a CertID names `issuer` (by name hash and key hash)
pub fn cert_id_matches_issuer(cert_id: &CertId, issuer: &Certificate) -> bool {
    let Ok(name_der) = issuer.tbs_certificate.subject.to_der() else {
        return false;
    };
    let key = issuer.tbs_certificate.subject_public_key_info.subject_public_key.raw_bytes();

    let (name_hash, key_hash) = match cert_id.hash_algorithm.oid {
        oid if oid == rfc5912::ID_SHA_1 => (
            privca_crypto::sha1(&name_der).to_vec(),
            privca_crypto::sha1(key).to_vec(),
        ),
        oid if oid == rfc5912::ID_SHA_256 => (
            privca_crypto::sha256(&name_der).to_vec(),
            privca_crypto::sha256(key).to_vec(),
        ),
        _ => return false,
    };
    cert_id.issuer_name_hash.as_bytes() == name_hash.as_slice()
        && cert_id.issuer_key_hash.as_bytes() == key_hash.as_slice()
}

/// Inputs for one signed response
#[derive(Debug)]
pub struct OcspResponseParams {
    pub cert_id: CertId,
    pub state: CertificateState,
    pub produced_at: OffsetDateTime,
    pub this_update: OffsetDateTime,
    pub next_update: OffsetDateTime,
    pub responder_name: Name,
    pub nonce: Option<Extension>,
    /// Signing CA certificate, carried in `certs`
    pub signer_certificate: Certificate,
}

fn ocsp_time(at: OffsetDateTime) -> Result<OcspGeneralizedTime> {
    Ok(OcspGeneralizedTime(to_generalized_time(at)?))
}

/// 构造并签名 BasicOCSPResponse，封装为 successful OCSPResponse
pub fn build_ocsp_response(params: OcspResponseParams, signer: &dyn SigningKey) -> Result<Vec<u8>> {
    let cert_status = match params.state {
        CertificateState::Good => CertStatus::good(),
        CertificateState::Revoked { at, reason } => CertStatus::revoked(RevokedInfo {
            revocation_time: ocsp_time(at)?,
            revocation_reason: reason.map(|reason| reason.to_crl_reason()),
        }),
        CertificateState::Unknown => CertStatus::unknown(),
    };

    let tbs_response_data = ResponseData {
        version: Version::V1,
        responder_id: ResponderId::ByName(params.responder_name),
        produced_at: ocsp_time(params.produced_at)?,
        responses: vec![SingleResponse {
            cert_id: params.cert_id,
            cert_status,
            this_update: ocsp_time(params.this_update)?,
            next_update: Some(ocsp_time(params.next_update)?),
            single_extensions: None,
        }],
        response_extensions: params.nonce.map(|nonce| vec![nonce]),
    };

    let signature = sign_der(&tbs_response_data, signer)?;
    let basic = BasicOcspResponse {
        tbs_response_data,
        signature_algorithm: signer.signature_algorithm_id(),
        signature: BitString::from_bytes(&signature)?,
        certs: Some(vec![params.signer_certificate]),
    };
    let response = OcspResponse::successful(basic)
        .map_err(|e| PkiError::EncodingError(format!("Failed to encode BasicOCSPResponse: {e}")))?;
    Ok(response.to_der()?)
}

/// Unsigned response carrying only an error status
pub fn error_response(status: OcspStatus) -> Vec<u8> {
    let response = OcspResponse {
        response_status: status.into(),
        response_bytes: None,
    };
    response.to_der().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to encode OCSP error response");
        // SEQUENCE { ENUMERATED internalError }
        vec![0x30, 0x03, 0x0a, 0x01, 0x02]
    })
}

/// Build a DER OCSPRequest for one serial issued by `issuer`
///
/// CertID hashes use SHA-1, as most clients still send.
pub fn build_ocsp_request(issuer: &Certificate, serial_hex_str: &str, nonce: Option<&[u8]>) -> Result<Vec<u8>> {
    let name_hash = privca_crypto::sha1(&issuer.tbs_certificate.subject.to_der()?);
    let key_hash = privca_crypto::sha1(
        issuer
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .raw_bytes(),
    );

    let request_extensions = nonce
        .map(|nonce| -> Result<Vec<Extension>> {
            Ok(vec![Extension {
                extn_id: ID_PKIX_OCSP_NONCE,
                critical: false,
                extn_value: OctetString::new(OctetString::new(nonce)?.to_der()?)?,
            }])
        })
        .transpose()?;

    let request = OcspRequest {
        tbs_request: TbsRequest {
            version: Version::V1,
            requestor_name: None,
            request_list: vec![Request {
                req_cert: CertId {
                    hash_algorithm: AlgorithmIdentifierOwned {
                        oid: rfc5912::ID_SHA_1,
                        parameters: Some(Any::from(Null)),
                    },
                    issuer_name_hash: OctetString::new(name_hash.to_vec())?,
                    issuer_key_hash: OctetString::new(key_hash.to_vec())?,
                    serial_number: serial_from_hex(serial_hex_str)?,
                },
                single_request_extensions: None,
            }],
            request_extensions,
        },
        optional_signature: None,
    };
    Ok(request.to_der()?)
}

/// One SingleResponse, decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleResponseInfo {
    pub serial_number: String,
    pub state: CertificateState,
    pub this_update: OffsetDateTime,
    pub next_update: Option<OffsetDateTime>,
}

/// Decoded OCSPResponse
#[derive(Debug, Clone)]
pub struct OcspResponseInfo {
    pub status: OcspStatus,
    pub responses: Vec<SingleResponseInfo>,
    pub responder_name: Option<String>,
    /// Raw extnValue of the echoed nonce
    pub nonce: Option<Vec<u8>>,
    /// Signature check against the first certificate in `certs`
    pub signature_verified: Option<bool>,
}

fn generalized(time: &OcspGeneralizedTime) -> Result<OffsetDateTime> {
    let inner: &GeneralizedTime = &time.0;
    from_unix_duration(inner.to_unix_duration())
}

/// Decode an OCSPResponse, verifying its signature when a signer certificate is included
pub fn decode_ocsp_response(der: &[u8]) -> Result<OcspResponseInfo> {
    let response = OcspResponse::from_der(der)
        .map_err(|e| PkiError::ParseError(format!("Not an OCSPResponse: {e}")))?;
    let status = OcspStatus::from(response.response_status);
    let Some(bytes) = response.response_bytes else {
        return Ok(OcspResponseInfo {
            status,
            responses: Vec::new(),
            responder_name: None,
            nonce: None,
            signature_verified: None,
        });
    };
    if bytes.response_type != ID_PKIX_OCSP_BASIC {
        return Err(PkiError::ParseError(format!(
            "Unsupported response type {}",
            bytes.response_type
        )));
    }
    let basic = BasicOcspResponse::from_der(bytes.response.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("Malformed BasicOCSPResponse: {e}")))?;
    let data = &basic.tbs_response_data;

    let responses = data
        .responses
        .iter()
        .map(|single| {
            let state = match &single.cert_status {
                CertStatus::Good(_) => CertificateState::Good,
                CertStatus::Revoked(info) => CertificateState::Revoked {
                    at: generalized(&info.revocation_time)?,
                    reason: info.revocation_reason.map(RevocationReason::from_crl_reason),
                },
                CertStatus::Unknown(_) => CertificateState::Unknown,
            };
            Ok(SingleResponseInfo {
                serial_number: serial_hex(&single.cert_id.serial_number),
                state,
                this_update: generalized(&single.this_update)?,
                next_update: single.next_update.as_ref().map(generalized).transpose()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let responder_name = match &data.responder_id {
        ResponderId::ByName(name) => Some(name.to_string()),
        ResponderId::ByKey(_) => None,
    };
    let nonce = data
        .response_extensions
        .as_ref()
        .and_then(|exts| exts.iter().find(|ext| ext.extn_id == ID_PKIX_OCSP_NONCE))
        .map(|ext| ext.extn_value.as_bytes().to_vec());

    let signature_verified = match basic.certs.as_ref().and_then(|certs| certs.first()) {
        Some(signer) => {
            let tbs = data.to_der()?;
            let signature = basic
                .signature
                .as_bytes()
                .ok_or_else(|| PkiError::ParseError("Signature has unused bits".to_string()))?;
            Some(privca_key::verify_signature(
                &spki_der(signer)?,
                &basic.signature_algorithm.oid,
                &tbs,
                signature,
            )?)
        }
        None => None,
    };

    Ok(OcspResponseInfo {
        status,
        responses,
        responder_name,
        nonce,
        signature_verified,
    })
}
