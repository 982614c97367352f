//! OCSP 响应器
//!
//! Answers DER OCSPRequests for certificates in the store. Every outcome,
//! including failures, is a DER OCSPResponse; nothing is returned as an error.

pub mod codec;

use time::{Duration, OffsetDateTime};
use x509_cert::Certificate;
use x509_ocsp::{CertId, OcspResponseStatus};

pub use codec::{
    build_ocsp_request, decode_ocsp_response, error_response, CertificateState, OcspResponseInfo,
    SingleResponseInfo,
};

use crate::{
    cert::cert_utils::whole_seconds,
    context::PkiContext,
    error::{PkiError, Result},
    types::{CaIdentity, CertificateStatus, IssuedCertificate},
};
use codec::{build_ocsp_response, cert_id_matches_issuer, parse_ocsp_request, OcspResponseParams};

pub const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";
pub const OCSP_RESPONSE_CONTENT_TYPE: &str = "application/ocsp-response";

/// OCSPResponseStatus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcspStatus {
    Successful,
    MalformedRequest,
    InternalError,
    TryLater,
    SigRequired,
    Unauthorized,
}

impl From<OcspStatus> for OcspResponseStatus {
    fn from(status: OcspStatus) -> Self {
        match status {
            OcspStatus::Successful => Self::Successful,
            OcspStatus::MalformedRequest => Self::MalformedRequest,
            OcspStatus::InternalError => Self::InternalError,
            OcspStatus::TryLater => Self::TryLater,
            OcspStatus::SigRequired => Self::SigRequired,
            OcspStatus::Unauthorized => Self::Unauthorized,
        }
    }
}

impl From<OcspResponseStatus> for OcspStatus {
    fn from(status: OcspResponseStatus) -> Self {
        match status {
            OcspResponseStatus::Successful => Self::Successful,
            OcspResponseStatus::MalformedRequest => Self::MalformedRequest,
            OcspResponseStatus::InternalError => Self::InternalError,
            OcspResponseStatus::TryLater => Self::TryLater,
            OcspResponseStatus::SigRequired => Self::SigRequired,
            OcspResponseStatus::Unauthorized => Self::Unauthorized,
        }
    }
}

/// OCSP 响应器
#[derive(Debug, Clone)]
pub struct OcspResponder {
    ctx: PkiContext,
}

impl OcspResponder {
    pub fn new(ctx: PkiContext) -> Self {
        Self { ctx }
    }

    /// 处理 OCSP 请求，总是返回 DER 编码的 OCSPResponse
    pub fn handle_ocsp_request(&self, request_der: &[u8]) -> Vec<u8> {
        match self.respond(request_der) {
            Ok(response) => response,
            Err(e) => {
                let status = e.ocsp_status();
                tracing::warn!(error = %e, ?status, "OCSP request not answered");
                error_response(status)
            }
        }
    }

    fn respond(&self, request_der: &[u8]) -> Result<Vec<u8>> {
        let request = parse_ocsp_request(request_der)?;
        let now = whole_seconds(OffsetDateTime::now_utc());

        let active = self.active_cas(now)?;
        let certificate = self.ctx.store.get_certificate_by_serial(&request.serial_number)?;
        // a serial issued by one CA says nothing about a CertID naming another
        let (state, owner) = match &certificate {
            Some(certificate) if self.issuing_ca_named(certificate, &request.cert_id)? => (
                self.certificate_state(certificate, now)?,
                active.iter().find(|(ca, _)| ca.id == certificate.ca_id),
            ),
            _ => (CertificateState::Unknown, None),
        };

        let (ca, ca_cert) = owner
            .or_else(|| {
                active
                    .iter()
                    .find(|(_, cert)| cert_id_matches_issuer(&request.cert_id, cert))
            })
            .or_else(|| active.first())
            .ok_or_else(|| PkiError::TryLater("No active CA can sign OCSP responses".to_string()))?;
        let signing_key = self.ctx.ca_signing_key(ca).map_err(|e| {
            PkiError::TryLater(format!("CA {} has no usable signing key: {e}", ca.id))
        })?;
        let next_update = now + Duration::hours(i64::from(self.ctx.config.ocsp.next_update_hours));

        let response = build_ocsp_response(
            OcspResponseParams {
                cert_id: request.cert_id,
                state,
                produced_at: now,
                this_update: now,
                next_update,
                responder_name: ca_cert.tbs_certificate.subject.clone(),
                nonce: request.nonce,
                signer_certificate: ca_cert.clone(),
            },
            signing_key.as_ref(),
        )?;

        tracing::debug!(
            serial = %request.serial_number,
            ca_id = %ca.id,
            state = ?state,
            "OCSP response produced"
        );
        Ok(response)
    }

    fn certificate_state(&self, certificate: &IssuedCertificate, now: OffsetDateTime) -> Result<CertificateState> {
        Ok(match certificate.observed_status(now) {
            CertificateStatus::Revoked => {
                let record = self
                    .ctx
                    .store
                    .get_revocation(&certificate.serial_number)?
                    .ok_or_else(|| {
                        PkiError::InternalError(format!(
                            "Certificate {} is revoked without a revocation record",
                            certificate.serial_number
                        ))
                    })?;
                CertificateState::Revoked {
                    at: record.revocation_date,
                    reason: Some(record.reason),
                }
            }
            CertificateStatus::Active
                if certificate.valid_from <= now && now <= certificate.valid_to =>
            {
                CertificateState::Good
            }
            _ => CertificateState::Unknown,
        })
    }

    /// Whether the CertID's issuer hashes name the CA that issued `certificate`
    fn issuing_ca_named(&self, certificate: &IssuedCertificate, cert_id: &CertId) -> Result<bool> {
        let Some(owner) = self.ctx.store.get_ca(&certificate.ca_id)? else {
            return Ok(false);
        };
        Ok(cert_id_matches_issuer(cert_id, &self.stored_certificate(&owner)?))
    }

    /// Active CAs with their parsed certificates, in store order
    fn active_cas(&self, now: OffsetDateTime) -> Result<Vec<(CaIdentity, Certificate)>> {
        self.ctx
            .store
            .list_cas()?
            .into_iter()
            .filter(|ca| ca.is_active(now) && ca.certificate_pem.is_some())
            .map(|ca| {
                let cert = self.stored_certificate(&ca)?;
                Ok((ca, cert))
            })
            .collect()
    }

    /// Parse failures of stored certificates are `InternalError`
    fn stored_certificate(&self, ca: &CaIdentity) -> Result<Certificate> {
        match ca.certificate_pem {
            Some(_) => self.ctx.ca_certificate(ca).map_err(|e| {
                tracing::error!(ca_id = %ca.id, error = %e, "Stored CA certificate is unreadable");
                PkiError::InternalError(format!("CA {} certificate is unreadable: {e}", ca.id))
            }),
            None => Err(PkiError::CANotActive(format!("CA {} has no certificate", ca.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use privca_crypto::EcCurve;
    use privca_key::KeySpec;

    use super::*;
    use crate::{
        ca::{CaCertificateOptions, CaManager, InitializeCaRequest},
        cert::cert_utils::parse_certificate_pem,
        context::test_support::memory_context,
        issuance::{IssuanceEngine, IssuanceRequest},
        revocation::RevocationManager,
        types::{CertificateType, RevocationReason},
    };

    const P256: KeySpec = KeySpec::Ecdsa { curve: EcCurve::P256 };

    fn active_ca(ctx: &PkiContext, dn: &str) -> String {
        let manager = CaManager::new(ctx.clone());
        let init = manager
            .initialize_ca(InitializeCaRequest::new("ocsp", dn).with_key_spec(P256), "admin")
            .unwrap();
        manager
            .self_sign(&init.ca_id, CaCertificateOptions::with_validity_days(3650), "admin")
            .unwrap();
        init.ca_id
    }

    fn issue(ctx: &PkiContext, ca_id: &str, cn: &str) -> String {
        IssuanceEngine::new(ctx.clone())
            .issue_certificate(
                IssuanceRequest::generated(format!("CN={cn}"), P256, CertificateType::Server),
                ca_id,
                "tester",
            )
            .unwrap()
            .serial_number
    }

    fn query(ctx: &PkiContext, ca_id: &str, serial: &str, nonce: Option<&[u8]>) -> OcspResponseInfo {
        let ca = ctx.find_ca(ca_id).unwrap();
        let issuer = parse_certificate_pem(ca.certificate_pem.as_deref().unwrap()).unwrap();
        let request = build_ocsp_request(&issuer, serial, nonce).unwrap();
        let response = OcspResponder::new(ctx.clone()).handle_ocsp_request(&request);
        decode_ocsp_response(&response).unwrap()
    }

    #[test]
    fn test_good_then_revoked() {
        let (ctx, _) = memory_context();
        let ca_id = active_ca(&ctx, "CN=OCSP Root");
        let serial = issue(&ctx, &ca_id, "svc.example.com");

        let info = query(&ctx, &ca_id, &serial, Some(b"n-1"));
        assert_eq!(info.status, OcspStatus::Successful);
        assert_eq!(info.signature_verified, Some(true));
        assert_eq!(info.responses[0].state, CertificateState::Good);
        assert_eq!(info.responder_name.as_deref(), Some("CN=OCSP Root"));
        assert!(info.nonce.is_some());
        let single = &info.responses[0];
        assert_eq!(single.next_update, Some(single.this_update + Duration::hours(1)));

        let record = RevocationManager::new(ctx.clone())
            .revoke_certificate(&serial, RevocationReason::KeyCompromise, "ops")
            .unwrap();
        let info = query(&ctx, &ca_id, &serial, None);
        assert_eq!(
            info.responses[0].state,
            CertificateState::Revoked {
                at: record.revocation_date,
                reason: Some(RevocationReason::KeyCompromise)
            }
        );
        assert!(info.nonce.is_none());
    }

    #[test]
    fn test_unknown_serial() {
        let (ctx, _) = memory_context();
        let ca_id = active_ca(&ctx, "CN=OCSP Root");
        let info = query(&ctx, &ca_id, "0123456789abcdef", None);
        assert_eq!(info.status, OcspStatus::Successful);
        assert_eq!(info.responses[0].state, CertificateState::Unknown);
        assert_eq!(info.responses[0].serial_number, "0123456789abcdef");
    }

    #[test]
    fn test_signed_by_named_ca() {
        let (ctx, _) = memory_context();
        let _first = active_ca(&ctx, "CN=First Root");
        let second = active_ca(&ctx, "CN=Second Root");
        let info = query(&ctx, &second, "7777", None);
        assert_eq!(info.responder_name.as_deref(), Some("CN=Second Root"));
        assert_eq!(info.signature_verified, Some(true));
    }

    #[test]
    fn test_no_active_ca_is_try_later() {
        let (ctx, _) = memory_context();
        let ca_id = active_ca(&ctx, "CN=Gone Root");
        let ca = ctx.find_ca(&ca_id).unwrap();
        let issuer = parse_certificate_pem(ca.certificate_pem.as_deref().unwrap()).unwrap();
        let request = build_ocsp_request(&issuer, "01", None).unwrap();
        CaManager::new(ctx.clone()).delete_ca(&ca_id, "admin").unwrap();

        let response = OcspResponder::new(ctx).handle_ocsp_request(&request);
        let info = decode_ocsp_response(&response).unwrap();
        assert_eq!(info.status, OcspStatus::TryLater);
        assert!(info.responses.is_empty());
    }

    #[test]
    fn test_serial_under_other_issuer_is_unknown() {
        let (ctx, _) = memory_context();
        let issuing = active_ca(&ctx, "CN=Issuing Root");
        let other = active_ca(&ctx, "CN=Other Root");
        let serial = issue(&ctx, &issuing, "svc.example.com");

        let info = query(&ctx, &other, &serial, None);
        assert_eq!(info.status, OcspStatus::Successful);
        assert_eq!(info.responses[0].state, CertificateState::Unknown);
        assert_eq!(info.responder_name.as_deref(), Some("CN=Other Root"));
        assert_eq!(info.signature_verified, Some(true));

        RevocationManager::new(ctx.clone())
            .revoke_certificate(&serial, RevocationReason::KeyCompromise, "ops")
            .unwrap();
        let info = query(&ctx, &other, &serial, None);
        assert_eq!(info.responses[0].state, CertificateState::Unknown);
        let info = query(&ctx, &issuing, &serial, None);
        assert!(matches!(info.responses[0].state, CertificateState::Revoked { .. }));
    }

    #[test]
    fn test_unreadable_ca_certificate_is_internal_error() {
        let (ctx, _) = memory_context();
        let ca_id = active_ca(&ctx, "CN=Broken Root");
        let serial = issue(&ctx, &ca_id, "svc.example.com");
        let mut ca = ctx.find_ca(&ca_id).unwrap();
        let issuer = parse_certificate_pem(ca.certificate_pem.as_deref().unwrap()).unwrap();
        let request = build_ocsp_request(&issuer, &serial, None).unwrap();

        ca.certificate_pem = Some("-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n".to_string());
        ctx.store.update_ca(ca).unwrap();

        let response = OcspResponder::new(ctx).handle_ocsp_request(&request);
        let info = decode_ocsp_response(&response).unwrap();
        assert_eq!(info.status, OcspStatus::InternalError);
    }

    #[test]
    fn test_malformed_request() {
        let (ctx, _) = memory_context();
        let response = OcspResponder::new(ctx).handle_ocsp_request(&[0x30, 0x02, 0xff]);
        let info = decode_ocsp_response(&response).unwrap();
        assert_eq!(info.status, OcspStatus::MalformedRequest);
    }
}
