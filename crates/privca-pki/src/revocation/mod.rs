//! 证书撤销与 CRL 发布

pub mod crl;

use serde_json::json;
use time::{Duration, OffsetDateTime};

pub use crl::{build_crl, parse_crl, CrlParams};

use crate::{
    audit::{AuditAction, AuditEvent},
    ca::manager::issuer_key_id,
    cert::cert_utils::{normalize_serial, whole_seconds},
    context::PkiContext,
    error::{PkiError, Result},
    store::{CrlSnapshot, RevokedEntry},
    types::{CrlIssuance, CrlKind, RevocationReason, RevocationRecord},
};

/// MIME type CRLs are served with
pub const CRL_CONTENT_TYPE: &str = "application/x-pkcs7-crl";

/// CRL 编码格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrlEncoding {
    Pem,
    Der,
}

/// 撤销管理器
#[derive(Debug, Clone)]
pub struct RevocationManager {
    ctx: PkiContext,
}

impl RevocationManager {
    pub fn new(ctx: PkiContext) -> Self {
        Self { ctx }
    }

    /// 撤销证书
    pub fn revoke_certificate(
        &self,
        serial_number: &str,
        reason: RevocationReason,
        revoked_by: &str,
    ) -> Result<RevocationRecord> {
        let serial_number = normalize_serial(serial_number);
        let certificate = self
            .ctx
            .store
            .get_certificate_by_serial(&serial_number)?
            .ok_or_else(|| PkiError::CertificateNotFound(serial_number.clone()))?;

        let record = RevocationRecord {
            serial_number: serial_number.clone(),
            certificate_id: certificate.id.clone(),
            ca_id: certificate.ca_id.clone(),
            revocation_date: whole_seconds(OffsetDateTime::now_utc()),
            reason,
            revoked_by: revoked_by.to_string(),
            sequence: 0,
        };
        let record = self.ctx.store.revoke(record)?;

        tracing::info!(ca_id = %record.ca_id, serial = %serial_number, reason = %reason, "Certificate revoked");
        self.ctx.audit(AuditEvent::new(
            AuditAction::CertificateRevoked,
            revoked_by,
            format!("Revoked certificate {serial_number}"),
            json!({
                "ca_id": record.ca_id,
                "certificate_id": record.certificate_id,
                "serial": serial_number,
                "reason": reason.as_str(),
            }),
        ));
        Ok(record)
    }

    pub fn get_revocation(&self, serial_number: &str) -> Result<Option<RevocationRecord>> {
        self.ctx.store.get_revocation(&normalize_serial(serial_number))
    }

    pub fn list_revocations(&self, ca_id: &str) -> Result<Vec<RevocationRecord>> {
        self.ctx.find_ca(ca_id)?;
        self.ctx.store.list_revocations(ca_id)
    }

    /// 生成 CRL
    ///
    /// Number allocation, signing and persistence happen as one store unit,
    /// so concurrent calls never share a number and a failed build leaves
    /// the counter untouched.
    pub fn generate_crl(&self, ca_id: &str, kind: CrlKind, actor: &str) -> Result<CrlIssuance> {
        let ca = self.ctx.active_ca(ca_id)?;
        let ca_cert = self.ctx.ca_certificate(&ca)?;
        let signing_key = self.ctx.ca_signing_key(&ca)?;
        let authority_key_id = issuer_key_id(&ca_cert)?;
        let issuer = ca_cert.tbs_certificate.subject.clone();
        let next_update_interval = Duration::hours(i64::from(self.ctx.config.crl.next_update_hours));
        let retention = Duration::days(i64::from(self.ctx.config.crl.retention_days));

        let mut build = |snapshot: CrlSnapshot<'_>| -> Result<CrlIssuance> {
            let this_update = whole_seconds(OffsetDateTime::now_utc());
            let (entries, base_crl_number): (Vec<RevokedEntry>, Option<u64>) = match kind {
                CrlKind::Full => (
                    snapshot
                        .revocations
                        .into_iter()
                        .filter(|entry| entry.certificate_valid_to + retention >= this_update)
                        .collect(),
                    None,
                ),
                CrlKind::Delta => {
                    let base = snapshot.latest_full.ok_or_else(|| {
                        PkiError::ValidationError(format!(
                            "CA {ca_id} has no full CRL to base a delta on"
                        ))
                    })?;
                    (
                        snapshot
                            .revocations
                            .into_iter()
                            .filter(|entry| entry.record.sequence > base.revocation_watermark)
                            .collect(),
                        Some(base.crl_number),
                    )
                }
            };

            let next_update = this_update + next_update_interval;
            let list = build_crl(
                CrlParams {
                    issuer: issuer.clone(),
                    crl_number: snapshot.crl_number,
                    base_crl_number,
                    this_update,
                    next_update,
                    entries: &entries,
                    authority_key_id: &authority_key_id,
                    distribution_url: snapshot.ca.crl_distribution_url.as_deref(),
                },
                signing_key.as_ref(),
            )?;
            let crl_der = crl::crl_der(&list)?;

            Ok(CrlIssuance {
                crl_number: snapshot.crl_number,
                ca_id: snapshot.ca.id.clone(),
                kind,
                base_crl_number,
                crl_pem: crl::crl_pem(&crl_der),
                crl_der,
                this_update,
                next_update,
                entry_count: entries.len(),
                revocation_watermark: snapshot.revocation_watermark,
            })
        };
        let issuance = self.ctx.store.issue_crl(ca_id, &mut build)?;

        tracing::info!(
            ca_id = %ca_id,
            crl_number = issuance.crl_number,
            kind = ?kind,
            entries = issuance.entry_count,
            "CRL generated"
        );
        self.ctx.audit(AuditEvent::new(
            AuditAction::CrlGenerated,
            actor,
            format!("Generated CRL {} for CA {ca_id}", issuance.crl_number),
            json!({
                "ca_id": ca_id,
                "crl_number": issuance.crl_number,
                "kind": format!("{kind:?}"),
                "base_crl_number": issuance.base_crl_number,
                "entries": issuance.entry_count,
            }),
        ));
        Ok(issuance)
    }

    /// 最新一次签发的 CRL（完整或增量）
    pub fn latest_crl(&self, ca_id: &str) -> Result<CrlIssuance> {
        self.ctx.find_ca(ca_id)?;
        self.ctx
            .store
            .latest_crl(ca_id, None)?
            .ok_or_else(|| PkiError::CrlNotFound(format!("CA {ca_id} has not published a CRL")))
    }

    pub fn get_crl(&self, ca_id: &str, crl_number: u64) -> Result<CrlIssuance> {
        self.ctx
            .store
            .get_crl(ca_id, crl_number)?
            .ok_or_else(|| PkiError::CrlNotFound(format!("CRL {crl_number} of CA {ca_id}")))
    }

    /// CRL bytes for publication: "latest" when `crl_number` is `None`
    pub fn crl_bytes(&self, ca_id: &str, crl_number: Option<u64>, encoding: CrlEncoding) -> Result<Vec<u8>> {
        let issuance = match crl_number {
            Some(number) => self.get_crl(ca_id, number)?,
            None => self.latest_crl(ca_id)?,
        };
        Ok(match encoding {
            CrlEncoding::Pem => issuance.crl_pem.into_bytes(),
            CrlEncoding::Der => issuance.crl_der,
        })
    }
}
