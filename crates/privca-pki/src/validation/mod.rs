//! 证书链与信任验证
//!
//! Trust anchors are the certificates of the CAs that are currently active.
//! A certificate is valid when its chain reaches one of them, every link
//! verifies, it is inside its validity window and it has not been revoked.

pub mod cache;

use privca_key::KeySpec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use x509_cert::Certificate;

pub use cache::{CacheKey, ValidationCache};

use crate::{
    audit::{AuditAction, AuditEvent},
    cert::{
        cert_utils::{
            certificate_der, is_self_issued, not_after, not_before, parse_certificate,
            parse_certificate_pem, serial_hex, spki_der, verify_issued_by,
        },
        extensions::{read_basic_constraints, read_subject_alt_names},
        name::dn_string,
        types::CertificateInfo,
    },
    context::PkiContext,
    error::Result,
};

/// Days before notAfter at which a warning is attached
const EXPIRY_WARNING_DAYS: i64 = 30;

/// 验证选项
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Extra untrusted certificates (PEM) that may complete the chain
    pub intermediates: Vec<String>,
    pub check_revocation: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            intermediates: Vec::new(),
            check_revocation: true,
        }
    }
}

impl ValidationOptions {
    pub fn with_intermediates<I, S>(mut self, intermediates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.intermediates = intermediates.into_iter().map(Into::into).collect();
        self
    }
}

/// 有效期信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationInfo {
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
    /// Negative once expired
    pub days_remaining: i64,
    pub expired: bool,
    pub not_yet_valid: bool,
}

impl ExpirationInfo {
    pub fn new(not_before: OffsetDateTime, not_after: OffsetDateTime, now: OffsetDateTime) -> Self {
        Self {
            not_before,
            not_after,
            days_remaining: (not_after - now).whole_days(),
            expired: now > not_after,
            not_yet_valid: now < not_before,
        }
    }
}

/// 验证报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    /// Subject first, then each issuer up to the anchor
    pub chain_info: Vec<CertificateInfo>,
    pub expiration: ExpirationInfo,
    /// The subject certificate's own signature verified
    pub signature_verified: bool,
    /// The chain ended at an active CA certificate
    pub trusted: bool,
    pub revoked: bool,
    pub cached: bool,
}

impl ValidationReport {
    pub fn new(expiration: ExpirationInfo) -> Self {
        Self {
            is_valid: false,
            issues: Vec::new(),
            warnings: Vec::new(),
            chain_info: Vec::new(),
            expiration,
            signature_verified: false,
            trusted: false,
            revoked: false,
            cached: false,
        }
    }

    fn add_issue(&mut self, issue: String) {
        self.issues.push(issue);
    }

    fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    fn conclude(&mut self) {
        self.is_valid = self.issues.is_empty()
            && self.trusted
            && self.signature_verified
            && !self.revoked
            && !self.expiration.expired
            && !self.expiration.not_yet_valid;
    }
}

/// 证书验证器
#[derive(Debug)]
pub struct Validator {
    ctx: PkiContext,
    cache: ValidationCache,
}

impl Validator {
    pub fn new(ctx: PkiContext) -> Self {
        let settings = &ctx.config.validation;
        let cache = ValidationCache::new(settings.cache_ttl_seconds, settings.cache_capacity);
        Self { ctx, cache }
    }

    pub fn cache(&self) -> &ValidationCache {
        &self.cache
    }

    /// 验证证书
    ///
    /// Unparseable input is an error; every other finding lands in the report.
    pub fn validate_certificate(
        &self,
        certificate_pem: &str,
        options: &ValidationOptions,
        actor: &str,
    ) -> Result<ValidationReport> {
        let certificate = parse_certificate(certificate_pem.as_bytes())?;
        let der = certificate_der(&certificate)?;
        let key = CacheKey {
            digest: privca_crypto::sha256_hex(&der),
            options: options.clone(),
        };

        let report = match self.cache.get(&key) {
            Some(mut report) => {
                report.cached = true;
                report
            }
            None => {
                let report = self.evaluate(&certificate, options)?;
                self.cache.insert(key.clone(), report.clone());
                report
            }
        };

        tracing::debug!(
            digest = %key.digest,
            is_valid = report.is_valid,
            cached = report.cached,
            issues = report.issues.len(),
            "Certificate validated"
        );
        self.ctx.audit(AuditEvent::new(
            AuditAction::CertificateValidated,
            actor,
            format!(
                "Validated certificate {}",
                serial_hex(&certificate.tbs_certificate.serial_number)
            ),
            json!({
                "digest": key.digest,
                "is_valid": report.is_valid,
                "cached": report.cached,
                "issues": report.issues.len(),
            }),
        ));
        Ok(report)
    }

    fn evaluate(&self, certificate: &Certificate, options: &ValidationOptions) -> Result<ValidationReport> {
        let now = OffsetDateTime::now_utc();
        let mut report = ValidationReport::new(ExpirationInfo::new(
            not_before(certificate)?,
            not_after(certificate)?,
            now,
        ));
        report.chain_info.push(CertificateInfo::from_certificate(certificate)?);

        if report.expiration.expired {
            report.add_issue(format!(
                "Certificate expired at {}",
                report.expiration.not_after
            ));
        } else if report.expiration.not_yet_valid {
            report.add_issue(format!(
                "Certificate is not yet valid until {}",
                report.expiration.not_before
            ));
        } else if report.expiration.days_remaining < EXPIRY_WARNING_DAYS {
            report.add_warning(format!(
                "Certificate expires in {} days",
                report.expiration.days_remaining
            ));
        }

        self.check_profile(certificate, "Certificate", &mut report)?;
        if !is_ca(certificate)? && read_subject_alt_names(certificate)?.is_empty() {
            report.add_warning("Certificate has no subjectAltName".to_string());
        }

        let anchors = self.trust_anchors(now)?;
        let mut pool = anchors.clone();
        for (index, pem) in options.intermediates.iter().enumerate() {
            match parse_certificate_pem(pem) {
                Ok(cert) => pool.push(cert),
                Err(e) => report.add_issue(format!("Intermediate {index} is not a certificate: {e}")),
            }
        }
        self.walk_chain(certificate, &anchors, &pool, &mut report)?;

        if options.check_revocation {
            let serial = serial_hex(&certificate.tbs_certificate.serial_number);
            if let Some(record) = self.ctx.store.get_revocation(&serial)? {
                report.revoked = true;
                report.add_issue(format!(
                    "Certificate was revoked at {} ({})",
                    record.revocation_date, record.reason
                ));
            }
        }

        report.conclude();
        Ok(report)
    }

    /// Certificates of every active CA
    fn trust_anchors(&self, now: OffsetDateTime) -> Result<Vec<Certificate>> {
        let mut anchors = Vec::new();
        for ca in self.ctx.store.list_cas()? {
            if !ca.is_active(now) {
                continue;
            }
            match self.ctx.ca_certificate(&ca) {
                Ok(cert) => anchors.push(cert),
                Err(e) => tracing::warn!(ca_id = %ca.id, error = %e, "Skipping unreadable CA certificate"),
            }
        }
        Ok(anchors)
    }

    fn walk_chain(
        &self,
        certificate: &Certificate,
        anchors: &[Certificate],
        pool: &[Certificate],
        report: &mut ValidationReport,
    ) -> Result<()> {
        let max_depth = self.ctx.config.validation.max_chain_depth;
        let mut current = certificate.clone();

        for depth in 0..=max_depth {
            if is_self_issued(&current) {
                let verified = self.verify_link(&current, &current, report)?;
                if depth == 0 {
                    report.signature_verified = verified;
                }
                if !verified {
                    report.add_issue(format!(
                        "Self-signature of {} does not verify",
                        dn_string(&current.tbs_certificate.subject)
                    ));
                } else if anchors.contains(&current) {
                    report.trusted = true;
                } else {
                    report.add_issue(format!(
                        "Root {} is not a trusted CA",
                        dn_string(&current.tbs_certificate.subject)
                    ));
                }
                return Ok(());
            }
            if depth == max_depth {
                break;
            }

            let issuer_name = &current.tbs_certificate.issuer;
            let mut issuer = None;
            for candidate in pool.iter().filter(|c| &c.tbs_certificate.subject == issuer_name) {
                if self.verify_link(&current, candidate, report)? {
                    issuer = Some(candidate.clone());
                    break;
                }
            }
            let Some(issuer) = issuer else {
                report.add_issue(format!(
                    "No trusted issuer {} verifies {}",
                    dn_string(issuer_name),
                    dn_string(&current.tbs_certificate.subject)
                ));
                return Ok(());
            };

            if depth == 0 {
                report.signature_verified = true;
            }
            if !is_ca(&issuer)? {
                report.add_issue(format!(
                    "Issuer {} is not a CA certificate",
                    dn_string(&issuer.tbs_certificate.subject)
                ));
            }
            let label = format!("Issuer {}", dn_string(&issuer.tbs_certificate.subject));
            self.check_profile(&issuer, &label, report)?;
            report.chain_info.push(CertificateInfo::from_certificate(&issuer)?);

            if anchors.contains(&issuer) {
                report.trusted = true;
                return Ok(());
            }
            current = issuer;
        }

        report.add_issue(format!("Chain exceeds maximum depth {max_depth}"));
        Ok(())
    }

    /// Signature check that turns algorithm errors into issues
    fn verify_link(&self, subject: &Certificate, issuer: &Certificate, report: &mut ValidationReport) -> Result<bool> {
        match verify_issued_by(subject, &spki_der(issuer)?) {
            Ok(verified) => Ok(verified),
            Err(e) => {
                report.add_issue(format!(
                    "Signature of {} could not be checked: {e}",
                    dn_string(&subject.tbs_certificate.subject)
                ));
                Ok(false)
            }
        }
    }

    /// Key strength, signature algorithm and basicConstraints criticality
    fn check_profile(&self, cert: &Certificate, label: &str, report: &mut ValidationReport) -> Result<()> {
        let min_rsa_bits = self.ctx.config.validation.min_rsa_bits;
        match privca_key::describe_spki(&spki_der(cert)?) {
            Ok(KeySpec::Rsa { bits }) if bits < min_rsa_bits => report.add_issue(format!(
                "{label}: RSA key of {bits} bits is below the {min_rsa_bits}-bit minimum"
            )),
            Ok(_) => {}
            Err(_) => report.add_warning(format!(
                "{label}: unrecognized public key algorithm {}",
                cert.tbs_certificate.subject_public_key_info.algorithm.oid
            )),
        }

        let algorithm = &cert.signature_algorithm.oid;
        if privca_key::is_weak_signature_algorithm(algorithm) {
            report.add_issue(format!(
                "{label}: weak signature algorithm {}",
                privca_key::signature_algorithm_name(algorithm)
            ));
        }

        if let Some((critical, constraints)) = read_basic_constraints(cert)? {
            if constraints.ca && !critical {
                report.add_issue(format!("{label}: CA basicConstraints is not marked critical"));
            }
        }
        Ok(())
    }
}

fn is_ca(cert: &Certificate) -> Result<bool> {
    Ok(read_basic_constraints(cert)?.is_some_and(|(_, bc)| bc.ca))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use der::Decode;
    use privca_crypto::EcCurve;
    use privca_key::generate;
    use spki::SubjectPublicKeyInfoOwned;
    use time::Duration;

    use super::*;
    use crate::{
        audit::MemoryAuditSink,
        ca::{manager::issuer_key_id, CaCertificateOptions, CaManager, InitializeCaRequest},
        cert::{
            builder::{sign_certificate, CertificateParams},
            cert_utils::{certificate_to_pem, generate_serial, whole_seconds},
            extensions::{authority_key_identifier, basic_constraints},
            name::parse_dn,
        },
        issuance::{IssuanceEngine, IssuanceRequest},
        revocation::RevocationManager,
        types::{CertificateType, RevocationReason},
    };

    const P256: KeySpec = KeySpec::Ecdsa { curve: EcCurve::P256 };

    fn setup() -> (PkiContext, Arc<MemoryAuditSink>, String) {
        let (ctx, audit) = crate::context::test_support::memory_context();
        let manager = CaManager::new(ctx.clone());
        let init = manager
            .initialize_ca(InitializeCaRequest::new("root", "CN=Validation Root").with_key_spec(P256), "admin")
            .unwrap();
        manager
            .self_sign(&init.ca_id, CaCertificateOptions::with_validity_days(3650), "admin")
            .unwrap();
        (ctx, audit, init.ca_id)
    }

    fn issue(ctx: &PkiContext, ca_id: &str) -> crate::issuance::IssuanceResult {
        IssuanceEngine::new(ctx.clone())
            .issue_certificate(
                IssuanceRequest::generated("CN=leaf.example.com", P256, CertificateType::Server)
                    .with_sans(["leaf.example.com"]),
                ca_id,
                "tester",
            )
            .unwrap()
    }

    /// Leaf signed directly with the CA key, outside the issuance rules
    fn forged_leaf(ctx: &PkiContext, ca_id: &str, not_before: OffsetDateTime, not_after: OffsetDateTime) -> String {
        let ca = ctx.find_ca(ca_id).unwrap();
        let ca_cert = ctx.ca_certificate(&ca).unwrap();
        let signer = ctx.ca_signing_key(&ca).unwrap();
        let subject_key = generate(P256).unwrap();
        let params = CertificateParams {
            serial_number: generate_serial().unwrap(),
            subject: parse_dn("CN=old.example.com").unwrap(),
            issuer: ca_cert.tbs_certificate.subject.clone(),
            subject_public_key_info: SubjectPublicKeyInfoOwned::from_der(&subject_key.spki_der().unwrap())
                .unwrap(),
            not_before,
            not_after,
            extensions: vec![
                basic_constraints(false, None).unwrap(),
                authority_key_identifier(&issuer_key_id(&ca_cert).unwrap()).unwrap(),
            ],
        };
        certificate_to_pem(&sign_certificate(params, signer.as_ref()).unwrap()).unwrap()
    }

    #[test]
    fn test_valid_leaf_then_cached() {
        let (ctx, audit, ca_id) = setup();
        let issued = issue(&ctx, &ca_id);
        let validator = Validator::new(ctx);
        let options = ValidationOptions::default();

        let report = validator
            .validate_certificate(&issued.certificate_pem, &options, "auditor")
            .unwrap();
        assert!(report.is_valid, "issues: {:?}", report.issues);
        assert!(report.signature_verified);
        assert!(report.trusted);
        assert!(!report.cached);
        assert_eq!(report.chain_info.len(), 2);
        assert_eq!(report.chain_info[1].subject, "CN=Validation Root");

        let again = validator
            .validate_certificate(&issued.certificate_pem, &options, "auditor")
            .unwrap();
        assert!(again.cached);
        assert_eq!(again.is_valid, report.is_valid);
        assert_eq!(
            audit
                .actions()
                .iter()
                .filter(|a| **a == AuditAction::CertificateValidated)
                .count(),
            2
        );
    }

    #[test]
    fn test_expired_certificate() {
        let (ctx, _, ca_id) = setup();
        let now = whole_seconds(OffsetDateTime::now_utc());
        let pem = forged_leaf(&ctx, &ca_id, now - Duration::days(10), now - Duration::days(1));
        let report = Validator::new(ctx)
            .validate_certificate(&pem, &ValidationOptions::default(), "auditor")
            .unwrap();
        assert!(!report.is_valid);
        assert!(report.expiration.expired);
        assert!(report.signature_verified);
        assert!(report.issues.iter().any(|issue| issue.contains("expired")));
    }

    #[test]
    fn test_not_yet_valid_certificate() {
        let (ctx, _, ca_id) = setup();
        let now = whole_seconds(OffsetDateTime::now_utc());
        let pem = forged_leaf(&ctx, &ca_id, now + Duration::days(2), now + Duration::days(20));
        let report = Validator::new(ctx)
            .validate_certificate(&pem, &ValidationOptions::default(), "auditor")
            .unwrap();
        assert!(!report.is_valid);
        assert!(report.issues.iter().any(|issue| issue.contains("not yet valid")));
    }

    #[test]
    fn test_revoked_certificate() {
        let (ctx, _, ca_id) = setup();
        let issued = issue(&ctx, &ca_id);
        RevocationManager::new(ctx.clone())
            .revoke_certificate(&issued.serial_number, RevocationReason::KeyCompromise, "ops")
            .unwrap();
        let validator = Validator::new(ctx);

        let report = validator
            .validate_certificate(&issued.certificate_pem, &ValidationOptions::default(), "auditor")
            .unwrap();
        assert!(!report.is_valid);
        assert!(report.revoked);

        let unchecked = ValidationOptions {
            check_revocation: false,
            ..ValidationOptions::default()
        };
        let report = validator
            .validate_certificate(&issued.certificate_pem, &unchecked, "auditor")
            .unwrap();
        assert!(report.is_valid);
        assert!(!report.cached);
    }

    #[test]
    fn test_untrusted_issuer() {
        let (ctx, _, _) = setup();
        let (other_ctx, _, other_ca) = setup();
        let foreign = issue(&other_ctx, &other_ca);

        let report = Validator::new(ctx)
            .validate_certificate(&foreign.certificate_pem, &ValidationOptions::default(), "auditor")
            .unwrap();
        assert!(!report.is_valid);
        assert!(!report.trusted);
    }

    #[test]
    fn test_trusted_root_itself() {
        let (ctx, _, ca_id) = setup();
        let root_pem = ctx.find_ca(&ca_id).unwrap().certificate_pem.unwrap();
        let report = Validator::new(ctx)
            .validate_certificate(&root_pem, &ValidationOptions::default(), "auditor")
            .unwrap();
        assert!(report.is_valid, "issues: {:?}", report.issues);
        assert_eq!(report.chain_info.len(), 1);
    }

    #[test]
    fn test_unparseable_input() {
        let (ctx, _, _) = setup();
        assert!(Validator::new(ctx)
            .validate_certificate("not a certificate", &ValidationOptions::default(), "auditor")
            .is_err());
    }
}
