//! 证书签发
//!
//! Builds end-entity certificates under an active CA from either a CSR or
//! inline subject parameters, and records them in the store.

pub mod policy;

use std::str::FromStr;

use const_oid::ObjectIdentifier;
use der::Decode;
use privca_key::{load_signing_key_from_pkcs8_pem, Algorithm, Key, KeySpec};
use serde_json::json;
use spki::SubjectPublicKeyInfoOwned;
use time::OffsetDateTime;
use uuid::Uuid;
use x509_cert::{
    ext::{pkix::name::GeneralName, Extension},
    name::Name,
    Certificate,
};
use zeroize::Zeroizing;

pub use policy::UsagePolicy;

use crate::{
    audit::{AuditAction, AuditEvent},
    ca::manager::issuer_key_id,
    cert::{
        builder::{sign_certificate, CertificateParams},
        cert_utils::{
            certificate_der, certificate_to_pem, fingerprint_sha256, generate_serial, serial_hex,
            validity_end, whole_seconds,
        },
        extensions::{
            authority_info_access_ocsp, authority_key_identifier, basic_constraints,
            certificate_policies, crl_distribution_points, extended_key_usage,
            general_name_string, key_identifier, key_usage, parse_san, subject_alt_name,
            subject_key_identifier,
        },
        name::{common_name, dn_string, parse_dn},
    },
    context::PkiContext,
    csr::Csr,
    error::{PkiError, Result},
    types::{CaIdentity, CertificateStatus, CertificateType, EncryptedBlob, IssuedCertificate},
};

/// 证书主体来源
#[derive(Debug, Clone)]
pub enum SubjectSource {
    /// PEM 格式的 PKCS#10 请求，密钥由申请方持有
    Csr(String),
    /// 服务端生成密钥（仅 RSA 与 ECDSA）
    Generated { subject_dn: String, key_spec: KeySpec },
}

/// 证书签发请求
#[derive(Debug, Clone)]
pub struct IssuanceRequest {
    pub source: SubjectSource,
    /// `DNS:`/`IP:`/`email:`/`URI:` 形式，或可推断的裸值
    pub sans: Vec<String>,
    pub certificate_type: CertificateType,
    /// 留空时使用 `issuance.default_validity_days`
    pub validity_days: Option<u32>,
}

impl IssuanceRequest {
    pub fn from_csr(csr_pem: impl Into<String>, certificate_type: CertificateType) -> Self {
        Self {
            source: SubjectSource::Csr(csr_pem.into()),
            sans: Vec::new(),
            certificate_type,
            validity_days: None,
        }
    }

    pub fn generated(
        subject_dn: impl Into<String>,
        key_spec: KeySpec,
        certificate_type: CertificateType,
    ) -> Self {
        Self {
            source: SubjectSource::Generated {
                subject_dn: subject_dn.into(),
                key_spec,
            },
            sans: Vec::new(),
            certificate_type,
            validity_days: None,
        }
    }

    pub fn with_sans<I, S>(mut self, sans: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sans = sans.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_validity_days(mut self, validity_days: u32) -> Self {
        self.validity_days = Some(validity_days);
        self
    }
}

/// 签发结果
pub struct IssuanceResult {
    pub certificate_id: String,
    pub serial_number: String,
    pub certificate_pem: String,
    pub fingerprint: String,
    /// 仅服务端生成密钥时返回，明文只出现在这里
    pub private_key_pem: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for IssuanceResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuanceResult")
            .field("certificate_id", &self.certificate_id)
            .field("serial_number", &self.serial_number)
            .field("fingerprint", &self.fingerprint)
            .field("private_key_pem", &self.private_key_pem.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// Subject side of a certificate, resolved from the request
struct ResolvedSubject {
    subject: Name,
    public_key: SubjectPublicKeyInfoOwned,
    key_spec: KeySpec,
    sans: Vec<GeneralName>,
    private_key_pem: Option<Zeroizing<String>>,
    encrypted_private_key: Option<EncryptedBlob>,
}

/// 证书签发引擎
#[derive(Debug, Clone)]
pub struct IssuanceEngine {
    ctx: PkiContext,
}

impl IssuanceEngine {
    pub fn new(ctx: PkiContext) -> Self {
        Self { ctx }
    }

    /// 签发证书
    pub fn issue_certificate(
        &self,
        request: IssuanceRequest,
        ca_id: &str,
        requested_by: &str,
    ) -> Result<IssuanceResult> {
        let ca = self.ctx.active_ca(ca_id)?;
        let ca_cert = self.ctx.ca_certificate(&ca)?;

        let validity_days = match request.validity_days {
            Some(0) => {
                return Err(PkiError::ValidationError(
                    "validity_days must be greater than zero".to_string(),
                ))
            }
            Some(days) => days,
            None => self.ctx.config.issuance.default_validity_days,
        };
        let not_before = whole_seconds(OffsetDateTime::now_utc());
        let not_after = validity_end(not_before, validity_days)?;
        if let Some(ca_valid_to) = ca.valid_to {
            if not_after > ca_valid_to {
                return Err(PkiError::ValidationError(format!(
                    "Requested validity ends {not_after}, after the CA certificate ({ca_valid_to})"
                )));
            }
        }

        let resolved = self.resolve_subject(&request)?;
        let extensions = self.extensions(&ca, &ca_cert, &request, &resolved)?;
        let signing_key = self.ctx.ca_signing_key(&ca)?;
        let subject_dn = dn_string(&resolved.subject);
        let sans: Vec<String> = resolved.sans.iter().filter_map(general_name_string).collect();

        let attempts = self.ctx.config.issuance.max_serial_attempts;
        for attempt in 1..=attempts {
            let params = CertificateParams {
                serial_number: generate_serial()?,
                subject: resolved.subject.clone(),
                issuer: ca_cert.tbs_certificate.subject.clone(),
                subject_public_key_info: resolved.public_key.clone(),
                not_before,
                not_after,
                extensions: extensions.clone(),
            };
            let certificate = sign_certificate(params, signing_key.as_ref())?;
            let der = certificate_der(&certificate)?;
            let serial_number = serial_hex(&certificate.tbs_certificate.serial_number);
            let fingerprint = fingerprint_sha256(&der);
            let certificate_pem = certificate_to_pem(&certificate)?;

            let record = IssuedCertificate {
                id: Uuid::new_v4().to_string(),
                serial_number: serial_number.clone(),
                fingerprint: fingerprint.clone(),
                subject_dn: subject_dn.clone(),
                sans: sans.clone(),
                certificate_type: request.certificate_type,
                key_algorithm: resolved.key_spec.to_string(),
                status: CertificateStatus::Active,
                valid_from: not_before,
                valid_to: not_after,
                certificate_pem: certificate_pem.clone(),
                encrypted_private_key: resolved.encrypted_private_key.clone(),
                ca_id: ca.id.clone(),
                requested_by: requested_by.to_string(),
                created_at: OffsetDateTime::now_utc(),
            };
            let certificate_id = record.id.clone();

            match self.ctx.store.insert_certificate(record) {
                Ok(()) => {}
                Err(PkiError::SerialCollision(_)) => {
                    tracing::warn!(ca_id = %ca.id, serial = %serial_number, attempt, "Serial collision, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }

            tracing::info!(
                ca_id = %ca.id,
                serial = %serial_number,
                certificate_type = %request.certificate_type,
                "Certificate issued"
            );
            self.ctx.audit(AuditEvent::new(
                AuditAction::CertificateIssued,
                requested_by,
                format!("Issued certificate for {subject_dn}"),
                json!({
                    "ca_id": ca.id,
                    "certificate_id": certificate_id,
                    "serial": serial_number,
                    "certificate_type": request.certificate_type.to_string(),
                    "sans": sans,
                }),
            ));

            return Ok(IssuanceResult {
                certificate_id,
                serial_number,
                certificate_pem,
                fingerprint,
                private_key_pem: resolved.private_key_pem,
            });
        }

        tracing::error!(ca_id = %ca.id, attempts, "No unique serial number found");
        Err(PkiError::InternalError(format!(
            "No unique serial number after {attempts} attempts"
        )))
    }

    fn resolve_subject(&self, request: &IssuanceRequest) -> Result<ResolvedSubject> {
        let mut resolved = match &request.source {
            SubjectSource::Csr(csr_pem) => {
                let csr = Csr::from_pem(csr_pem)?;
                csr.verify_signature()?;
                if common_name(csr.subject()).is_none() {
                    return Err(PkiError::ValidationError(
                        "CSR subject has no common name".to_string(),
                    ));
                }
                let key_spec = csr.key_spec()?;
                self.check_key_strength(key_spec)?;
                ResolvedSubject {
                    subject: csr.subject().clone(),
                    public_key: csr.public_key().clone(),
                    key_spec,
                    sans: csr.requested_sans()?,
                    private_key_pem: None,
                    encrypted_private_key: None,
                }
            }
            SubjectSource::Generated { subject_dn, key_spec } => {
                if key_spec.algorithm() == Algorithm::Ed25519 {
                    return Err(PkiError::ValidationError(format!(
                        "Generated keys must be RSA or ECDSA, not {key_spec}"
                    )));
                }
                let subject = parse_dn(subject_dn)?;
                let pair = self.ctx.vault.generate_key_pair(*key_spec)?;
                let key = load_signing_key_from_pkcs8_pem(&pair.private_key_pem).map_err(|e| {
                    PkiError::KeyGenerationError(format!("Generated key does not load: {e}"))
                })?;
                let public_key = SubjectPublicKeyInfoOwned::from_der(&key.spki_der()?)?;
                let encrypted = self.ctx.vault.encrypt(&pair.private_key_pem)?;
                ResolvedSubject {
                    subject,
                    public_key,
                    key_spec: *key_spec,
                    sans: Vec::new(),
                    private_key_pem: Some(pair.private_key_pem),
                    encrypted_private_key: Some(encrypted),
                }
            }
        };

        for entry in &request.sans {
            let name = parse_san(entry)?;
            if !resolved.sans.contains(&name) {
                resolved.sans.push(name);
            }
        }
        Ok(resolved)
    }

    fn check_key_strength(&self, key_spec: KeySpec) -> Result<()> {
        let min_bits = self.ctx.config.validation.min_rsa_bits;
        match key_spec {
            KeySpec::Rsa { bits } if bits < min_bits => Err(PkiError::ValidationError(format!(
                "RSA key of {bits} bits is below the {min_bits}-bit minimum"
            ))),
            _ => Ok(()),
        }
    }

    fn policy_oids(&self) -> Result<Vec<ObjectIdentifier>> {
        self.ctx
            .config
            .issuance
            .policy_oids
            .iter()
            .map(|oid| {
                ObjectIdentifier::from_str(oid).map_err(|e| {
                    PkiError::ConfigurationError(format!("Invalid policy OID '{oid}': {e}"))
                })
            })
            .collect()
    }

    fn extensions(
        &self,
        ca: &CaIdentity,
        ca_cert: &Certificate,
        request: &IssuanceRequest,
        resolved: &ResolvedSubject,
    ) -> Result<Vec<Extension>> {
        let policy = request.certificate_type.usage_policy();
        let mut extensions = vec![
            basic_constraints(false, None)?,
            key_usage(policy.key_usage)?,
            extended_key_usage(policy.extended_key_usage)?,
        ];
        if !resolved.sans.is_empty() {
            extensions.push(subject_alt_name(resolved.sans.clone())?);
        }
        if let Some(url) = ca.crl_distribution_url.as_deref() {
            extensions.push(crl_distribution_points(url)?);
        }
        if let Some(url) = ca.ocsp_url.as_deref() {
            extensions.push(authority_info_access_ocsp(url)?);
        }
        extensions.push(certificate_policies(&self.policy_oids()?)?);
        extensions.push(authority_key_identifier(&issuer_key_id(ca_cert)?)?);
        extensions.push(subject_key_identifier(&key_identifier(&resolved.public_key))?);
        Ok(extensions)
    }

    pub fn get_certificate(&self, certificate_id: &str) -> Result<IssuedCertificate> {
        self.ctx
            .store
            .get_certificate(certificate_id)?
            .map(|cert| cert.observed(OffsetDateTime::now_utc()))
            .ok_or_else(|| PkiError::CertificateNotFound(certificate_id.to_string()))
    }

    /// 某个CA签发的全部证书
    pub fn list_certificates(&self, ca_id: &str) -> Result<Vec<IssuedCertificate>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .ctx
            .store
            .list_certificates(ca_id)?
            .into_iter()
            .map(|cert| cert.observed(now))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use const_oid::db::rfc5280;
    use privca_crypto::EcCurve;
    use privca_key::generate;
    use x509_cert::ext::pkix::{CertificatePolicies, KeyUsage};

    use super::*;
    use crate::{
        audit::AuditAction,
        ca::{CaCertificateOptions, CaManager, InitializeCaRequest},
        cert::{
            cert_utils::{not_after, parse_certificate_pem, spki_der, verify_issued_by},
            extensions::{
                decode_extension, read_basic_constraints, read_extended_key_usage,
                read_key_usage, read_subject_alt_names, read_subject_key_identifier,
                ANY_POLICY, ID_KP_CLIENT_AUTH,
            },
        },
        context::test_support::memory_context,
        csr::create_csr,
    };

    const P256: KeySpec = KeySpec::Ecdsa { curve: EcCurve::P256 };

    fn setup() -> (PkiContext, std::sync::Arc<crate::audit::MemoryAuditSink>, String) {
        let (ctx, audit) = memory_context();
        let manager = CaManager::new(ctx.clone());
        let init = manager
            .initialize_ca(
                InitializeCaRequest::new("root", "CN=Issuing Root,O=Example")
                    .with_key_spec(KeySpec::Ecdsa { curve: EcCurve::P256 }),
                "admin",
            )
            .unwrap();
        manager
            .self_sign(&init.ca_id, CaCertificateOptions::with_validity_days(3650), "admin")
            .unwrap();
        (ctx, audit, init.ca_id)
    }

    #[test]
    fn test_issue_generated_server_certificate() {
        let (ctx, audit, ca_id) = setup();
        let engine = IssuanceEngine::new(ctx.clone());

        let request = IssuanceRequest::generated(
            "CN=test.example.com",
            KeySpec::Rsa { bits: 2048 },
            CertificateType::Server,
        )
        .with_sans(["test.example.com", "IP:10.0.0.1"])
        .with_validity_days(365);
        let result = engine.issue_certificate(request, &ca_id, "alice").unwrap();

        assert_eq!(result.serial_number.len(), 32);
        assert!(result.serial_number.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(result.fingerprint.split(':').count(), 32);
        assert!(result.certificate_pem.contains("-----BEGIN CERTIFICATE-----"));
        assert!(result.private_key_pem.is_some());
        assert!(!format!("{result:?}").contains("PRIVATE KEY"));

        let cert = parse_certificate_pem(&result.certificate_pem).unwrap();
        let (critical, bc) = read_basic_constraints(&cert).unwrap().unwrap();
        assert!(critical && !bc.ca);
        let usage = read_key_usage(&cert).unwrap().unwrap();
        assert!(usage.digital_signature() && usage.key_encipherment());
        assert_eq!(
            read_subject_alt_names(&cert).unwrap(),
            vec!["DNS:test.example.com".to_string(), "IP:10.0.0.1".to_string()]
        );
        let (_, policies) = decode_extension::<CertificatePolicies>(
            cert.tbs_certificate.extensions.as_deref(),
            rfc5280::ID_CE_CERTIFICATE_POLICIES,
        )
        .unwrap()
        .unwrap();
        assert_eq!(policies.0[0].policy_identifier, ANY_POLICY);

        let ca = ctx.find_ca(&ca_id).unwrap();
        let ca_cert = ctx.ca_certificate(&ca).unwrap();
        assert!(verify_issued_by(&cert, &spki_der(&ca_cert).unwrap()).unwrap());
        assert!(not_after(&cert).unwrap() <= ca.valid_to.unwrap());

        let stored = ctx.store.get_certificate(&result.certificate_id).unwrap().unwrap();
        assert_eq!(stored.serial_number, result.serial_number);
        assert_eq!(stored.key_algorithm, "RSA-2048");
        assert!(stored.encrypted_private_key.is_some());
        assert_eq!(stored.requested_by, "alice");
        assert_eq!(audit.actions().last(), Some(&AuditAction::CertificateIssued));
    }

    #[test]
    fn test_issue_from_csr() {
        let (ctx, _, ca_id) = setup();
        let engine = IssuanceEngine::new(ctx.clone());

        let key = generate(KeySpec::Ecdsa { curve: EcCurve::P384 }).unwrap();
        let san = subject_alt_name(vec![parse_san("client.example.com").unwrap()]).unwrap();
        let csr = create_csr(key.as_ref(), parse_dn("CN=client.example.com").unwrap(), vec![san]).unwrap();

        let request = IssuanceRequest::from_csr(csr.to_pem().unwrap(), CertificateType::Client)
            .with_sans(["email:ops@example.com"]);
        let result = engine.issue_certificate(request, &ca_id, "bob").unwrap();
        assert!(result.private_key_pem.is_none());

        let cert = parse_certificate_pem(&result.certificate_pem).unwrap();
        assert_eq!(
            cert.tbs_certificate.subject_public_key_info,
            *csr.public_key()
        );
        assert_eq!(read_extended_key_usage(&cert).unwrap(), vec![ID_KP_CLIENT_AUTH]);
        assert_eq!(
            read_subject_alt_names(&cert).unwrap(),
            vec!["DNS:client.example.com".to_string(), "email:ops@example.com".to_string()]
        );
        assert_eq!(
            read_subject_key_identifier(&cert).unwrap(),
            Some(key_identifier(csr.public_key()))
        );
        let stored = ctx.store.get_certificate(&result.certificate_id).unwrap().unwrap();
        assert!(stored.encrypted_private_key.is_none());
    }

    #[test]
    fn test_code_signing_usage() {
        let (ctx, _, ca_id) = setup();
        let engine = IssuanceEngine::new(ctx);
        let result = engine
            .issue_certificate(
                IssuanceRequest::generated(
                    "CN=Release Signing",
                    KeySpec::Ecdsa { curve: EcCurve::P256 },
                    CertificateType::CodeSigning,
                ),
                &ca_id,
                "ci",
            )
            .unwrap();
        let cert = parse_certificate_pem(&result.certificate_pem).unwrap();
        let usage: KeyUsage = read_key_usage(&cert).unwrap().unwrap();
        assert!(usage.digital_signature());
        assert!(!usage.key_encipherment());
    }

    #[test]
    fn test_rejections() {
        let (ctx, _, ca_id) = setup();
        let engine = IssuanceEngine::new(ctx.clone());

        let ed25519 = IssuanceRequest::generated("CN=x", KeySpec::Ed25519, CertificateType::Server);
        assert!(matches!(
            engine.issue_certificate(ed25519, &ca_id, "a"),
            Err(PkiError::ValidationError(_))
        ));

        let zero = IssuanceRequest::generated("CN=x", P256, CertificateType::Server)
            .with_validity_days(0);
        assert!(matches!(
            engine.issue_certificate(zero, &ca_id, "a"),
            Err(PkiError::ValidationError(_))
        ));

        let too_long = IssuanceRequest::generated("CN=x", P256, CertificateType::Server)
            .with_validity_days(20_000);
        assert!(matches!(
            engine.issue_certificate(too_long, &ca_id, "a"),
            Err(PkiError::ValidationError(_))
        ));

        let past_calendar = IssuanceRequest::generated("CN=x", P256, CertificateType::Server)
            .with_validity_days(4_000_000);
        assert!(matches!(
            engine.issue_certificate(past_calendar, &ca_id, "a"),
            Err(PkiError::ValidationError(_))
        ));

        let bad_san = IssuanceRequest::generated("CN=x", P256, CertificateType::Server)
            .with_sans(["not a host name"]);
        assert!(matches!(
            engine.issue_certificate(bad_san, &ca_id, "a"),
            Err(PkiError::ValidationError(_))
        ));

        let tampered = IssuanceRequest::from_csr("-----BEGIN CERTIFICATE REQUEST-----\nAAAA\n-----END CERTIFICATE REQUEST-----", CertificateType::Server);
        assert!(engine.issue_certificate(tampered, &ca_id, "a").is_err());

        assert!(ctx.store.list_certificates(&ca_id).unwrap().is_empty());
    }

    #[test]
    fn test_inactive_ca_rejected() {
        let (ctx, _) = memory_context();
        let manager = CaManager::new(ctx.clone());
        let init = manager
            .initialize_ca(
                InitializeCaRequest::new("pending", "CN=Pending CA")
                    .with_key_spec(KeySpec::Ecdsa { curve: EcCurve::P256 }),
                "admin",
            )
            .unwrap();
        let engine = IssuanceEngine::new(ctx);
        let request = IssuanceRequest::generated("CN=x", P256, CertificateType::Server);
        assert!(matches!(
            engine.issue_certificate(request, &init.ca_id, "a"),
            Err(PkiError::CANotActive(_))
        ));
    }

    #[test]
    fn test_configured_policy_oids() {
        let (ctx, _, ca_id) = setup();
        let mut config = (*ctx.config).clone();
        config.issuance.policy_oids = vec!["1.3.6.1.4.1.99999.1".to_string()];
        let ctx = PkiContext::new(ctx.store.clone(), ctx.vault.clone(), ctx.audit.clone(), std::sync::Arc::new(config));

        let engine = IssuanceEngine::new(ctx);
        let result = engine
            .issue_certificate(
                IssuanceRequest::generated("CN=policy.example.com", KeySpec::Ecdsa { curve: EcCurve::P256 }, CertificateType::Server),
                &ca_id,
                "a",
            )
            .unwrap();
        let cert = parse_certificate_pem(&result.certificate_pem).unwrap();
        let (_, policies) = decode_extension::<CertificatePolicies>(
            cert.tbs_certificate.extensions.as_deref(),
            rfc5280::ID_CE_CERTIFICATE_POLICIES,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            policies.0[0].policy_identifier,
            ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1")
        );
    }
}
