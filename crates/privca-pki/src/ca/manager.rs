//! CA管理器
//!
//! 提供CA生命周期管理：初始化、自签名、上传外部签发的证书、签发下级CA与删除

use der::{Decode, Encode};
use privca_key::{load_signing_key_from_pkcs8_pem, KeySpec};
use serde_json::json;
use spki::SubjectPublicKeyInfoOwned;
use time::OffsetDateTime;
use uuid::Uuid;
use x509_cert::{
    ext::{
        pkix::{KeyUsage, KeyUsages},
        Extension,
    },
    Certificate,
};
use zeroize::Zeroizing;

use super::{chain::Chain, same_public_key};
use crate::{
    audit::{AuditAction, AuditEvent},
    cert::{
        builder::{sign_certificate, CertificateParams},
        cert_utils::{
            certificate_to_pem, generate_serial, not_after, not_before, parse_certificate_pem,
            pem_blocks, serial_hex, validity_end, whole_seconds,
        },
        extensions::{
            authority_info_access_ocsp, authority_key_identifier, basic_constraints,
            crl_distribution_points, key_identifier, key_usage, read_basic_constraints,
            read_key_usage, read_subject_key_identifier, subject_key_identifier,
        },
        name::{dn_string, parse_dn},
    },
    context::PkiContext,
    csr::{create_csr, Csr},
    error::{PkiError, Result},
    store::CascadeSummary,
    types::{CaIdentity, CaStatus},
};

/// CA初始化选项
#[derive(Debug, Clone, Default)]
pub struct InitializeCaOptions {
    /// 留空时使用 `ca.crl_distribution_base_url/<ca_id>`
    pub crl_distribution_url: Option<String>,
    /// 留空时使用 `ca.ocsp_url`
    pub ocsp_url: Option<String>,
}

/// CA初始化请求
#[derive(Debug, Clone)]
pub struct InitializeCaRequest {
    pub name: String,
    pub subject_dn: String,
    /// 留空时使用 `ca.default_key`
    pub key_spec: Option<KeySpec>,
    pub options: InitializeCaOptions,
}

impl InitializeCaRequest {
    pub fn new(name: impl Into<String>, subject_dn: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject_dn: subject_dn.into(),
            key_spec: None,
            options: InitializeCaOptions::default(),
        }
    }

    pub fn with_key_spec(mut self, key_spec: KeySpec) -> Self {
        self.key_spec = Some(key_spec);
        self
    }
}

/// CA初始化结果
pub struct InitializedCa {
    pub ca_id: String,
    pub csr_pem: String,
    /// PKCS#8 PEM，仅在此处以明文出现
    pub private_key_pem: Zeroizing<String>,
}

impl std::fmt::Debug for InitializedCa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializedCa")
            .field("ca_id", &self.ca_id)
            .field("csr_pem", &self.csr_pem)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

/// CA证书签发选项（自签名与下级CA共用）
#[derive(Debug, Clone, Copy, Default)]
pub struct CaCertificateOptions {
    /// 留空时使用 `ca.default_validity_days`
    pub validity_days: Option<u32>,
    /// 留空时使用 `ca.path_len`
    pub path_len: Option<u8>,
}

impl CaCertificateOptions {
    pub fn with_validity_days(validity_days: u32) -> Self {
        Self {
            validity_days: Some(validity_days),
            path_len: None,
        }
    }
}

/// CA管理器
#[derive(Debug, Clone)]
pub struct CaManager {
    ctx: PkiContext,
}

impl CaManager {
    pub fn new(ctx: PkiContext) -> Self {
        Self { ctx }
    }

    /// 生成密钥与CSR，创建 `Initializing` 状态的CA
    pub fn initialize_ca(&self, request: InitializeCaRequest, actor: &str) -> Result<InitializedCa> {
        if request.name.trim().is_empty() {
            return Err(PkiError::ValidationError("CA name must not be empty".to_string()));
        }
        let subject = parse_dn(&request.subject_dn)?;
        let key_spec = request.key_spec.unwrap_or(self.ctx.config.ca.default_key);

        let pair = self.ctx.vault.generate_key_pair(key_spec)?;
        let signing_key = load_signing_key_from_pkcs8_pem(&pair.private_key_pem)
            .map_err(|e| PkiError::KeyGenerationError(format!("Generated key does not load: {e}")))?;
        let csr = create_csr(signing_key.as_ref(), subject.clone(), Vec::new())?;
        let csr_pem = csr.to_pem()?;
        let encrypted_private_key = self.ctx.vault.encrypt(&pair.private_key_pem)?;

        let ca_id = Uuid::new_v4().to_string();
        let crl_distribution_url = request.options.crl_distribution_url.or_else(|| {
            self.ctx
                .config
                .ca
                .crl_distribution_base_url
                .as_deref()
                .map(|base| format!("{}/{ca_id}", base.trim_end_matches('/')))
        });
        let ocsp_url = request
            .options
            .ocsp_url
            .or_else(|| self.ctx.config.ca.ocsp_url.clone());

        let now = OffsetDateTime::now_utc();
        let identity = CaIdentity {
            id: ca_id.clone(),
            name: request.name.trim().to_string(),
            subject_dn: dn_string(&subject),
            key_spec,
            status: CaStatus::Initializing,
            encrypted_private_key,
            csr_pem: Some(csr_pem.clone()),
            certificate_pem: None,
            certificate_chain_pem: Vec::new(),
            crl_number: 0,
            crl_distribution_url,
            ocsp_url,
            valid_from: None,
            valid_to: None,
            created_at: now,
            updated_at: now,
        };
        self.ctx.store.insert_ca(identity)?;

        tracing::info!(ca_id = %ca_id, key_spec = %key_spec, "CA initialized");
        self.ctx.audit(AuditEvent::new(
            AuditAction::CaInitialized,
            actor,
            format!("Initialized CA {}", request.name.trim()),
            json!({ "ca_id": ca_id, "subject_dn": dn_string(&subject), "key_spec": key_spec.to_string() }),
        ));

        Ok(InitializedCa {
            ca_id,
            csr_pem,
            private_key_pem: pair.private_key_pem,
        })
    }

    /// 用CA自身密钥签发根证书
    pub fn self_sign(&self, ca_id: &str, options: CaCertificateOptions, actor: &str) -> Result<String> {
        let mut ca = self.ctx.find_ca(ca_id)?;
        if ca.status != CaStatus::Initializing {
            return Err(PkiError::ValidationError(format!(
                "CA {ca_id} is {:?}, only an initializing CA can self-sign",
                ca.status
            )));
        }
        let validity_days = self.validity_days(options)?;
        let csr = self.pending_csr(&ca)?;
        let signing_key = self.ctx.ca_signing_key(&ca)?;

        let spki = csr.public_key().clone();
        let key_id = key_identifier(&spki);
        let path_len = options.path_len.or(self.ctx.config.ca.path_len);
        let extensions = ca_extensions(&ca, path_len, &key_id, &key_id)?;

        let not_before = whole_seconds(OffsetDateTime::now_utc());
        let not_after = validity_end(not_before, validity_days)?;
        let params = CertificateParams {
            serial_number: generate_serial()?,
            subject: csr.subject().clone(),
            issuer: csr.subject().clone(),
            subject_public_key_info: spki,
            not_before,
            not_after,
            extensions,
        };
        let certificate = sign_certificate(params, signing_key.as_ref())?;
        let certificate_pem = certificate_to_pem(&certificate)?;

        ca.status = CaStatus::Active;
        ca.certificate_pem = Some(certificate_pem.clone());
        ca.certificate_chain_pem = vec![certificate_pem.clone()];
        ca.valid_from = Some(not_before);
        ca.valid_to = Some(not_after);
        ca.updated_at = OffsetDateTime::now_utc();
        self.ctx.store.update_ca(ca)?;

        let serial = serial_hex(&certificate.tbs_certificate.serial_number);
        tracing::info!(ca_id = %ca_id, serial = %serial, validity_days, "CA self-signed");
        self.ctx.audit(AuditEvent::new(
            AuditAction::CaSelfSigned,
            actor,
            format!("Self-signed CA {ca_id}"),
            json!({ "ca_id": ca_id, "serial": serial, "validity_days": validity_days }),
        ));

        Ok(certificate_pem)
    }

    /// 上传外部签发的CA证书（可附带证书链）
    ///
    /// Checks run in a fixed order and the first failure is reported; the
    /// identity is only written once every check has passed.
    pub fn upload_certificate(
        &self,
        ca_id: &str,
        certificate_pem: &str,
        chain_pem: Option<&str>,
        actor: &str,
    ) -> Result<CaIdentity> {
        let mut ca = self.ctx.find_ca(ca_id)?;

        let certificate = parse_certificate_pem(certificate_pem).map_err(|e| {
            PkiError::ValidationError(format!("Certificate is not valid X.509: {e}"))
        })?;

        let now = OffsetDateTime::now_utc();
        let valid_from = not_before(&certificate)?;
        let valid_to = not_after(&certificate)?;
        if now < valid_from {
            return Err(PkiError::ValidationError(format!(
                "Certificate is not yet valid (notBefore {valid_from})"
            )));
        }
        if now > valid_to {
            return Err(PkiError::ValidationError(format!(
                "Certificate has expired (notAfter {valid_to})"
            )));
        }

        match read_basic_constraints(&certificate)? {
            Some((_, bc)) if bc.ca => {}
            Some(_) => {
                return Err(PkiError::ValidationError(
                    "Certificate basicConstraints has cA=false".to_string(),
                ))
            }
            None => {
                return Err(PkiError::ValidationError(
                    "Certificate has no basicConstraints extension".to_string(),
                ))
            }
        }

        if let Some(usage) = read_key_usage(&certificate)? {
            if !usage.key_cert_sign() {
                return Err(PkiError::ValidationError(
                    "Certificate keyUsage does not include keyCertSign".to_string(),
                ));
            }
        }

        let ca_key = self.ca_public_key(&ca)?;
        if !same_public_key(&certificate.tbs_certificate.subject_public_key_info, &ca_key) {
            return Err(PkiError::ValidationError(
                "Certificate public key does not match the CA key".to_string(),
            ));
        }

        let mut blocks = vec![certificate.to_der()?];
        if let Some(chain_pem) = chain_pem.filter(|pem| !pem.trim().is_empty()) {
            blocks.extend(pem_blocks(chain_pem).map_err(|e| {
                PkiError::ValidationError(format!("Certificate chain does not parse: {e}"))
            })?);
        }
        let chain = Chain::normalize(blocks, &ca_key)?;

        ca.status = CaStatus::Active;
        ca.certificate_pem = Some(certificate_to_pem(&certificate)?);
        ca.certificate_chain_pem = chain.to_pem_list()?;
        ca.subject_dn = dn_string(&certificate.tbs_certificate.subject);
        ca.valid_from = Some(valid_from);
        ca.valid_to = Some(valid_to);
        ca.updated_at = now;
        self.ctx.store.update_ca(ca.clone())?;

        tracing::info!(ca_id = %ca_id, chain_length = chain.length(), "CA certificate uploaded");
        self.ctx.audit(AuditEvent::new(
            AuditAction::CaCertificateUploaded,
            actor,
            format!("Uploaded certificate for CA {ca_id}"),
            json!({
                "ca_id": ca_id,
                "serial": serial_hex(&certificate.tbs_certificate.serial_number),
                "chain_length": chain.length(),
            }),
        ));

        Ok(ca)
    }

    /// 用本CA签发下级CA证书
    ///
    /// The result is handed back for upload on the subordinate; it is not
    /// recorded as an issued end-entity certificate.
    pub fn sign_intermediate(
        &self,
        parent_id: &str,
        csr_pem: &str,
        options: CaCertificateOptions,
        actor: &str,
    ) -> Result<String> {
        let parent = self.ctx.active_ca(parent_id)?;
        let parent_cert = self.ctx.ca_certificate(&parent)?;
        let validity_days = self.validity_days(options)?;

        let parent_path_len = read_basic_constraints(&parent_cert)?
            .and_then(|(_, bc)| bc.path_len_constraint);
        let path_len = match parent_path_len {
            Some(0) => {
                return Err(PkiError::ValidationError(format!(
                    "CA {parent_id} has pathLenConstraint 0 and cannot sign CAs"
                )))
            }
            Some(limit) => Some(options.path_len.map_or(limit - 1, |wanted| wanted.min(limit - 1))),
            None => options.path_len,
        };

        let csr = Csr::from_pem(csr_pem)?;
        csr.verify_signature()?;
        let spki = csr.public_key().clone();
        let subject_key_id = key_identifier(&spki);
        let authority_key_id = issuer_key_id(&parent_cert)?;
        let extensions = ca_extensions(&parent, path_len, &subject_key_id, &authority_key_id)?;

        let not_before = whole_seconds(OffsetDateTime::now_utc());
        let mut not_after = validity_end(not_before, validity_days)?;
        if let Some(parent_valid_to) = parent.valid_to {
            not_after = not_after.min(parent_valid_to);
        }

        let signing_key = self.ctx.ca_signing_key(&parent)?;
        let params = CertificateParams {
            serial_number: generate_serial()?,
            subject: csr.subject().clone(),
            issuer: parent_cert.tbs_certificate.subject.clone(),
            subject_public_key_info: spki,
            not_before,
            not_after,
            extensions,
        };
        let certificate = sign_certificate(params, signing_key.as_ref())?;
        let serial = serial_hex(&certificate.tbs_certificate.serial_number);

        tracing::info!(parent_id = %parent_id, serial = %serial, "Intermediate CA certificate signed");
        self.ctx.audit(AuditEvent::new(
            AuditAction::CertificateIssued,
            actor,
            format!("Signed intermediate CA {}", csr.subject_dn()),
            json!({ "ca_id": parent_id, "serial": serial, "kind": "intermediate_ca" }),
        ));

        certificate_to_pem(&certificate)
    }

    /// 删除CA及其全部证书、撤销记录和CRL
    pub fn delete_ca(&self, ca_id: &str, actor: &str) -> Result<CascadeSummary> {
        let summary = self.ctx.store.delete_ca_cascade(ca_id)?;
        tracing::info!(
            ca_id = %ca_id,
            certificates = summary.certificates,
            revocations = summary.revocations,
            crls = summary.crls,
            "CA deleted"
        );
        self.ctx.audit(AuditEvent::new(
            AuditAction::CaDeleted,
            actor,
            format!("Deleted CA {ca_id}"),
            json!({
                "ca_id": ca_id,
                "certificates": summary.certificates,
                "revocations": summary.revocations,
                "crls": summary.crls,
            }),
        ));
        Ok(summary)
    }

    pub fn get_ca(&self, ca_id: &str) -> Result<CaIdentity> {
        self.ctx.find_ca(ca_id)
    }

    /// 全部CA，过期状态按当前时间计算
    pub fn list_cas(&self) -> Result<Vec<CaIdentity>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .ctx
            .store
            .list_cas()?
            .into_iter()
            .map(|ca| ca.observed(now))
            .collect())
    }

    /// Stored chain of an identity, leaf first
    pub fn chain(&self, ca_id: &str) -> Result<Vec<String>> {
        let ca = self.ctx.find_ca(ca_id)?;
        if ca.certificate_chain_pem.is_empty() {
            return Err(PkiError::CANotActive(format!("CA {ca_id} has no certificate")));
        }
        Ok(ca.certificate_chain_pem)
    }

    fn validity_days(&self, options: CaCertificateOptions) -> Result<u32> {
        match options.validity_days {
            Some(0) => Err(PkiError::ValidationError(
                "validity_days must be greater than zero".to_string(),
            )),
            Some(days) => Ok(days),
            None => Ok(self.ctx.config.ca.default_validity_days),
        }
    }

    fn pending_csr(&self, ca: &CaIdentity) -> Result<Csr> {
        let csr_pem = ca.csr_pem.as_deref().ok_or_else(|| {
            PkiError::ValidationError(format!("CA {} has no pending CSR", ca.id))
        })?;
        Csr::from_pem(csr_pem)
    }

    fn ca_public_key(&self, ca: &CaIdentity) -> Result<SubjectPublicKeyInfoOwned> {
        let signing_key = self.ctx.ca_signing_key(ca)?;
        let spki_der = privca_key::Key::spki_der(signing_key.as_ref())?;
        Ok(SubjectPublicKeyInfoOwned::from_der(&spki_der)?)
    }
}

/// SKI of an issuer certificate, computed when the extension is absent
pub(crate) fn issuer_key_id(issuer: &Certificate) -> Result<Vec<u8>> {
    Ok(match read_subject_key_identifier(issuer)? {
        Some(key_id) => key_id,
        None => key_identifier(&issuer.tbs_certificate.subject_public_key_info),
    })
}

/// Extensions for a CA certificate; distribution points come from `issuer`
fn ca_extensions(
    issuer: &CaIdentity,
    path_len: Option<u8>,
    subject_key_id: &[u8],
    authority_key_id: &[u8],
) -> Result<Vec<Extension>> {
    let mut extensions = vec![
        basic_constraints(true, path_len)?,
        key_usage(KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign))?,
        subject_key_identifier(subject_key_id)?,
        authority_key_identifier(authority_key_id)?,
    ];
    if let Some(url) = issuer.crl_distribution_url.as_deref() {
        extensions.push(crl_distribution_points(url)?);
    }
    if let Some(url) = issuer.ocsp_url.as_deref() {
        extensions.push(authority_info_access_ocsp(url)?);
    }
    Ok(extensions)
}
