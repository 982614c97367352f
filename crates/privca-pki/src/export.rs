//! 证书导出
//!
//! PEM, DER, PKCS#12 and chain bundles for issued certificates.

use std::path::Path;

use p12::PFX;
use privca_key::{load_signing_key_from_pkcs8_pem, KeyExport};
use zeroize::Zeroizing;

use crate::{
    cert::cert_utils::{certificate_der, parse_certificate_pem},
    context::PkiContext,
    error::{PkiError, Result},
    types::IssuedCertificate,
};

/// 导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Pem,
    Der,
    Pkcs12,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Pem => "application/x-pem-file",
            Self::Der => "application/pkix-cert",
            Self::Pkcs12 => "application/x-pkcs12",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Pem => "pem",
            Self::Der => "cer",
            Self::Pkcs12 => "p12",
        }
    }
}

/// Contents of a decoded PKCS#12 archive
pub struct Pkcs12Contents {
    /// Certificate DERs, end-entity first
    pub certificates: Vec<Vec<u8>>,
    pub private_key_der: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for Pkcs12Contents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkcs12Contents")
            .field("certificates", &self.certificates.len())
            .field("private_key_der", &"[REDACTED]")
            .finish()
    }
}

/// 证书导出器
#[derive(Debug, Clone)]
pub struct CertificateExporter {
    ctx: PkiContext,
}

impl CertificateExporter {
    pub fn new(ctx: PkiContext) -> Self {
        Self { ctx }
    }

    fn certificate(&self, certificate_id: &str) -> Result<IssuedCertificate> {
        self.ctx
            .store
            .get_certificate(certificate_id)?
            .ok_or_else(|| PkiError::CertificateNotFound(certificate_id.to_string()))
    }

    pub fn certificate_pem(&self, certificate_id: &str) -> Result<String> {
        Ok(self.certificate(certificate_id)?.certificate_pem)
    }

    pub fn certificate_der(&self, certificate_id: &str) -> Result<Vec<u8>> {
        let record = self.certificate(certificate_id)?;
        certificate_der(&parse_certificate_pem(&record.certificate_pem)?)
    }

    /// Certificate followed by the issuing CA's chain, as one PEM text
    pub fn chain_bundle(&self, certificate_id: &str) -> Result<String> {
        let record = self.certificate(certificate_id)?;
        let ca = self.ctx.find_ca(&record.ca_id)?;
        let mut bundle = record.certificate_pem;
        for pem in &ca.certificate_chain_pem {
            if !bundle.ends_with('\n') {
                bundle.push('\n');
            }
            bundle.push_str(pem);
        }
        Ok(bundle)
    }

    /// 打包证书、私钥与 CA 证书为 PKCS#12
    ///
    /// Only certificates whose key was generated here have one to export.
    pub fn pkcs12(&self, certificate_id: &str, password: &str) -> Result<Vec<u8>> {
        if password.is_empty() {
            return Err(PkiError::ValidationError(
                "PKCS#12 export requires a non-empty password".to_string(),
            ));
        }
        let record = self.certificate(certificate_id)?;
        let blob = record.encrypted_private_key.as_ref().ok_or_else(|| {
            PkiError::ExportError(format!(
                "Certificate {certificate_id} has no stored private key"
            ))
        })?;

        let key_pem = self.ctx.vault.decrypt(blob)?;
        let key_der = Zeroizing::new(load_signing_key_from_pkcs8_pem(&key_pem)?.to_pkcs8_der()?);
        let cert_der = certificate_der(&parse_certificate_pem(&record.certificate_pem)?)?;
        let ca = self.ctx.find_ca(&record.ca_id)?;
        let ca_der = certificate_der(&self.ctx.ca_certificate(&ca)?)?;

        let pfx = PFX::new(&cert_der, &key_der, Some(&ca_der), password, &record.subject_dn)
            .ok_or_else(|| {
                tracing::error!(certificate_id, "PKCS#12 assembly failed");
                PkiError::ExportError("Failed to build PKCS#12 archive".to_string())
            })?;
        tracing::info!(certificate_id, serial = %record.serial_number, "Exported PKCS#12");
        Ok(pfx.to_der())
    }

    /// 按格式导出
    pub fn export(&self, certificate_id: &str, format: ExportFormat, password: Option<&str>) -> Result<Vec<u8>> {
        match format {
            ExportFormat::Pem => Ok(self.certificate_pem(certificate_id)?.into_bytes()),
            ExportFormat::Der => self.certificate_der(certificate_id),
            ExportFormat::Pkcs12 => self.pkcs12(certificate_id, password.unwrap_or_default()),
        }
    }

    /// Export and write to `path`
    pub fn export_to_file<P: AsRef<Path>>(
        &self,
        certificate_id: &str,
        format: ExportFormat,
        password: Option<&str>,
        path: P,
    ) -> Result<()> {
        let bytes = self.export(certificate_id, format, password)?;
        std::fs::write(path.as_ref(), bytes)?;
        tracing::debug!(certificate_id, path = %path.as_ref().display(), "Export written");
        Ok(())
    }
}

/// Decode a PKCS#12 archive, checking its MAC first
pub fn parse_pkcs12(der: &[u8], password: &str) -> Result<Pkcs12Contents> {
    let pfx = PFX::parse(der)
        .map_err(|e| PkiError::ParseError(format!("Malformed PKCS#12: {e:?}")))?;
    if !pfx.verify_mac(password) {
        return Err(PkiError::DecryptionFailed("PKCS#12 MAC does not verify".to_string()));
    }
    let certificates = pfx
        .cert_x509_bags(password)
        .map_err(|e| PkiError::ParseError(format!("Unreadable PKCS#12 certificates: {e:?}")))?;
    let private_key_der = pfx
        .key_bags(password)
        .map_err(|e| PkiError::ParseError(format!("Unreadable PKCS#12 key: {e:?}")))?
        .into_iter()
        .next()
        .ok_or_else(|| PkiError::ParseError("PKCS#12 holds no private key".to_string()))?;
    Ok(Pkcs12Contents {
        certificates,
        private_key_der: Zeroizing::new(private_key_der),
    })
}
