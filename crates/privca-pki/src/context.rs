//! Shared state handed to every component

use std::sync::Arc;

use privca_key::SigningKey;
use time::OffsetDateTime;
use x509_cert::Certificate;

use crate::{
    audit::{emit, AuditEvent, AuditSink},
    cert::cert_utils::parse_certificate_pem,
    config::PkiConfig,
    error::{PkiError, Result},
    store::PkiStore,
    types::CaIdentity,
    vault::Vault,
};

#[derive(Clone)]
pub struct PkiContext {
    pub store: Arc<dyn PkiStore>,
    pub vault: Arc<Vault>,
    pub audit: Arc<dyn AuditSink>,
    pub config: Arc<PkiConfig>,
}

impl std::fmt::Debug for PkiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkiContext")
            .field("environment", &self.config.environment)
            .finish_non_exhaustive()
    }
}

impl PkiContext {
    pub fn new(
        store: Arc<dyn PkiStore>,
        vault: Arc<Vault>,
        audit: Arc<dyn AuditSink>,
        config: Arc<PkiConfig>,
    ) -> Self {
        Self {
            store,
            vault,
            audit,
            config,
        }
    }

    pub fn audit(&self, event: AuditEvent) {
        emit(self.audit.as_ref(), event);
    }

    /// Identity with observed expiry applied
    pub fn find_ca(&self, ca_id: &str) -> Result<CaIdentity> {
        self.store
            .get_ca(ca_id)?
            .map(|ca| ca.observed(OffsetDateTime::now_utc()))
            .ok_or_else(|| PkiError::CANotFound(ca_id.to_string()))
    }

    /// Identity that may sign right now
    pub fn active_ca(&self, ca_id: &str) -> Result<CaIdentity> {
        let ca = self.find_ca(ca_id)?;
        if !ca.is_active(OffsetDateTime::now_utc()) {
            return Err(PkiError::CANotActive(format!(
                "CA {ca_id} is {:?}",
                ca.status
            )));
        }
        Ok(ca)
    }

    /// Decrypt the identity's private key
    pub fn ca_signing_key(&self, ca: &CaIdentity) -> Result<Box<dyn SigningKey>> {
        self.vault.signing_key(&ca.encrypted_private_key).map_err(|e| {
            tracing::error!(ca_id = %ca.id, "CA key could not be opened");
            e
        })
    }

    /// Parsed CA certificate; only identities past initialization have one
    pub fn ca_certificate(&self, ca: &CaIdentity) -> Result<Certificate> {
        let pem = ca.certificate_pem.as_deref().ok_or_else(|| {
            PkiError::CANotActive(format!("CA {} has no certificate", ca.id))
        })?;
        parse_certificate_pem(pem)
    }
}
