//! PKI 门面
//!
//! Wires store, vault, audit sink and configuration into one shared context
//! and hands out the components that operate on it.

use std::{path::Path, sync::Arc};

use crate::{
    audit::{AuditSink, TracingAuditSink},
    ca::CaManager,
    config::PkiConfig,
    context::PkiContext,
    error::Result,
    export::CertificateExporter,
    issuance::IssuanceEngine,
    ocsp::OcspResponder,
    revocation::RevocationManager,
    store::{MemoryStore, PkiStore},
    validation::Validator,
    vault::Vault,
};

/// 私有 CA 引擎
#[derive(Debug, Clone)]
pub struct Pki {
    ctx: PkiContext,
    validator: Arc<Validator>,
}

impl Pki {
    /// Validated config, in-memory store, tracing audit sink
    pub fn new(config: PkiConfig) -> Result<Self> {
        config.validate()?;
        let vault = Vault::from_config(&config)?;
        Ok(Self::from_parts(
            Arc::new(MemoryStore::new()),
            Arc::new(vault),
            Arc::new(TracingAuditSink),
            config,
        ))
    }

    /// Load the TOML config at `path`, then build as [`Pki::new`]
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(PkiConfig::load(path)?)
    }

    pub fn from_parts(
        store: Arc<dyn PkiStore>,
        vault: Arc<Vault>,
        audit: Arc<dyn AuditSink>,
        config: PkiConfig,
    ) -> Self {
        let ctx = PkiContext::new(store, vault, audit, Arc::new(config));
        let validator = Arc::new(Validator::new(ctx.clone()));
        tracing::info!(environment = ?ctx.config.environment, "PKI engine ready");
        Self { ctx, validator }
    }

    pub fn context(&self) -> &PkiContext {
        &self.ctx
    }

    pub fn config(&self) -> &PkiConfig {
        &self.ctx.config
    }

    pub fn ca_manager(&self) -> CaManager {
        CaManager::new(self.ctx.clone())
    }

    pub fn issuance(&self) -> IssuanceEngine {
        IssuanceEngine::new(self.ctx.clone())
    }

    pub fn revocation(&self) -> RevocationManager {
        RevocationManager::new(self.ctx.clone())
    }

    pub fn ocsp(&self) -> OcspResponder {
        OcspResponder::new(self.ctx.clone())
    }

    pub fn exporter(&self) -> CertificateExporter {
        CertificateExporter::new(self.ctx.clone())
    }

    /// Shared validator; its cache lives as long as this engine
    pub fn validator(&self) -> &Validator {
        &self.validator
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use base64::{engine::general_purpose::STANDARD, Engine};

    use super::*;
    use crate::error::PkiError;

    #[test]
    fn test_from_config_file() {
        let master_key = STANDARD.encode([9u8; 32]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "environment = \"test\"\n\n[vault]\nmaster_key = \"{master_key}\"\n\n[ocsp]\nnext_update_hours = 2"
        )
        .unwrap();

        let pki = Pki::from_config_file(file.path()).unwrap();
        assert_eq!(pki.config().ocsp.next_update_hours, 2);
        assert!(pki.ca_manager().list_cas().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PkiConfig::default();
        config.crl.next_update_hours = 0;
        assert!(matches!(Pki::new(config), Err(PkiError::ConfigurationError(_))));
    }
}
